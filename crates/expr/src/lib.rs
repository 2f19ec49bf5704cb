//! The plan IR: one tagged variant tree shared by the parser, the schema
//! resolver, the rule engine and the executor.
//!
//! Scalar operators (constants, variables, arithmetic, comparisons, ...)
//! and relational operators (load, selection, join, ...) live in the same
//! `Expr` enum so a whole query plan is a single tree. Relational nodes
//! carry an optional output `Schema`; a plan is *resolved* once every
//! relational node's schema is known.
//!
//! Extension operators added by syntax packs use the `ExtScalar`/`ExtRel`
//! escape hatches: the node stores only a registered tag, and the registry
//! owns the mapping from tag to resolver and executor.

pub mod cost;
pub mod predicate;
#[cfg(test)]
mod tests;

pub use predicate::Predicate;

use common::{EngineError, EngineResult, EvalContext, Rows};
use schema::Schema;
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::sync::Arc;
use types::{ExtOpTag, FieldType, Value};

/// Unary scalar operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Binary scalar operators, arithmetic through logical.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Lt,
    Le,
    Eq,
    Ne,
    Ge,
    Gt,
    Is,
    IsNot,
    Like,
    NotLike,
    RLike,
    NotRLike,
    RegExp,
    And,
    Or,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "!=",
            BinaryOp::Ge => ">=",
            BinaryOp::Gt => ">",
            BinaryOp::Is => "IS",
            BinaryOp::IsNot => "IS NOT",
            BinaryOp::Like => "LIKE",
            BinaryOp::NotLike => "NOT LIKE",
            BinaryOp::RLike => "RLIKE",
            BinaryOp::NotRLike => "NOT RLIKE",
            BinaryOp::RegExp => "REGEXP",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
        };
        write!(f, "{text}")
    }
}

/// Key of the `$k` item getter.
#[derive(Clone, Debug, PartialEq)]
pub enum ItemKey {
    Index(usize),
    Name(String),
}

/// One WHEN/THEN arm of a CASE expression.
#[derive(Clone, Debug, PartialEq)]
pub struct CaseArm {
    pub when: Expr,
    pub then: Expr,
}

/// Capability yielding a relation's rows for a given evaluation context.
/// The context is shared so lazy row streams can keep a handle to it.
pub type RowSource = Arc<dyn Fn(&Rc<EvalContext>) -> EngineResult<Rows>>;

/// A bound leaf: a resolved `Load` with its adapter, schema and row source.
#[derive(Clone)]
pub struct Relation {
    pub adapter: String,
    pub name: String,
    pub schema: Schema,
    pub source: RowSource,
}

impl Relation {
    pub fn new(
        adapter: impl Into<String>,
        name: impl Into<String>,
        schema: Schema,
        source: RowSource,
    ) -> Self {
        Self {
            adapter: adapter.into(),
            name: name.into(),
            schema,
            source,
        }
    }

    pub fn scan(&self, ctx: &Rc<EvalContext>) -> EngineResult<Rows> {
        (self.source.as_ref())(ctx)
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relation")
            .field("adapter", &self.adapter)
            .field("name", &self.name)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

/// Two relations are the same leaf when adapter and name agree; the row
/// source is a capability, not an attribute.
impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.adapter == other.adapter && self.name == other.name
    }
}

/// Variant tag, used by rule operands to pattern-match plan shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExprKind {
    Const,
    Var,
    Param,
    ItemGetter,
    FuncCall,
    Unary,
    Binary,
    Between,
    In,
    Tuple,
    Case,
    Cast,
    Asc,
    Desc,
    Rename,
    SelectAll,
    ExtScalar(ExtOpTag),
    Load,
    Relation,
    Alias,
    Projection,
    Selection,
    GroupBy,
    OrderBy,
    Slice,
    Join,
    LeftJoin,
    UnionAll,
    ExtRel(ExtOpTag),
}

/// A plan node. See the module docs for the variant families.
#[derive(Clone, Debug)]
pub enum Expr {
    // ---- scalar values and operators ----
    Const(Value),
    Var {
        path: String,
    },
    /// Positional query parameter `?<index>`.
    Param {
        index: usize,
    },
    /// `$k` positional item getter.
    ItemGetter {
        key: ItemKey,
    },
    /// Scalar UDF, aggregate, or relational table function call.
    FuncCall {
        name: String,
        args: Vec<Expr>,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    In {
        needle: Box<Expr>,
        items: Box<Expr>,
    },
    Tuple {
        exprs: Vec<Expr>,
    },
    Case {
        arms: Vec<CaseArm>,
        default: Option<Box<Expr>>,
    },
    Cast {
        expr: Box<Expr>,
        ty: FieldType,
    },
    Asc {
        expr: Box<Expr>,
    },
    Desc {
        expr: Box<Expr>,
    },
    /// `<expr> AS <name>` in a result column list.
    Rename {
        name: String,
        expr: Box<Expr>,
    },
    /// `*` or `<qualifier>.*`.
    SelectAll {
        qualifier: Option<String>,
    },
    /// Extension scalar operator; semantics live in the syntax registry.
    ExtScalar {
        tag: ExtOpTag,
        args: Vec<Expr>,
        cost_factor: f64,
    },

    // ---- relational operators ----
    Load {
        name: String,
    },
    Relation(Relation),
    Alias {
        name: String,
        input: Box<Expr>,
        schema: Option<Schema>,
    },
    Projection {
        input: Box<Expr>,
        exprs: Vec<Expr>,
        schema: Option<Schema>,
    },
    Selection {
        input: Box<Expr>,
        predicate: Option<Box<Expr>>,
        schema: Option<Schema>,
    },
    GroupBy {
        input: Box<Expr>,
        keys: Vec<Expr>,
        schema: Option<Schema>,
    },
    OrderBy {
        input: Box<Expr>,
        keys: Vec<Expr>,
        schema: Option<Schema>,
    },
    Slice {
        input: Box<Expr>,
        start: usize,
        stop: Option<usize>,
        schema: Option<Schema>,
    },
    Join {
        left: Box<Expr>,
        right: Box<Expr>,
        predicate: Box<Expr>,
        schema: Option<Schema>,
    },
    LeftJoin {
        left: Box<Expr>,
        right: Box<Expr>,
        predicate: Box<Expr>,
        schema: Option<Schema>,
    },
    UnionAll {
        left: Box<Expr>,
        right: Box<Expr>,
        schema: Option<Schema>,
    },
    /// Extension relational operator (e.g. a similarity selection).
    ExtRel {
        tag: ExtOpTag,
        input: Box<Expr>,
        predicate: Option<Box<Expr>>,
        schema: Option<Schema>,
        cost_factor: f64,
    },
}

/// Options for structural equality.
///
/// The default ignores schemas (so an unresolved parse tree equals its
/// resolved twin) and keeps `Load` distinct from `Relation`.
#[derive(Clone, Copy, Debug)]
pub struct EqOptions {
    pub ignore_schema: bool,
    pub match_load_and_relation: bool,
}

impl Default for EqOptions {
    fn default() -> Self {
        Self {
            ignore_schema: true,
            match_load_and_relation: false,
        }
    }
}

/// Traversal order for plan iteration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TraversalOrder {
    #[default]
    DepthFirst,
    /// Breadth-first; the plan is a tree, so this is topological order.
    Topological,
}

/// Path of relational child indices from the root to a node.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NodePath(pub Vec<usize>);

// ---- constructors --------------------------------------------------------

impl Expr {
    pub fn var(path: impl Into<String>) -> Expr {
        Expr::Var { path: path.into() }
    }

    pub fn int(v: i64) -> Expr {
        Expr::Const(Value::Int(v))
    }

    pub fn float(v: f64) -> Expr {
        Expr::Const(Value::Float(v))
    }

    pub fn string(v: impl Into<String>) -> Expr {
        Expr::Const(Value::Str(v.into()))
    }

    pub fn boolean(v: bool) -> Expr {
        Expr::Const(Value::Bool(v))
    }

    pub fn null() -> Expr {
        Expr::Const(Value::Null)
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn and(lhs: Expr, rhs: Expr) -> Expr {
        Expr::binary(BinaryOp::And, lhs, rhs)
    }

    pub fn rename(name: impl Into<String>, expr: Expr) -> Expr {
        Expr::Rename {
            name: name.into(),
            expr: Box::new(expr),
        }
    }

    pub fn load(name: impl Into<String>) -> Expr {
        Expr::Load { name: name.into() }
    }

    pub fn alias(name: impl Into<String>, input: Expr) -> Expr {
        Expr::Alias {
            name: name.into(),
            input: Box::new(input),
            schema: None,
        }
    }

    pub fn projection(input: Expr, exprs: Vec<Expr>) -> Expr {
        Expr::Projection {
            input: Box::new(input),
            exprs,
            schema: None,
        }
    }

    pub fn selection(input: Expr, predicate: Expr) -> Expr {
        Expr::Selection {
            input: Box::new(input),
            predicate: Some(Box::new(predicate)),
            schema: None,
        }
    }

    pub fn group_by(input: Expr, keys: Vec<Expr>) -> Expr {
        Expr::GroupBy {
            input: Box::new(input),
            keys,
            schema: None,
        }
    }

    pub fn order_by(input: Expr, keys: Vec<Expr>) -> Expr {
        Expr::OrderBy {
            input: Box::new(input),
            keys,
            schema: None,
        }
    }

    pub fn slice(input: Expr, start: usize, stop: Option<usize>) -> Expr {
        Expr::Slice {
            input: Box::new(input),
            start,
            stop,
            schema: None,
        }
    }

    pub fn join(left: Expr, right: Expr, predicate: Expr) -> Expr {
        Expr::Join {
            left: Box::new(left),
            right: Box::new(right),
            predicate: Box::new(predicate),
            schema: None,
        }
    }

    pub fn left_join(left: Expr, right: Expr, predicate: Expr) -> Expr {
        Expr::LeftJoin {
            left: Box::new(left),
            right: Box::new(right),
            predicate: Box::new(predicate),
            schema: None,
        }
    }

    pub fn union_all(left: Expr, right: Expr) -> Expr {
        Expr::UnionAll {
            left: Box::new(left),
            right: Box::new(right),
            schema: None,
        }
    }
}

// ---- structure -----------------------------------------------------------

impl Expr {
    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Const(_) => ExprKind::Const,
            Expr::Var { .. } => ExprKind::Var,
            Expr::Param { .. } => ExprKind::Param,
            Expr::ItemGetter { .. } => ExprKind::ItemGetter,
            Expr::FuncCall { .. } => ExprKind::FuncCall,
            Expr::Unary { .. } => ExprKind::Unary,
            Expr::Binary { .. } => ExprKind::Binary,
            Expr::Between { .. } => ExprKind::Between,
            Expr::In { .. } => ExprKind::In,
            Expr::Tuple { .. } => ExprKind::Tuple,
            Expr::Case { .. } => ExprKind::Case,
            Expr::Cast { .. } => ExprKind::Cast,
            Expr::Asc { .. } => ExprKind::Asc,
            Expr::Desc { .. } => ExprKind::Desc,
            Expr::Rename { .. } => ExprKind::Rename,
            Expr::SelectAll { .. } => ExprKind::SelectAll,
            Expr::ExtScalar { tag, .. } => ExprKind::ExtScalar(*tag),
            Expr::Load { .. } => ExprKind::Load,
            Expr::Relation(_) => ExprKind::Relation,
            Expr::Alias { .. } => ExprKind::Alias,
            Expr::Projection { .. } => ExprKind::Projection,
            Expr::Selection { .. } => ExprKind::Selection,
            Expr::GroupBy { .. } => ExprKind::GroupBy,
            Expr::OrderBy { .. } => ExprKind::OrderBy,
            Expr::Slice { .. } => ExprKind::Slice,
            Expr::Join { .. } => ExprKind::Join,
            Expr::LeftJoin { .. } => ExprKind::LeftJoin,
            Expr::UnionAll { .. } => ExprKind::UnionAll,
            Expr::ExtRel { tag, .. } => ExprKind::ExtRel(*tag),
        }
    }

    pub fn is_relational(&self) -> bool {
        matches!(
            self,
            Expr::Load { .. }
                | Expr::Relation(_)
                | Expr::Alias { .. }
                | Expr::Projection { .. }
                | Expr::Selection { .. }
                | Expr::GroupBy { .. }
                | Expr::OrderBy { .. }
                | Expr::Slice { .. }
                | Expr::Join { .. }
                | Expr::LeftJoin { .. }
                | Expr::UnionAll { .. }
                | Expr::ExtRel { .. }
        )
    }

    /// Output schema slot of a relational node. `None` for scalar nodes and
    /// for unresolved relational nodes.
    pub fn schema(&self) -> Option<&Schema> {
        match self {
            Expr::Relation(rel) => Some(&rel.schema),
            Expr::Alias { schema, .. }
            | Expr::Projection { schema, .. }
            | Expr::Selection { schema, .. }
            | Expr::GroupBy { schema, .. }
            | Expr::OrderBy { schema, .. }
            | Expr::Slice { schema, .. }
            | Expr::Join { schema, .. }
            | Expr::LeftJoin { schema, .. }
            | Expr::UnionAll { schema, .. }
            | Expr::ExtRel { schema, .. } => schema.as_ref(),
            _ => None,
        }
    }

    pub fn set_schema(&mut self, new_schema: Schema) {
        match self {
            Expr::Relation(rel) => rel.schema = new_schema,
            Expr::Alias { schema, .. }
            | Expr::Projection { schema, .. }
            | Expr::Selection { schema, .. }
            | Expr::GroupBy { schema, .. }
            | Expr::OrderBy { schema, .. }
            | Expr::Slice { schema, .. }
            | Expr::Join { schema, .. }
            | Expr::LeftJoin { schema, .. }
            | Expr::UnionAll { schema, .. }
            | Expr::ExtRel { schema, .. } => *schema = Some(new_schema),
            _ => {}
        }
    }

    /// Whether this plan is resolved. The root's status is a sufficient
    /// proxy: the resolver works bottom-up, so partially resolved trees
    /// never escape it.
    pub fn is_resolved(&self) -> bool {
        match self {
            Expr::Load { .. } => false,
            Expr::Relation(_) => true,
            _ if self.is_relational() => self.schema().is_some(),
            _ => match self.operand_children().first() {
                Some(child) => child.is_resolved(),
                None => true,
            },
        }
    }

    /// Relational children, the edges plan traversal and rule matching walk.
    /// Predicates and projection expressions are attributes, not children.
    pub fn rel_children(&self) -> Vec<&Expr> {
        match self {
            Expr::Alias { input, .. }
            | Expr::Projection { input, .. }
            | Expr::Selection { input, .. }
            | Expr::GroupBy { input, .. }
            | Expr::OrderBy { input, .. }
            | Expr::Slice { input, .. }
            | Expr::ExtRel { input, .. } => vec![input.as_ref()],
            Expr::Join { left, right, .. }
            | Expr::LeftJoin { left, right, .. }
            | Expr::UnionAll { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            Expr::FuncCall { args, .. } => args.iter().filter(|a| a.is_relational()).collect(),
            _ => Vec::new(),
        }
    }

    pub fn rel_children_mut(&mut self) -> Vec<&mut Expr> {
        match self {
            Expr::Alias { input, .. }
            | Expr::Projection { input, .. }
            | Expr::Selection { input, .. }
            | Expr::GroupBy { input, .. }
            | Expr::OrderBy { input, .. }
            | Expr::Slice { input, .. }
            | Expr::ExtRel { input, .. } => vec![input.as_mut()],
            Expr::Join { left, right, .. }
            | Expr::LeftJoin { left, right, .. }
            | Expr::UnionAll { left, right, .. } => vec![left.as_mut(), right.as_mut()],
            Expr::FuncCall { args, .. } => {
                args.iter_mut().filter(|a| a.is_relational()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// Scalar operand children, the edges predicate analysis walks.
    pub fn operand_children(&self) -> Vec<&Expr> {
        match self {
            Expr::Unary { expr, .. }
            | Expr::Cast { expr, .. }
            | Expr::Asc { expr }
            | Expr::Desc { expr }
            | Expr::Rename { expr, .. } => vec![expr.as_ref()],
            Expr::Binary { lhs, rhs, .. } => vec![lhs.as_ref(), rhs.as_ref()],
            Expr::Between { expr, low, high } => {
                vec![expr.as_ref(), low.as_ref(), high.as_ref()]
            }
            Expr::In { needle, items } => vec![needle.as_ref(), items.as_ref()],
            Expr::Case { arms, default } => {
                let mut children: Vec<&Expr> = Vec::new();
                for arm in arms {
                    children.push(&arm.when);
                    children.push(&arm.then);
                }
                if let Some(default) = default {
                    children.push(default.as_ref());
                }
                children
            }
            Expr::ExtScalar { args, .. } => args.iter().collect(),
            _ => Vec::new(),
        }
    }

    /// Paths of every relational node under (and including) this one, in
    /// the given order. DFS is pre-order; the root path is empty.
    pub fn rel_paths(&self, order: TraversalOrder) -> Vec<NodePath> {
        let mut paths = Vec::new();
        match order {
            TraversalOrder::DepthFirst => {
                fn walk(node: &Expr, path: &mut Vec<usize>, out: &mut Vec<NodePath>) {
                    out.push(NodePath(path.clone()));
                    for (idx, child) in node.rel_children().into_iter().enumerate() {
                        path.push(idx);
                        walk(child, path, out);
                        path.pop();
                    }
                }
                walk(self, &mut Vec::new(), &mut paths);
            }
            TraversalOrder::Topological => {
                let mut queue: VecDeque<(NodePath, &Expr)> = VecDeque::new();
                queue.push_back((NodePath(Vec::new()), self));
                while let Some((path, node)) = queue.pop_front() {
                    for (idx, child) in node.rel_children().into_iter().enumerate() {
                        let mut child_path = path.0.clone();
                        child_path.push(idx);
                        queue.push_back((NodePath(child_path), child));
                    }
                    paths.push(path);
                }
            }
        }
        paths
    }

    pub fn node_at(&self, path: &NodePath) -> Option<&Expr> {
        let mut node = self;
        for &idx in &path.0 {
            node = node.rel_children().into_iter().nth(idx)?;
        }
        Some(node)
    }

    pub fn node_at_mut(&mut self, path: &NodePath) -> Option<&mut Expr> {
        let mut node = self;
        for &idx in &path.0 {
            node = node.rel_children_mut().into_iter().nth(idx)?;
        }
        Some(node)
    }

    /// Overwrite the node at `path` with a replacement subtree.
    pub fn replace_at(&mut self, path: &NodePath, replacement: Expr) -> EngineResult<()> {
        match self.node_at_mut(path) {
            Some(slot) => {
                *slot = replacement;
                Ok(())
            }
            None => Err(EngineError::PlannerInternal(format!(
                "no plan node at path {:?}",
                path.0
            ))),
        }
    }

    /// Deep copy. Ownership guarantees the copy shares no node identity
    /// with the original; row sources are capabilities and stay shared.
    pub fn deep_copy(&self) -> Expr {
        self.clone()
    }
}

// ---- equality ------------------------------------------------------------

fn eq_opt_schema(a: &Option<Schema>, b: &Option<Schema>, opts: &EqOptions) -> bool {
    opts.ignore_schema || a == b
}

fn eq_opt_box(a: &Option<Box<Expr>>, b: &Option<Box<Expr>>, opts: &EqOptions) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equal(b, opts),
        _ => false,
    }
}

fn eq_vec(a: &[Expr], b: &[Expr], opts: &EqOptions) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.equal(y, opts))
}

impl Expr {
    /// Structural equality by variant tag and attribute values.
    pub fn equal(&self, other: &Expr, opts: &EqOptions) -> bool {
        use Expr::*;
        match (self, other) {
            // A bound Relation equals the LoadOp it was bound from only when
            // the caller opts in.
            (Load { name }, Relation(rel)) | (Relation(rel), Load { name }) => {
                opts.match_load_and_relation && *name == rel.name
            }
            (Relation(a), Relation(b)) => a == b,
            (Const(a), Const(b)) => a == b,
            (Var { path: a }, Var { path: b }) => a == b,
            (Param { index: a }, Param { index: b }) => a == b,
            (ItemGetter { key: a }, ItemGetter { key: b }) => a == b,
            (FuncCall { name: a, args: x }, FuncCall { name: b, args: y }) => {
                a == b && eq_vec(x, y, opts)
            }
            (Unary { op: a, expr: x }, Unary { op: b, expr: y }) => a == b && x.equal(y, opts),
            (
                Binary {
                    op: a,
                    lhs: al,
                    rhs: ar,
                },
                Binary {
                    op: b,
                    lhs: bl,
                    rhs: br,
                },
            ) => a == b && al.equal(bl, opts) && ar.equal(br, opts),
            (
                Between {
                    expr: ax,
                    low: al,
                    high: ah,
                },
                Between {
                    expr: bx,
                    low: bl,
                    high: bh,
                },
            ) => ax.equal(bx, opts) && al.equal(bl, opts) && ah.equal(bh, opts),
            (
                In {
                    needle: an,
                    items: ai,
                },
                In {
                    needle: bn,
                    items: bi,
                },
            ) => an.equal(bn, opts) && ai.equal(bi, opts),
            (Tuple { exprs: a }, Tuple { exprs: b }) => eq_vec(a, b, opts),
            (
                Case {
                    arms: aa,
                    default: ad,
                },
                Case {
                    arms: ba,
                    default: bd,
                },
            ) => {
                aa.len() == ba.len()
                    && aa.iter().zip(ba).all(|(x, y)| {
                        x.when.equal(&y.when, opts) && x.then.equal(&y.then, opts)
                    })
                    && match (ad, bd) {
                        (None, None) => true,
                        (Some(x), Some(y)) => x.equal(y, opts),
                        _ => false,
                    }
            }
            (Cast { expr: ax, ty: at }, Cast { expr: bx, ty: bt }) => {
                at == bt && ax.equal(bx, opts)
            }
            (Asc { expr: a }, Asc { expr: b }) | (Desc { expr: a }, Desc { expr: b }) => {
                a.equal(b, opts)
            }
            (Rename { name: an, expr: ax }, Rename { name: bn, expr: bx }) => {
                an == bn && ax.equal(bx, opts)
            }
            (SelectAll { qualifier: a }, SelectAll { qualifier: b }) => a == b,
            (
                ExtScalar {
                    tag: at,
                    args: aa,
                    cost_factor: af,
                },
                ExtScalar {
                    tag: bt,
                    args: ba,
                    cost_factor: bf,
                },
            ) => at == bt && af == bf && eq_vec(aa, ba, opts),
            (Load { name: a }, Load { name: b }) => a == b,
            (
                Alias {
                    name: an,
                    input: ai,
                    schema: asch,
                },
                Alias {
                    name: bn,
                    input: bi,
                    schema: bsch,
                },
            ) => an == bn && ai.equal(bi, opts) && eq_opt_schema(asch, bsch, opts),
            (
                Projection {
                    input: ai,
                    exprs: ae,
                    schema: asch,
                },
                Projection {
                    input: bi,
                    exprs: be,
                    schema: bsch,
                },
            ) => ai.equal(bi, opts) && eq_vec(ae, be, opts) && eq_opt_schema(asch, bsch, opts),
            (
                Selection {
                    input: ai,
                    predicate: ap,
                    schema: asch,
                },
                Selection {
                    input: bi,
                    predicate: bp,
                    schema: bsch,
                },
            ) => {
                ai.equal(bi, opts) && eq_opt_box(ap, bp, opts) && eq_opt_schema(asch, bsch, opts)
            }
            (
                GroupBy {
                    input: ai,
                    keys: ak,
                    schema: asch,
                },
                GroupBy {
                    input: bi,
                    keys: bk,
                    schema: bsch,
                },
            )
            | (
                OrderBy {
                    input: ai,
                    keys: ak,
                    schema: asch,
                },
                OrderBy {
                    input: bi,
                    keys: bk,
                    schema: bsch,
                },
            ) => ai.equal(bi, opts) && eq_vec(ak, bk, opts) && eq_opt_schema(asch, bsch, opts),
            (
                Slice {
                    input: ai,
                    start: ast,
                    stop: asp,
                    schema: asch,
                },
                Slice {
                    input: bi,
                    start: bst,
                    stop: bsp,
                    schema: bsch,
                },
            ) => {
                ast == bst
                    && asp == bsp
                    && ai.equal(bi, opts)
                    && eq_opt_schema(asch, bsch, opts)
            }
            (
                Join {
                    left: al,
                    right: ar,
                    predicate: ap,
                    schema: asch,
                },
                Join {
                    left: bl,
                    right: br,
                    predicate: bp,
                    schema: bsch,
                },
            )
            | (
                LeftJoin {
                    left: al,
                    right: ar,
                    predicate: ap,
                    schema: asch,
                },
                LeftJoin {
                    left: bl,
                    right: br,
                    predicate: bp,
                    schema: bsch,
                },
            ) => {
                al.equal(bl, opts)
                    && ar.equal(br, opts)
                    && ap.equal(bp, opts)
                    && eq_opt_schema(asch, bsch, opts)
            }
            (
                UnionAll {
                    left: al,
                    right: ar,
                    schema: asch,
                },
                UnionAll {
                    left: bl,
                    right: br,
                    schema: bsch,
                },
            ) => al.equal(bl, opts) && ar.equal(br, opts) && eq_opt_schema(asch, bsch, opts),
            (
                ExtRel {
                    tag: at,
                    input: ai,
                    predicate: ap,
                    schema: asch,
                    cost_factor: af,
                },
                ExtRel {
                    tag: bt,
                    input: bi,
                    predicate: bp,
                    schema: bsch,
                    cost_factor: bf,
                },
            ) => {
                at == bt
                    && af == bf
                    && ai.equal(bi, opts)
                    && eq_opt_box(ap, bp, opts)
                    && eq_opt_schema(asch, bsch, opts)
            }
            _ => false,
        }
    }

    /// Equality including schemas; both plans must be resolved.
    pub fn equal_resolved(&self, other: &Expr) -> EngineResult<bool> {
        if !self.is_resolved() || !other.is_resolved() {
            return Err(EngineError::PlannerInternal(
                "equal_resolved requires resolved plans".into(),
            ));
        }
        Ok(self.equal(
            other,
            &EqOptions {
                ignore_schema: false,
                match_load_and_relation: false,
            },
        ))
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.equal(other, &EqOptions::default())
    }
}

// ---- display -------------------------------------------------------------

fn comma_join(exprs: &[Expr]) -> String {
    exprs
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(Value::Str(s)) => write!(f, "'{s}'"),
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Var { path } => write!(f, "{path}"),
            Expr::Param { index } => write!(f, "?{index}"),
            Expr::ItemGetter { key: ItemKey::Index(i) } => write!(f, "${i}"),
            Expr::ItemGetter { key: ItemKey::Name(n) } => write!(f, "${n}"),
            Expr::FuncCall { name, args } => write!(f, "{name}({})", comma_join(args)),
            Expr::Unary { op: UnaryOp::Neg, expr } => write!(f, "-{expr}"),
            Expr::Unary { op: UnaryOp::Not, expr } => write!(f, "NOT {expr}"),
            Expr::Binary { op, lhs, rhs } => write!(f, "{lhs} {op} {rhs}"),
            Expr::Between { expr, low, high } => {
                write!(f, "{expr} BETWEEN {low} AND {high}")
            }
            Expr::In { needle, items } => write!(f, "{needle} IN {items}"),
            Expr::Tuple { exprs } => write!(f, "({})", comma_join(exprs)),
            Expr::Case { arms, default } => {
                write!(f, "CASE")?;
                for arm in arms {
                    write!(f, " WHEN {} THEN {}", arm.when, arm.then)?;
                }
                if let Some(default) = default {
                    write!(f, " ELSE {default}")?;
                }
                write!(f, " END")
            }
            Expr::Cast { expr, ty } => write!(f, "CAST({expr} AS {ty})"),
            Expr::Asc { expr } => write!(f, "{expr} ASC"),
            Expr::Desc { expr } => write!(f, "{expr} DESC"),
            Expr::Rename { name, expr } => write!(f, "{expr} AS {name}"),
            Expr::SelectAll { qualifier: None } => write!(f, "*"),
            Expr::SelectAll {
                qualifier: Some(q),
            } => write!(f, "{q}.*"),
            Expr::ExtScalar { tag, args, .. } => {
                write!(f, "ext#{}({})", tag.0, comma_join(args))
            }
            Expr::Load { name } => write!(f, "Load : {name}"),
            Expr::Relation(rel) => write!(f, "Relation : {}", rel.name),
            Expr::Alias { name, .. } => write!(f, "Alias : {name}"),
            Expr::Projection { exprs, .. } => write!(f, "Projection : {}", comma_join(exprs)),
            Expr::Selection { predicate, .. } => match predicate {
                Some(p) => write!(f, "Selection : {p}"),
                None => write!(f, "Selection : true"),
            },
            Expr::GroupBy { keys, .. } => write!(f, "GroupBy : {}", comma_join(keys)),
            Expr::OrderBy { keys, .. } => write!(f, "OrderBy : {}", comma_join(keys)),
            Expr::Slice { start, stop, .. } => write!(f, "Slice : {start}..{stop:?}"),
            Expr::Join { predicate, .. } => write!(f, "Join : {predicate}"),
            Expr::LeftJoin { predicate, .. } => write!(f, "LeftJoin : {predicate}"),
            Expr::UnionAll { .. } => write!(f, "UnionAll"),
            Expr::ExtRel { tag, predicate, .. } => match predicate {
                Some(p) => write!(f, "ExtRel#{} : {p}", tag.0),
                None => write!(f, "ExtRel#{} : true", tag.0),
            },
        }
    }
}
