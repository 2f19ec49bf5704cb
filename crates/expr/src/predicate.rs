//! Predicate analysis: source-column extraction, AND-decorrelation and
//! grouping by related child relation. The predicate-push-down rule is the
//! main consumer.

use crate::{BinaryOp, EqOptions, Expr, ExprKind};
use common::{EngineError, EngineResult};

/// A scalar expression used as a boolean, together with the source columns
/// it references. Never appears inside a plan tree.
#[derive(Clone, Debug)]
pub struct Predicate {
    expr: Expr,
    sources: Vec<String>,
}

impl PartialEq for Predicate {
    fn eq(&self, other: &Self) -> bool {
        self.expr == other.expr
    }
}

impl Predicate {
    pub fn new(expr: Expr) -> EngineResult<Self> {
        let mut sources = Vec::new();
        collect_sources(&expr, &mut sources)?;
        Ok(Self { expr, sources })
    }

    /// Predicate of a relational operator that carries one (Selection, Join,
    /// extended selections).
    pub fn from_rel_op(op: &Expr) -> EngineResult<Self> {
        let predicate = match op {
            Expr::Selection {
                predicate: Some(p), ..
            }
            | Expr::ExtRel {
                predicate: Some(p), ..
            } => p.as_ref().clone(),
            Expr::Join { predicate, .. } | Expr::LeftJoin { predicate, .. } => {
                predicate.as_ref().clone()
            }
            _ => {
                return Err(EngineError::PlannerInternal(format!(
                    "operator has no predicate: {op}"
                )))
            }
        };
        Predicate::new(predicate)
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn into_expr(self) -> Expr {
        self.expr
    }

    /// Source columns referenced by this predicate. Empty for constant
    /// predicates like `1 = 1`.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Whether any source column resolves in the given resolved node's
    /// output schema.
    pub fn related_to(&self, node: &Expr) -> EngineResult<bool> {
        if !node.is_resolved() {
            return Err(EngineError::PlannerInternal(
                "related_to requires a resolved plan node".into(),
            ));
        }
        let schema = node.schema().ok_or_else(|| {
            EngineError::PlannerInternal("related_to requires a relational node".into())
        })?;
        for path in &self.sources {
            match schema.field_position(path) {
                Ok(_) => return Ok(true),
                Err(EngineError::FieldNotFound(_)) => continue,
                Err(other) => return Err(other),
            }
        }
        Ok(false)
    }

    /// Split an AND-conjunction into its conjuncts, each annotated with the
    /// indices of the `nodes` it references. Duplicated conjuncts are
    /// dropped. Non-AND predicates come back whole.
    pub fn decorrelate_and(
        &self,
        nodes: &[&Expr],
    ) -> EngineResult<Vec<(Predicate, Vec<usize>)>> {
        let mut parts = Vec::new();
        self.decorrelate_into(nodes, &mut parts)?;
        Ok(parts)
    }

    fn decorrelate_into(
        &self,
        nodes: &[&Expr],
        out: &mut Vec<(Predicate, Vec<usize>)>,
    ) -> EngineResult<()> {
        if let Expr::Binary {
            op: BinaryOp::And,
            lhs,
            rhs,
        } = &self.expr
        {
            Predicate::new(lhs.as_ref().clone())?.decorrelate_into(nodes, out)?;
            Predicate::new(rhs.as_ref().clone())?.decorrelate_into(nodes, out)?;
            return Ok(());
        }
        if out.iter().any(|(p, _)| p == self) {
            return Ok(());
        }
        let mut related = Vec::new();
        for (i, node) in nodes.iter().enumerate() {
            if self.related_to(node)? {
                related.push(i);
            }
        }
        out.push((self.clone(), related));
        Ok(())
    }

    /// Re-key decorrelated conjuncts by their reference set, AND-joining
    /// co-grouped conjuncts in decorrelation order.
    pub fn group(parts: Vec<(Predicate, Vec<usize>)>) -> Vec<(Vec<usize>, Predicate)> {
        let mut groups: Vec<(Vec<usize>, Predicate)> = Vec::new();
        for (pred, related) in parts {
            match groups.iter_mut().find(|(key, _)| *key == related) {
                Some((_, existing)) => {
                    let merged = Expr::and(existing.expr.clone(), pred.expr.clone());
                    let mut sources = existing.sources.clone();
                    for s in pred.sources {
                        if !sources.contains(&s) {
                            sources.push(s);
                        }
                    }
                    existing.expr = merged;
                    existing.sources = sources;
                }
                None => groups.push((related, pred)),
            }
        }
        groups
    }

    /// Semantic equality against another predicate expression.
    pub fn equal_expr(&self, expr: &Expr) -> bool {
        self.expr.equal(expr, &EqOptions::default())
    }
}

fn collect_sources(expr: &Expr, sources: &mut Vec<String>) -> EngineResult<()> {
    match expr.kind() {
        ExprKind::Var => {
            if let Expr::Var { path } = expr {
                if !sources.contains(path) {
                    sources.push(path.clone());
                }
            }
            Ok(())
        }
        ExprKind::Tuple | ExprKind::FuncCall => Err(EngineError::PlannerInternal(format!(
            "tuple and function values are not supported in predicate analysis: {expr}"
        ))),
        _ => {
            for child in expr.operand_children() {
                collect_sources(child, sources)?;
            }
            Ok(())
        }
    }
}

/// Fold expressions into a single AND chain, left to right.
pub fn and_join(mut exprs: Vec<Expr>) -> Option<Expr> {
    if exprs.is_empty() {
        return None;
    }
    let first = exprs.remove(0);
    Some(exprs.into_iter().fold(first, Expr::and))
}
