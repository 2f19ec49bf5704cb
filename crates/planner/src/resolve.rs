//! Schema resolver: a post-order walk that binds `Load` leaves to
//! adapter-provided relations (expanding views first) and computes each
//! relational node's output schema.

use common::{EngineError, EngineResult};
use expr::{Expr, Relation, UnaryOp};
use schema::{Field, Schema};
use std::sync::Arc;
use syntax::{FunctionProvider, SyntaxRegistry};
use types::FieldType;

/// Lookup surface for binding `Load` operators. The dataset implements it.
pub trait RelationProvider {
    /// A stored view plan for this name, already resolved.
    fn view(&self, name: &str) -> Option<Expr>;

    /// Ask the adapters, in registration order, for a relation of this
    /// name; the first match is bound.
    fn bind_relation(&self, name: &str) -> EngineResult<Option<Relation>>;
}

/// Resolve a plan: returns a new tree in which every relational node's
/// schema is known. Resolving an already-resolved plan is a no-op up to
/// value equality.
pub fn resolve_schema(
    plan: &Expr,
    provider: &dyn RelationProvider,
    funcs: &dyn FunctionProvider,
    registry: &SyntaxRegistry,
) -> EngineResult<Expr> {
    let r = Resolver {
        provider,
        funcs,
        registry,
    };
    r.resolve(plan)
}

struct Resolver<'a> {
    provider: &'a dyn RelationProvider,
    funcs: &'a dyn FunctionProvider,
    registry: &'a SyntaxRegistry,
}

impl Resolver<'_> {
    fn resolve(&self, plan: &Expr) -> EngineResult<Expr> {
        match plan {
            Expr::Load { name } => self.resolve_load(name),
            Expr::Relation(_) => Ok(plan.clone()),
            Expr::FuncCall { name, args } => self.resolve_table_fn(name, args),
            Expr::Alias {
                name,
                input,
                ..
            } => {
                let input = self.resolve(input)?;
                let schema = self.child_schema(&input)?.aliased(name.clone());
                Ok(Expr::Alias {
                    name: name.clone(),
                    input: Box::new(input),
                    schema: Some(schema),
                })
            }
            Expr::Projection { input, exprs, .. } => {
                let input = self.resolve(input)?;
                let schema = self.projection_schema(exprs, self.child_schema(&input)?)?;
                Ok(Expr::Projection {
                    input: Box::new(input),
                    exprs: exprs.clone(),
                    schema: Some(schema),
                })
            }
            Expr::Selection {
                input, predicate, ..
            } => {
                let input = self.resolve(input)?;
                let schema = self.child_schema(&input)?.clone();
                Ok(Expr::Selection {
                    input: Box::new(input),
                    predicate: predicate.clone(),
                    schema: Some(schema),
                })
            }
            Expr::GroupBy { input, keys, .. } => {
                let input = self.resolve(input)?;
                let schema = self.child_schema(&input)?.clone();
                Ok(Expr::GroupBy {
                    input: Box::new(input),
                    keys: keys.clone(),
                    schema: Some(schema),
                })
            }
            Expr::OrderBy { input, keys, .. } => {
                let input = self.resolve(input)?;
                let schema = self.child_schema(&input)?.clone();
                Ok(Expr::OrderBy {
                    input: Box::new(input),
                    keys: keys.clone(),
                    schema: Some(schema),
                })
            }
            Expr::Slice {
                input, start, stop, ..
            } => {
                let input = self.resolve(input)?;
                let schema = self.child_schema(&input)?.clone();
                Ok(Expr::Slice {
                    input: Box::new(input),
                    start: *start,
                    stop: *stop,
                    schema: Some(schema),
                })
            }
            Expr::Join {
                left,
                right,
                predicate,
                ..
            } => {
                let left = self.resolve(left)?;
                let right = self.resolve(right)?;
                let schema = self
                    .child_schema(&left)?
                    .concat(self.child_schema(&right)?);
                Ok(Expr::Join {
                    left: Box::new(left),
                    right: Box::new(right),
                    predicate: predicate.clone(),
                    schema: Some(schema),
                })
            }
            Expr::LeftJoin {
                left,
                right,
                predicate,
                ..
            } => {
                let left = self.resolve(left)?;
                let right = self.resolve(right)?;
                let schema = self
                    .child_schema(&left)?
                    .concat(self.child_schema(&right)?);
                Ok(Expr::LeftJoin {
                    left: Box::new(left),
                    right: Box::new(right),
                    predicate: predicate.clone(),
                    schema: Some(schema),
                })
            }
            Expr::UnionAll { left, right, .. } => {
                let left = self.resolve(left)?;
                let right = self.resolve(right)?;
                let schema = self.union_schema(
                    self.child_schema(&left)?,
                    self.child_schema(&right)?,
                )?;
                Ok(Expr::UnionAll {
                    left: Box::new(left),
                    right: Box::new(right),
                    schema: Some(schema),
                })
            }
            Expr::ExtRel {
                tag,
                input,
                predicate,
                cost_factor,
                ..
            } => {
                let input = self.resolve(input)?;
                let mut node = Expr::ExtRel {
                    tag: *tag,
                    input: Box::new(input),
                    predicate: predicate.clone(),
                    schema: None,
                    cost_factor: *cost_factor,
                };
                // registered resolver wins; unknown variants inherit the
                // child schema
                let schema = match self.registry.rel_op(*tag).and_then(|d| d.schema_fn.clone())
                {
                    Some(schema_fn) => (schema_fn.as_ref())(&node)?,
                    None => self.child_schema_of_ext(&node)?,
                };
                node.set_schema(schema);
                Ok(node)
            }
            // scalar roots resolve to themselves
            _ => Ok(plan.clone()),
        }
    }

    fn child_schema_of_ext(&self, node: &Expr) -> EngineResult<Schema> {
        match node {
            Expr::ExtRel { input, .. } => Ok(self.child_schema(input)?.clone()),
            _ => Err(EngineError::PlannerInternal(
                "expected an extension relational node".into(),
            )),
        }
    }

    fn child_schema<'e>(&self, child: &'e Expr) -> EngineResult<&'e Schema> {
        child.schema().ok_or_else(|| {
            EngineError::PlannerInternal(format!("child not resolved: {child}"))
        })
    }

    fn resolve_load(&self, name: &str) -> EngineResult<Expr> {
        if let Some(view) = self.provider.view(name) {
            // stored views are resolved when created, but expand recursively
            // so views over views keep working
            if view.is_resolved() {
                return Ok(view);
            }
            return self.resolve(&view);
        }
        match self.provider.bind_relation(name)? {
            Some(relation) => Ok(Expr::Relation(relation)),
            None => Err(EngineError::RelationNotFound(name.to_string())),
        }
    }

    /// Bind a relational function call: resolve its relational arguments,
    /// then derive the output schema and wrap the call as a bound relation.
    fn resolve_table_fn(&self, name: &str, args: &[Expr]) -> EngineResult<Expr> {
        let table_fn = self.funcs.table_fn(name).ok_or_else(|| {
            EngineError::RelationNotFound(format!("table function '{name}'"))
        })?;
        let args: Vec<Expr> = args
            .iter()
            .map(|arg| match arg {
                Expr::Const(_) => Ok(arg.clone()),
                _ => self.resolve(arg),
            })
            .collect::<EngineResult<_>>()?;
        let schema = table_fn.resolve_schema(&args)?;
        let body = table_fn.body.clone();
        let call_args = args.clone();
        let source = Arc::new(move |ctx: &std::rc::Rc<common::EvalContext>| {
            (body.as_ref())(ctx, &call_args)
        });
        Ok(Expr::Relation(Relation::new(
            "",
            name,
            schema,
            source,
        )))
    }

    fn union_schema(&self, left: &Schema, right: &Schema) -> EngineResult<Schema> {
        if left.len() != right.len() {
            return Err(EngineError::UnionSchemaMismatch(format!(
                "inputs have {} and {} fields",
                left.len(),
                right.len()
            )));
        }
        for (pos, (l, r)) in left.fields().iter().zip(right.fields()).enumerate() {
            if r.ty != l.ty && r.ty != FieldType::Null {
                return Err(EngineError::UnionSchemaMismatch(format!(
                    "field types at position {pos} differ: {} vs {}",
                    l.ty, r.ty
                )));
            }
        }
        Ok(left.clone())
    }

    fn projection_schema(&self, exprs: &[Expr], input: &Schema) -> EngineResult<Schema> {
        let mut fields = Vec::new();
        for expr in exprs {
            match expr {
                Expr::SelectAll { qualifier: None } => {
                    fields.extend(input.fields().iter().cloned());
                }
                Expr::SelectAll {
                    qualifier: Some(q),
                } => {
                    fields.extend(
                        input
                            .fields()
                            .iter()
                            .filter(|f| f.schema_name.as_deref() == Some(q))
                            .cloned(),
                    );
                }
                _ => fields.push(field_from_expr(expr, input, self.funcs, self.registry)?),
            }
        }
        Ok(Schema::new(fields))
    }
}

/// Derive the output field of one result-column expression. Also used by
/// the executor to pick type-dependent sort key encodings.
pub fn field_from_expr(
    expr: &Expr,
    input: &Schema,
    funcs: &dyn FunctionProvider,
    registry: &SyntaxRegistry,
) -> EngineResult<Field> {
    match expr {
        Expr::Var { path } => Ok(input.field(path)?.clone()),
        Expr::Const(v) => Ok(Field::new("?column?", v.field_type())),
        Expr::Param { .. } | Expr::ItemGetter { .. } => {
            Ok(Field::new("?column?", FieldType::Null))
        }
        Expr::FuncCall { name, .. } => {
            if let Some(agg) = funcs.aggregate(name) {
                return Ok(agg.returns.clone());
            }
            match funcs.scalar_udf(name) {
                Some(udf) => udf.returns.clone().ok_or_else(|| {
                    EngineError::TypeCoercion(format!(
                        "cannot determine the return type of function '{name}'"
                    ))
                }),
                None => Err(EngineError::Execution(format!("no function named '{name}'"))),
            }
        }
        Expr::Rename { name, expr } => {
            Ok(field_from_expr(expr, input, funcs, registry)?.renamed(name))
        }
        Expr::Unary { op, expr } => {
            let field = field_from_expr(expr, input, funcs, registry)?;
            let op_name = match op {
                UnaryOp::Neg => "Neg",
                UnaryOp::Not => "Not",
            };
            Ok(field.renamed(format!("{op_name}({})", field.name)))
        }
        Expr::Binary { lhs, rhs, .. } => {
            let lhs_field = field_from_expr(lhs, input, funcs, registry)?;
            let rhs_field = field_from_expr(rhs, input, funcs, registry)?;
            if lhs_field.ty != rhs_field.ty {
                return Err(EngineError::TypeCoercion(format!(
                    "cannot coerce {} to {}",
                    lhs_field.ty, rhs_field.ty
                )));
            }
            Ok(lhs_field.renamed("?column?"))
        }
        Expr::Between { .. } | Expr::In { .. } => Ok(Field::new("?column?", FieldType::Boolean)),
        Expr::Case { arms, default } => {
            let inner = arms
                .first()
                .map(|arm| &arm.then)
                .or(default.as_deref())
                .ok_or_else(|| EngineError::TypeCoercion("CASE with no arms".into()))?;
            Ok(field_from_expr(inner, input, funcs, registry)?.renamed("?column?"))
        }
        Expr::Cast { ty, .. } => Ok(Field::new("?column?", *ty)),
        Expr::Asc { expr } | Expr::Desc { expr } => field_from_expr(expr, input, funcs, registry),
        Expr::ExtScalar { tag, .. } => match registry.scalar_op(*tag) {
            Some(def) => Ok(Field::new("?column?", def.result)),
            None => Err(EngineError::ExtensionInternal(format!(
                "no scalar operator registered for tag #{}",
                tag.0
            ))),
        },
        other => Err(EngineError::TypeCoercion(format!(
            "expression not allowed in a result column: {other}"
        ))),
    }
}
