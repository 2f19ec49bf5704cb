//! Row-at-a-time executor: compiles a resolved plan into a tree of lazy
//! row-stream producers and runs it.
//!
//! Compilation walks the plan post-order; every relational node becomes a
//! `RelProducer`. On invocation each operator fully materializes its
//! input(s), records `(num_input_rows, refined cost factor)` into the
//! evaluation context for the logical cost model, then re-exposes the rows
//! as a fresh lazy stream to its consumer.

mod group;
mod join;
mod scalar;
mod sort;
#[cfg(test)]
mod tests;

use common::{EngineError, EngineResult, EvalContext, Row, Rows};
use expr::cost::refined_cost_factor;
use expr::Expr;
use schema::Schema;
use std::rc::Rc;
use syntax::{FunctionProvider, PlanCompiler, RelProducer, ScalarFn, SyntaxRegistry};

/// Drain a row stream into memory, surfacing the first error.
pub fn materialize(rows: Rows) -> EngineResult<Vec<Row>> {
    rows.collect()
}

/// Re-expose materialized rows as a fresh lazy stream.
pub fn rows_from_vec(rows: Vec<Row>) -> Rows {
    Box::new(rows.into_iter().map(Ok))
}

/// Compiles resolved plans against a function provider and the syntax
/// registry (for extension operators).
pub struct Compiler<'a> {
    funcs: &'a dyn FunctionProvider,
    registry: &'a SyntaxRegistry,
}

impl<'a> Compiler<'a> {
    pub fn new(funcs: &'a dyn FunctionProvider, registry: &'a SyntaxRegistry) -> Self {
        Self { funcs, registry }
    }

    pub(crate) fn funcs(&self) -> &dyn FunctionProvider {
        self.funcs
    }

    pub(crate) fn registry(&self) -> &SyntaxRegistry {
        self.registry
    }

    /// Compile a resolved plan into its root producer.
    pub fn compile(&self, plan: &Expr) -> EngineResult<RelProducer> {
        if !plan.is_resolved() {
            return Err(EngineError::PlannerInternal(
                "the executor requires a resolved plan".into(),
            ));
        }
        self.compile_node(plan, false)
    }

    /// Compile and run a plan, collecting all rows.
    pub fn run(&self, plan: &Expr, ctx: &Rc<EvalContext>) -> EngineResult<Vec<Row>> {
        let producer = self.compile(plan)?;
        materialize(producer(ctx)?)
    }

    pub(crate) fn compile_node(
        &self,
        plan: &Expr,
        parent_is_group_by: bool,
    ) -> EngineResult<RelProducer> {
        match plan {
            Expr::Relation(rel) => {
                let rel = rel.clone();
                Ok(Box::new(move |ctx| rel.scan(ctx)))
            }
            Expr::Alias { input, .. } => {
                let child = self.compile_node(input, false)?;
                let factor = refined_cost_factor(plan);
                Ok(Box::new(move |ctx| {
                    let rows = materialize(child(ctx)?)?;
                    ctx.record_stat(rows.len() as u64, factor);
                    Ok(rows_from_vec(rows))
                }))
            }
            Expr::Projection { input, exprs, .. } => {
                let aggregates =
                    group::discover_aggregates(exprs, self.input_schema(input)?, self.funcs);
                if !aggregates.is_empty() && !parent_is_group_by {
                    // an aggregate projection with no GROUP BY above it gets
                    // wrapped into an implicit whole-input group
                    return group::compile_group(self, &[], plan, self.node_schema(plan)?);
                }
                self.compile_projection(plan)
            }
            Expr::Selection {
                input, predicate, ..
            } => {
                let child = self.compile_node(input, false)?;
                let schema = self.input_schema(input)?.clone();
                let predicate = predicate
                    .as_deref()
                    .map(|p| self.compile_scalar(p, &schema))
                    .transpose()?
                    .map(Rc::new);
                let factor = refined_cost_factor(plan);
                Ok(Box::new(move |ctx| {
                    let rows = materialize(child(ctx)?)?;
                    ctx.record_stat(rows.len() as u64, factor);
                    match &predicate {
                        None => Ok(rows_from_vec(rows)),
                        Some(predicate) => {
                            let predicate = Rc::clone(predicate);
                            let ctx = Rc::clone(ctx);
                            Ok(Box::new(rows.into_iter().filter_map(move |row| {
                                match (predicate.as_ref())(&row, &ctx) {
                                    Ok(v) if v.truthy() => Some(Ok(row)),
                                    Ok(_) => None,
                                    Err(err) => Some(Err(err)),
                                }
                            })) as Rows)
                        }
                    }
                }))
            }
            Expr::GroupBy { input, keys, .. } => {
                group::compile_group(self, keys, input, self.node_schema(plan)?)
            }
            Expr::OrderBy { input, keys, .. } => sort::compile_order_by(
                self,
                keys,
                input,
                refined_cost_factor(plan),
            ),
            Expr::Slice {
                input, start, stop, ..
            } => {
                let child = self.compile_node(input, false)?;
                let factor = refined_cost_factor(plan);
                let (start, stop) = (*start, *stop);
                Ok(Box::new(move |ctx| {
                    let rows = materialize(child(ctx)?)?;
                    ctx.record_stat(rows.len() as u64, factor);
                    let tail = rows.into_iter().skip(start);
                    let sliced: Vec<Row> = match stop {
                        Some(stop) => tail.take(stop.saturating_sub(start)).collect(),
                        None => tail.collect(),
                    };
                    Ok(rows_from_vec(sliced))
                }))
            }
            Expr::UnionAll { left, right, .. } => {
                let left = self.compile_node(left, false)?;
                let right = self.compile_node(right, false)?;
                let factor = refined_cost_factor(plan);
                Ok(Box::new(move |ctx| {
                    let l = materialize(left(ctx)?)?;
                    let r = materialize(right(ctx)?)?;
                    ctx.record_stat((l.len() + r.len()) as u64, factor);
                    Ok(Box::new(l.into_iter().chain(r).map(Ok)) as Rows)
                }))
            }
            Expr::Join { .. } | Expr::LeftJoin { .. } => join::compile_join(self, plan),
            Expr::ExtRel { tag, .. } => {
                let def = self.registry.rel_op(*tag).ok_or_else(|| {
                    EngineError::ExtensionInternal(format!(
                        "no relational operator registered for tag #{}",
                        tag.0
                    ))
                })?;
                (def.executor.as_ref())(plan, self)
            }
            Expr::Load { name } => Err(EngineError::PlannerInternal(format!(
                "unresolved load of '{name}' reached the executor"
            ))),
            other => Err(EngineError::Execution(format!(
                "not a relational operator: {other}"
            ))),
        }
    }

    fn compile_projection(&self, plan: &Expr) -> EngineResult<RelProducer> {
        let Expr::Projection { input, exprs, .. } = plan else {
            return Err(EngineError::PlannerInternal(
                "compile_projection requires a projection".into(),
            ));
        };
        let input_schema = self.input_schema(input)?.clone();
        let mut columns: Vec<ScalarFn> = Vec::new();
        for expr in exprs {
            match expr {
                Expr::SelectAll { qualifier } => {
                    for (pos, field) in input_schema.fields().iter().enumerate() {
                        let matches_qualifier = match qualifier {
                            None => true,
                            Some(q) => field.schema_name.as_deref() == Some(q),
                        };
                        if matches_qualifier {
                            columns.push(Box::new(move |row: &Row, _: &EvalContext| {
                                row.values.get(pos).cloned().ok_or_else(|| {
                                    EngineError::Execution("row narrower than schema".into())
                                })
                            }));
                        }
                    }
                }
                _ => columns.push(self.compile_scalar(expr, &input_schema)?),
            }
        }
        let child = self.compile_node(input, false)?;
        let factor = refined_cost_factor(plan);
        let columns = Rc::new(columns);
        Ok(Box::new(move |ctx| {
            let rows = materialize(child(ctx)?)?;
            ctx.record_stat(rows.len() as u64, factor);
            let columns = Rc::clone(&columns);
            let ctx = Rc::clone(ctx);
            Ok(Box::new(rows.into_iter().map(move |row| {
                columns
                    .iter()
                    .map(|col| col(&row, &ctx))
                    .collect::<EngineResult<Vec<_>>>()
                    .map(Row::new)
            })) as Rows)
        }))
    }

    pub(crate) fn input_schema<'e>(&self, input: &'e Expr) -> EngineResult<&'e Schema> {
        input.schema().ok_or_else(|| {
            EngineError::PlannerInternal(format!("unresolved plan node: {input}"))
        })
    }

    fn node_schema<'e>(&self, node: &'e Expr) -> EngineResult<&'e Schema> {
        self.input_schema(node)
    }
}

impl PlanCompiler for Compiler<'_> {
    fn compile_rel(&self, plan: &Expr) -> EngineResult<RelProducer> {
        self.compile_node(plan, false)
    }

    fn compile_scalar(&self, expr: &Expr, schema: &Schema) -> EngineResult<ScalarFn> {
        scalar::compile_scalar(self, expr, schema)
    }
}
