use crate::DataSet;
use common::{EngineError, EngineResult, EvalContext, Row};
use executor::Compiler;
use expr::Expr;
use planner::{resolve_schema, CostEstimator, HeuristicPlanner};
use schema::Schema;
use std::rc::Rc;
use types::Value;

/// A parsed, resolved and possibly optimized statement bound to a dataset.
pub struct Query<'d> {
    dataset: &'d DataSet,
    plan: Expr,
    schema: Schema,
}

impl std::fmt::Debug for Query<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("plan", &self.plan)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

impl<'d> Query<'d> {
    /// Build a query over a plan. With `resolve` the schema resolver runs
    /// (view expansion included); without it the plan must already be
    /// resolved and is deep-copied. A provided optimizer replaces the plan
    /// with its best rewrite, ranked by executed logical cost.
    pub fn new(
        dataset: &'d DataSet,
        plan: Expr,
        resolve: bool,
        optimizer: Option<&HeuristicPlanner>,
    ) -> EngineResult<Self> {
        let plan = if resolve {
            resolve_schema(&plan, dataset, dataset, dataset.registry())?
        } else {
            if !plan.is_resolved() {
                return Err(EngineError::PlannerInternal(
                    "Query requires a resolved plan when resolution is disabled".into(),
                ));
            }
            plan.deep_copy()
        };
        let plan = match optimizer {
            Some(optimizer) => optimizer.find_best_plan(&plan, &LogicalCost::new(dataset))?,
            None => plan,
        };
        let schema = plan.schema().cloned().ok_or_else(|| {
            EngineError::PlannerInternal("a query needs a relational plan".into())
        })?;
        Ok(Self {
            dataset,
            plan,
            schema,
        })
    }

    pub fn plan(&self) -> &Expr {
        &self.plan
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn headers(&self) -> Vec<String> {
        self.schema.field_names()
    }

    /// Execute and collect all rows.
    pub fn rows(&self, params: Vec<Value>) -> EngineResult<Vec<Row>> {
        self.dataset.execute(self, params)
    }

    pub fn explain(&self) -> String {
        planner::explain(&self.plan)
    }
}

/// The logical cost model: run the plan for the side effect of recording
/// `(num_input_rows, refined cost factor)` per relational operator, then
/// sum the products.
pub struct LogicalCost<'d> {
    dataset: &'d DataSet,
}

impl<'d> LogicalCost<'d> {
    pub fn new(dataset: &'d DataSet) -> Self {
        Self { dataset }
    }
}

impl CostEstimator for LogicalCost<'_> {
    fn plan_cost(&self, plan: &Expr) -> EngineResult<f64> {
        let compiler = Compiler::new(self.dataset, self.dataset.registry());
        let ctx = Rc::new(EvalContext::new(Vec::new()));
        compiler.run(plan, &ctx)?;
        Ok(ctx.total_cost())
    }
}
