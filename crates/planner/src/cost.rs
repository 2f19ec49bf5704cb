use common::EngineResult;
use expr::Expr;

/// Computes the logical cost of a resolved plan.
///
/// The dataset crate provides the real implementation, which executes the
/// plan for the side effect of recording `(num_input_rows, refined factor)`
/// per relational operator and sums the products. The planner only needs
/// the trait so rule application can rank equivalent plans.
pub trait CostEstimator {
    fn plan_cost(&self, plan: &Expr) -> EngineResult<f64>;
}

/// Estimator that ranks every plan the same; with it the planner always
/// keeps the first equivalent a rule produces.
pub struct UniformCost;

impl CostEstimator for UniformCost {
    fn plan_cost(&self, _plan: &Expr) -> EngineResult<f64> {
        Ok(0.0)
    }
}
