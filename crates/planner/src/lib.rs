//! Query planner: schema resolution and the rule-based heuristic
//! optimizer.
//!
//! The resolver binds `Load` leaves through a `RelationProvider` and
//! stamps every relational node with its output schema. The heuristic
//! planner then pattern-matches registered rules against the resolved tree
//! and rewrites sub-plans, ranking alternatives with a `CostEstimator`.

mod cost;
mod explain;
mod heuristic;
mod operand;
mod resolve;
mod rule;
pub mod rules;

pub use cost::{CostEstimator, UniformCost};
pub use explain::explain;
pub use heuristic::{HeuristicPlanner, PlannerOptions};
pub use operand::RuleOperand;
pub use resolve::{field_from_expr, resolve_schema, RelationProvider};
pub use rule::Rule;
