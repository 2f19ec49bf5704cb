use std::cell::RefCell;
use thiserror::Error;
use types::Value;

/// Canonical error type shared across engine subsystems.
///
/// One variant per failure kind a query can surface. `ParsingFailure` is
/// informational: it only signals that one parser inside a bundle did not
/// recognize the input, and the bundle swallows it to try the next parser.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("syntax error: {0}")]
    Syntax(String),
    #[error("parsing failure: {0}")]
    ParsingFailure(String),
    #[error("extended syntax error: {0}")]
    ExtendedSyntax(String),
    #[error("field not found: {0}")]
    FieldNotFound(String),
    #[error("ambiguous field: {0}")]
    AmbiguousField(String),
    #[error("union schema mismatch: {0}")]
    UnionSchemaMismatch(String),
    #[error("type coercion error: {0}")]
    TypeCoercion(String),
    #[error("relation not found: {0}")]
    RelationNotFound(String),
    #[error("planner internal error: {0}")]
    PlannerInternal(String),
    #[error("rule implementation error: {0}")]
    RuleImplement(String),
    #[error("extension internal error: {0}")]
    ExtensionInternal(String),
    #[error("registry error: {0}")]
    Registry(String),
    #[error("name conflict: {0}")]
    NameConflict(String),
    #[error("execution error: {0}")]
    Execution(String),
}

impl EngineError {
    /// True for the informational variant that parser bundles absorb.
    pub fn is_parsing_failure(&self) -> bool {
        matches!(self, EngineError::ParsingFailure(_))
    }
}

/// Result alias that carries an `EngineError`.
pub type EngineResult<T> = Result<T, EngineError>;

/// Positional row aligned with a node's output schema.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Row::new(values)
    }
}

/// Lazy row stream produced by a compiled relational operator.
pub type Rows = Box<dyn Iterator<Item = EngineResult<Row>>>;

/// One cost sample: rows an operator consumed and its refined cost factor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OpStat {
    pub num_input_rows: u64,
    pub cost_factor: f64,
}

/// Per-execution context handed to every compiled operator.
///
/// Statistics live here rather than on IR nodes, so a plan stays immutable
/// during execution and deep copies never carry stale counters.
#[derive(Debug, Default)]
pub struct EvalContext {
    pub params: Vec<Value>,
    stats: RefCell<Vec<OpStat>>,
}

impl EvalContext {
    pub fn new(params: Vec<Value>) -> Self {
        Self {
            params,
            stats: RefCell::new(Vec::new()),
        }
    }

    pub fn param(&self, index: usize) -> EngineResult<Value> {
        self.params
            .get(index)
            .cloned()
            .ok_or_else(|| EngineError::Execution(format!("missing query parameter ?{index}")))
    }

    /// Record a cost sample for one relational operator invocation.
    pub fn record_stat(&self, num_input_rows: u64, cost_factor: f64) {
        self.stats.borrow_mut().push(OpStat {
            num_input_rows,
            cost_factor,
        });
    }

    pub fn op_stats(&self) -> Vec<OpStat> {
        self.stats.borrow().clone()
    }

    /// Logical cost accumulated so far: sum of rows x refined factor.
    pub fn total_cost(&self) -> f64 {
        self.stats
            .borrow()
            .iter()
            .map(|s| s.num_input_rows as f64 * s.cost_factor)
            .sum()
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{EngineError, EngineResult, EvalContext, OpStat, Row, Rows};
    pub use types::{FieldType, Value};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_accumulate_cost() {
        let ctx = EvalContext::new(vec![]);
        ctx.record_stat(10, 2.0);
        ctx.record_stat(3, 1.0);
        assert_eq!(ctx.total_cost(), 23.0);
        assert_eq!(ctx.op_stats().len(), 2);
    }

    #[test]
    fn missing_param_is_an_execution_error() {
        let ctx = EvalContext::new(vec![Value::Int(1)]);
        assert_eq!(ctx.param(0).unwrap(), Value::Int(1));
        assert!(matches!(ctx.param(1), Err(EngineError::Execution(_))));
    }
}
