//! Registration types for scalar UDFs, relational table functions and
//! aggregates. Arity and return types are declared here, never introspected
//! at call time.

use common::{EngineResult, EvalContext, Rows};
use expr::Expr;
use schema::{Field, Schema};
use std::rc::Rc;
use std::sync::Arc;
use types::Value;

pub type UdfBody = Arc<dyn Fn(&[Value]) -> EngineResult<Value>>;

/// A scalar user-defined function.
///
/// `returns` is required for the function to appear in a projection (schema
/// derivation needs a field); predicate-only functions may omit it.
#[derive(Clone)]
pub struct ScalarUdf {
    pub name: String,
    pub body: UdfBody,
    pub returns: Option<Field>,
}

impl ScalarUdf {
    pub fn new(name: impl Into<String>, body: UdfBody, returns: Option<Field>) -> Self {
        Self {
            name: name.into(),
            body,
            returns,
        }
    }
}

pub type TableFnBody = Arc<dyn Fn(&Rc<EvalContext>, &[Expr]) -> EngineResult<Rows>>;

/// Output schema of a table function: fixed, or computed from the resolved
/// arguments.
#[derive(Clone)]
pub enum TableFnReturns {
    Fixed(Schema),
    FromArgs(Arc<dyn Fn(&[Expr]) -> EngineResult<Schema>>),
}

/// A function that produces a whole relation. Arguments are resolved plan
/// leaves (bound relations or constants); the body receives them along with
/// the evaluation context.
#[derive(Clone)]
pub struct TableFn {
    pub name: String,
    pub returns: TableFnReturns,
    pub body: TableFnBody,
}

impl TableFn {
    pub fn resolve_schema(&self, args: &[Expr]) -> EngineResult<Schema> {
        match &self.returns {
            TableFnReturns::Fixed(schema) => Ok(schema.clone()),
            TableFnReturns::FromArgs(f) => (f.as_ref())(args),
        }
    }
}

/// Accumulation step of an aggregate, with its arity made explicit.
#[derive(Clone)]
pub enum AggStep {
    /// `state -> state`, e.g. `count`.
    Unary(Arc<dyn Fn(Value) -> EngineResult<Value>>),
    /// `(state, next_value) -> state`, e.g. `sum`.
    Binary(Arc<dyn Fn(Value, Value) -> EngineResult<Value>>),
}

/// A registered aggregate function.
#[derive(Clone)]
pub struct Aggregate {
    pub name: String,
    pub step: AggStep,
    pub returns: Field,
    pub initial: Value,
    pub finalize: Option<Arc<dyn Fn(Value) -> EngineResult<Value>>>,
}

impl Aggregate {
    pub fn accumulate(&self, state: Value, next: Value) -> EngineResult<Value> {
        match &self.step {
            AggStep::Unary(f) => (f.as_ref())(state),
            AggStep::Binary(f) => (f.as_ref())(state, next),
        }
    }

    pub fn finish(&self, state: Value) -> EngineResult<Value> {
        match &self.finalize {
            Some(f) => (f.as_ref())(state),
            None => Ok(state),
        }
    }
}

/// Lookup surface the resolver and executor use for named functions. The
/// dataset implements it; nothing in the core owns a global function table.
pub trait FunctionProvider {
    fn scalar_udf(&self, name: &str) -> Option<&ScalarUdf>;
    fn aggregate(&self, name: &str) -> Option<&Aggregate>;
    fn table_fn(&self, name: &str) -> Option<&TableFn>;
}
