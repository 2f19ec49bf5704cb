//! Tokens, the extensible lexer, and the syntax-pack registry, plus the
//! callback traits that let registered extensions re-enter the parser and
//! the plan compiler without depending on them.

pub mod functions;
pub mod lexer;
pub mod registry;
pub mod token;

pub use functions::{
    AggStep, Aggregate, FunctionProvider, ScalarUdf, TableFn, TableFnBody, TableFnReturns,
    UdfBody,
};
pub use lexer::tokenize;
pub use registry::{
    ClauseHooks, ClauseHooksFactory, PackSession, PredLevel, PredParser, RelOpDef,
    RelOpExecutor, RelOpSchemaFn, ScalarOpDef, ScalarOpExecutor, SyntaxPack, SyntaxRegistry,
};
pub use token::{Token, TokenCursor};

use common::{EngineResult, EvalContext, Row, Rows};
use expr::Expr;
use schema::Schema;
use std::rc::Rc;
use types::Value;

/// Compiled row-level evaluator of a scalar expression.
pub type ScalarFn = Box<dyn Fn(&Row, &EvalContext) -> EngineResult<Value>>;

/// Compiled relational operator: invoked with an evaluation context, yields
/// a lazy row stream. The context is shared so the stream can evaluate
/// per-row expressions while the caller keeps pulling.
pub type RelProducer = Box<dyn Fn(&Rc<EvalContext>) -> EngineResult<Rows>>;

/// Re-entry surface into the predicate grammar for registered parsers and
/// clause hooks. Implemented by the parser's `Grammar`.
pub trait PredicateGrammar {
    /// Parse one expression at the given precedence level. `name` carries
    /// the already-consumed leading word at the VAR/FUNC levels.
    fn parse_level(
        &self,
        level: PredLevel,
        name: Option<&str>,
        cursor: &mut TokenCursor,
    ) -> EngineResult<Expr>;

    /// The standard result-column list parser (everything between SELECT and
    /// the next clause boundary).
    fn parse_select_columns(&self, cursor: &mut TokenCursor) -> EngineResult<Vec<Expr>>;

    /// The standard WHERE clause: wraps `relation` in a Selection when a
    /// `where` keyword is present.
    fn parse_standard_where(
        &self,
        cursor: &mut TokenCursor,
        relation: Expr,
    ) -> EngineResult<Expr>;

    fn is_terminator(&self, token: &Token) -> bool;
}

/// Re-entry surface into the plan compiler for registered operator
/// executors. Implemented by the executor's `Compiler`.
pub trait PlanCompiler {
    fn compile_rel(&self, plan: &Expr) -> EngineResult<RelProducer>;
    fn compile_scalar(&self, expr: &Expr, schema: &Schema) -> EngineResult<ScalarFn>;
}
