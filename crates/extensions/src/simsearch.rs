//! Similarity search: a VECTOR literal type (`[1,2,3,4]`), the `TO`
//! distance operator at multiplicative precedence, and the `SIMSELECT`
//! clause that upgrades the WHERE clause to a similarity selection.
//!
//! ```sql
//! SIMSELECT employee_id
//! FROM employees_with_vectors
//! WHERE vector TO [1.0,2.0,1.2,5.1] < 1.5
//! ```

use crate::shared;
use common::{EngineError, EngineResult};
use expr::cost::DEFAULT_COST_FACTOR;
use expr::Expr;
use std::fmt;
use std::sync::Arc;
use syntax::{
    ClauseHooks, PackSession, PredLevel, PredicateGrammar, ScalarFn, SyntaxPack, TokenCursor,
};
use types::{ExtOpTag, ExtPayload, ExtTypeId, ExtValue, FieldType, Value};

/// Assumed embedding width, used only to scale the operator's cost factor.
const VEC_DIM: f64 = 4.0;

/// A dense embedding vector.
#[derive(Clone, Debug, PartialEq)]
pub struct VectorValue(pub Vec<f64>);

impl fmt::Display for VectorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{v}")?;
        }
        write!(f, "]")
    }
}

impl ExtPayload for VectorValue {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn eq_payload(&self, other: &dyn ExtPayload) -> bool {
        other
            .as_any()
            .downcast_ref::<VectorValue>()
            .is_some_and(|o| o == self)
    }

    fn cost_units(&self) -> usize {
        self.0.len()
    }
}

/// Distance metrics over two vectors.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    Euclidean,
    CosineDistance,
    CosineSimilarity,
    Dot,
}

pub fn distance(a: &VectorValue, b: &VectorValue, metric: Metric) -> EngineResult<f64> {
    if a.0.len() != b.0.len() {
        return Err(EngineError::Execution(format!(
            "cannot compute the distance between vectors of widths {} and {}",
            a.0.len(),
            b.0.len()
        )));
    }
    let dot: f64 = a.0.iter().zip(&b.0).map(|(x, y)| x * y).sum();
    match metric {
        Metric::Euclidean => Ok(a
            .0
            .iter()
            .zip(&b.0)
            .map(|(x, y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()),
        Metric::Dot => Ok(dot),
        Metric::CosineDistance | Metric::CosineSimilarity => {
            let norm_a = a.0.iter().map(|x| x * x).sum::<f64>().sqrt();
            let norm_b = b.0.iter().map(|x| x * x).sum::<f64>().sqrt();
            if norm_a == 0.0 || norm_b == 0.0 {
                return Err(EngineError::Execution(
                    "cosine distance is undefined for zero vectors".into(),
                ));
            }
            let similarity = dot / (norm_a * norm_b);
            Ok(match metric {
                Metric::CosineSimilarity => similarity,
                _ => 1.0 - similarity,
            })
        }
    }
}

/// Build a vector literal value for fixtures and adapters.
pub fn vector(ty: ExtTypeId, components: impl IntoIterator<Item = f64>) -> Value {
    Value::Extension(ExtValue::new(
        ty,
        Arc::new(VectorValue(components.into_iter().collect())),
    ))
}

fn vector_operand(v: Value) -> EngineResult<VectorValue> {
    match v {
        Value::Extension(ext) => ext
            .downcast::<VectorValue>()
            .cloned()
            .ok_or_else(|| EngineError::Execution("TO expects vector operands".into())),
        other => Err(EngineError::Execution(format!(
            "TO expects vector operands, found {other:?}"
        ))),
    }
}

pub struct SimSearchPack;

pub const PACK_NAME: &str = "simsearch";
pub const SIMSELECT_KEYWORD: &str = "simselect";
pub const TO_KEYWORD: &str = "to";

impl SyntaxPack for SimSearchPack {
    fn name(&self) -> &str {
        PACK_NAME
    }

    fn install(&self, session: &mut PackSession<'_>) -> EngineResult<()> {
        session.add_symbols("[]");
        session.add_clause_keyword(SIMSELECT_KEYWORD);
        session.add_soft_keyword(TO_KEYWORD);

        let vector_ty = session.register_type("VECTOR");

        let to_tag = session.register_scalar_op(
            TO_KEYWORD,
            FieldType::Float,
            Arc::new(|expr, schema, compiler| -> EngineResult<ScalarFn> {
                let Expr::ExtScalar { args, .. } = expr else {
                    return Err(EngineError::ExtensionInternal(
                        "TO executor received a foreign node".into(),
                    ));
                };
                let [lhs, rhs] = args.as_slice() else {
                    return Err(EngineError::ExtensionInternal(
                        "TO takes exactly two operands".into(),
                    ));
                };
                let lhs = compiler.compile_scalar(lhs, schema)?;
                let rhs = compiler.compile_scalar(rhs, schema)?;
                Ok(Box::new(move |row, ctx| {
                    let a = vector_operand(lhs(row, ctx)?)?;
                    let b = vector_operand(rhs(row, ctx)?)?;
                    Ok(Value::Float(distance(&a, &b, Metric::Euclidean)?))
                }))
            }),
        );

        let sim_tag = session.register_rel_op(
            "sim_selection",
            None, // similarity selection inherits the child schema
            Arc::new(|node, compiler| shared::selection_like_executor(node, compiler)),
        );

        // `TO` binds at multiplicative precedence
        session.add_pred_parser(
            PredLevel::Mul,
            Arc::new(move |_name, cursor, grammar| {
                let lhs = grammar.parse_level(PredLevel::Unary, None, cursor)?;
                if !cursor.eat(TO_KEYWORD) {
                    return Err(EngineError::ParsingFailure(
                        "no TO operator at this position".into(),
                    ));
                }
                let rhs = grammar.parse_level(PredLevel::Unary, None, cursor)?;
                Ok(Expr::ExtScalar {
                    tag: to_tag,
                    args: vec![lhs, rhs],
                    cost_factor: DEFAULT_COST_FACTOR * VEC_DIM,
                })
            }),
            false,
        );

        // `[c1, c2, ...]` vector literals
        session.add_pred_parser(
            PredLevel::Value,
            Arc::new(move |_name, cursor, _grammar| parse_vector_literal(vector_ty, cursor)),
            false,
        );

        session.set_clause_hooks(Arc::new(move || {
            Box::new(SimSelectHooks::new(sim_tag)) as Box<dyn ClauseHooks>
        }));
        Ok(())
    }
}

fn parse_vector_literal(ty: ExtTypeId, cursor: &mut TokenCursor) -> EngineResult<Expr> {
    if !cursor.eat("[") {
        return Err(EngineError::ParsingFailure("not a vector literal".into()));
    }
    let mut components = Vec::new();
    if !cursor.peek().is_some_and(|t| t.is("]")) {
        components.push(shared::read_number(cursor, "]")?);
        while cursor.eat(",") {
            components.push(shared::read_number(cursor, "]")?);
        }
    }
    if !cursor.eat("]") {
        return Err(EngineError::Syntax("missing closing ']'".into()));
    }
    Ok(Expr::Const(Value::Extension(ExtValue::new(
        ty,
        Arc::new(VectorValue(components)),
    ))))
}

/// Per-query trigger state for the SIMSELECT clause pair.
///
/// A query is upgraded to a similarity selection when it starts with
/// `simselect`, or when a `to` expression appears in its SELECT or WHERE
/// clause. `simselect` with no `to` anywhere is an extended-syntax error.
struct SimSelectHooks {
    tag: ExtOpTag,
    triggered: bool,
    simselect_detected: bool,
    to_in_select: bool,
}

impl SimSelectHooks {
    fn new(tag: ExtOpTag) -> Self {
        Self {
            tag,
            triggered: false,
            simselect_detected: false,
            to_in_select: false,
        }
    }
}

impl ClauseHooks for SimSelectHooks {
    fn trigger_select(&mut self, cursor: &TokenCursor) -> bool {
        let tokens = cursor.remaining();
        let first_is_simselect = tokens.first().is_some_and(|t| t.is(SIMSELECT_KEYWORD));
        let select_with_to = tokens.first().is_some_and(|t| t.is("select"))
            && shared::word_before_from(tokens, TO_KEYWORD);
        self.triggered = first_is_simselect || select_with_to;
        self.triggered
    }

    fn parse_select(
        &mut self,
        cursor: &mut TokenCursor,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Vec<Expr>> {
        self.simselect_detected = false;
        self.to_in_select = false;
        if cursor.eat(SIMSELECT_KEYWORD) {
            self.simselect_detected = true;
        } else if !cursor.eat("select") {
            return Err(EngineError::Syntax(format!(
                "expected SELECT or SIMSELECT, found '{}'",
                cursor.peek().map(|t| t.text()).unwrap_or_default()
            )));
        }
        self.to_in_select =
            shared::word_in_clause(cursor.remaining(), TO_KEYWORD, SIMSELECT_KEYWORD);
        grammar.parse_select_columns(cursor)
    }

    fn trigger_where(&mut self, cursor: &TokenCursor) -> bool {
        self.triggered
            || (cursor.peek().is_some_and(|t| t.is("where"))
                && shared::anywhere(cursor.remaining(), TO_KEYWORD))
    }

    fn parse_where(
        &mut self,
        cursor: &mut TokenCursor,
        relation: Expr,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Expr> {
        if cursor.eat("where") {
            let to_in_where =
                shared::word_in_clause(cursor.remaining(), TO_KEYWORD, SIMSELECT_KEYWORD);
            if self.simselect_detected && !self.to_in_select && !to_in_where {
                return Err(EngineError::ExtendedSyntax(
                    "simselect requires at least one 'to' expression, zero found".into(),
                ));
            }
            let predicate = grammar.parse_level(PredLevel::Or, None, cursor)?;
            if to_in_where || self.to_in_select || self.simselect_detected {
                Ok(Expr::ExtRel {
                    tag: self.tag,
                    input: Box::new(relation),
                    predicate: Some(Box::new(predicate)),
                    schema: None,
                    cost_factor: DEFAULT_COST_FACTOR,
                })
            } else {
                Ok(Expr::selection(relation, predicate))
            }
        } else {
            if self.simselect_detected && !self.to_in_select {
                return Err(EngineError::ExtendedSyntax(
                    "simselect requires at least one 'to' expression, zero found".into(),
                ));
            }
            Ok(relation)
        }
    }
}
