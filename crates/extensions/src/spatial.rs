//! Spatial pack: POINT (`#x,y#`) and CIRCLE (`{#x,y#, r}`) literal types,
//! the `INSIDE` containment operator at comparison precedence, and the
//! `SPATIALSELECT` clause pair.
//!
//! ```sql
//! SPATIALSELECT pid
//! FROM points
//! WHERE point INSIDE {#0,0#, 3}
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

/// A 2D point.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointValue {
    pub x: f64,
    pub y: f64,
}

impl fmt::Display for PointValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Point<{}, {}>", self.x, self.y)
    }
}

impl ExtPayload for PointValue {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn eq_payload(&self, other: &dyn ExtPayload) -> bool {
        other
            .as_any()
            .downcast_ref::<PointValue>()
            .is_some_and(|o| o == self)
    }

    fn cost_units(&self) -> usize {
        2
    }
}

/// A circle: center plus radius.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CircleValue {
    pub center: PointValue,
    pub radius: f64,
}

impl fmt::Display for CircleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circle{{ {}, r={} }}", self.center, self.radius)
    }
}

impl ExtPayload for CircleValue {
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn eq_payload(&self, other: &dyn ExtPayload) -> bool {
        other
            .as_any()
            .downcast_ref::<CircleValue>()
            .is_some_and(|o| o == self)
    }

    fn cost_units(&self) -> usize {
        3
    }
}

pub fn point_distance(a: &PointValue, b: &PointValue) -> f64 {
    ((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()
}

pub fn is_inside(p: &PointValue, c: &CircleValue) -> bool {
    point_distance(p, &c.center) < c.radius
}

/// Build a point value for fixtures and adapters.
pub fn point(ty: ExtTypeId, x: f64, y: f64) -> Value {
    Value::Extension(ExtValue::new(ty, Arc::new(PointValue { x, y })))
}

/// Build a circle value for fixtures and adapters.
pub fn circle(ty: ExtTypeId, x: f64, y: f64, radius: f64) -> Value {
    Value::Extension(ExtValue::new(
        ty,
        Arc::new(CircleValue {
            center: PointValue { x, y },
            radius,
        }),
    ))
}

fn point_operand(v: Value) -> EngineResult<PointValue> {
    match v {
        Value::Extension(ext) => ext
            .downcast::<PointValue>()
            .copied()
            .ok_or_else(|| EngineError::Execution("INSIDE expects a point".into())),
        other => Err(EngineError::Execution(format!(
            "INSIDE expects a point, found {other:?}"
        ))),
    }
}

fn circle_operand(v: Value) -> EngineResult<CircleValue> {
    match v {
        Value::Extension(ext) => ext
            .downcast::<CircleValue>()
            .copied()
            .ok_or_else(|| EngineError::Execution("INSIDE expects a circle".into())),
        other => Err(EngineError::Execution(format!(
            "INSIDE expects a circle, found {other:?}"
        ))),
    }
}

pub struct SpatialPack;

pub const PACK_NAME: &str = "spatial";
pub const SPATIALSELECT_KEYWORD: &str = "spatialselect";
pub const INSIDE_KEYWORD: &str = "inside";

impl SyntaxPack for SpatialPack {
    fn name(&self) -> &str {
        PACK_NAME
    }

    fn install(&self, session: &mut PackSession<'_>) -> EngineResult<()> {
        session.add_symbols("#{}");
        session.add_clause_keyword(SPATIALSELECT_KEYWORD);
        session.add_soft_keyword(INSIDE_KEYWORD);

        let point_ty = session.register_type("POINT");
        let circle_ty = session.register_type("CIRCLE");

        let inside_tag = session.register_scalar_op(
            INSIDE_KEYWORD,
            FieldType::Boolean,
            Arc::new(|expr, schema, compiler| -> EngineResult<ScalarFn> {
                let Expr::ExtScalar { args, .. } = expr else {
                    return Err(EngineError::ExtensionInternal(
                        "INSIDE executor received a foreign node".into(),
                    ));
                };
                let [lhs, rhs] = args.as_slice() else {
                    return Err(EngineError::ExtensionInternal(
                        "INSIDE takes exactly two operands".into(),
                    ));
                };
                let lhs = compiler.compile_scalar(lhs, schema)?;
                let rhs = compiler.compile_scalar(rhs, schema)?;
                Ok(Box::new(move |row, ctx| {
                    let p = point_operand(lhs(row, ctx)?)?;
                    let c = circle_operand(rhs(row, ctx)?)?;
                    Ok(Value::Bool(is_inside(&p, &c)))
                }))
            }),
        );

        let spatial_tag = session.register_rel_op(
            "spatial_selection",
            None,
            Arc::new(|node, compiler| shared::selection_like_executor(node, compiler)),
        );

        // `INSIDE` binds at comparison precedence
        session.add_pred_parser(
            PredLevel::Comp,
            Arc::new(move |_name, cursor, grammar| {
                let lhs = grammar.parse_level(PredLevel::Add, None, cursor)?;
                if !cursor.eat(INSIDE_KEYWORD) {
                    return Err(EngineError::ParsingFailure(
                        "no INSIDE operator at this position".into(),
                    ));
                }
                let rhs = grammar.parse_level(PredLevel::Add, None, cursor)?;
                Ok(Expr::ExtScalar {
                    tag: inside_tag,
                    args: vec![lhs, rhs],
                    cost_factor: DEFAULT_COST_FACTOR * 2.0,
                })
            }),
            false,
        );

        // `#x,y#` and `{#x,y#, r}` literals
        session.add_pred_parser(
            PredLevel::Value,
            Arc::new(move |_name, cursor, _grammar| {
                match cursor.peek() {
                    Some(t) if t.is("#") => parse_point_literal(point_ty, cursor),
                    Some(t) if t.is("{") => parse_circle_literal(circle_ty, cursor),
                    _ => Err(EngineError::ParsingFailure(
                        "not a point or circle literal".into(),
                    )),
                }
            }),
            false,
        );

        session.set_clause_hooks(Arc::new(move || {
            Box::new(SpatialSelectHooks::new(spatial_tag)) as Box<dyn ClauseHooks>
        }));
        Ok(())
    }
}

fn parse_point(cursor: &mut TokenCursor) -> EngineResult<PointValue> {
    if !cursor.eat("#") {
        return Err(EngineError::ParsingFailure("not a point literal".into()));
    }
    let x = shared::read_number(cursor, "#")?;
    if !cursor.eat(",") {
        return Err(EngineError::Syntax(
            "a point needs two comma-separated coordinates".into(),
        ));
    }
    let y = shared::read_number(cursor, "#")?;
    if !cursor.eat("#") {
        return Err(EngineError::Syntax("missing closing '#'".into()));
    }
    Ok(PointValue { x, y })
}

fn parse_point_literal(ty: ExtTypeId, cursor: &mut TokenCursor) -> EngineResult<Expr> {
    let p = parse_point(cursor)?;
    Ok(Expr::Const(Value::Extension(ExtValue::new(
        ty,
        Arc::new(p),
    ))))
}

fn parse_circle_literal(circle_ty: ExtTypeId, cursor: &mut TokenCursor) -> EngineResult<Expr> {
    if !cursor.eat("{") {
        return Err(EngineError::ParsingFailure("not a circle literal".into()));
    }
    if !cursor.peek().is_some_and(|t| t.is("#")) {
        return Err(EngineError::Syntax("missing center in a circle".into()));
    }
    let center = parse_point(cursor)?;
    if !cursor.eat(",") {
        return Err(EngineError::Syntax(
            "expected ',' after the circle center".into(),
        ));
    }
    let radius = shared::read_number(cursor, "}")?;
    if !cursor.eat("}") {
        return Err(EngineError::Syntax("missing closing '}'".into()));
    }
    Ok(Expr::Const(Value::Extension(ExtValue::new(
        circle_ty,
        Arc::new(CircleValue { center, radius }),
    ))))
}

/// Per-query trigger state for the SPATIALSELECT clause pair, mirroring the
/// simselect discipline with `inside` as the marker keyword.
struct SpatialSelectHooks {
    tag: ExtOpTag,
    triggered: bool,
    spatialselect_detected: bool,
    inside_in_select: bool,
}

impl SpatialSelectHooks {
    fn new(tag: ExtOpTag) -> Self {
        Self {
            tag,
            triggered: false,
            spatialselect_detected: false,
            inside_in_select: false,
        }
    }
}

impl ClauseHooks for SpatialSelectHooks {
    fn trigger_select(&mut self, cursor: &TokenCursor) -> bool {
        let tokens = cursor.remaining();
        let first_is_spatial = tokens
            .first()
            .is_some_and(|t| t.is(SPATIALSELECT_KEYWORD));
        let select_with_inside = tokens.first().is_some_and(|t| t.is("select"))
            && shared::word_before_from(tokens, INSIDE_KEYWORD);
        self.triggered = first_is_spatial || select_with_inside;
        self.triggered
    }

    fn parse_select(
        &mut self,
        cursor: &mut TokenCursor,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Vec<Expr>> {
        self.spatialselect_detected = false;
        self.inside_in_select = false;
        if cursor.eat(SPATIALSELECT_KEYWORD) {
            self.spatialselect_detected = true;
        } else if !cursor.eat("select") {
            return Err(EngineError::Syntax(format!(
                "expected SELECT or SPATIALSELECT, found '{}'",
                cursor.peek().map(|t| t.text()).unwrap_or_default()
            )));
        }
        self.inside_in_select =
            shared::word_in_clause(cursor.remaining(), INSIDE_KEYWORD, SPATIALSELECT_KEYWORD);
        grammar.parse_select_columns(cursor)
    }

    fn trigger_where(&mut self, cursor: &TokenCursor) -> bool {
        self.triggered
            || (cursor.peek().is_some_and(|t| t.is("where"))
                && shared::anywhere(cursor.remaining(), INSIDE_KEYWORD))
    }

    fn parse_where(
        &mut self,
        cursor: &mut TokenCursor,
        relation: Expr,
        grammar: &dyn PredicateGrammar,
    ) -> EngineResult<Expr> {
        if cursor.eat("where") {
            let inside_in_where = shared::word_in_clause(
                cursor.remaining(),
                INSIDE_KEYWORD,
                SPATIALSELECT_KEYWORD,
            );
            if self.spatialselect_detected && !self.inside_in_select && !inside_in_where {
                return Err(EngineError::ExtendedSyntax(
                    "spatialselect requires at least one 'inside' expression, zero found"
                        .into(),
                ));
            }
            let predicate = grammar.parse_level(PredLevel::Or, None, cursor)?;
            if inside_in_where || self.inside_in_select || self.spatialselect_detected {
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
            if self.spatialselect_detected && !self.inside_in_select {
                return Err(EngineError::ExtendedSyntax(
                    "spatialselect requires at least one 'inside' expression, zero found"
                        .into(),
                ));
            }
            Ok(relation)
        }
    }
}
