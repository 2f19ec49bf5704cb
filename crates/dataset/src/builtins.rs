//! Default function and aggregate packs registered on every new dataset:
//! the standard aggregates plus small math and string scalar sets.

use crate::DataSet;
use common::{EngineError, EngineResult};
use schema::Field;
use std::cmp::Ordering;
use std::sync::Arc;
use syntax::{AggStep, Aggregate, ScalarUdf};
use types::{FieldType, Value};

pub(crate) fn register_on(dataset: &mut DataSet) {
    for aggregate in standard_aggregates() {
        // names are fresh on a new dataset, conflicts are impossible here
        let _ = dataset.add_aggregate(aggregate);
    }
    for udf in math_functions().into_iter().chain(string_functions()) {
        let _ = dataset.add_function(udf);
    }
}

fn pick(state: Value, next: Value, keep: Ordering) -> EngineResult<Value> {
    if next.is_null() {
        return Ok(state);
    }
    match state.compare(&next) {
        Some(ord) if ord == keep => Ok(next),
        Some(_) => Ok(state),
        None => Err(EngineError::Execution(format!(
            "cannot compare {state:?} with {next:?} in an aggregate"
        ))),
    }
}

pub(crate) fn standard_aggregates() -> Vec<Aggregate> {
    vec![
        Aggregate {
            name: "count".into(),
            step: AggStep::Unary(Arc::new(|state| {
                state
                    .add(&Value::Int(1))
                    .ok_or_else(|| EngineError::Execution("count state must be numeric".into()))
            })),
            returns: Field::new("count", FieldType::Integer),
            initial: Value::Int(0),
            finalize: None,
        },
        Aggregate {
            name: "min".into(),
            step: AggStep::Binary(Arc::new(|state, next| {
                pick(state, next, Ordering::Greater)
            })),
            returns: Field::new("min", FieldType::Integer),
            initial: Value::Float(f64::INFINITY),
            finalize: None,
        },
        Aggregate {
            name: "max".into(),
            step: AggStep::Binary(Arc::new(|state, next| pick(state, next, Ordering::Less))),
            returns: Field::new("max", FieldType::Integer),
            initial: Value::Float(f64::NEG_INFINITY),
            finalize: None,
        },
        Aggregate {
            name: "sum".into(),
            step: AggStep::Binary(Arc::new(|state, next| {
                if next.is_null() {
                    return Ok(state);
                }
                state
                    .add(&next)
                    .ok_or_else(|| EngineError::Execution("sum requires numeric input".into()))
            })),
            returns: Field::new("sum", FieldType::Integer),
            initial: Value::Int(0),
            finalize: None,
        },
        Aggregate {
            name: "concat".into(),
            step: AggStep::Binary(Arc::new(|state, next| {
                if next.is_null() {
                    return Ok(state);
                }
                state
                    .add(&next)
                    .ok_or_else(|| EngineError::Execution("concat requires strings".into()))
            })),
            returns: Field::new("concat", FieldType::String),
            initial: Value::Str(String::new()),
            finalize: None,
        },
    ]
}

fn number_arg(args: &[Value], name: &str) -> EngineResult<f64> {
    match args.first() {
        Some(Value::Int(i)) => Ok(*i as f64),
        Some(Value::Float(f)) => Ok(*f),
        other => Err(EngineError::Execution(format!(
            "{name} expects a number, found {other:?}"
        ))),
    }
}

fn string_arg(args: &[Value], name: &str) -> EngineResult<String> {
    match args.first() {
        Some(Value::Str(s)) => Ok(s.clone()),
        other => Err(EngineError::Execution(format!(
            "{name} expects a string, found {other:?}"
        ))),
    }
}

fn math_udf(
    name: &'static str,
    f: impl Fn(f64) -> f64 + 'static,
) -> ScalarUdf {
    ScalarUdf::new(
        name,
        Arc::new(move |args| Ok(Value::Float(f(number_arg(args, name)?)))),
        Some(Field::new(name, FieldType::Float)),
    )
}

pub(crate) fn math_functions() -> Vec<ScalarUdf> {
    vec![
        math_udf("sqrt", f64::sqrt),
        math_udf("abs", f64::abs),
        math_udf("floor", f64::floor),
        math_udf("ceil", f64::ceil),
        ScalarUdf::new(
            "pow",
            Arc::new(|args| {
                let base = number_arg(args, "pow")?;
                let exponent = match args.get(1) {
                    Some(Value::Int(i)) => *i as f64,
                    Some(Value::Float(f)) => *f,
                    other => {
                        return Err(EngineError::Execution(format!(
                            "pow expects a numeric exponent, found {other:?}"
                        )))
                    }
                };
                Ok(Value::Float(base.powf(exponent)))
            }),
            Some(Field::new("pow", FieldType::Float)),
        ),
    ]
}

pub(crate) fn string_functions() -> Vec<ScalarUdf> {
    vec![
        ScalarUdf::new(
            "upper",
            Arc::new(|args| Ok(Value::Str(string_arg(args, "upper")?.to_uppercase()))),
            Some(Field::new("upper", FieldType::String)),
        ),
        ScalarUdf::new(
            "lower",
            Arc::new(|args| Ok(Value::Str(string_arg(args, "lower")?.to_lowercase()))),
            Some(Field::new("lower", FieldType::String)),
        ),
        ScalarUdf::new(
            "length",
            Arc::new(|args| Ok(Value::Int(string_arg(args, "length")?.chars().count() as i64))),
            Some(Field::new("length", FieldType::Integer)),
        ),
        ScalarUdf::new(
            "trim",
            Arc::new(|args| Ok(Value::Str(string_arg(args, "trim")?.trim().to_string()))),
            Some(Field::new("trim", FieldType::String)),
        ),
    ]
}
