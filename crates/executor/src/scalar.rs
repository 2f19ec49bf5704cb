//! Scalar compilation: one recursive dispatch from expression variant to a
//! `(row, ctx) -> value` closure.

use crate::Compiler;
use common::{EngineError, EngineResult, EvalContext, Row};
use expr::{BinaryOp, Expr, ItemKey, UnaryOp};
use schema::Schema;
use syntax::{PlanCompiler, ScalarFn};
use types::{Date, FieldType, Value};

pub(crate) fn compile_scalar(
    compiler: &Compiler<'_>,
    expr: &Expr,
    schema: &Schema,
) -> EngineResult<ScalarFn> {
    match expr {
        Expr::Const(v) => {
            let v = v.clone();
            Ok(Box::new(move |_, _| Ok(v.clone())))
        }
        Expr::Var { path } => {
            let pos = schema.field_position(path)?;
            let path = path.clone();
            Ok(Box::new(move |row, _| {
                row.values.get(pos).cloned().ok_or_else(|| {
                    EngineError::Execution(format!("row has no value for '{path}'"))
                })
            }))
        }
        Expr::Param { index } => {
            let index = *index;
            Ok(Box::new(move |_, ctx| ctx.param(index)))
        }
        Expr::ItemGetter { key } => match key {
            ItemKey::Index(index) => {
                let index = *index;
                Ok(Box::new(move |row, _| {
                    row.values.get(index).cloned().ok_or_else(|| {
                        EngineError::Execution(format!("row has no item ${index}"))
                    })
                }))
            }
            ItemKey::Name(name) => Err(EngineError::Execution(format!(
                "item getter requires a numeric key, found '${name}'"
            ))),
        },
        Expr::FuncCall { name, args } => compile_func_call(compiler, name, args, schema),
        Expr::Unary { op, expr } => {
            let inner = compile_scalar(compiler, expr, schema)?;
            match op {
                UnaryOp::Neg => Ok(Box::new(move |row, ctx| {
                    let v = inner(row, ctx)?;
                    v.neg().ok_or_else(|| {
                        EngineError::Execution(format!("cannot negate {v:?}"))
                    })
                })),
                UnaryOp::Not => Ok(Box::new(move |row, ctx| {
                    Ok(Value::Bool(!inner(row, ctx)?.truthy()))
                })),
            }
        }
        Expr::Binary { op, lhs, rhs } => compile_binary(compiler, *op, lhs, rhs, schema),
        Expr::Between { expr, low, high } => {
            let value = compile_scalar(compiler, expr, schema)?;
            let low = compile_scalar(compiler, low, schema)?;
            let high = compile_scalar(compiler, high, schema)?;
            Ok(Box::new(move |row, ctx| {
                let v = value(row, ctx)?;
                let lo = low(row, ctx)?;
                let hi = high(row, ctx)?;
                let in_range = matches!(
                    lo.compare(&v),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                ) && matches!(
                    v.compare(&hi),
                    Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)
                );
                Ok(Value::Bool(in_range))
            }))
        }
        Expr::In { needle, items } => {
            let needle = compile_scalar(compiler, needle, schema)?;
            let items: Vec<ScalarFn> = match items.as_ref() {
                Expr::Tuple { exprs } => exprs
                    .iter()
                    .map(|e| compile_scalar(compiler, e, schema))
                    .collect::<EngineResult<_>>()?,
                single => vec![compile_scalar(compiler, single, schema)?],
            };
            Ok(Box::new(move |row, ctx| {
                let v = needle(row, ctx)?;
                for item in &items {
                    if item(row, ctx)?.loose_eq(&v) {
                        return Ok(Value::Bool(true));
                    }
                }
                Ok(Value::Bool(false))
            }))
        }
        Expr::Case { arms, default } => {
            let arms: Vec<(ScalarFn, ScalarFn)> = arms
                .iter()
                .map(|arm| {
                    Ok((
                        compile_scalar(compiler, &arm.when, schema)?,
                        compile_scalar(compiler, &arm.then, schema)?,
                    ))
                })
                .collect::<EngineResult<_>>()?;
            let default = default
                .as_deref()
                .map(|d| compile_scalar(compiler, d, schema))
                .transpose()?;
            Ok(Box::new(move |row, ctx| {
                for (when, then) in &arms {
                    if when(row, ctx)?.truthy() {
                        return then(row, ctx);
                    }
                }
                match &default {
                    Some(default) => default(row, ctx),
                    None => Ok(Value::Null),
                }
            }))
        }
        Expr::Cast { expr, ty } => {
            let inner = compile_scalar(compiler, expr, schema)?;
            let ty = *ty;
            Ok(Box::new(move |row, ctx| cast_value(inner(row, ctx)?, ty)))
        }
        Expr::Asc { expr } | Expr::Desc { expr } | Expr::Rename { expr, .. } => {
            compile_scalar(compiler, expr, schema)
        }
        Expr::ExtScalar { tag, .. } => {
            let def = compiler.registry().scalar_op(*tag).ok_or_else(|| {
                EngineError::ExtensionInternal(format!(
                    "no scalar operator registered for tag #{}",
                    tag.0
                ))
            })?;
            (def.executor.as_ref())(expr, schema, compiler)
        }
        other => Err(EngineError::Execution(format!(
            "expression cannot be evaluated per row: {other}"
        ))),
    }
}

fn compile_func_call(
    compiler: &Compiler<'_>,
    name: &str,
    args: &[Expr],
    schema: &Schema,
) -> EngineResult<ScalarFn> {
    // An aggregate call in a projection evaluates to its argument; the
    // surrounding group operator folds those values with the registered
    // step function.
    if compiler.funcs().aggregate(name).is_some() {
        return match args.first() {
            Some(Expr::SelectAll { .. }) | None => Ok(Box::new(|_, _| Ok(Value::Null))),
            Some(arg) => compile_scalar(compiler, arg, schema),
        };
    }
    let udf = compiler.funcs().scalar_udf(name).ok_or_else(|| {
        EngineError::Execution(format!("no function named '{name}'"))
    })?;
    let body = udf.body.clone();
    let args: Vec<ScalarFn> = args
        .iter()
        .map(|arg| compile_scalar(compiler, arg, schema))
        .collect::<EngineResult<_>>()?;
    Ok(Box::new(move |row, ctx| {
        let values: Vec<Value> = args
            .iter()
            .map(|arg| arg(row, ctx))
            .collect::<EngineResult<_>>()?;
        (body.as_ref())(&values)
    }))
}

fn compile_binary(
    compiler: &Compiler<'_>,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    schema: &Schema,
) -> EngineResult<ScalarFn> {
    use BinaryOp::*;

    // pattern operators compile their pattern once when it is a literal
    if matches!(op, Like | NotLike | RLike | NotRLike | RegExp) {
        return compile_pattern_op(compiler, op, lhs, rhs, schema);
    }

    let left = compile_scalar(compiler, lhs, schema)?;
    let right = compile_scalar(compiler, rhs, schema)?;

    Ok(match op {
        And => Box::new(move |row, ctx| {
            Ok(Value::Bool(
                left(row, ctx)?.truthy() && right(row, ctx)?.truthy(),
            ))
        }),
        Or => Box::new(move |row, ctx| {
            Ok(Value::Bool(
                left(row, ctx)?.truthy() || right(row, ctx)?.truthy(),
            ))
        }),
        Add | Sub | Mul | Div => Box::new(move |row, ctx| {
            let l = left(row, ctx)?;
            let r = right(row, ctx)?;
            let result = match op {
                Add => l.add(&r),
                Sub => l.sub(&r),
                Mul => l.mul(&r),
                Div => {
                    if matches!(r, Value::Int(0)) || matches!(r, Value::Float(f) if f == 0.0) {
                        return Err(EngineError::Execution("division by zero".into()));
                    }
                    l.div(&r)
                }
                _ => unreachable!(),
            };
            result.ok_or_else(|| {
                EngineError::Execution(format!("incompatible operands for {op}: {l:?}, {r:?}"))
            })
        }),
        Eq => Box::new(move |row, ctx| {
            Ok(Value::Bool(left(row, ctx)?.loose_eq(&right(row, ctx)?)))
        }),
        Ne => Box::new(move |row, ctx| {
            let l = left(row, ctx)?;
            let r = right(row, ctx)?;
            if l.is_null() || r.is_null() {
                return Ok(Value::Bool(false));
            }
            Ok(Value::Bool(!l.loose_eq(&r)))
        }),
        Lt | Le | Gt | Ge => Box::new(move |row, ctx| {
            use std::cmp::Ordering::*;
            let l = left(row, ctx)?;
            let r = right(row, ctx)?;
            // null operands compare false rather than erroring out
            let result = match l.compare(&r) {
                Some(ord) => match op {
                    Lt => ord == Less,
                    Le => ord != Greater,
                    Gt => ord == Greater,
                    Ge => ord != Less,
                    _ => unreachable!(),
                },
                None => false,
            };
            Ok(Value::Bool(result))
        }),
        Is => Box::new(move |row, ctx| {
            let l = left(row, ctx)?;
            let r = right(row, ctx)?;
            Ok(Value::Bool(l == r))
        }),
        IsNot => Box::new(move |row, ctx| {
            let l = left(row, ctx)?;
            let r = right(row, ctx)?;
            Ok(Value::Bool(l != r))
        }),
        Like | NotLike | RLike | NotRLike | RegExp => unreachable!(),
    })
}

fn compile_pattern_op(
    compiler: &Compiler<'_>,
    op: BinaryOp,
    lhs: &Expr,
    rhs: &Expr,
    schema: &Schema,
) -> EngineResult<ScalarFn> {
    let negate = matches!(op, BinaryOp::NotLike | BinaryOp::NotRLike);
    let is_like = matches!(op, BinaryOp::Like | BinaryOp::NotLike);
    let left = compile_scalar(compiler, lhs, schema)?;

    let build = move |pattern: &str| -> EngineResult<regex::Regex> {
        let source = if is_like {
            like_pattern_to_regex(pattern)
        } else {
            pattern.to_string()
        };
        regex::Regex::new(&source)
            .map_err(|e| EngineError::Execution(format!("invalid pattern '{pattern}': {e}")))
    };

    // literal patterns compile once
    if let Expr::Const(Value::Str(pattern)) = rhs {
        let re = build(pattern)?;
        return Ok(Box::new(move |row, ctx| {
            let subject = string_operand(left(row, ctx)?)?;
            Ok(Value::Bool(re.is_match(&subject) != negate))
        }));
    }

    let right = compile_scalar(compiler, rhs, schema)?;
    Ok(Box::new(move |row, ctx| {
        let subject = string_operand(left(row, ctx)?)?;
        let pattern = string_operand(right(row, ctx)?)?;
        let re = build(&pattern)?;
        Ok(Value::Bool(re.is_match(&subject) != negate))
    }))
}

fn string_operand(v: Value) -> EngineResult<String> {
    match v {
        Value::Str(s) => Ok(s),
        other => Err(EngineError::Execution(format!(
            "pattern operators require strings, found {other:?}"
        ))),
    }
}

/// Translate a SQL LIKE pattern (`%` any run, `_` one character) into an
/// anchored regular expression.
fn like_pattern_to_regex(pattern: &str) -> String {
    let mut source = String::from("^");
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            other => source.push_str(&regex::escape(&other.to_string())),
        }
    }
    source.push('$');
    source
}

pub(crate) fn cast_value(v: Value, ty: FieldType) -> EngineResult<Value> {
    let failed = |v: &Value| {
        Err(EngineError::Execution(format!(
            "cannot cast {v:?} to {ty}"
        )))
    };
    match ty {
        FieldType::Integer => match &v {
            Value::Int(_) => Ok(v),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| EngineError::Execution(format!("cannot cast '{s}' to {ty}"))),
            _ => failed(&v),
        },
        FieldType::Float => match &v {
            Value::Float(_) => Ok(v),
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| EngineError::Execution(format!("cannot cast '{s}' to {ty}"))),
            _ => failed(&v),
        },
        FieldType::String => Ok(Value::Str(v.to_string())),
        FieldType::Boolean => Ok(Value::Bool(v.truthy())),
        FieldType::Date => match &v {
            Value::Date(_) => Ok(v),
            Value::Str(s) => parse_date(s)
                .map(Value::Date)
                .ok_or_else(|| EngineError::Execution(format!("cannot cast '{s}' to {ty}"))),
            _ => failed(&v),
        },
        _ => failed(&v),
    }
}

fn parse_date(s: &str) -> Option<Date> {
    let mut parts = s.trim().split('-');
    let year = parts.next()?.parse().ok()?;
    let month = parts.next()?.parse().ok()?;
    let day = parts.next()?.parse().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(Date::new(year, month, day))
}
