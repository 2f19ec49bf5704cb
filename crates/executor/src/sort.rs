//! ORDER BY: materialize, then sort by a key tuple. DESC reverses per
//! column with a type-dependent encoding: numbers by arithmetic negation,
//! strings by byte-wise negation, anything else contributes a constant key.

use crate::{materialize, rows_from_vec, Compiler};
use common::{EngineResult, EvalContext, Row};
use expr::Expr;
use planner::field_from_expr;
use schema::Schema;
use std::rc::Rc;
use syntax::{PlanCompiler, RelProducer};
use types::{Date, FieldType, Value};

/// Totally ordered f64 wrapper.
#[derive(Clone, Copy, Debug, PartialEq)]
pub(crate) struct OrdF64(pub f64);

impl Eq for OrdF64 {}

impl PartialOrd for OrdF64 {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OrdF64 {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// One column of a sort key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) enum SortKey {
    Null,
    Bool(bool),
    Num(OrdF64),
    Str(String),
    /// Byte-wise negated string, the DESC encoding for text.
    Bytes(Vec<i16>),
    /// Unsupported types sort as equals.
    Unit,
}

pub(crate) fn value_sort_key(v: &Value) -> SortKey {
    match v {
        Value::Null => SortKey::Null,
        Value::Bool(b) => SortKey::Bool(*b),
        Value::Int(i) => SortKey::Num(OrdF64(*i as f64)),
        Value::Float(f) => SortKey::Num(OrdF64(*f)),
        Value::Str(s) => SortKey::Str(s.clone()),
        Value::Date(d) => SortKey::Num(OrdF64(date_ordinal(d))),
        Value::List(_) | Value::Extension(_) => SortKey::Unit,
    }
}

fn date_ordinal(d: &Date) -> f64 {
    d.year as f64 * 10_000.0 + d.month as f64 * 100.0 + d.day as f64
}

type KeyFn = Box<dyn Fn(&Row, &EvalContext) -> EngineResult<SortKey>>;

pub(crate) fn compile_sort_keys(
    compiler: &Compiler<'_>,
    keys: &[Expr],
    schema: &Schema,
) -> EngineResult<Vec<KeyFn>> {
    keys.iter()
        .map(|key| compile_sort_key(compiler, key, schema))
        .collect()
}

fn compile_sort_key(
    compiler: &Compiler<'_>,
    key: &Expr,
    schema: &Schema,
) -> EngineResult<KeyFn> {
    if let Expr::Desc { expr } = key {
        let field = field_from_expr(expr, schema, compiler.funcs(), compiler.registry())?;
        let value = compiler.compile_scalar(expr, schema)?;
        return Ok(match field.ty {
            FieldType::Integer | FieldType::Float | FieldType::Date => {
                Box::new(move |row, ctx| {
                    Ok(match value_sort_key(&value(row, ctx)?) {
                        SortKey::Num(OrdF64(n)) => SortKey::Num(OrdF64(-n)),
                        _ => SortKey::Unit,
                    })
                })
            }
            FieldType::String => Box::new(move |row, ctx| {
                Ok(match value(row, ctx)? {
                    Value::Str(s) => {
                        SortKey::Bytes(s.bytes().map(|b| -(b as i16)).collect())
                    }
                    _ => SortKey::Unit,
                })
            }),
            _ => Box::new(|_, _| Ok(SortKey::Unit)),
        });
    }
    let value = compiler.compile_scalar(key, schema)?;
    Ok(Box::new(move |row, ctx| {
        Ok(value_sort_key(&value(row, ctx)?))
    }))
}

pub(crate) fn compile_order_by(
    compiler: &Compiler<'_>,
    keys: &[Expr],
    input: &Expr,
    factor: f64,
) -> EngineResult<RelProducer> {
    let schema = compiler.input_schema(input)?.clone();
    let key_fns = compile_sort_keys(compiler, keys, &schema)?;
    let child = compiler.compile_rel(input)?;
    Ok(Box::new(move |ctx| {
        let rows = materialize(child(ctx)?)?;
        ctx.record_stat(rows.len() as u64, factor);
        Ok(rows_from_vec(sort_rows(rows, &key_fns, ctx)?))
    }))
}

pub(crate) fn sort_rows(
    rows: Vec<Row>,
    key_fns: &[KeyFn],
    ctx: &Rc<EvalContext>,
) -> EngineResult<Vec<Row>> {
    let mut keyed: Vec<(Vec<SortKey>, Row)> = rows
        .into_iter()
        .map(|row| {
            let key = key_fns
                .iter()
                .map(|f| f(&row, ctx))
                .collect::<EngineResult<Vec<_>>>()?;
            Ok((key, row))
        })
        .collect::<EngineResult<_>>()?;
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(keyed.into_iter().map(|(_, row)| row).collect())
}
