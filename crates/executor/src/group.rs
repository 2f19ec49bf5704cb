//! GROUP BY and aggregation.
//!
//! With group keys the input is pre-ordered by the key tuple, then folded
//! in a single pass, yielding a finished record on every key change. With
//! no keys exactly one record is emitted, covering the whole input.
//! Aggregate cells start from the registered initial value; every input
//! row is folded exactly once.

use crate::{materialize, rows_from_vec, sort, Compiler};
use common::{EngineError, EngineResult, Row};
use expr::cost::DEFAULT_COST_FACTOR;
use expr::{cost::refined_cost_factor, Expr};
use schema::Schema;
use syntax::{Aggregate, FunctionProvider, RelProducer};
use types::Value;

/// Find aggregate calls among projection expressions, keyed by their
/// output column position (select-all entries widen the positions).
pub(crate) fn discover_aggregates(
    exprs: &[Expr],
    input_schema: &Schema,
    funcs: &dyn FunctionProvider,
) -> Vec<(usize, Aggregate)> {
    let mut found = Vec::new();
    let mut pos = 0usize;
    for expr in exprs {
        match expr {
            Expr::SelectAll { qualifier: None } => pos += input_schema.len(),
            Expr::SelectAll {
                qualifier: Some(q),
            } => {
                pos += input_schema
                    .fields()
                    .iter()
                    .filter(|f| f.schema_name.as_deref() == Some(q))
                    .count();
            }
            other => {
                let inner = match other {
                    Expr::Rename { expr, .. } => expr.as_ref(),
                    e => e,
                };
                if let Expr::FuncCall { name, .. } = inner {
                    if let Some(agg) = funcs.aggregate(name) {
                        found.push((pos, agg.clone()));
                    }
                }
                pos += 1;
            }
        }
    }
    found
}

fn flattened_width(exprs: &[Expr], input_schema: &Schema) -> usize {
    exprs
        .iter()
        .map(|expr| match expr {
            Expr::SelectAll { qualifier: None } => input_schema.len(),
            Expr::SelectAll {
                qualifier: Some(q),
            } => input_schema
                .fields()
                .iter()
                .filter(|f| f.schema_name.as_deref() == Some(q))
                .count(),
            _ => 1,
        })
        .sum()
}

/// First projected column that is neither an aggregate nor covered by the
/// group keys; used for the group-by-required error message.
fn first_plain_column<'e>(
    exprs: &'e [Expr],
    funcs: &dyn FunctionProvider,
) -> Option<&'e Expr> {
    exprs.iter().find(|expr| {
        let inner = match expr {
            Expr::Rename { expr, .. } => expr.as_ref(),
            e => e,
        };
        match inner {
            Expr::FuncCall { name, .. } => funcs.aggregate(name).is_none(),
            _ => true,
        }
    })
}

/// Compile a grouped aggregation over `child` (normally a projection whose
/// aggregate cells evaluate to the aggregate's argument).
pub(crate) fn compile_group(
    compiler: &Compiler<'_>,
    keys: &[Expr],
    child: &Expr,
    group_schema: &Schema,
) -> EngineResult<RelProducer> {
    let aggregates = match child {
        Expr::Projection { input, exprs, .. } => {
            let input_schema = compiler.input_schema(input)?;
            let aggs = discover_aggregates(exprs, input_schema, compiler.funcs());
            if keys.is_empty() && !aggs.is_empty() {
                let width = flattened_width(exprs, input_schema);
                if aggs.len() != width {
                    let offending = first_plain_column(exprs, compiler.funcs())
                        .map(|e| e.to_string())
                        .unwrap_or_default();
                    return Err(EngineError::Syntax(format!(
                        "\"{offending}\" must appear in the GROUP BY clause or be used in \
                         an aggregate function"
                    )));
                }
            }
            aggs
        }
        _ => Vec::new(),
    };

    let key_positions: Vec<usize> = keys
        .iter()
        .map(|key| match key {
            Expr::Var { path } => group_schema.field_position(path),
            other => Err(EngineError::Execution(format!(
                "GROUP BY supports column references only, found '{other}'"
            ))),
        })
        .collect::<EngineResult<_>>()?;

    let child_producer = compiler.compile_node(child, true)?;
    let width = group_schema.len();
    let factor = DEFAULT_COST_FACTOR
        + keys.iter().map(refined_cost_factor).sum::<f64>();

    let aggregates = std::rc::Rc::new(aggregates);
    Ok(Box::new(move |ctx| {
        let rows = materialize(child_producer(ctx)?)?;
        ctx.record_stat(rows.len() as u64, factor);

        if key_positions.is_empty() {
            let record = fold_all(&rows, &aggregates, width)?;
            return Ok(rows_from_vec(vec![record]));
        }

        // pre-order by the key tuple, then fold in one pass
        let mut keyed: Vec<(Vec<sort::SortKey>, Row)> = rows
            .into_iter()
            .map(|row| (row_key(&row, &key_positions), row))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        let mut out = Vec::new();
        let mut current: Option<(Vec<sort::SortKey>, Row)> = None;
        for (key, row) in keyed {
            match &mut current {
                Some((group_key, record)) if *group_key == key => {
                    accumulate(record, &row, &aggregates)?;
                }
                Some((group_key, record)) => {
                    out.push(finalize(record.clone(), &aggregates)?);
                    *group_key = key;
                    *record = initialize(&row, &aggregates);
                    accumulate(record, &row, &aggregates)?;
                }
                None => {
                    let mut record = initialize(&row, &aggregates);
                    accumulate(&mut record, &row, &aggregates)?;
                    current = Some((key, record));
                }
            }
        }
        if let Some((_, record)) = current {
            out.push(finalize(record, &aggregates)?);
        }
        Ok(rows_from_vec(out))
    }))
}

fn row_key(row: &Row, positions: &[usize]) -> Vec<sort::SortKey> {
    positions
        .iter()
        .map(|&pos| {
            row.values
                .get(pos)
                .map(sort::value_sort_key)
                .unwrap_or(sort::SortKey::Null)
        })
        .collect()
}

/// Aggregate cells start from the registered initial value; other cells
/// keep the first row's values.
fn initialize(row: &Row, aggregates: &[(usize, Aggregate)]) -> Row {
    let mut record = row.clone();
    for (pos, agg) in aggregates {
        if let Some(cell) = record.values.get_mut(*pos) {
            *cell = agg.initial.clone();
        }
    }
    record
}

fn accumulate(record: &mut Row, row: &Row, aggregates: &[(usize, Aggregate)]) -> EngineResult<()> {
    for (pos, agg) in aggregates {
        let next = row.values.get(*pos).cloned().unwrap_or(Value::Null);
        let state = record
            .values
            .get_mut(*pos)
            .ok_or_else(|| EngineError::Execution("aggregate cell out of range".into()))?;
        let folded = agg.accumulate(std::mem::replace(state, Value::Null), next)?;
        *state = folded;
    }
    Ok(())
}

fn finalize(mut record: Row, aggregates: &[(usize, Aggregate)]) -> EngineResult<Row> {
    for (pos, agg) in aggregates {
        if agg.finalize.is_some() {
            let state = record
                .values
                .get_mut(*pos)
                .ok_or_else(|| EngineError::Execution("aggregate cell out of range".into()))?;
            let finished = agg.finish(std::mem::replace(state, Value::Null))?;
            *state = finished;
        }
    }
    Ok(record)
}

/// The keyless case: one record covering every input row. An empty input
/// still yields one record of finalized initial states.
fn fold_all(
    rows: &[Row],
    aggregates: &[(usize, Aggregate)],
    width: usize,
) -> EngineResult<Row> {
    let mut record = match rows.first() {
        Some(first) => initialize(first, aggregates),
        None => {
            let mut record = Row::new(vec![Value::Null; width]);
            for (pos, agg) in aggregates {
                if let Some(cell) = record.values.get_mut(*pos) {
                    *cell = agg.initial.clone();
                }
            }
            record
        }
    };
    for row in rows {
        accumulate(&mut record, row, aggregates)?;
    }
    finalize(record, aggregates)
}
