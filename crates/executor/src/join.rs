//! Joins. When the predicate is a single equality between one column of
//! each side, rows flow through a hash join built over the smaller side;
//! everything else falls back to a nested loop over the concatenated rows.
//! Left joins pad unmatched left rows with nulls on the right.

use crate::{materialize, rows_from_vec, Compiler};
use common::{EngineError, EngineResult, Row};
use expr::cost::refined_cost_factor;
use expr::{BinaryOp, Expr};
use hashbrown::HashMap;
use schema::Schema;
use std::hash::{Hash, Hasher};
use syntax::{PlanCompiler, RelProducer};
use types::Value;

/// Join key wrapper: hashing is consistent with `Value::loose_eq`, so
/// integer and float keys with the same numeric value land in one bucket.
#[derive(Clone, Debug)]
struct JoinKey(Value);

impl PartialEq for JoinKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.loose_eq(&other.0)
    }
}

impl Eq for JoinKey {}

impl Hash for JoinKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match &self.0 {
            Value::Int(i) => state.write_i64(*i),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                    state.write_i64(*f as i64);
                } else {
                    state.write_u64(f.to_bits());
                }
            }
            Value::Str(s) => s.hash(state),
            Value::Bool(b) => b.hash(state),
            Value::Date(d) => d.hash(state),
            // rare key types share a bucket and disambiguate via eq
            _ => state.write_u8(0xff),
        }
    }
}

/// Recognize `left_col = right_col` (in either order) over the two input
/// schemas. Anything else means no hash-join keys.
fn equi_join_keys(
    predicate: &Expr,
    left: &Schema,
    right: &Schema,
) -> Option<(usize, usize)> {
    let Expr::Binary {
        op: BinaryOp::Eq,
        lhs,
        rhs,
    } = predicate
    else {
        return None;
    };
    let (Expr::Var { path: a }, Expr::Var { path: b }) = (lhs.as_ref(), rhs.as_ref()) else {
        return None;
    };
    if let (Ok(la), Ok(rb)) = (left.field_position(a), right.field_position(b)) {
        return Some((la, rb));
    }
    if let (Ok(lb), Ok(ra)) = (left.field_position(b), right.field_position(a)) {
        return Some((lb, ra));
    }
    None
}

fn concat_rows(left: &Row, right: &Row) -> Row {
    let mut values = left.values.clone();
    values.extend(right.values.iter().cloned());
    Row::new(values)
}

fn null_padded(left: &Row, right_width: usize) -> Row {
    let mut values = left.values.clone();
    values.extend(std::iter::repeat(Value::Null).take(right_width));
    Row::new(values)
}

pub(crate) fn compile_join(compiler: &Compiler<'_>, plan: &Expr) -> EngineResult<RelProducer> {
    let (left, right, predicate, schema, left_join) = match plan {
        Expr::Join {
            left,
            right,
            predicate,
            schema,
        } => (left, right, predicate, schema, false),
        Expr::LeftJoin {
            left,
            right,
            predicate,
            schema,
        } => (left, right, predicate, schema, true),
        _ => {
            return Err(EngineError::PlannerInternal(
                "compile_join requires a join node".into(),
            ))
        }
    };
    let left_schema = compiler.input_schema(left)?.clone();
    let right_schema = compiler.input_schema(right)?.clone();
    let joined_schema = schema.clone().ok_or_else(|| {
        EngineError::PlannerInternal("join node not resolved".into())
    })?;
    let right_width = right_schema.len();
    let factor = refined_cost_factor(plan);

    let left_producer = compiler.compile_rel(left)?;
    let right_producer = compiler.compile_rel(right)?;

    if let Some((left_key, right_key)) = equi_join_keys(predicate, &left_schema, &right_schema)
    {
        return Ok(Box::new(move |ctx| {
            let l = materialize(left_producer(ctx)?)?;
            let r = materialize(right_producer(ctx)?)?;
            // costed as a cross product regardless of the physical algorithm
            ctx.record_stat((l.len() * r.len()) as u64, factor);
            let out = hash_join(&l, &r, left_key, right_key, right_width, left_join);
            Ok(rows_from_vec(out))
        }));
    }

    let condition =
        std::rc::Rc::new(compiler.compile_scalar(predicate, &joined_schema)?);
    Ok(Box::new(move |ctx| {
        let l = materialize(left_producer(ctx)?)?;
        let r = materialize(right_producer(ctx)?)?;
        ctx.record_stat((l.len() * r.len()) as u64, factor);
        let mut out = Vec::new();
        for lrow in &l {
            let mut matched = false;
            for rrow in &r {
                let combined = concat_rows(lrow, rrow);
                if (condition.as_ref())(&combined, ctx)?.truthy() {
                    out.push(combined);
                    matched = true;
                }
            }
            if left_join && !matched {
                out.push(null_padded(lrow, right_width));
            }
        }
        Ok(rows_from_vec(out))
    }))
}

fn hash_join(
    l: &[Row],
    r: &[Row],
    left_key: usize,
    right_key: usize,
    right_width: usize,
    left_join: bool,
) -> Vec<Row> {
    let key_of = |row: &Row, pos: usize| -> Option<JoinKey> {
        match row.values.get(pos) {
            Some(Value::Null) | None => None,
            Some(v) => Some(JoinKey(v.clone())),
        }
    };
    let mut out = Vec::new();

    if left_join || l.len() > r.len() {
        // build over the right side, probe with left rows in order
        let mut table: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        for (idx, row) in r.iter().enumerate() {
            if let Some(key) = key_of(row, right_key) {
                table.entry(key).or_default().push(idx);
            }
        }
        for lrow in l {
            let matches = key_of(lrow, left_key)
                .and_then(|key| table.get(&key))
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            if matches.is_empty() {
                if left_join {
                    out.push(null_padded(lrow, right_width));
                }
                continue;
            }
            for &idx in matches {
                out.push(concat_rows(lrow, &r[idx]));
            }
        }
    } else {
        // build over the (smaller) left side, probe with right rows
        let mut table: HashMap<JoinKey, Vec<usize>> = HashMap::new();
        for (idx, row) in l.iter().enumerate() {
            if let Some(key) = key_of(row, left_key) {
                table.entry(key).or_default().push(idx);
            }
        }
        for rrow in r {
            if let Some(indices) = key_of(rrow, right_key).and_then(|key| table.get(&key)) {
                for &idx in indices {
                    out.push(concat_rows(&l[idx], rrow));
                }
            }
        }
    }
    out
}
