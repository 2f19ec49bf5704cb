//! Logical cost factors.
//!
//! Every node has an initial factor: relational operators and most scalar
//! operators cost one unit, constants and variables a tiny fraction, leaves
//! nothing. The *refined* factor of a relational operator folds in the
//! factors of its predicate expressions, so a selection with an expensive
//! predicate costs more per input row than a trivial one.

use crate::Expr;
use types::Value;

pub const DEFAULT_COST_FACTOR: f64 = 1.0;
pub const TINY_COST_FACTOR: f64 = 0.1;

/// Initial cost factor of a single node.
pub fn initial_cost_factor(expr: &Expr) -> f64 {
    match expr {
        Expr::Const(Value::Null) => 0.0,
        Expr::Const(Value::Extension(v)) => TINY_COST_FACTOR * v.payload.cost_units() as f64,
        Expr::Const(_) | Expr::Var { .. } | Expr::Tuple { .. } => TINY_COST_FACTOR,
        Expr::ExtScalar { cost_factor, .. } | Expr::ExtRel { cost_factor, .. } => *cost_factor,
        Expr::Load { .. } | Expr::Relation(_) => 0.0,
        _ => DEFAULT_COST_FACTOR,
    }
}

/// The predicate expressions a relational operator evaluates per row.
pub fn predicate_exprs(expr: &Expr) -> Vec<&Expr> {
    match expr {
        Expr::Projection { exprs, .. } => exprs.iter().collect(),
        Expr::GroupBy { keys, .. } | Expr::OrderBy { keys, .. } => keys.iter().collect(),
        Expr::Selection { predicate, .. } | Expr::ExtRel { predicate, .. } => {
            predicate.iter().map(|p| p.as_ref()).collect()
        }
        Expr::Join { predicate, .. } | Expr::LeftJoin { predicate, .. } => {
            vec![predicate.as_ref()]
        }
        _ => Vec::new(),
    }
}

fn refined_predicate_factor(expr: &Expr) -> f64 {
    initial_cost_factor(expr)
        + expr
            .operand_children()
            .into_iter()
            .map(refined_predicate_factor)
            .sum::<f64>()
}

/// Refined cost factor: the node's initial factor plus the summed factors
/// of its predicate expressions. Leaves are not refined.
pub fn refined_cost_factor(expr: &Expr) -> f64 {
    if expr.is_relational() {
        match expr {
            Expr::Load { .. } | Expr::Relation(_) => initial_cost_factor(expr),
            _ => {
                initial_cost_factor(expr)
                    + predicate_exprs(expr)
                        .into_iter()
                        .map(refined_predicate_factor)
                        .sum::<f64>()
            }
        }
    } else {
        refined_predicate_factor(expr)
    }
}
