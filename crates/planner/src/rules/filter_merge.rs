use crate::operand::RuleOperand;
use crate::rule::Rule;
use common::{EngineError, EngineResult};
use expr::{Expr, ExprKind};

/// Merges two stacked selections into one whose predicate is
/// `inner AND outer`, keeping a single pass over the input.
pub struct FilterMergeRule {
    operand: RuleOperand,
}

impl FilterMergeRule {
    pub fn new() -> Self {
        Self {
            operand: RuleOperand::node(
                ExprKind::Selection,
                vec![RuleOperand::node(
                    ExprKind::Selection,
                    vec![RuleOperand::AnyMatch],
                )],
            ),
        }
    }
}

impl Default for FilterMergeRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterMergeRule {
    fn name(&self) -> &'static str {
        "filter_merge"
    }

    fn operand(&self) -> &RuleOperand {
        &self.operand
    }

    fn rewrite_owned(&self, root: &Expr) -> EngineResult<Vec<Expr>> {
        let Expr::Selection {
            input: inner,
            predicate: outer_pred,
            schema: outer_schema,
        } = root
        else {
            return Err(EngineError::RuleImplement(
                "filter_merge applied to a non-selection".into(),
            ));
        };
        let Expr::Selection {
            input: source,
            predicate: inner_pred,
            schema: inner_schema,
        } = inner.as_ref()
        else {
            return Err(EngineError::RuleImplement(
                "filter_merge requires a selection child".into(),
            ));
        };
        if outer_schema != inner_schema {
            return Err(EngineError::PlannerInternal(
                "sequential selections have different schemas".into(),
            ));
        }
        let merged = match (inner_pred, outer_pred) {
            (Some(inner), Some(outer)) => {
                Some(Box::new(Expr::and(*inner.clone(), *outer.clone())))
            }
            (Some(inner), None) => Some(inner.clone()),
            (None, Some(outer)) => Some(outer.clone()),
            (None, None) => None,
        };
        Ok(vec![Expr::Selection {
            input: source.clone(),
            predicate: merged,
            schema: inner_schema.clone(),
        }])
    }
}
