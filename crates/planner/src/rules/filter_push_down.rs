use crate::operand::RuleOperand;
use crate::rule::Rule;
use common::{EngineError, EngineResult};
use expr::predicate::and_join;
use expr::{Expr, ExprKind, Predicate};

/// Predicate push-down across an inner join.
///
/// The selection predicate is decorrelated into AND-conjuncts. Conjuncts
/// referencing only one join child are pushed into a new selection over
/// that child; conjuncts referencing neither (constants) are duplicated
/// into both children; conjuncts referencing both stay on top, AND-joined
/// into a single surviving selection. When nothing stays, the join becomes
/// the new root.
pub struct FilterPushDownRule {
    operand: RuleOperand,
}

impl FilterPushDownRule {
    pub fn new() -> Self {
        Self {
            operand: RuleOperand::node(
                ExprKind::Selection,
                vec![RuleOperand::node(
                    ExprKind::Join,
                    vec![RuleOperand::AnyMatch, RuleOperand::AnyMatch],
                )],
            ),
        }
    }

    fn wrap(child: Expr, predicate: &Predicate) -> EngineResult<Expr> {
        let schema = child
            .schema()
            .cloned()
            .ok_or_else(|| EngineError::PlannerInternal("join child not resolved".into()))?;
        Ok(Expr::Selection {
            input: Box::new(child),
            predicate: Some(Box::new(predicate.expr().clone())),
            schema: Some(schema),
        })
    }
}

impl Default for FilterPushDownRule {
    fn default() -> Self {
        Self::new()
    }
}

impl Rule for FilterPushDownRule {
    fn name(&self) -> &'static str {
        "filter_push_down"
    }

    fn operand(&self) -> &RuleOperand {
        &self.operand
    }

    fn rewrite_owned(&self, root: &Expr) -> EngineResult<Vec<Expr>> {
        let Expr::Selection {
            input: join,
            predicate: Some(_),
            schema: sel_schema,
        } = root
        else {
            return Err(EngineError::RuleImplement(
                "filter_push_down applied to a selection without predicate".into(),
            ));
        };
        let Expr::Join {
            left,
            right,
            predicate: join_pred,
            schema: join_schema,
        } = join.as_ref()
        else {
            return Err(EngineError::RuleImplement(
                "filter_push_down requires a join child".into(),
            ));
        };
        if sel_schema != join_schema {
            return Err(EngineError::PlannerInternal(
                "selection and join child disagree on schema".into(),
            ));
        }

        let predicate = Predicate::from_rel_op(root)?;
        let groups =
            Predicate::group(predicate.decorrelate_and(&[left.as_ref(), right.as_ref()])?);

        let mut new_left = left.as_ref().clone();
        let mut new_right = right.as_ref().clone();
        let mut remaining = Vec::new();
        for (related, pred) in groups {
            match related.as_slice() {
                // a constant conjunct filters either side equally well
                [] => {
                    new_left = Self::wrap(new_left, &pred)?;
                    new_right = Self::wrap(new_right, &pred)?;
                }
                [0] => new_left = Self::wrap(new_left, &pred)?,
                [1] => new_right = Self::wrap(new_right, &pred)?,
                _ => remaining.push(pred.into_expr()),
            }
        }

        let new_join = Expr::Join {
            left: Box::new(new_left),
            right: Box::new(new_right),
            predicate: join_pred.clone(),
            schema: join_schema.clone(),
        };
        let new_root = match and_join(remaining) {
            Some(top) => Expr::Selection {
                input: Box::new(new_join),
                predicate: Some(Box::new(top)),
                schema: sel_schema.clone(),
            },
            None => new_join,
        };
        Ok(vec![new_root])
    }
}
