use crate::operand::RuleOperand;
use crate::rule::Rule;
use common::{EngineError, EngineResult};
use expr::{Expr, ExprKind};
use types::ExtOpTag;

/// Swaps a plain selection sitting on top of an extended selection, so the
/// typically more expensive extended predicate runs on the pre-filtered
/// input. Generic over the extension tag; each pack registers its own
/// instance.
pub struct SelectionExtSwapRule {
    tag: ExtOpTag,
    operand: RuleOperand,
}

impl SelectionExtSwapRule {
    pub fn new(tag: ExtOpTag) -> Self {
        Self {
            tag,
            operand: RuleOperand::node(
                ExprKind::Selection,
                vec![RuleOperand::node(
                    ExprKind::ExtRel(tag),
                    vec![RuleOperand::AnyMatch],
                )],
            ),
        }
    }
}

impl Rule for SelectionExtSwapRule {
    fn name(&self) -> &'static str {
        "selection_ext_selection_swap"
    }

    fn operand(&self) -> &RuleOperand {
        &self.operand
    }

    fn rewrite_owned(&self, root: &Expr) -> EngineResult<Vec<Expr>> {
        let Expr::Selection {
            input: ext,
            predicate: sel_pred,
            schema: sel_schema,
        } = root
        else {
            return Err(EngineError::RuleImplement(
                "selection swap applied to a non-selection".into(),
            ));
        };
        let Expr::ExtRel {
            tag,
            input: source,
            predicate: ext_pred,
            schema: ext_schema,
            cost_factor,
        } = ext.as_ref()
        else {
            return Err(EngineError::RuleImplement(
                "selection swap requires an extended selection child".into(),
            ));
        };
        if *tag != self.tag {
            return Err(EngineError::RuleImplement(
                "selection swap matched a foreign extension tag".into(),
            ));
        }
        if sel_schema != ext_schema {
            return Err(EngineError::PlannerInternal(
                "stacked selections disagree on schema".into(),
            ));
        }

        let inner = Expr::Selection {
            input: source.clone(),
            predicate: sel_pred.clone(),
            schema: sel_schema.clone(),
        };
        Ok(vec![Expr::ExtRel {
            tag: *tag,
            input: Box::new(inner),
            predicate: ext_pred.clone(),
            schema: ext_schema.clone(),
            cost_factor: *cost_factor,
        }])
    }
}
