use crate::operand::RuleOperand;
use common::{EngineError, EngineResult};
use expr::Expr;

/// A rewrite rule: an operand pattern plus a transformation.
///
/// `rewrite_owned` returns one or more equivalent plans, each a fresh tree
/// built from clones of the input. `rewrite_in_place` consumes the subtree
/// and returns the (possibly new) root; rules producing several equivalent
/// plans must not override it.
///
/// Rule identity is the rule name, not the operand structure.
pub trait Rule {
    fn name(&self) -> &'static str;

    fn operand(&self) -> &RuleOperand;

    fn matches(&self, node: &Expr) -> bool {
        self.operand().matches(Some(node))
    }

    fn rewrite_owned(&self, root: &Expr) -> EngineResult<Vec<Expr>>;

    fn rewrite_in_place(&self, root: Expr) -> EngineResult<Expr> {
        let mut plans = self.rewrite_owned(&root)?;
        if plans.is_empty() {
            return Err(EngineError::RuleImplement(format!(
                "rule '{}' produced no equivalent plan",
                self.name()
            )));
        }
        Ok(plans.remove(0))
    }
}

/// Validate what a rule returned; shape violations become rule errors.
pub(crate) fn validate_rewrite(rule: &dyn Rule, plans: &[Expr]) -> EngineResult<()> {
    if plans.is_empty() {
        return Err(EngineError::RuleImplement(format!(
            "rule '{}' returned an empty plan list",
            rule.name()
        )));
    }
    for plan in plans {
        if !plan.is_resolved() {
            return Err(EngineError::RuleImplement(format!(
                "rule '{}' produced an unresolved plan",
                rule.name()
            )));
        }
    }
    Ok(())
}
