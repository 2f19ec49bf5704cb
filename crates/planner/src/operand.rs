use expr::{Expr, ExprKind};

/// Pattern tree a rule matches against plan shapes.
///
/// `AnyMatch` matches anything including an empty slot; `NoneMatch` only an
/// absent node. A plan node matches a `Node` operand when the variant tags
/// agree and every plan child matches the operand child at its position;
/// surplus operand children must be sentinels.
#[derive(Clone, Debug)]
pub enum RuleOperand {
    Node {
        kind: ExprKind,
        children: Vec<RuleOperand>,
    },
    AnyMatch,
    NoneMatch,
}

impl RuleOperand {
    pub fn node(kind: ExprKind, children: Vec<RuleOperand>) -> Self {
        RuleOperand::Node { kind, children }
    }

    pub fn matches(&self, node: Option<&Expr>) -> bool {
        match self {
            RuleOperand::AnyMatch => true,
            RuleOperand::NoneMatch => node.is_none(),
            RuleOperand::Node { kind, children } => {
                let Some(node) = node else {
                    return false;
                };
                if node.kind() != *kind {
                    return false;
                }
                let plan_children = node.rel_children();
                if plan_children.len() > children.len() {
                    return false;
                }
                for (idx, operand) in children.iter().enumerate() {
                    match plan_children.get(idx) {
                        Some(child) => {
                            if !operand.matches(Some(child)) {
                                return false;
                            }
                        }
                        None => {
                            if !matches!(operand, RuleOperand::AnyMatch | RuleOperand::NoneMatch)
                            {
                                return false;
                            }
                        }
                    }
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_nested_shapes() {
        let operand = RuleOperand::node(
            ExprKind::Selection,
            vec![RuleOperand::node(
                ExprKind::Selection,
                vec![RuleOperand::AnyMatch],
            )],
        );
        let plan = Expr::selection(
            Expr::selection(Expr::load("t"), Expr::boolean(true)),
            Expr::boolean(false),
        );
        assert!(operand.matches(Some(&plan)));

        let flat = Expr::selection(Expr::load("t"), Expr::boolean(true));
        assert!(!operand.matches(Some(&flat)));
    }

    #[test]
    fn surplus_operand_children_must_be_sentinels() {
        let operand = RuleOperand::node(
            ExprKind::Load,
            vec![RuleOperand::AnyMatch, RuleOperand::NoneMatch],
        );
        assert!(operand.matches(Some(&Expr::load("t"))));

        let strict = RuleOperand::node(
            ExprKind::Load,
            vec![RuleOperand::node(ExprKind::Load, vec![])],
        );
        assert!(!strict.matches(Some(&Expr::load("t"))));
    }

    #[test]
    fn none_only_matches_absent() {
        assert!(RuleOperand::NoneMatch.matches(None));
        assert!(!RuleOperand::NoneMatch.matches(Some(&Expr::load("t"))));
        assert!(RuleOperand::AnyMatch.matches(None));
    }
}
