//! The rule-based heuristic optimizer.

use crate::cost::CostEstimator;
use crate::rule::{validate_rewrite, Rule};
use common::{EngineError, EngineResult};
use expr::{Expr, TraversalOrder};

/// Options for the heuristic planner.
#[derive(Clone, Copy, Debug, bon::Builder)]
pub struct PlannerOptions {
    /// Order in which plan nodes are offered to the rules.
    #[builder(default)]
    pub match_order: TraversalOrder,
    /// Upper bound on rule applications before the search stops.
    #[builder(default = 100)]
    pub max_applications: usize,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        PlannerOptions::builder().build()
    }
}

/// Applies registered rules to a resolved plan until no rule fires or the
/// application limit is reached. Each application restarts the node
/// iteration from the (possibly new) root, since a rewrite invalidates the
/// previous traversal.
pub struct HeuristicPlanner {
    options: PlannerOptions,
    rules: Vec<Box<dyn Rule>>,
}

impl HeuristicPlanner {
    pub fn new() -> Self {
        Self::with_options(PlannerOptions::default())
    }

    pub fn with_options(options: PlannerOptions) -> Self {
        Self {
            options,
            rules: Vec::new(),
        }
    }

    /// Register a rule. Returns false (and keeps the old one) when a rule
    /// with the same name is already registered.
    pub fn add_rule(&mut self, rule: Box<dyn Rule>) -> bool {
        if self.rules.iter().any(|r| r.name() == rule.name()) {
            return false;
        }
        self.rules.push(rule);
        true
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Optimize a resolved plan, ranking rule alternatives with `estimator`.
    pub fn find_best_plan(
        &self,
        plan: &Expr,
        estimator: &dyn CostEstimator,
    ) -> EngineResult<Expr> {
        if !plan.is_resolved() {
            return Err(EngineError::PlannerInternal(
                "the heuristic planner requires a resolved plan".into(),
            ));
        }
        let mut root = plan.deep_copy();
        if self.rules.is_empty() {
            tracing::warn!("planner invoked without any registered rule");
            return Ok(root);
        }

        let mut applied = 0usize;
        'restart: loop {
            let paths = root.rel_paths(self.options.match_order);
            for path in paths {
                for rule in &self.rules {
                    let replacement = {
                        let node = root.node_at(&path).ok_or_else(|| {
                            EngineError::PlannerInternal("traversal path went stale".into())
                        })?;
                        self.apply_rule(rule.as_ref(), node, estimator)?
                    };
                    if let Some(new_node) = replacement {
                        tracing::debug!(rule = rule.name(), "rule rewrote a sub-plan");
                        root.replace_at(&path, new_node)?;
                        applied += 1;
                        if applied >= self.options.max_applications {
                            return Ok(root.deep_copy());
                        }
                        continue 'restart;
                    }
                }
            }
            return Ok(root.deep_copy());
        }
    }

    /// Try one rule on one node. Returns the chosen replacement, or `None`
    /// when the rule does not match or its best plan equals the input.
    fn apply_rule(
        &self,
        rule: &dyn Rule,
        node: &Expr,
        estimator: &dyn CostEstimator,
    ) -> EngineResult<Option<Expr>> {
        if !node.is_resolved() {
            return Err(EngineError::PlannerInternal(
                "rules require resolved inputs".into(),
            ));
        }
        if !rule.matches(node) {
            return Ok(None);
        }
        let equivalents = rule.rewrite_owned(node)?;
        validate_rewrite(rule, &equivalents)?;

        let best = if equivalents.len() == 1 {
            equivalents.into_iter().next().ok_or_else(|| {
                EngineError::RuleImplement(format!("rule '{}' lost its plan", rule.name()))
            })?
        } else {
            let mut best: Option<(f64, Expr)> = None;
            for plan in equivalents {
                let cost = estimator.plan_cost(&plan)?;
                match &best {
                    Some((lowest, _)) if cost >= *lowest => {}
                    _ => best = Some((cost, plan)),
                }
            }
            best.map(|(_, plan)| plan).ok_or_else(|| {
                EngineError::RuleImplement(format!("rule '{}' lost its plans", rule.name()))
            })?
        };

        if node.equal_resolved(&best)? {
            return Ok(None);
        }
        Ok(Some(best))
    }
}

impl Default for HeuristicPlanner {
    fn default() -> Self {
        Self::new()
    }
}
