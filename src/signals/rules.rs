use std::collections::HashSet;

use tracing::debug;

use crate::config::SignalConfig;
use crate::core::{DetectionRule, RuleHit, Transaction};

/// Built-in predicate selected by a rule's condition tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleCondition {
    LargeAmount,
    BlacklistedAccount,
    /// Tag this build does not know. Never fires.
    Unknown(String),
}

impl RuleCondition {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "large_amount" => RuleCondition::LargeAmount,
            "blacklisted_account" => RuleCondition::BlacklistedAccount,
            other => RuleCondition::Unknown(other.to_string()),
        }
    }
}

/// Sum of triggered rule weights plus the rules that fired.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleEvaluation {
    pub contribution: f64,
    pub hits: Vec<RuleHit>,
}

/// Evaluates detection rules against a transaction.
pub struct RuleEvaluator {
    large_amount_threshold: f64,
    blacklist: HashSet<String>,
}

impl RuleEvaluator {
    pub fn new(large_amount_threshold: f64, blacklist: impl IntoIterator<Item = String>) -> Self {
        Self {
            large_amount_threshold,
            blacklist: blacklist.into_iter().collect(),
        }
    }

    pub fn from_config(config: &SignalConfig) -> Self {
        Self::new(config.large_amount_threshold, config.blacklist.iter().cloned())
    }

    pub fn is_blacklisted(&self, account_id: &str) -> bool {
        self.blacklist.contains(account_id)
    }

    /// Whether `condition` holds for `tx`.
    pub fn holds(&self, condition: &RuleCondition, tx: &Transaction) -> bool {
        match condition {
            RuleCondition::LargeAmount => tx.amount > self.large_amount_threshold,
            RuleCondition::BlacklistedAccount => self.is_blacklisted(&tx.account_id),
            RuleCondition::Unknown(_) => false,
        }
    }

    /// Evaluate every rule independently and sum the weights of those that fire.
    pub fn evaluate(&self, rules: &[DetectionRule], tx: &Transaction) -> RuleEvaluation {
        let mut evaluation = RuleEvaluation::default();
        for rule in rules {
            let condition = RuleCondition::parse(&rule.condition);
            if let RuleCondition::Unknown(tag) = &condition {
                debug!(rule_id = rule.id, condition = %tag, "Ignoring rule with unknown condition");
                continue;
            }
            if self.holds(&condition, tx) {
                debug!(transaction_id = %tx.id, rule_id = rule.id, weight = rule.weight, "Rule triggered");
                evaluation.contribution += rule.weight;
                evaluation.hits.push(RuleHit {
                    rule_id: rule.id,
                    condition: rule.condition.clone(),
                    weight: rule.weight,
                });
            }
        }
        evaluation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn evaluator() -> RuleEvaluator {
        RuleEvaluator::new(10_000.0, ["BLCKLST001".to_string(), "BLCKLST002".to_string()])
    }

    fn make_tx(account_id: &str, amount: f64) -> Transaction {
        Transaction {
            id: "tx1".to_string(),
            account_id: account_id.to_string(),
            transaction_type: "wire".to_string(),
            amount,
            timestamp: Utc::now(),
        }
    }

    fn make_rule(id: i64, condition: &str, weight: f64) -> DetectionRule {
        DetectionRule {
            id,
            name: format!("rule_{id}"),
            description: String::new(),
            priority: 1,
            condition: condition.to_string(),
            weight,
        }
    }

    #[test]
    fn parse_known_tags() {
        assert_eq!(RuleCondition::parse("large_amount"), RuleCondition::LargeAmount);
        assert_eq!(
            RuleCondition::parse("blacklisted_account"),
            RuleCondition::BlacklistedAccount
        );
        assert_eq!(
            RuleCondition::parse("velocity"),
            RuleCondition::Unknown("velocity".to_string())
        );
    }

    #[test]
    fn large_amount_fires_above_threshold() {
        let rules = vec![make_rule(1, "large_amount", 0.65)];
        let eval = evaluator().evaluate(&rules, &make_tx("ACC123", 15_000.0));
        assert!(eval.contribution >= 0.65);
        assert_eq!(eval.hits.len(), 1);
        assert_eq!(eval.hits[0].rule_id, 1);
    }

    #[test]
    fn large_amount_boundary_is_strict() {
        let rules = vec![make_rule(1, "large_amount", 0.65)];
        let eval = evaluator().evaluate(&rules, &make_tx("ACC123", 10_000.0));
        assert_eq!(eval.contribution, 0.0);
        assert!(eval.hits.is_empty());

        let eval = evaluator().evaluate(&rules, &make_tx("ACC123", 10_000.01));
        assert_eq!(eval.contribution, 0.65);
    }

    #[test]
    fn blacklisted_account_fires() {
        let rules = vec![make_rule(2, "blacklisted_account", 0.9)];
        let eval = evaluator().evaluate(&rules, &make_tx("BLCKLST002", 10.0));
        assert!(eval.contribution >= 0.9);
    }

    #[test]
    fn clean_account_does_not_fire() {
        let rules = vec![make_rule(2, "blacklisted_account", 0.9)];
        let eval = evaluator().evaluate(&rules, &make_tx("ACC123", 10.0));
        assert_eq!(eval.contribution, 0.0);
    }

    #[test]
    fn unknown_condition_is_inert() {
        let rules = vec![make_rule(3, "velocity", 5.0), make_rule(4, "", 1.0)];
        let eval = evaluator().evaluate(&rules, &make_tx("BLCKLST001", 50_000.0));
        assert_eq!(eval, RuleEvaluation::default());
    }

    #[test]
    fn weights_accumulate() {
        let rules = vec![
            make_rule(1, "large_amount", 0.5),
            make_rule(2, "blacklisted_account", 0.9),
            make_rule(3, "large_amount", 0.25),
        ];
        let eval = evaluator().evaluate(&rules, &make_tx("BLCKLST001", 20_000.0));
        assert!((eval.contribution - 1.65).abs() < 1e-9);
        assert_eq!(eval.hits.len(), 3);
    }

    #[test]
    fn order_does_not_matter() {
        let mut rules = vec![
            make_rule(1, "large_amount", 0.5),
            make_rule(2, "blacklisted_account", 0.9),
            make_rule(3, "unknown", 0.3),
        ];
        let tx = make_tx("BLCKLST001", 20_000.0);
        let forward = evaluator().evaluate(&rules, &tx).contribution;
        rules.reverse();
        let backward = evaluator().evaluate(&rules, &tx).contribution;
        assert!((forward - backward).abs() < 1e-12);
    }

    #[test]
    fn empty_rule_set() {
        let eval = evaluator().evaluate(&[], &make_tx("BLCKLST001", 20_000.0));
        assert_eq!(eval.contribution, 0.0);
    }
}
