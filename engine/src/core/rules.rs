//! Structured classification rules as handed over by the rule extractor.
//!
//! Priority is list position: rules are applied from first to last and a later
//! rule overwrites the category an earlier one assigned. An `exception` is a
//! strictly higher-priority condition that overrides its own rule.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(alias = "rule_id")]
    pub id: i64,
    #[serde(alias = "rule_name")]
    pub name: String,
    #[serde(alias = "condition_logic")]
    pub condition: String,
    #[serde(default, alias = "exception_logic")]
    pub exception: Option<String>,
}

/// How the rule set was produced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleOrigin {
    #[default]
    Extracted,
    /// Produced by a partial manual parser after extraction failed outright.
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    /// Redundant count; must equal `rules.len()`.
    #[serde(alias = "total_rules")]
    pub total: usize,
    #[serde(default)]
    pub origin: RuleOrigin,
}

impl RuleSet {
    pub fn is_degraded(&self) -> bool {
        self.origin == RuleOrigin::Fallback
    }

    /// Consistency violations, in a stable order. Empty means consistent.
    pub fn consistency_errors(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.total != self.rules.len() {
            errors.push(format!(
                "total is {} but {} rules are listed",
                self.total,
                self.rules.len()
            ));
        }
        let mut seen = BTreeSet::new();
        for rule in &self.rules {
            if !seen.insert(rule.id) {
                errors.push(format!("duplicate rule id {}", rule.id));
            }
            if rule.name.trim().is_empty() {
                errors.push(format!("rule {} has an empty name", rule.id));
            }
            if rule.condition.trim().is_empty() {
                errors.push(format!("rule {} has an empty condition", rule.id));
            }
            if rule
                .exception
                .as_deref()
                .is_some_and(|exception| exception.trim().is_empty())
            {
                errors.push(format!("rule {} has a blank exception", rule.id));
            }
        }
        errors
    }

    /// Canonical JSON handed to the generator: one entry per rule, annotated
    /// with its 1-based priority.
    pub fn to_prompt_json(&self) -> serde_json::Result<String> {
        let rules: Vec<serde_json::Value> = self
            .rules
            .iter()
            .enumerate()
            .map(|(index, rule)| {
                serde_json::json!({
                    "priority": index + 1,
                    "id": rule.id,
                    "name": rule.name,
                    "condition": rule.condition,
                    "exception": rule.exception,
                })
            })
            .collect();
        serde_json::to_string_pretty(&serde_json::json!({
            "rules": rules,
            "total": self.rules.len(),
        }))
    }
}
