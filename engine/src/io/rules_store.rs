//! Rule document loading with schema and consistency validation.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use jsonschema::validator_for;
use serde_json::Value;
use tracing::warn;

use crate::core::rules::RuleSet;

const RULES_SCHEMA: &str = include_str!("../../schemas/rules.schema.json");

/// Load a rule document, validating it against the bundled JSON Schema and
/// then checking the count and identity invariants.
pub fn load_rules(path: &Path) -> Result<RuleSet> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read rules {}", path.display()))?;
    parse_rules(&contents).with_context(|| format!("load rules {}", path.display()))
}

pub fn parse_rules(contents: &str) -> Result<RuleSet> {
    let value: Value = serde_json::from_str(contents).context("parse rules json")?;
    validate_schema(&value)?;
    let rules: RuleSet = serde_json::from_value(value).context("deserialize rules")?;
    let errors = rules.consistency_errors();
    if !errors.is_empty() {
        return Err(anyhow!("rule set is inconsistent: {}", errors.join("; ")));
    }
    if rules.is_degraded() {
        warn!(
            rules = rules.rules.len(),
            "rule set came from the fallback parser; results may be incomplete"
        );
    }
    Ok(rules)
}

fn validate_schema(value: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(RULES_SCHEMA).context("parse bundled rules schema")?;
    let compiled = validator_for(&schema).map_err(|err| anyhow!("invalid schema: {}", err))?;
    if !compiled.is_valid(value) {
        let messages = compiled
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect::<Vec<_>>();
        return Err(anyhow!(
            "rules schema validation failed: {}",
            messages.join("; ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::rules::RuleOrigin;

    #[test]
    fn loads_canonical_document() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rules.json");
        fs::write(
            &path,
            r#"{"rules": [{"id": 1, "name": "Review", "condition": "Profit < 5", "exception": null}], "total": 1}"#,
        )
        .expect("write");
        let rules = load_rules(&path).expect("load");
        assert_eq!(rules.rules[0].name, "Review");
        assert_eq!(rules.origin, RuleOrigin::Extracted);
    }

    #[test]
    fn fallback_origin_is_accepted_and_flagged() {
        let rules = parse_rules(
            r#"{"rules": [{"rule_id": 1, "rule_name": "Liquidation", "condition_logic": "Days > 180"}], "total_rules": 1, "origin": "fallback"}"#,
        )
        .expect("parse");
        assert!(rules.is_degraded());
    }

    #[test]
    fn schema_rejects_rules_without_conditions() {
        let err = parse_rules(r#"{"rules": [{"id": 1, "name": "x"}], "total": 1}"#).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn schema_rejects_missing_total() {
        let err = parse_rules(r#"{"rules": []}"#).unwrap_err();
        assert!(format!("{err:#}").contains("schema validation failed"));
    }

    #[test]
    fn count_mismatch_is_inconsistent() {
        let err = parse_rules(
            r#"{"rules": [{"id": 1, "name": "a", "condition": "c"}], "total": 2}"#,
        )
        .unwrap_err();
        assert!(format!("{err:#}").contains("total is 2 but 1 rules are listed"));
    }

    #[test]
    fn missing_file_names_the_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = load_rules(&temp.path().join("absent.json")).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
