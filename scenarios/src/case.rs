//! Case file parsing and validation.
//!
//! Cases are TOML files naming a dataset, its rule document, and the category
//! counts a correct classification must produce. See `scenarios/cases/`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;

use crate::fixtures::FixtureKind;

/// A parsed case file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseFile {
    pub case: CaseMeta,
    /// Built-in dataset generated into the run workspace.
    #[serde(default)]
    pub fixture: Option<FixtureSpec>,
    /// Existing files, relative to the repository root.
    #[serde(default)]
    pub inputs: Option<CaseInputs>,
    /// Expected category counts. Empty means only completeness is checked.
    #[serde(default)]
    pub expected: BTreeMap<String, usize>,
    #[serde(default)]
    pub config: CaseConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`). Also the verified slot.
    pub id: String,
    /// Human-readable scenario label recorded in the outcome.
    pub label: String,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct FixtureSpec {
    pub kind: FixtureKind,
    #[serde(default)]
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct CaseInputs {
    pub data: PathBuf,
    pub rules: PathBuf,
    #[serde(default)]
    pub schema: Option<PathBuf>,
}

/// Engine configuration overrides for the case.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct CaseConfig {
    pub max_attempts: Option<u32>,
    pub execution_timeout_secs: Option<u64>,
}

impl CaseFile {
    /// Load and validate a case file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read case {}", path.display()))?;
        let case: CaseFile =
            toml::from_str(&contents).with_context(|| format!("parse case {}", path.display()))?;
        case.validate()
            .with_context(|| format!("validate case {}", path.display()))?;
        Ok(case)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let case: CaseFile = toml::from_str(contents).context("parse case")?;
        case.validate()?;
        Ok(case)
    }

    fn validate(&self) -> Result<()> {
        validate_case_id(&self.case.id)?;
        if self.case.label.trim().is_empty() {
            bail!("case.label must be non-empty");
        }
        match (&self.fixture, &self.inputs) {
            (Some(_), Some(_)) => bail!("fixture and inputs are mutually exclusive"),
            (None, None) => bail!("one of fixture or inputs is required"),
            _ => {}
        }
        if let Some(inputs) = &self.inputs {
            if inputs.data.as_os_str().is_empty() {
                bail!("inputs.data must be non-empty");
            }
            if inputs.rules.as_os_str().is_empty() {
                bail!("inputs.rules must be non-empty");
            }
        }
        for category in self.expected.keys() {
            if category.trim().is_empty() {
                bail!("expected category names must be non-empty");
            }
        }
        if let Some(max_attempts) = self.config.max_attempts
            && max_attempts == 0
        {
            bail!("config.max_attempts must be > 0");
        }
        if let Some(timeout) = self.config.execution_timeout_secs
            && timeout == 0
        {
            bail!("config.execution_timeout_secs must be > 0");
        }
        Ok(())
    }
}

/// Discover and load all case files from a directory.
///
/// Returns cases sorted by id. Errors if duplicate ids are found.
pub fn discover_cases(dir: &Path) -> Result<Vec<CaseFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut cases = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read cases dir {}", dir.display()))? {
        let entry = entry.context("read case entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        cases.push(CaseFile::load(&path)?);
    }
    cases.sort_by(|left, right| left.case.id.cmp(&right.case.id));
    for pair in cases.windows(2) {
        if pair[0].case.id == pair[1].case.id {
            return Err(anyhow!("duplicate case.id {}", pair[0].case.id));
        }
    }
    Ok(cases)
}

/// Resolve `<cases_dir>/<case_id>.toml`, failing when it does not exist.
pub fn case_path(cases_dir: &Path, case_id: &str) -> Result<PathBuf> {
    validate_case_id(case_id)?;
    let path = cases_dir.join(format!("{case_id}.toml"));
    if !path.exists() {
        bail!("case {} not found at {}", case_id, path.display());
    }
    Ok(path)
}

fn validate_case_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("case.id must be non-empty");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("case.id must use [a-z0-9_-] only");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fixture_case() {
        let input = r#"
[case]
id = "warehouse"
label = "Titan Warehouse SOP"

[fixture]
kind = "warehouse"
seed = 42

[expected]
Normal = 80
Liquidation = 10

[config]
max_attempts = 5
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        assert_eq!(case.case.id, "warehouse");
        assert_eq!(
            case.fixture,
            Some(FixtureSpec {
                kind: FixtureKind::Warehouse,
                seed: Some(42)
            })
        );
        assert_eq!(case.expected.get("Liquidation"), Some(&10));
        assert_eq!(case.config.max_attempts, Some(5));
    }

    #[test]
    fn parses_inputs_case() {
        let input = r#"
[case]
id = "custom"
label = "Custom data"

[inputs]
data = "data/custom.csv"
rules = "data/custom_rules.json"
"#;
        let case = CaseFile::parse_str(input).expect("case parses");
        let inputs = case.inputs.expect("inputs");
        assert_eq!(inputs.data, PathBuf::from("data/custom.csv"));
        assert_eq!(inputs.schema, None);
        assert!(case.expected.is_empty());
    }

    #[test]
    fn rejects_invalid_id() {
        let input = r#"
[case]
id = "bad/id"
label = "x"

[fixture]
kind = "orders"
"#;
        let err = CaseFile::parse_str(input).expect_err("invalid id");
        assert!(err.to_string().contains("case.id"));
    }

    #[test]
    fn requires_exactly_one_data_source() {
        let neither = r#"
[case]
id = "empty"
label = "x"
"#;
        let err = CaseFile::parse_str(neither).expect_err("no source");
        assert!(err.to_string().contains("one of fixture or inputs"));

        let both = r#"
[case]
id = "both"
label = "x"

[fixture]
kind = "orders"

[inputs]
data = "a.csv"
rules = "b.json"
"#;
        let err = CaseFile::parse_str(both).expect_err("two sources");
        assert!(err.to_string().contains("mutually exclusive"));
    }

    #[test]
    fn rejects_zero_attempt_budget() {
        let input = r#"
[case]
id = "zero"
label = "x"

[fixture]
kind = "electronics"

[config]
max_attempts = 0
"#;
        let _err = CaseFile::parse_str(input).expect_err("zero attempts");
    }

    #[test]
    fn discovers_cases_sorted_by_id() {
        let temp = tempfile::tempdir().expect("tempdir");
        for id in ["orders", "electronics"] {
            fs::write(
                temp.path().join(format!("{id}.toml")),
                format!("[case]\nid = \"{id}\"\nlabel = \"{id}\"\n\n[fixture]\nkind = \"{id}\"\n"),
            )
            .expect("write case");
        }
        fs::write(temp.path().join("notes.txt"), "ignored").expect("write notes");

        let cases = discover_cases(temp.path()).expect("discover");
        let ids: Vec<&str> = cases.iter().map(|case| case.case.id.as_str()).collect();
        assert_eq!(ids, vec!["electronics", "orders"]);
        assert!(case_path(temp.path(), "orders").is_ok());
        assert!(case_path(temp.path(), "missing").is_err());
    }
}
