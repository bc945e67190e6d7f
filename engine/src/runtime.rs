//! Production path: re-apply a resolved classifier to new data.
//!
//! Independent of the retry loop. Given the same input table and the same
//! classifier, every file this writes is byte-identical across runs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::{info, instrument};

use crate::core::classify::{Classifier, RuleClassifier};
use crate::core::summary::{RunSummary, summarize};
use crate::core::validator::validate_table;
use crate::io::config::EngineConfig;
use crate::io::executor::ProcessExecutor;
use crate::io::fs_util::write_atomic;
use crate::io::script::ScriptClassifier;
use crate::io::table_io::{read_table, write_table};
use crate::io::verified_store::VerifiedStore;

#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub data_path: PathBuf,
    pub classified_path: PathBuf,
    pub violations_path: PathBuf,
    pub summary_path: PathBuf,
    pub category_column: String,
    pub default_category: String,
    /// Empty means every numeric input column.
    pub value_columns: Vec<String>,
}

impl PipelineRequest {
    pub fn from_config(config: &EngineConfig, data_path: PathBuf) -> Self {
        Self {
            data_path,
            classified_path: config.paths.classified.clone(),
            violations_path: config.paths.violations.clone(),
            summary_path: config.paths.summary.clone(),
            category_column: config.table.category_column.clone(),
            default_category: config.table.default_category.clone(),
            value_columns: config.table.value_columns.clone(),
        }
    }
}

/// Where the production classifier comes from.
#[derive(Debug, Clone)]
pub enum ClassifierSource {
    /// The artifact promoted into a verified store slot.
    Verified { slot: String },
    /// Structured predicates from a TOML file.
    Native { rules_path: PathBuf },
}

/// Resolve the classifier once at startup.
pub fn resolve_classifier<S: VerifiedStore + ?Sized>(
    config: &EngineConfig,
    store: &S,
    source: &ClassifierSource,
) -> Result<Box<dyn Classifier>> {
    match source {
        ClassifierSource::Verified { slot } => {
            let artifact = store
                .load(slot)?
                .ok_or_else(|| anyhow!("no verified artifact in slot '{slot}' (run `engine compile` first)"))?;
            info!(
                slot = %slot,
                revision = artifact.meta.revision,
                scenario = %artifact.meta.scenario_label,
                "using verified artifact"
            );
            Ok(Box::new(ScriptClassifier {
                code: artifact.code,
                executor: ProcessExecutor {
                    interpreter: config.interpreter.clone(),
                    sentinel: config.sentinel.clone(),
                    output_limit_bytes: config.output_limit_bytes,
                },
                timeout: config.execution_timeout(),
                sentinel: config.sentinel.clone(),
            }))
        }
        ClassifierSource::Native { rules_path } => {
            Ok(Box::new(load_native_rules(rules_path)?))
        }
    }
}

pub fn load_native_rules(path: &Path) -> Result<RuleClassifier> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

/// Classify the data file and write the classified table, the violations
/// subset, and the summary.
#[instrument(skip_all, fields(data = %request.data_path.display()))]
pub fn run_pipeline<C: Classifier + ?Sized>(
    classifier: &C,
    request: &PipelineRequest,
) -> Result<RunSummary> {
    let input = read_table(&request.data_path)?;
    let classified = classifier.apply(&input).context("classify input")?;

    let check = validate_table(&classified, &request.category_column, None);
    if !check.passed {
        return Err(anyhow!("classifier output rejected: {}", check.report));
    }
    if classified.len() != input.len() {
        return Err(anyhow!(
            "classifier returned {} rows for {} input rows",
            classified.len(),
            input.len()
        ));
    }
    let category_index = classified
        .column_index(&request.category_column)
        .ok_or_else(|| anyhow!("missing '{}' column", request.category_column))?;

    let violations = classified.filter_rows(|row| {
        row.get(category_index).map(String::as_str) != Some(request.default_category.as_str())
    });

    let value_columns = if request.value_columns.is_empty() {
        input
            .numeric_columns()
            .into_iter()
            .filter(|name| name != &request.category_column)
            .collect()
    } else {
        request.value_columns.clone()
    };
    let summary = summarize(
        &classified,
        category_index,
        &request.default_category,
        &value_columns,
    );

    write_table(&request.classified_path, &classified)?;
    write_table(&request.violations_path, &violations)?;
    let mut summary_json =
        serde_json::to_string_pretty(&summary).context("serialize summary")?;
    summary_json.push('\n');
    write_atomic(&request.summary_path, summary_json.as_bytes())?;

    info!(
        total = summary.total_items,
        violations = summary.total_violations,
        rate = summary.violation_rate,
        "pipeline finished"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::classify::{CategoryRule, Comparison, Op, Operand};
    use crate::core::table::Table;

    fn rules() -> RuleClassifier {
        RuleClassifier {
            column: "Status".to_string(),
            default_category: "Normal".to_string(),
            rules: vec![CategoryRule {
                category: "Review".to_string(),
                when: vec![Comparison {
                    column: "Profit".to_string(),
                    op: Op::Lt,
                    value: Operand::Number(5.0),
                }],
                exception: None,
            }],
        }
    }

    fn request(dir: &Path) -> PipelineRequest {
        PipelineRequest {
            data_path: dir.join("data.csv"),
            classified_path: dir.join("out/classified.csv"),
            violations_path: dir.join("out/violations.csv"),
            summary_path: dir.join("out/summary.json"),
            category_column: "Status".to_string(),
            default_category: "Normal".to_string(),
            value_columns: Vec::new(),
        }
    }

    #[test]
    fn writes_classified_violations_and_summary() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("data.csv"),
            "Item,Profit\na,10\nb,2\nc,3.5\nd,8\n",
        )
        .expect("write");
        let req = request(temp.path());

        let summary = run_pipeline(&rules(), &req).expect("pipeline");
        assert_eq!(summary.total_items, 4);
        assert_eq!(summary.total_violations, 2);
        assert_eq!(summary.violation_rate, 50.0);
        assert_eq!(summary.categories["Review"].totals["Profit"], 5.5);

        let violations = read_table(&req.violations_path).expect("violations");
        assert_eq!(violations.len(), 2);
        assert!(violations.column(2).all(|status| status == "Review"));
    }

    struct DropsRows;

    impl Classifier for DropsRows {
        fn apply(&self, table: &Table) -> Result<Table> {
            let mut out = table.clone();
            let index = out.ensure_column("Status");
            out.rows.truncate(1);
            out.rows[0][index] = "Normal".to_string();
            Ok(out)
        }
    }

    #[test]
    fn rejects_classifier_that_drops_rows() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(temp.path().join("data.csv"), "Item,Profit\na,1\nb,2\n").expect("write");
        let err = run_pipeline(&DropsRows, &request(temp.path())).unwrap_err();
        assert!(err.to_string().contains("1 rows for 2 input rows"));
        assert!(!temp.path().join("out/classified.csv").exists());
    }

    #[test]
    fn native_rules_load_from_toml() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("rules.toml");
        fs::write(
            &path,
            "column = \"Status\"\ndefault_category = \"Normal\"\n\n[[rules]]\ncategory = \"Review\"\nwhen = [{ column = \"Profit\", op = \"lt\", value = 5 }]\n",
        )
        .expect("write");
        assert_eq!(load_native_rules(&path).expect("load"), rules());
    }
}
