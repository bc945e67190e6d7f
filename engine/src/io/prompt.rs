//! Prompt rendering for the code generator.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::Feedback;
use crate::io::generator::GenerationRequest;

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const GENERATE_TEMPLATE: &str = include_str!("prompts/generate.md");
const REPAIR_TEMPLATE: &str = include_str!("prompts/repair.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("generate", GENERATE_TEMPLATE)
            .expect("generate template should be valid");
        env.add_template("repair", REPAIR_TEMPLATE)
            .expect("repair template should be valid");
        Self { env }
    }

    pub fn system(&self) -> &'static str {
        SYSTEM_TEMPLATE.trim()
    }

    pub fn render_generate(&self, request: &GenerationRequest) -> Result<String> {
        let template = self.env.get_template("generate")?;
        let rendered = template.render(context! {
            schema => request.schema_text.trim(),
            rules => request.rules_json.trim(),
            category_column => request.category_column.as_str(),
            default_category => request.default_category.as_str(),
            input_path => request.input_path.display().to_string(),
            output_path => request.output_path.display().to_string(),
            sentinel => request.sentinel.as_str(),
        })?;
        Ok(rendered)
    }

    pub fn render_repair(
        &self,
        request: &GenerationRequest,
        prior_code: &str,
        feedback: &Feedback,
    ) -> Result<String> {
        let template = self.env.get_template("repair")?;
        let rendered = template.render(context! {
            feedback => feedback.text.trim(),
            crashed => feedback.kind.is_crash(),
            prior_code => prior_code.trim(),
            schema => request.schema_text.trim(),
            rules => request.rules_json.trim(),
            category_column => request.category_column.as_str(),
            default_category => request.default_category.as_str(),
            input_path => request.input_path.display().to_string(),
            output_path => request.output_path.display().to_string(),
            sentinel => request.sentinel.as_str(),
        })?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::core::types::FailureKind;

    fn request() -> GenerationRequest {
        GenerationRequest {
            schema_text: "DATA SCHEMA:\n- Columns: [Price]".to_string(),
            rules_json: "{\"rules\": []}".to_string(),
            input_path: PathBuf::from("data/in.csv"),
            output_path: PathBuf::from("work/out.csv"),
            category_column: "Status".to_string(),
            default_category: "Normal".to_string(),
            sentinel: "PROCESS_COMPLETE".to_string(),
        }
    }

    #[test]
    fn generate_prompt_states_the_execution_contract() {
        let text = PromptEngine::new()
            .render_generate(&request())
            .expect("render");
        assert!(text.contains("DATA SCHEMA:"));
        assert!(text.contains("sys.argv[1]"));
        assert!(text.contains("sys.argv[2]"));
        assert!(text.contains("'Status' and sets it to 'Normal'"));
        assert!(text.contains("Print `PROCESS_COMPLETE` as the LAST line"));
        assert!(text.contains("data/in.csv"));
    }

    #[test]
    fn repair_prompt_distinguishes_crash_from_wrong_output() {
        let engine = PromptEngine::new();
        let crash = Feedback {
            kind: FailureKind::ExecutionFailed,
            text: "CODE CRASHED: KeyError".to_string(),
        };
        let wrong = Feedback {
            kind: FailureKind::DistributionMismatch,
            text: "CODE RAN BUT PRODUCED WRONG OUTPUT".to_string(),
        };

        let crashed = engine
            .render_repair(&request(), "print(1)", &crash)
            .expect("render");
        assert!(crashed.contains("KeyError"));
        assert!(crashed.contains("print(1)"));
        assert!(crashed.contains("did not finish"));

        let mismatched = engine
            .render_repair(&request(), "print(1)", &wrong)
            .expect("render");
        assert!(mismatched.contains("output was wrong"));
        assert!(!mismatched.contains("did not finish"));
    }
}
