use super::client::{parse_model_json, GeminiClient};
use super::prompts::{GradingInput, PromptTemplates};
use super::schema_utils;
use super::types::{Evaluation, PromptAnalysis, StressTest, StressTestBatch};
use crate::config::GenerationProfiles;
use crate::error::ForgeError;
use schemars::JsonSchema;
use serde_json::Value;

/// One method per kind of model call. Each builds its request from the
/// injected templates and profiles, calls the model once (with retries) and
/// parses the reply. Sequencing and degradation live in the orchestrator.
pub struct PromptAgents {
    client: GeminiClient,
    templates: PromptTemplates,
    profiles: GenerationProfiles,
}

impl PromptAgents {
    pub fn new(client: GeminiClient, templates: PromptTemplates, profiles: GenerationProfiles) -> Self {
        Self {
            client,
            templates,
            profiles,
        }
    }

    pub fn ensure_configured(&self) -> Result<(), ForgeError> {
        self.client.ensure_configured()
    }

    pub async fn analyze_prompt(&self, user_prompt: &str) -> Result<PromptAnalysis, ForgeError> {
        let prompt = self.templates.render_analysis(user_prompt);
        let text = self
            .client
            .generate(&prompt, &self.profiles.analysis, Some(schema_of::<PromptAnalysis>()?), "Analysis")
            .await?;

        parse_model_json(&text).inspect_err(|e| log::error!("Analysis parse failed: {e}"))
    }

    pub async fn generate_stress_tests(&self, target_prompt: &str) -> Result<Vec<StressTest>, ForgeError> {
        let prompt = self.templates.render_stress_tests(target_prompt);
        let text = self
            .client
            .generate(
                &prompt,
                &self.profiles.stress_tests,
                Some(schema_of::<StressTestBatch>()?),
                "Stress Tests",
            )
            .await?;

        let batch: StressTestBatch = parse_model_json(&text)?;
        Ok(batch.stress_tests)
    }

    pub async fn grade_response(&self, input: &GradingInput<'_>) -> Result<Evaluation, ForgeError> {
        let prompt = self.templates.render_evaluation(input);
        let text = self
            .client
            .generate(&prompt, &self.profiles.evaluation, Some(schema_of::<Evaluation>()?), "Evaluation")
            .await?;

        parse_model_json(&text).inspect_err(|e| log::error!("Evaluation parse failed: {e}"))
    }

    /// Asks for a workflow graph. The reply is kept as loose JSON: node
    /// parameters are open-ended, so no response schema is attached.
    pub async fn draft_workflow(&self, description: &str) -> Result<Value, ForgeError> {
        let prompt = self.templates.render_workflow(description);
        let text = self
            .client
            .generate(&prompt, &self.profiles.workflow, None, "Workflow")
            .await?;

        let draft: Value = parse_model_json(&text).map_err(|e| {
            log::error!("Workflow reply was not JSON: {text}");
            ForgeError::WorkflowSynthesisFailed(e.to_string())
        })?;

        if !draft.is_object() {
            return Err(ForgeError::WorkflowSynthesisFailed(
                "model reply is not a JSON object".into(),
            ));
        }
        Ok(draft)
    }
}

fn schema_of<T: JsonSchema>() -> Result<Value, ForgeError> {
    Ok(schema_utils::response_schema::<T>()?)
}
