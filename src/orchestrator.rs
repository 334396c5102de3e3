use crate::ai::agents::PromptAgents;
use crate::ai::client::GeminiClient;
use crate::ai::dify::{ConversationClient, ConversationReply};
use crate::ai::prompts::GradingInput;
use crate::ai::types::{Evaluation, PromptAnalysis, StressTest};
use crate::config::Config;
use crate::error::ForgeError;
use crate::workflow::graph::WorkflowGraph;
use crate::workflow::normalize::normalize_workflow;
use crate::workflow::tree::find_embedded_prompt;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub analysis: PromptAnalysis,
    pub stress_tests: Vec<StressTest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkflowReport {
    pub result: WorkflowGraph,
    pub stress_tests: Vec<StressTest>,
}

/// Entry point for every pipeline. Holds no per-request state; each call
/// runs its model calls one after another.
pub struct Workbench {
    agents: PromptAgents,
    conversation: ConversationClient,
}

impl Workbench {
    pub fn new(agents: PromptAgents, conversation: ConversationClient) -> Self {
        Self {
            agents,
            conversation,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, ForgeError> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()?;

        let client = GeminiClient::new(
            http.clone(),
            config.gemini.clone(),
            config.retry,
            config.safety.clone(),
        );
        let agents = PromptAgents::new(client, config.templates.clone(), config.generation);
        let conversation = ConversationClient::new(http, config.dify.clone());

        Ok(Self::new(agents, conversation))
    }

    pub async fn analyze(&self, prompt: &str) -> Result<AnalysisReport, ForgeError> {
        self.agents.ensure_configured()?;
        if prompt.trim().is_empty() {
            return Err(ForgeError::BadRequest(
                "Nenhum prompt foi fornecido para análise.".into(),
            ));
        }

        log::info!("🔍 Phase 1: Prompt analysis");
        let analysis = self.agents.analyze_prompt(prompt).await?;
        log::info!(
            "   -> Score {}/10 across {} sections",
            analysis.overall_score,
            analysis.sections.len()
        );

        log::info!("🧪 Phase 2: Stress tests");
        let stress_tests = self.stress_tests_or_empty(prompt).await;

        Ok(AnalysisReport {
            analysis,
            stress_tests,
        })
    }

    pub async fn evaluate(&self, input: &GradingInput<'_>) -> Result<Evaluation, ForgeError> {
        self.agents.ensure_configured()?;
        let fields = [
            input.user_prompt,
            input.tricky_question,
            input.ideal_answer,
            input.actual_answer,
        ];
        if fields.iter().any(|f| f.trim().is_empty()) {
            return Err(ForgeError::BadRequest("Dados incompletos para avaliação.".into()));
        }

        let evaluation = self.agents.grade_response(input).await?;
        log::info!("⚖️  Evaluation score: {}/10", evaluation.score);
        Ok(evaluation)
    }

    /// Sends one user turn to the conversational agent. `user_prompt` is
    /// only validated: the agent is configured with its persona out of band.
    pub async fn simulate(
        &self,
        user_prompt: &str,
        message: &str,
        conversation_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ConversationReply, ForgeError> {
        self.conversation.ensure_configured()?;
        if user_prompt.trim().is_empty() || message.trim().is_empty() {
            return Err(ForgeError::BadRequest(
                "Prompt do usuário e/ou mensagem não fornecidos.".into(),
            ));
        }

        log::info!("💬 Simulating conversation turn");
        self.conversation.send(message, conversation_id, user_id).await
    }

    pub async fn synthesize(&self, description: &str) -> Result<WorkflowReport, ForgeError> {
        self.agents.ensure_configured()?;
        if description.trim().is_empty() {
            return Err(ForgeError::BadRequest(
                "Nenhuma descrição de automação foi fornecida.".into(),
            ));
        }

        log::info!("🏗️  Phase 1: Workflow generation");
        let draft = self.agents.draft_workflow(description).await?;

        log::info!("🏗️  Phase 2: Normalization");
        let normalized = normalize_workflow(&draft);
        log::info!(
            "   -> {} nodes, {} repairs",
            normalized.graph.nodes.len(),
            normalized.repairs.len()
        );
        for repair in &normalized.repairs {
            log::debug!("      🔧 {repair}");
        }

        // Branch fields are gone after normalization, so search the draft.
        log::info!("🏗️  Phase 3: Prompt extraction");
        let stress_tests = match find_embedded_prompt(&draft) {
            Some(embedded) => {
                log::info!("   -> Found embedded prompt ({} chars)", embedded.len());
                self.stress_tests_or_empty(&embedded).await
            }
            None => {
                log::info!("   -> No embedded prompt; skipping stress tests");
                Vec::new()
            }
        };

        Ok(WorkflowReport {
            result: normalized.graph,
            stress_tests,
        })
    }

    /// Stress tests enrich a result that already succeeded, so failures here
    /// are logged and swallowed.
    async fn stress_tests_or_empty(&self, target_prompt: &str) -> Vec<StressTest> {
        match self.agents.generate_stress_tests(target_prompt).await {
            Ok(tests) => {
                log::info!("   -> Generated {} stress tests", tests.len());
                tests
            }
            Err(e) => {
                log::warn!("⚠️  Stress test generation failed, continuing without: {e}");
                Vec::new()
            }
        }
    }
}
