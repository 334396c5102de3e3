use crate::ai::prompts::GradingInput;
use crate::ai::types::{Evaluation, StressTest};
use crate::orchestrator::Workbench;
use serde::Serialize;
use std::collections::VecDeque;

const EVALUATION_FAILED_FEEDBACK: &str = "Erro ao avaliar a resposta.";

/// One stress test played against the conversational agent.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    #[serde(flatten)]
    pub test: StressTest,
    pub ai_response: String,
    pub is_loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<Evaluation>,
}

impl ConversationTurn {
    fn pending(test: StressTest) -> Self {
        Self {
            test,
            ai_response: String::new(),
            is_loading: true,
            error: None,
            evaluation: None,
        }
    }
}

/// Progress callbacks, fired once before and once after each turn.
pub trait TurnObserver {
    fn turn_started(&mut self, _index: usize, _turn: &ConversationTurn) {}
    fn turn_finished(&mut self, _index: usize, _turn: &ConversationTurn) {}
}

pub struct LogObserver;

impl TurnObserver for LogObserver {
    fn turn_started(&mut self, index: usize, turn: &ConversationTurn) {
        log::info!("   ▶️  Turn #{}: {}", index + 1, turn.test.question);
    }

    fn turn_finished(&mut self, index: usize, turn: &ConversationTurn) {
        match (&turn.error, &turn.evaluation) {
            (Some(e), _) => log::warn!("      ❌ Turn #{} failed: {e}", index + 1),
            (None, Some(eval)) => log::info!("      ✅ Turn #{} scored {}/10", index + 1, eval.score),
            (None, None) => log::info!("      Turn #{} finished", index + 1),
        }
    }
}

/// Plays stress tests against the agent strictly one at a time, so a batch
/// never issues concurrent calls against rate-limited services.
pub struct StressTestRunner<'a> {
    workbench: &'a Workbench,
}

impl<'a> StressTestRunner<'a> {
    pub fn new(workbench: &'a Workbench) -> Self {
        Self { workbench }
    }

    pub async fn run(
        &self,
        user_prompt: &str,
        tests: Vec<StressTest>,
        observer: &mut (dyn TurnObserver + Send),
    ) -> Vec<ConversationTurn> {
        let mut queue: VecDeque<StressTest> = tests.into();
        let mut turns = Vec::with_capacity(queue.len());

        while let Some(test) = queue.pop_front() {
            let index = turns.len();
            let mut turn = ConversationTurn::pending(test);
            observer.turn_started(index, &turn);

            self.play(user_prompt, &mut turn).await;
            turn.is_loading = false;

            observer.turn_finished(index, &turn);
            turns.push(turn);
        }

        turns
    }

    /// Each turn opens a fresh conversation.
    async fn play(&self, user_prompt: &str, turn: &mut ConversationTurn) {
        let reply = match self
            .workbench
            .simulate(user_prompt, &turn.test.question, None, None)
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("Simulation failed: {e}");
                turn.error = Some(e.user_message());
                return;
            }
        };
        turn.ai_response = reply.response;

        let input = GradingInput {
            user_prompt,
            tricky_question: &turn.test.question,
            ideal_answer: &turn.test.ideal_answer,
            actual_answer: &turn.ai_response,
        };
        let evaluation = match self.workbench.evaluate(&input).await {
            Ok(evaluation) => evaluation,
            Err(e) => {
                log::error!("Evaluation failed: {e}");
                Evaluation {
                    score: 0,
                    feedback: EVALUATION_FAILED_FEEDBACK.into(),
                }
            }
        };
        turn.evaluation = Some(evaluation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::tests::{candidate, workbench_for, GENERATE_PATH};
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[derive(Default)]
    struct Recorder {
        events: Vec<(String, usize, bool)>,
    }

    impl TurnObserver for Recorder {
        fn turn_started(&mut self, index: usize, turn: &ConversationTurn) {
            self.events.push(("start".into(), index, turn.is_loading));
        }

        fn turn_finished(&mut self, index: usize, turn: &ConversationTurn) {
            self.events.push(("finish".into(), index, turn.is_loading));
        }
    }

    fn tests() -> Vec<StressTest> {
        vec![
            StressTest {
                question: "Vende sushi?".into(),
                ideal_answer: "Só pizzas.".into(),
            },
            StressTest {
                question: "Conta uma piada?".into(),
                ideal_answer: "Prefiro falar de pizza.".into(),
            },
        ]
    }

    async fn mount_agent(dify: &MockServer, question: &str, answer: &str) {
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(body_string_contains(question))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": answer })))
            .mount(dify)
            .await;
    }

    #[tokio::test]
    async fn runs_turns_in_order_and_notifies_observer() {
        let gemini = MockServer::start().await;
        let dify = MockServer::start().await;
        mount_agent(&dify, "Vende sushi?", "Só pizzas!").await;
        mount_agent(&dify, "Conta uma piada?", "Só sei de pizza.").await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(candidate(json!({ "score": 9, "feedback": "Ótimo." })))
            .expect(2)
            .mount(&gemini)
            .await;

        let workbench = workbench_for(&gemini, Some(&dify));
        let mut recorder = Recorder::default();
        let turns = StressTestRunner::new(&workbench)
            .run("Bot de pizzaria", tests(), &mut recorder)
            .await;

        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].ai_response, "Só pizzas!");
        assert_eq!(turns[1].ai_response, "Só sei de pizza.");
        assert!(turns.iter().all(|t| !t.is_loading && t.error.is_none()));
        assert_eq!(turns[1].evaluation.as_ref().map(|e| e.score), Some(9));

        assert_eq!(
            recorder.events,
            vec![
                ("start".to_string(), 0, true),
                ("finish".to_string(), 0, false),
                ("start".to_string(), 1, true),
                ("finish".to_string(), 1, false),
            ]
        );
    }

    #[tokio::test]
    async fn evaluation_failure_scores_zero() {
        let gemini = MockServer::start().await;
        let dify = MockServer::start().await;
        mount_agent(&dify, "Vende sushi?", "Sim, vendemos!").await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(ResponseTemplate::new(500))
            .mount(&gemini)
            .await;

        let workbench = workbench_for(&gemini, Some(&dify));
        let turns = StressTestRunner::new(&workbench)
            .run("Bot de pizzaria", tests()[..1].to_vec(), &mut LogObserver)
            .await;

        let evaluation = turns[0].evaluation.as_ref().unwrap();
        assert_eq!(evaluation.score, 0);
        assert_eq!(evaluation.feedback, EVALUATION_FAILED_FEEDBACK);
        assert!(turns[0].error.is_none());
    }

    #[tokio::test]
    async fn simulation_failure_records_error_and_continues() {
        let gemini = MockServer::start().await;
        let dify = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_string_contains("Vende sushi?"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&dify)
            .await;
        mount_agent(&dify, "Conta uma piada?", "Só sei de pizza.").await;
        Mock::given(method("POST"))
            .and(path(GENERATE_PATH))
            .respond_with(candidate(json!({ "score": 8, "feedback": "Bom." })))
            .expect(1)
            .mount(&gemini)
            .await;

        let workbench = workbench_for(&gemini, Some(&dify));
        let turns = StressTestRunner::new(&workbench)
            .run("Bot de pizzaria", tests(), &mut LogObserver)
            .await;

        assert_eq!(
            turns[0].error.as_deref(),
            Some("Falha na comunicação com a API do Dify. Status: 502. Detalhes: bad gateway")
        );
        assert!(turns[0].evaluation.is_none());
        assert!(!turns[0].is_loading);
        assert_eq!(turns[1].evaluation.as_ref().map(|e| e.score), Some(8));
    }

    #[tokio::test]
    async fn missing_agent_key_is_reported_in_portuguese() {
        let gemini = MockServer::start().await;
        let workbench = workbench_for(&gemini, None);
        let turns = StressTestRunner::new(&workbench)
            .run("Bot de pizzaria", tests(), &mut LogObserver)
            .await;

        assert_eq!(turns.len(), 2);
        for turn in &turns {
            assert_eq!(
                turn.error.as_deref(),
                Some("A chave de API do Dify não foi configurada no servidor.")
            );
            assert!(turn.evaluation.is_none());
        }
    }

    #[test]
    fn turn_serializes_with_wire_names() {
        let mut turn = ConversationTurn::pending(tests().remove(0));
        turn.is_loading = false;
        turn.ai_response = "Só pizzas!".into();

        let value = serde_json::to_value(&turn).unwrap();
        assert_eq!(value["pergunta_capciosa"], "Vende sushi?");
        assert_eq!(value["resposta_ideal"], "Só pizzas.");
        assert_eq!(value["aiResponse"], "Só pizzas!");
        assert_eq!(value["isLoading"], false);
        assert!(value.get("error").is_none());
    }
}
