use crate::ai::dify::ConversationReply;
use crate::ai::prompts::GradingInput;
use crate::ai::types::{Evaluation, PromptAnalysis};
use crate::error::ForgeError;
use crate::orchestrator::{AnalysisReport, Workbench, WorkflowReport};
use crate::runner::{ConversationTurn, LogObserver, StressTestRunner};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

const QUOTA_DOCS: &str =
    "Para mais informações sobre limites da API Gemini, visite: https://ai.google.dev/gemini-api/docs/rate-limits";
const RETRY_AFTER_SECS: u64 = 60;

pub fn router(workbench: Arc<Workbench>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/analyze", post(analyze))
        .route("/api/dify/conversation", post(conversation))
        .route("/api/evaluate-response", post(evaluate))
        .route("/api/n8n", post(synthesize))
        .route("/api/qa-run", post(qa_run))
        .layer(middleware::from_fn(log_requests))
        .with_state(workbench)
}

async fn log_requests(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let uri = request.uri().path().to_owned();
    let started = Instant::now();

    log::info!("[{request_id}] {method} {uri}");
    let response = next.run(request).await;
    log::info!(
        "[{request_id}] {} in {}ms",
        response.status(),
        started.elapsed().as_millis()
    );
    response
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "service": "prompt-forge" }))
}

/// Missing or malformed bodies fall through as empty requests so the
/// workbench reports them with the endpoint's own validation message.
fn body_or_default<T: Default>(payload: Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            log::warn!("Unreadable request body: {rejection}");
            T::default()
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct PromptRequest {
    #[serde(default)]
    prompt: Option<String>,
}

async fn analyze(
    State(workbench): State<Arc<Workbench>>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<AnalysisReport>, ForgeError> {
    let req = body_or_default(payload);
    let report = workbench.analyze(req.prompt.as_deref().unwrap_or_default()).await?;
    Ok(Json(report))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConversationRequest {
    #[serde(default)]
    user_prompt: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "conversation_id")]
    conversation_id: Option<String>,
    #[serde(default, rename = "user_id")]
    user_id: Option<String>,
}

async fn conversation(
    State(workbench): State<Arc<Workbench>>,
    payload: Result<Json<ConversationRequest>, JsonRejection>,
) -> Result<Json<ConversationReply>, ForgeError> {
    let req = body_or_default(payload);
    let reply = workbench
        .simulate(
            req.user_prompt.as_deref().unwrap_or_default(),
            req.message.as_deref().unwrap_or_default(),
            req.conversation_id.as_deref(),
            req.user_id.as_deref(),
        )
        .await?;
    Ok(Json(reply))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateRequest {
    #[serde(default)]
    user_prompt: Option<String>,
    #[serde(default)]
    pergunta_capciosa: Option<String>,
    #[serde(default)]
    resposta_ideal: Option<String>,
    #[serde(default)]
    ai_response: Option<String>,
}

async fn evaluate(
    State(workbench): State<Arc<Workbench>>,
    payload: Result<Json<EvaluateRequest>, JsonRejection>,
) -> Result<Json<Evaluation>, ForgeError> {
    let req = body_or_default(payload);
    let input = GradingInput {
        user_prompt: req.user_prompt.as_deref().unwrap_or_default(),
        tricky_question: req.pergunta_capciosa.as_deref().unwrap_or_default(),
        ideal_answer: req.resposta_ideal.as_deref().unwrap_or_default(),
        actual_answer: req.ai_response.as_deref().unwrap_or_default(),
    };
    Ok(Json(workbench.evaluate(&input).await?))
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowRequest {
    #[serde(default)]
    query: Option<String>,
}

async fn synthesize(
    State(workbench): State<Arc<Workbench>>,
    payload: Result<Json<WorkflowRequest>, JsonRejection>,
) -> Result<Json<WorkflowReport>, ForgeError> {
    let req = body_or_default(payload);
    let report = workbench.synthesize(req.query.as_deref().unwrap_or_default()).await?;
    Ok(Json(report))
}

#[derive(Debug, Serialize)]
struct QaRunReport {
    analysis: PromptAnalysis,
    turns: Vec<ConversationTurn>,
}

/// Analyzes the prompt, then plays every generated stress test against the
/// conversational agent.
async fn qa_run(
    State(workbench): State<Arc<Workbench>>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<QaRunReport>, ForgeError> {
    let req = body_or_default(payload);
    let prompt = req.prompt.as_deref().unwrap_or_default();

    let report = workbench.analyze(prompt).await?;
    let turns = StressTestRunner::new(&workbench)
        .run(prompt, report.stress_tests, &mut LogObserver)
        .await;

    Ok(Json(QaRunReport {
        analysis: report.analysis,
        turns,
    }))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    retry_after: Option<u64>,
}

impl ErrorBody {
    fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
            retry_after: None,
        }
    }
}

impl IntoResponse for ForgeError {
    fn into_response(self) -> Response {
        let mut body = ErrorBody::new(self.user_message());
        let status = match &self {
            ForgeError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ForgeError::Upstream { status, .. } => StatusCode::from_u16(*status)
                .ok()
                .filter(|s| s.is_client_error() || s.is_server_error())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            ForgeError::RateLimited { .. } => {
                body.retry_after = Some(RETRY_AFTER_SECS);
                StatusCode::TOO_MANY_REQUESTS
            }
            ForgeError::QuotaExceeded(_) => {
                body.details = Some(QUOTA_DOCS.into());
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            log::error!("❌ {self}");
        } else {
            log::warn!("⚠️  {self}");
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::prompts::WORKFLOW_INPUT_MARKER;
    use crate::config::Config;
    use crate::orchestrator::tests::{candidate, mount_stage, workbench_for};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn unconfigured_app() -> Router {
        let config = Config::from_lookup(|_| None).unwrap();
        router(Arc::new(Workbench::from_config(&config).unwrap()))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn error_json(err: ForgeError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let response = unconfigured_app()
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn missing_key_is_500_with_message() {
        let (status, body) = post_json(unconfigured_app(), "/api/analyze", json!({ "prompt": "p" })).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "A chave de API do Google AI não foi configurada no servidor.");

        let (status, body) = post_json(
            unconfigured_app(),
            "/api/dify/conversation",
            json!({ "userPrompt": "p", "message": "m" }),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "A chave de API do Dify não foi configurada no servidor.");
    }

    #[tokio::test]
    async fn missing_fields_are_400() {
        let gemini = MockServer::start().await;
        let dify = MockServer::start().await;
        let app = router(Arc::new(workbench_for(&gemini, Some(&dify))));

        let (status, body) = post_json(app.clone(), "/api/analyze", json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Nenhum prompt foi fornecido para análise.");

        let (status, body) = post_json(app.clone(), "/api/n8n", json!({ "query": "" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Nenhuma descrição de automação foi fornecida.");

        let (status, body) = post_json(
            app.clone(),
            "/api/evaluate-response",
            json!({ "userPrompt": "p", "perguntaCapciosa": "q", "respostaIdeal": "r" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Dados incompletos para avaliação.");

        let (status, body) = post_json(app, "/api/dify/conversation", json!({ "message": "m" })).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Prompt do usuário e/ou mensagem não fornecidos.");
    }

    #[tokio::test]
    async fn malformed_body_is_reported_as_missing_input() {
        let gemini = MockServer::start().await;
        let app = router(Arc::new(workbench_for(&gemini, None)));
        let request = Request::builder()
            .method("POST")
            .uri("/api/analyze")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn dify_status_is_passed_through_with_details() {
        let gemini = MockServer::start().await;
        let dify = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("app not found"))
            .mount(&dify)
            .await;
        let app = router(Arc::new(workbench_for(&gemini, Some(&dify))));

        let (status, body) = post_json(
            app,
            "/api/dify/conversation",
            json!({ "userPrompt": "p", "message": "m", "conversation_id": "c-1" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(
            body["error"],
            "Falha na comunicação com a API do Dify. Status: 404. Detalhes: app not found"
        );
    }

    #[tokio::test]
    async fn n8n_returns_normalized_graph() {
        let gemini = MockServer::start().await;
        mount_stage(
            &gemini,
            WORKFLOW_INPUT_MARKER,
            candidate(json!({
                "name": "Fluxo",
                "nodes": [{ "name": "Webhook", "type": "n8n-nodes-base.webhook", "typeVersion": "abc" }],
                "connections": { "Nada": { "main": [[]] } }
            })),
        )
        .await;
        let app = router(Arc::new(workbench_for(&gemini, None)));

        let (status, body) = post_json(app, "/api/n8n", json!({ "query": "Receber pedidos" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"]["nodes"][0]["typeVersion"], 1);
        assert_eq!(body["result"]["connections"], json!({}));
        assert_eq!(body["stress_tests"], json!([]));
    }

    #[tokio::test]
    async fn throttling_errors_carry_hints() {
        let (status, body) = error_json(ForgeError::RateLimited { attempts: 6 }).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(body["retryAfter"], 60);
        assert!(body.get("details").is_none());

        let (status, body) = error_json(ForgeError::QuotaExceeded("PerDay".into())).await;
        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        assert!(body["details"].as_str().unwrap().contains("rate-limits"));
    }

    #[tokio::test]
    async fn non_error_upstream_status_becomes_500() {
        let (status, body) = error_json(ForgeError::Upstream {
            service: "Google AI",
            status: 302,
            body: String::new(),
        })
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Falha na comunicação com a API do Google AI. Status: 302");
    }

    #[tokio::test]
    async fn malformed_model_output_has_json_message() {
        let (status, body) = error_json(ForgeError::MalformedJson("eof".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "A resposta da IA não estava em um formato JSON válido.");
    }
}
