use crate::config::DifySettings;
use crate::error::ForgeError;
use serde::Serialize;
use serde_json::{json, Value};

pub const SERVICE_NAME: &str = "Dify";
pub const DEFAULT_USER_ID: &str = "default_user";

/// Answer from the conversational agent plus the session to continue with.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationReply {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
}

/// Client for the agent's blocking chat endpoint. The agent is expected to
/// carry its persona and rules already; only the user turn is sent.
pub struct ConversationClient {
    http: reqwest::Client,
    settings: DifySettings,
}

impl ConversationClient {
    pub fn new(http: reqwest::Client, settings: DifySettings) -> Self {
        Self { http, settings }
    }

    pub fn ensure_configured(&self) -> Result<(), ForgeError> {
        self.settings.api_key.require(SERVICE_NAME).map(|_| ())
    }

    pub async fn send(
        &self,
        message: &str,
        conversation_id: Option<&str>,
        user_id: Option<&str>,
    ) -> Result<ConversationReply, ForgeError> {
        let api_key = self.settings.api_key.require(SERVICE_NAME)?;
        let url = format!("{}/chat-messages", self.settings.base_url.trim_end_matches('/'));

        let mut payload = json!({
            "inputs": {},
            "query": message,
            "response_mode": "blocking",
            "user": user_id.filter(|u| !u.is_empty()).unwrap_or(DEFAULT_USER_ID)
        });
        if let Some(id) = conversation_id.filter(|id| !id.is_empty()) {
            payload["conversation_id"] = json!(id);
        }

        let res = self
            .http
            .post(&url)
            .bearer_auth(api_key)
            .json(&payload)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            log::error!("{SERVICE_NAME} API Error {status}: {body}");
            return Err(ForgeError::Upstream {
                service: SERVICE_NAME,
                status: status.as_u16(),
                body,
            });
        }

        let body: Value = res.json().await?;
        let response = body["answer"]
            .as_str()
            .filter(|a| !a.is_empty())
            .ok_or(ForgeError::EmptyResponse(SERVICE_NAME))?
            .to_string();
        let conversation_id = body["conversation_id"].as_str().map(String::from);

        Ok(ConversationReply {
            response,
            conversation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Credential;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ConversationClient {
        ConversationClient::new(
            reqwest::Client::new(),
            DifySettings {
                api_key: Credential::new(Some("dify-key".into())),
                base_url: server.uri(),
            },
        )
    }

    #[tokio::test]
    async fn sends_blocking_query_with_default_user() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat-messages"))
            .and(header("authorization", "Bearer dify-key"))
            .and(body_partial_json(json!({
                "query": "Vocês vendem sushi?",
                "response_mode": "blocking",
                "user": "default_user",
                "inputs": {}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "answer": "Só pizzas!",
                "conversation_id": "conv-1"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server).send("Vocês vendem sushi?", None, None).await.unwrap();
        assert_eq!(reply.response, "Só pizzas!");
        assert_eq!(reply.conversation_id.as_deref(), Some("conv-1"));
    }

    #[tokio::test]
    async fn continues_existing_conversation() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "conversation_id": "conv-9", "user": "ana" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "answer": "ok" })))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client_for(&server)
            .send("oi", Some("conv-9"), Some("ana"))
            .await
            .unwrap();
        assert_eq!(reply.conversation_id, None);
    }

    #[tokio::test]
    async fn error_status_carries_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(404).set_body_string("app not found"))
            .mount(&server)
            .await;

        let err = client_for(&server).send("oi", None, None).await.unwrap_err();
        assert!(matches!(
            err,
            ForgeError::Upstream { service: SERVICE_NAME, status: 404, ref body } if body == "app not found"
        ));
    }

    #[tokio::test]
    async fn missing_answer_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "conversation_id": "c" })))
            .mount(&server)
            .await;

        let err = client_for(&server).send("oi", None, None).await.unwrap_err();
        assert!(matches!(err, ForgeError::EmptyResponse(SERVICE_NAME)));
    }
}
