use super::retry::{send_with_retry, Reply, RetryPolicy};
use crate::config::{GeminiSettings, GenerationProfile, SafetyPolicy};
use crate::error::ForgeError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

pub const SERVICE_NAME: &str = "Google AI";

pub struct GeminiClient {
    http: reqwest::Client,
    settings: GeminiSettings,
    retry: RetryPolicy,
    safety: SafetyPolicy,
}

impl GeminiClient {
    pub fn new(
        http: reqwest::Client,
        settings: GeminiSettings,
        retry: RetryPolicy,
        safety: SafetyPolicy,
    ) -> Self {
        Self {
            http,
            settings,
            retry,
            safety,
        }
    }

    pub fn ensure_configured(&self) -> Result<(), ForgeError> {
        self.settings.api_key.require(SERVICE_NAME).map(|_| ())
    }

    /// Sends one prompt and returns the text of the first candidate's first part.
    pub async fn generate(
        &self,
        prompt: &str,
        profile: &GenerationProfile,
        response_schema: Option<Value>,
        stage_name: &str,
    ) -> Result<String, ForgeError> {
        let api_key = self.settings.api_key.require(SERVICE_NAME)?;
        let url = format!(
            "{}/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model
        );
        let payload = self.build_payload(prompt, profile, response_schema);

        log::debug!("📤 [{stage_name}] {} prompt chars", prompt.len());

        let reply = send_with_retry(&self.retry, stage_name, || {
            let request = self
                .http
                .post(&url)
                .query(&[("key", api_key)])
                .json(&payload);
            async move {
                let res = request.send().await?;
                let status = res.status();
                let body = res.text().await?;
                Ok::<_, ForgeError>(Reply { status, body })
            }
        })
        .await?;

        if !reply.is_success() {
            log::error!("[{stage_name}] API Error {}: {}", reply.status, reply.body);
            return Err(ForgeError::Upstream {
                service: SERVICE_NAME,
                status: reply.status.as_u16(),
                body: reply.body,
            });
        }

        let body: Value = serde_json::from_str(&reply.body).map_err(|e| {
            log::error!("[{stage_name}] reply body is not JSON: {e}");
            ForgeError::MalformedJson(e.to_string())
        })?;
        let text = body["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ForgeError::EmptyResponse(SERVICE_NAME))?;

        log::info!("📥 [{stage_name}] received {} chars", text.len());
        Ok(text.to_string())
    }

    pub fn build_payload(
        &self,
        prompt: &str,
        profile: &GenerationProfile,
        response_schema: Option<Value>,
    ) -> Value {
        let safety_settings: Vec<Value> = self
            .safety
            .categories
            .iter()
            .map(|category| json!({ "category": category, "threshold": self.safety.threshold }))
            .collect();

        let mut payload = json!({
            "contents": [{
                "parts": [{ "text": prompt }]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "temperature": profile.temperature,
                "topK": profile.top_k,
                "topP": profile.top_p,
                "maxOutputTokens": profile.max_output_tokens,
                "stopSequences": []
            },
            "safetySettings": safety_settings
        });

        if let Some(schema) = response_schema {
            payload["generationConfig"]["responseSchema"] = schema;
        }

        payload
    }
}

/// Strips a surrounding Markdown code fence, if any.
pub fn clean_json_block(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(after_open) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json", "JSON", ...) on the opening line.
    let body = after_open
        .split_once('\n')
        .map(|(_, rest)| rest)
        .unwrap_or(after_open);
    body.trim_end().trim_end_matches("```").trim()
}

/// Parses model text as JSON, tolerating code fences and chatter around
/// the outermost object.
pub fn parse_model_json<T: DeserializeOwned>(text: &str) -> Result<T, ForgeError> {
    let cleaned = clean_json_block(text);

    let first_error = match serde_json::from_str(cleaned) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    if let (Some(start), Some(end)) = (cleaned.find('{'), cleaned.rfind('}')) {
        if end > start {
            if let Ok(parsed) = serde_json::from_str(&cleaned[start..=end]) {
                log::debug!("Recovered JSON object from surrounding text");
                return Ok(parsed);
            }
        }
    }

    Err(ForgeError::MalformedJson(first_error.to_string()))
}
