use crate::ai::prompts::PromptTemplates;
use crate::ai::retry::RetryPolicy;
use crate::error::ForgeError;
use serde::Serialize;
use std::net::SocketAddr;
use std::time::Duration;

/// Value shipped in `.env.example`; treated exactly like a missing key.
pub const PLACEHOLDER_KEY: &str = "SUA_CHAVE_API_AQUI";

const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_DIFY_BASE_URL: &str = "https://api.dify.ai/v1";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";

/// An API key that may be absent. Checked on every call, never at boot.
#[derive(Debug, Clone, Default)]
pub struct Credential(Option<String>);

impl Credential {
    pub fn new(raw: Option<String>) -> Self {
        Self(raw)
    }

    pub fn require(&self, service: &'static str) -> Result<&str, ForgeError> {
        match self.0.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() && key != PLACEHOLDER_KEY => Ok(key),
            _ => Err(ForgeError::Unconfigured(service)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Credential,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct DifySettings {
    pub api_key: Credential,
    pub base_url: String,
}

/// Sampling parameters for one kind of model call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationProfile {
    pub temperature: f64,
    pub top_k: u32,
    pub top_p: f64,
    pub max_output_tokens: u32,
}

impl GenerationProfile {
    const fn new(temperature: f64, max_output_tokens: u32) -> Self {
        Self {
            temperature,
            top_k: 32,
            top_p: 1.0,
            max_output_tokens,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationProfiles {
    pub analysis: GenerationProfile,
    pub stress_tests: GenerationProfile,
    pub evaluation: GenerationProfile,
    pub workflow: GenerationProfile,
}

impl Default for GenerationProfiles {
    fn default() -> Self {
        Self {
            analysis: GenerationProfile::new(0.4, 4096),
            stress_tests: GenerationProfile::new(0.4, 8192),
            evaluation: GenerationProfile::new(0.2, 500),
            workflow: GenerationProfile::new(0.1, 8192),
        }
    }
}

/// Content filter applied to every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyPolicy {
    pub threshold: String,
    pub categories: Vec<String>,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            threshold: "BLOCK_MEDIUM_AND_ABOVE".into(),
            categories: [
                "HARM_CATEGORY_HARASSMENT",
                "HARM_CATEGORY_HATE_SPEECH",
                "HARM_CATEGORY_SEXUALLY_EXPLICIT",
                "HARM_CATEGORY_DANGEROUS_CONTENT",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub http_timeout: Duration,
    pub gemini: GeminiSettings,
    pub dify: DifySettings,
    pub retry: RetryPolicy,
    pub generation: GenerationProfiles,
    pub safety: SafetyPolicy,
    pub templates: PromptTemplates,
}

impl Config {
    pub fn from_env() -> Result<Self, ForgeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup so tests do not
    /// have to touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ForgeError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bind_raw = lookup("BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.into());
        let bind_addr = bind_raw
            .parse()
            .map_err(|e| ForgeError::InvalidConfig(format!("BIND_ADDR '{bind_raw}': {e}")))?;

        let http_timeout = Duration::from_secs(parse_number(&lookup, "HTTP_TIMEOUT_SECS", 60)?);

        let mut retry = RetryPolicy::default();
        retry.max_attempts = parse_number(&lookup, "RETRY_MAX_ATTEMPTS", retry.max_attempts)?;
        if retry.max_attempts == 0 {
            return Err(ForgeError::InvalidConfig(
                "RETRY_MAX_ATTEMPTS must be at least 1".into(),
            ));
        }

        Ok(Self {
            bind_addr,
            http_timeout,
            gemini: GeminiSettings {
                api_key: Credential::new(lookup("GOOGLE_API_KEY")),
                base_url: lookup("GEMINI_BASE_URL").unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.into()),
                model: lookup("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
            },
            dify: DifySettings {
                api_key: Credential::new(lookup("DIFY_API_KEY")),
                base_url: lookup("DIFY_BASE_URL").unwrap_or_else(|| DEFAULT_DIFY_BASE_URL.into()),
            },
            retry,
            generation: GenerationProfiles::default(),
            safety: SafetyPolicy::default(),
            templates: PromptTemplates::default(),
        })
    }
}

fn parse_number<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ForgeError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| ForgeError::InvalidConfig(format!("{key} '{raw}': {e}"))),
        None => Ok(default),
    }
}
