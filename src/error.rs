use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForgeError {
    #[error("{0} API key is not configured")]
    Unconfigured(&'static str),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{service} returned HTTP {status}: {body}")]
    Upstream {
        service: &'static str,
        status: u16,
        body: String,
    },

    #[error("Rate limit exceeded after {attempts} attempts")]
    RateLimited { attempts: u32 },

    #[error("Quota exhausted: {0}")]
    QuotaExceeded(String),

    #[error("{0} returned no usable text")]
    EmptyResponse(&'static str),

    #[error("Malformed model JSON: {0}")]
    MalformedJson(String),

    #[error("Workflow synthesis failed: {0}")]
    WorkflowSynthesisFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("API Error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON Error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ForgeError {
    /// Message shown to the person using the workbench, in pt-BR.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unconfigured(service) => {
                format!("A chave de API do {service} não foi configurada no servidor.")
            }
            Self::BadRequest(message) => message.clone(),
            Self::Upstream {
                service,
                status,
                body,
            } => {
                let mut message = format!("Falha na comunicação com a API do {service}. Status: {status}");
                if *service == crate::ai::dify::SERVICE_NAME {
                    message.push_str(&format!(". Detalhes: {body}"));
                }
                message
            }
            Self::RateLimited { .. } => {
                "Muitas solicitações em pouco tempo. Aguarde alguns minutos antes de tentar novamente.".into()
            }
            Self::QuotaExceeded(_) => {
                "Limite de uso da API atingido. Aguarde até amanhã ou considere fazer upgrade para um plano pago."
                    .into()
            }
            Self::EmptyResponse(service) => {
                format!("Não foi possível obter uma resposta da IA do {service}.")
            }
            Self::MalformedJson(_) | Self::WorkflowSynthesisFailed(_) => {
                "A resposta da IA não estava em um formato JSON válido.".into()
            }
            Self::InvalidConfig(_) | Self::Http(_) | Self::Json(_) => {
                "Ocorreu um erro interno no servidor.".into()
            }
        }
    }
}
