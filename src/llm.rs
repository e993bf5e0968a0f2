//! Cliente del LLM: una llamada HTTP con forma fija (un único mensaje `system`
//! con todo el prompt, sin streaming) contra el endpoint configurado.
//!
//! Si el primer intento falla se hace exactamente un reintento contra el mismo
//! endpoint y las mismas credenciales. No hay proveedor secundario.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("endpoint del LLM no configurado (URL_CUSTOM_LLM)")]
    NotConfigured,
    /// Fallo de conexión o timeout.
    #[error("fallo de transporte: {0}")]
    Transport(#[from] reqwest::Error),
    /// El endpoint respondió con un estado distinto de 200.
    #[error("la llamada a la API falló con estado {status}: {message}")]
    Api { status: u16, message: String },
    #[error("respuesta inesperada: {0}")]
    Parse(String),
}

/// Parámetros de generación de cada llamada.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationParams {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerationParams {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            max_tokens: cfg.llm_max_tokens,
            temperature: cfg.llm_temperature,
        }
    }
}

/// Modelo capaz de completar un prompt. El error es siempre explícito:
/// quien llama decide qué hacer con él.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: [ChatCompletionMessage<'a>; 1],
    max_tokens: u32,
    temperature: f32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatCompletionMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Cliente HTTP del endpoint de chat-completions configurado.
#[derive(Debug, Clone)]
pub struct LlmClient {
    http: Client,
    url: String,
    token: String,
    model: String,
}

impl LlmClient {
    pub fn from_config(cfg: &AppConfig) -> anyhow::Result<Self> {
        if cfg.llm_url.is_empty() {
            warn!("No hay endpoint de LLM configurado");
        } else {
            info!("Motor LLM configurado con endpoint propio");
        }
        Self::new(&cfg.llm_url, &cfg.llm_token, &cfg.llm_model_name, cfg.llm_timeout)
    }

    pub fn new(url: &str, token: &str, model: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.to_string(),
            token: token.to_string(),
            model: model.to_string(),
        })
    }

    async fn call_once(&self, body: &ChatCompletionRequest<'_>) -> Result<String, LlmError> {
        if self.url.is_empty() {
            return Err(LlmError::NotConfigured);
        }
        debug!("Llamando al LLM en {}", self.url);

        let resp = self
            .http
            .post(&self.url)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::ACCEPT, "application/json")
            .header("x-api-key", &self.token)
            .json(body)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;
        if status != StatusCode::OK {
            error!("Error de la API {}: {}", status.as_u16(), text);
            return Err(LlmError::Api {
                status: status.as_u16(),
                message: text,
            });
        }

        let parsed: ChatCompletionResponse =
            serde_json::from_str(&text).map_err(|e| LlmError::Parse(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| LlmError::Parse("la respuesta no contiene choices[0].message.content".into()))
    }
}

#[async_trait]
impl CompletionModel for LlmClient {
    async fn complete(&self, prompt: &str, params: &GenerationParams) -> Result<String, LlmError> {
        debug!(
            "Llamada al LLM con max_tokens: {}, temperature: {}",
            params.max_tokens, params.temperature
        );
        let body = ChatCompletionRequest {
            model: &self.model,
            messages: [ChatCompletionMessage {
                role: "system",
                content: prompt,
            }],
            max_tokens: params.max_tokens,
            temperature: params.temperature,
            stream: false,
        };

        let result = match self.call_once(&body).await {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("Falló la llamada principal al LLM ({e}); reintentando una vez");
                self.call_once(&body).await
            }
        };

        match &result {
            Ok(_) => info!("Llamada al LLM completada"),
            Err(e) => warn!("La llamada al LLM devolvió un error: {e}"),
        }
        result
    }
}
