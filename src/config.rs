//! Carga y gestión de configuración de la aplicación (servidor, almacenamiento,
//! LLM y servicio de árbol de documentos).

use std::{env, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use url::Url;

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub app_name: String,
    pub debug: bool,
    pub host: String,
    pub port: u16,

    // Almacenamiento de PDFs
    pub pdf_storage_path: PathBuf,
    pub max_file_size: usize,
    pub allowed_extensions: Vec<String>,

    // Memoria de conversación
    pub max_history_length: usize,
    pub memory_backend: String,
    pub memory_in_prompt: bool,

    // LLM
    pub llm_model_name: String,
    pub llm_temperature: f32,
    pub llm_max_tokens: u32,
    pub llm_timeout: Duration,
    pub llm_url: String,
    pub llm_token: String,

    // Servicio de árbol de documentos (PageIndex)
    pub pageindex_api_key: String,
    pub pageindex_base_url: String,

    pub database_url: String,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de claves.
    /// Toda opción tiene un valor por defecto; sólo los valores mal formados fallan.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string_or = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .unwrap_or_else(|| default.to_string())
        };

        let allowed_extensions = string_or("ALLOWED_EXTENSIONS", "pdf")
            .split(',')
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect::<Vec<_>>();
        if allowed_extensions.is_empty() {
            return Err(anyhow!("ALLOWED_EXTENSIONS no puede estar vacío"));
        }

        let llm_url = string_or("URL_CUSTOM_LLM", "");
        if !llm_url.is_empty() {
            Url::parse(&llm_url).with_context(|| format!("URL_CUSTOM_LLM inválida: {llm_url}"))?;
        }

        let pageindex_base_url = string_or("PAGEINDEX_BASE_URL", "https://api.pageindex.ai");
        Url::parse(&pageindex_base_url)
            .with_context(|| format!("PAGEINDEX_BASE_URL inválida: {pageindex_base_url}"))?;

        Ok(Self {
            app_name: string_or("APP_NAME", "PageIndex RAG Chatbot"),
            debug: parse_or(&lookup, "DEBUG", false)?,
            host: string_or("HOST", "0.0.0.0"),
            port: parse_or(&lookup, "PORT", 8000)?,
            pdf_storage_path: PathBuf::from(string_or("PDF_STORAGE_PATH", "./uploaded_pdfs")),
            max_file_size: parse_or(&lookup, "MAX_FILE_SIZE", 10 * 1024 * 1024)?,
            allowed_extensions,
            max_history_length: parse_or(&lookup, "MAX_HISTORY_LENGTH", 10)?,
            memory_backend: string_or("MEMORY_BACKEND", "memory").to_lowercase(),
            memory_in_prompt: parse_or(&lookup, "CHAT_MEMORY_IN_PROMPT", false)?,
            llm_model_name: string_or("LLM_MODEL_NAME", "telkom-ai-instruct"),
            llm_temperature: parse_or(&lookup, "LLM_TEMPERATURE", 0.0)?,
            llm_max_tokens: parse_or(&lookup, "LLM_MAX_TOKENS", 3000)?,
            llm_timeout: Duration::from_secs(parse_or(&lookup, "LLM_TIMEOUT_SECS", 120)?),
            llm_url,
            llm_token: string_or("TOKEN_CUSTOM_LLM", ""),
            pageindex_api_key: string_or("PAGEINDEX_API_KEY", ""),
            pageindex_base_url,
            database_url: string_or("DATABASE_URL", "sqlite:///./memori.db"),
        })
    }

    /// Dirección `host:port` en la que escucha el servidor.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Deja constancia en el log de qué secretos se han cargado, sin mostrar su valor.
    /// Los que faltan generan un aviso pero no impiden el arranque.
    pub fn log_summary(&self) {
        info!(
            "Configuración cargada. App: {}, Host: {}, Puerto: {}",
            self.app_name, self.host, self.port
        );

        let secrets = [
            ("URL_CUSTOM_LLM", &self.llm_url),
            ("TOKEN_CUSTOM_LLM", &self.llm_token),
            ("PAGEINDEX_API_KEY", &self.pageindex_api_key),
        ];
        for (name, value) in secrets {
            if value.is_empty() {
                warn!("{name} no encontrado en el entorno, se usa el valor por defecto");
            } else {
                info!("{name} cargado desde el entorno");
            }
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow!("Valor inválido para {key} ('{raw}'): {e}")),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let cfg = config_from(&[]).unwrap();
        assert_eq!(cfg.app_name, "PageIndex RAG Chatbot");
        assert_eq!(cfg.server_addr(), "0.0.0.0:8000");
        assert_eq!(cfg.max_file_size, 10 * 1024 * 1024);
        assert_eq!(cfg.allowed_extensions, vec!["pdf".to_string()]);
        assert_eq!(cfg.max_history_length, 10);
        assert_eq!(cfg.llm_model_name, "telkom-ai-instruct");
        assert_eq!(cfg.llm_temperature, 0.0);
        assert_eq!(cfg.llm_max_tokens, 3000);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(120));
        assert!(cfg.llm_url.is_empty());
        assert!(!cfg.memory_in_prompt);
    }

    #[test]
    fn test_overrides_are_applied() {
        let cfg = config_from(&[
            ("PORT", "9100"),
            ("MAX_FILE_SIZE", "2048"),
            ("ALLOWED_EXTENSIONS", " .PDF , pdfa "),
            ("LLM_TEMPERATURE", "0.3"),
            ("URL_CUSTOM_LLM", "https://llm.example.com/v1/chat/completions"),
            ("CHAT_MEMORY_IN_PROMPT", "true"),
        ])
        .unwrap();
        assert_eq!(cfg.port, 9100);
        assert_eq!(cfg.max_file_size, 2048);
        assert_eq!(cfg.allowed_extensions, vec!["pdf", "pdfa"]);
        assert!((cfg.llm_temperature - 0.3).abs() < f32::EPSILON);
        assert!(cfg.memory_in_prompt);
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let err = config_from(&[("PORT", "ochenta")]).unwrap_err();
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_malformed_llm_url_is_rejected() {
        assert!(config_from(&[("URL_CUSTOM_LLM", "no es una url")]).is_err());
    }

    #[test]
    fn test_empty_value_falls_back_to_default() {
        let cfg = config_from(&[("MAX_HISTORY_LENGTH", "  ")]).unwrap();
        assert_eq!(cfg.max_history_length, 10);
    }
}
