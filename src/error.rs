//! Taxonomía de errores de la aplicación y su traducción a respuestas HTTP.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::llm::LlmError;

pub type AppResult<T> = std::result::Result<T, AppError>;

/// Errores de una petición. Ninguno es fatal para el proceso: todos quedan
/// acotados a la petición que los produce.
#[derive(Debug, Error)]
pub enum AppError {
    /// Extensión no permitida, fichero demasiado grande, petición mal formada.
    #[error("{0}")]
    Validation(String),

    #[error("PDF no encontrado: {0}")]
    NotFound(String),

    #[error("El documento todavía se está procesando, inténtelo más tarde.")]
    DocumentProcessing,

    #[error("Identificador duplicado: {0}")]
    DuplicateKey(String),

    #[error("Error del servicio de documentos: {0:#}")]
    DocumentService(anyhow::Error),

    #[error("Error del LLM: {0}")]
    Llm(#[from] LlmError),

    /// La respuesta de selección de nodos no es el JSON esperado.
    #[error("Respuesta de selección de nodos inválida: {0}")]
    NodeSelection(String),

    #[error("El LLM seleccionó un nodo inexistente: {0}")]
    UnknownNode(String),

    #[error("Error de E/S: {0}")]
    Io(#[from] std::io::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::DocumentProcessing => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Código legible por máquina que acompaña al mensaje.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "bad_request",
            Self::NotFound(_) => "not_found",
            Self::DocumentProcessing => "document_processing",
            Self::DuplicateKey(_) => "duplicate_key",
            Self::DocumentService(_) => "document_service_error",
            Self::Llm(LlmError::Transport(_)) => "llm_transport",
            Self::Llm(_) => "llm_error",
            Self::NodeSelection(_) | Self::UnknownNode(_) => "retrieval_error",
            Self::Io(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.to_string(),
            "code": self.code(),
        }));
        (self.status(), body).into_response()
    }
}
