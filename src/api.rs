use axum::{
    extract::{DefaultBodyLimit, Json, Multipart, Path, State},
    routing::{delete, get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    app_state::AppState,
    chat,
    error::{AppError, AppResult},
    models::PdfRecord,
};

// Margen para las cabeceras multipart por encima del tamaño máximo del fichero.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

// --- Payloads y Respuestas de la API ---

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub pdf_id: String,
    pub filename: String,
    pub status: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub pdf_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let body_limit = app_state.config.max_file_size + MULTIPART_OVERHEAD;
    Router::new()
        .route("/", get(root_handler))
        .route("/upload", post(upload_handler))
        .route("/chat", post(chat_handler))
        .route("/pdf/:pdf_id", delete(delete_handler))
        .route("/pdfs", get(list_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn root_handler(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "message": format!("Welcome to {}", state.config.app_name) }))
}

#[axum::debug_handler]
async fn upload_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Petición multipart inválida: {e}")))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let content = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("No se pudo leer el fichero: {e}")))?;
        upload = Some((filename, content));
        break;
    }
    let (filename, content) =
        upload.ok_or_else(|| AppError::Validation("Falta el campo 'file'".to_string()))?;

    let record = chat::upload_pdf(&state, &filename, &content).await?;
    info!("Fichero {} subido con ID {}", record.filename, record.pdf_id);

    Ok(Json(UploadResponse {
        pdf_id: record.pdf_id,
        filename: record.filename,
        status: "success".to_string(),
    }))
}

#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Json<ChatResponse>> {
    let outcome =
        chat::chat_with_pdf(&state, &payload.pdf_id, &payload.message, payload.session_id).await?;
    Ok(Json(ChatResponse {
        response: outcome.answer,
        session_id: outcome.session.session_id,
        timestamp: outcome.timestamp,
    }))
}

#[axum::debug_handler]
async fn delete_handler(
    State(state): State<AppState>,
    Path(pdf_id): Path<String>,
) -> AppResult<Json<MessageResponse>> {
    chat::delete_pdf(&state, &pdf_id).await?;
    Ok(Json(MessageResponse {
        message: format!("PDF {pdf_id} deleted successfully"),
    }))
}

#[axum::debug_handler]
async fn list_handler(State(state): State<AppState>) -> Json<Vec<PdfRecord>> {
    Json(chat::list_pdfs(&state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        llm::CompletionModel,
        memory::InMemoryConversationMemory,
        models::DocumentTree,
        page_index::DocumentService,
        pdf_store::PdfStore,
        rag::tests::{node, ScriptedLlm},
    };
    use async_trait::async_trait;
    use reqwest::{multipart, StatusCode};
    use std::{path::Path as FsPath, sync::Arc};

    struct ReadyDocuments;

    #[async_trait]
    impl DocumentService for ReadyDocuments {
        async fn submit_document(&self, _path: &FsPath) -> anyhow::Result<String> {
            Ok("pi-http".to_string())
        }

        async fn is_retrieval_ready(&self, _doc_id: &str) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn get_tree(&self, _doc_id: &str) -> anyhow::Result<DocumentTree> {
            Ok(vec![node("0001", "El PIB creció un 5%.")])
        }
    }

    async fn spawn_app(llm: Arc<ScriptedLlm>, dir: &FsPath) -> String {
        let mut config = AppConfig::from_lookup(|_| None).unwrap();
        config.pdf_storage_path = dir.to_path_buf();
        config.max_file_size = 4096;
        let state = AppState {
            store: PdfStore::new(dir),
            memory: Arc::new(InMemoryConversationMemory::new(config.max_history_length)),
            config: Arc::new(config),
            documents: Arc::new(ReadyDocuments),
            llm: llm as Arc<dyn CompletionModel>,
        };
        let app = create_router(state);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn pdf_form(filename: &str, content: Vec<u8>) -> multipart::Form {
        let part = multipart::Part::bytes(content).file_name(filename.to_string());
        multipart::Form::new().part("file", part)
    }

    #[tokio::test]
    async fn test_upload_chat_delete_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"{"thinking": "economía", "node_list": ["0001"]}"#.to_string()),
            Ok("El PIB creció un 5%.".to_string()),
        ]));
        let base = spawn_app(llm.clone(), dir.path()).await;
        let client = reqwest::Client::new();

        let upload: UploadResponse = client
            .post(format!("{base}/upload"))
            .multipart(pdf_form("informe.pdf", b"%PDF-1.4".to_vec()))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(upload.status, "success");
        assert_eq!(upload.filename, "informe.pdf");

        let chat: ChatResponse = client
            .post(format!("{base}/chat"))
            .json(&json!({"message": "¿Cuánto creció el PIB?", "pdf_id": upload.pdf_id}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(chat.response, "El PIB creció un 5%.");
        assert!(!chat.session_id.is_empty());
        assert_eq!(llm.calls(), 2);

        let listed: Vec<PdfRecord> = client
            .get(format!("{base}/pdfs"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let resp = client
            .delete(format!("{base}/pdf/{}", upload.pdf_id))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let deleted: MessageResponse = resp.json().await.unwrap();
        assert_eq!(
            deleted.message,
            format!("PDF {} deleted successfully", upload.pdf_id)
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_upload_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(Arc::new(ScriptedLlm::default()), dir.path()).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/upload"))
            .multipart(pdf_form("notas.docx", b"hola".to_vec()))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "bad_request");
    }

    #[tokio::test]
    async fn test_upload_rejects_oversized_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(Arc::new(ScriptedLlm::default()), dir.path()).await;

        let resp = reqwest::Client::new()
            .post(format!("{base}/upload"))
            .multipart(pdf_form("grande.pdf", vec![b'x'; 5000]))
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unknown_pdf_is_404_for_chat_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(Arc::new(ScriptedLlm::default()), dir.path()).await;
        let client = reqwest::Client::new();

        let resp = client
            .post(format!("{base}/chat"))
            .json(&json!({"message": "hola", "pdf_id": "no-existe"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["code"], "not_found");

        let resp = client
            .delete(format!("{base}/pdf/no-existe"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_root_welcomes() {
        let dir = tempfile::tempdir().unwrap();
        let base = spawn_app(Arc::new(ScriptedLlm::default()), dir.path()).await;
        let body: Value = reqwest::get(&base).await.unwrap().json().await.unwrap();
        assert_eq!(body["message"], "Welcome to PageIndex RAG Chatbot");
    }
}
