//! Operaciones de la aplicación: subir, consultar, listar y borrar PDFs.
//!
//! Cada operación es independiente de la capa HTTP; los handlers de `api` sólo
//! traducen peticiones y respuestas.

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    app_state::AppState,
    config::AppConfig,
    error::{AppError, AppResult},
    memory::{render_history, ChatMessage},
    models::{ChatSession, PdfRecord},
    pdf_store::PdfStore,
    rag,
};

/// Resultado de una consulta ya respondida.
#[derive(Debug, Clone)]
pub struct ChatOutcome {
    pub answer: String,
    pub session: ChatSession,
    pub timestamp: DateTime<Utc>,
}

/// Comprueba extensión y tamaño antes de tocar el disco.
pub fn validate_upload(cfg: &AppConfig, filename: &str, size: usize) -> AppResult<()> {
    let extension = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    if !cfg.allowed_extensions.iter().any(|allowed| *allowed == extension) {
        warn!("Tipo de fichero no permitido: {filename}");
        return Err(AppError::Validation("Sólo se permiten ficheros PDF".to_string()));
    }
    if size > cfg.max_file_size {
        warn!("Fichero demasiado grande: {size} bytes en {filename}");
        return Err(AppError::Validation(
            "El fichero supera el tamaño máximo permitido".to_string(),
        ));
    }
    Ok(())
}

/// Valida, guarda, envía al servicio de documentos y registra el PDF.
/// Si algo falla después de escribir el fichero, el fichero se borra.
pub async fn upload_pdf(state: &AppState, filename: &str, content: &[u8]) -> AppResult<PdfRecord> {
    info!("Petición de subida para el fichero: {filename}");
    validate_upload(&state.config, filename, content.len())?;

    let pdf_id = Uuid::new_v4().to_string();
    debug!("PDF ID generado: {pdf_id} para el fichero: {filename}");
    let file_path = state.store.persist_file(&pdf_id, content).await?;

    let registered = async {
        let document_id = state
            .documents
            .submit_document(&file_path)
            .await
            .map_err(AppError::DocumentService)?;
        let record = PdfRecord {
            pdf_id: pdf_id.clone(),
            filename: filename.to_string(),
            file_path: file_path.to_string_lossy().to_string(),
            document_id,
            upload_time: Utc::now(),
        };
        state.store.put(&pdf_id, record.clone())?;
        Ok::<_, AppError>(record)
    }
    .await;

    match registered {
        Ok(record) => {
            info!(
                "PDF {} procesado con doc_id: {}",
                record.filename, record.document_id
            );
            debug!("PDFs disponibles: {:?}", state.store.ids());
            Ok(record)
        }
        Err(err) => {
            error!("Error procesando el PDF {filename}: {err}");
            if let Err(cleanup) = PdfStore::remove_file(&file_path).await {
                error!("No se pudo limpiar {}: {cleanup}", file_path.display());
            }
            Err(err)
        }
    }
}

/// Responde a una pregunta sobre un PDF ya subido.
///
/// Si el documento no está listo se devuelve `DocumentProcessing` sin llamar al LLM.
pub async fn chat_with_pdf(
    state: &AppState,
    pdf_id: &str,
    message: &str,
    session_id: Option<String>,
) -> AppResult<ChatOutcome> {
    info!(
        "Consulta para el PDF {pdf_id}: {}...",
        message.chars().take(50).collect::<String>()
    );
    let record = state.store.get(pdf_id)?;
    let doc_id = &record.document_id;

    let ready = state
        .documents
        .is_retrieval_ready(doc_id)
        .await
        .map_err(AppError::DocumentService)?;
    if !ready {
        warn!("El documento {doc_id} todavía se está procesando");
        return Err(AppError::DocumentProcessing);
    }
    let tree = state
        .documents
        .get_tree(doc_id)
        .await
        .map_err(AppError::DocumentService)?;

    let session = ChatSession::resolve(session_id);
    debug!("Usando la sesión: {}", session.session_id);

    let history = if state.config.memory_in_prompt {
        let messages = state.memory.relevant_context(&session.session_id, message).await;
        Some(render_history(&messages))
    } else {
        None
    };

    let params = state.generation_params();
    let result = rag::answer_question(
        state.llm.as_ref(),
        &params,
        message,
        &tree,
        history.as_deref(),
    )
    .await?;
    debug!("Nodos usados: {:?}", result.node_ids);

    state
        .memory
        .record(&session.session_id, ChatMessage::user(message))
        .await;
    state
        .memory
        .record(&session.session_id, ChatMessage::assistant(result.answer.clone()))
        .await;

    Ok(ChatOutcome {
        answer: result.answer,
        session,
        timestamp: Utc::now(),
    })
}

/// Borra el registro y el fichero. Un fichero ya ausente no es un error.
pub async fn delete_pdf(state: &AppState, pdf_id: &str) -> AppResult<PdfRecord> {
    info!("Petición de borrado para el PDF: {pdf_id}");
    let record = state.store.delete(pdf_id).await?;
    info!("PDF {pdf_id} eliminado");
    Ok(record)
}

pub fn list_pdfs(state: &AppState) -> Vec<PdfRecord> {
    state.store.list()
}
