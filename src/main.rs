// Módulos de la aplicación
mod api;
mod app_state;
mod chat;
mod config;
mod error;
mod llm;
mod memory;
mod models;
mod page_index;
mod pdf_store;
mod rag;

use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::{
    app_state::AppState, llm::LlmClient, memory::InMemoryConversationMemory,
    page_index::PageIndexClient, pdf_store::PdfStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Cargar .env y configuración
    dotenvy::dotenv().ok();
    let cfg = config::AppConfig::from_env().context("Error al cargar la configuración")?;

    // 2. Inicializar logging (RUST_LOG tiene prioridad sobre DEBUG)
    let default_level = if cfg.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
    cfg.log_summary();
    info!("Inicializando {}", cfg.app_name);

    // 3. Almacenamiento de PDFs
    let store = PdfStore::new(&cfg.pdf_storage_path);
    store
        .ensure_storage_dir()
        .await
        .context("No se pudo crear el directorio de PDFs")?;

    // 4. Colaboradores externos: servicio de documentos, LLM y memoria
    let documents = PageIndexClient::from_config(&cfg).context("Error inicializando PageIndex")?;
    let llm = LlmClient::from_config(&cfg).context("Error inicializando el cliente LLM")?;
    let memory = InMemoryConversationMemory::from_config(&cfg);
    info!(
        "Memoria de conversación inicializada (backend: {}, turnos: {}, en prompt: {})",
        cfg.memory_backend, cfg.max_history_length, cfg.memory_in_prompt
    );

    // 5. Estado compartido de la aplicación
    let app_state = AppState {
        config: Arc::new(cfg.clone()),
        store,
        documents: Arc::new(documents),
        llm: Arc::new(llm),
        memory: Arc::new(memory),
    };

    // 6. Router de la API
    let app = Router::new().merge(api::create_router(app_state)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 7. Iniciar el servidor
    let server_addr = cfg.server_addr();
    let listener = tokio::net::TcpListener::bind(&server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {server_addr}"))?;
    info!("🚀 Servidor escuchando en http://{}", server_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}
