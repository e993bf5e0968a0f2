use std::sync::Arc;

use crate::{
    config::AppConfig,
    llm::{CompletionModel, GenerationParams},
    memory::ConversationMemory,
    page_index::DocumentService,
    pdf_store::PdfStore,
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: PdfStore,
    pub documents: Arc<dyn DocumentService>,
    pub llm: Arc<dyn CompletionModel>,
    pub memory: Arc<dyn ConversationMemory>,
}

impl AppState {
    pub fn generation_params(&self) -> GenerationParams {
        GenerationParams::from_config(&self.config)
    }
}
