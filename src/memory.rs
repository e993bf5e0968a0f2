//! Memoria de conversación por sesión.
//!
//! Es una capacidad intercambiable: el flujo de chat registra cada intercambio y,
//! sólo si `CHAT_MEMORY_IN_PROMPT` está activo, lee el historial para el prompt.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::AppConfig;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[async_trait]
pub trait ConversationMemory: Send + Sync {
    async fn record(&self, session_id: &str, message: ChatMessage);

    /// Mensajes de la sesión útiles para responder a `query`, en orden cronológico.
    async fn relevant_context(&self, session_id: &str, query: &str) -> Vec<ChatMessage>;
}

/// Historial en proceso, acotado a `max_turns` turnos (pregunta + respuesta) por sesión.
#[derive(Debug, Clone)]
pub struct InMemoryConversationMemory {
    max_turns: usize,
    sessions: Arc<Mutex<HashMap<String, VecDeque<ChatMessage>>>>,
}

impl InMemoryConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            sessions: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Único backend disponible; cualquier otro valor de `MEMORY_BACKEND` cae aquí.
    pub fn from_config(cfg: &AppConfig) -> Self {
        if cfg.memory_backend != "memory" {
            warn!(
                "MEMORY_BACKEND '{}' no soportado, se usa la memoria en proceso",
                cfg.memory_backend
            );
        }
        Self::new(cfg.max_history_length)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VecDeque<ChatMessage>>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ConversationMemory for InMemoryConversationMemory {
    async fn record(&self, session_id: &str, message: ChatMessage) {
        let max_messages = self.max_turns * 2;
        let mut sessions = self.lock();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(message);
        while history.len() > max_messages {
            history.pop_front();
        }
    }

    async fn relevant_context(&self, session_id: &str, _query: &str) -> Vec<ChatMessage> {
        self.lock()
            .get(session_id)
            .map(|history| history.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Historial como texto plano para incluirlo en un prompt.
pub fn render_history(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| match m.role {
            Role::User => format!("Usuario: {}", m.content),
            Role::Assistant => format!("Asistente: {}", m.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
