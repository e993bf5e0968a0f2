//! Modelos de dominio (registros de PDFs, árbol de documento y sesiones de chat).

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Metadatos de un PDF subido y su documento en el servicio externo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfRecord {
    pub pdf_id: String,
    pub filename: String,
    pub file_path: String,
    pub document_id: String,
    pub upload_time: DateTime<Utc>,
}

/// Nodo del árbol jerárquico que devuelve el servicio de documentos.
/// `node_id` es único dentro de un mismo árbol. Los campos ausentes o `null`
/// toman su valor por defecto; los que no se modelan se conservan en `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub node_id: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub title: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub page_index: i64,
    #[serde(default, deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(
        default,
        deserialize_with = "null_as_default",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub nodes: Vec<TreeNode>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Árbol completo de un documento: lista ordenada de nodos raíz.
pub type DocumentTree = Vec<TreeNode>;

/// Identificador de conversación. El historial en sí vive en la memoria de conversación.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSession {
    pub session_id: String,
}

impl ChatSession {
    /// Reutiliza el id recibido o genera uno nuevo.
    pub fn resolve(session_id: Option<String>) -> Self {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        Self { session_id }
    }
}

/// Índice plano `node_id -> nodo` de todo el árbol (recorrido en profundidad).
pub fn node_index(tree: &[TreeNode]) -> HashMap<&str, &TreeNode> {
    let mut index = HashMap::new();
    let mut stack: Vec<&TreeNode> = tree.iter().rev().collect();
    while let Some(node) = stack.pop() {
        index.insert(node.node_id.as_str(), node);
        stack.extend(node.nodes.iter().rev());
    }
    index
}

/// Esquema del árbol sin el campo `text` en ningún nivel: sólo títulos y resúmenes.
pub fn outline(tree: &[TreeNode]) -> Value {
    let mut value = serde_json::to_value(tree).unwrap_or(Value::Array(Vec::new()));
    remove_fields(&mut value, &["text"]);
    value
}

fn remove_fields(value: &mut Value, fields: &[&str]) {
    match value {
        Value::Object(map) => {
            for field in fields {
                map.remove(*field);
            }
            for child in map.values_mut() {
                remove_fields(child, fields);
            }
        }
        Value::Array(items) => {
            for item in items {
                remove_fields(item, fields);
            }
        }
        _ => {}
    }
}
