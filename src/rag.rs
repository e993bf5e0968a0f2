//! Consulta RAG sobre el árbol de un documento, sin búsqueda vectorial.
//!
//! Flujo:
//!   1. (Quien llama) comprueba que el documento está listo y descarga el árbol.
//!   2. Selección de nodos: el LLM recibe la pregunta y el árbol sin `text`
//!      y devuelve JSON `{"thinking": ..., "node_list": [...]}`.
//!   3. Resolución de cada `node_id` contra el índice plano del árbol completo.
//!      Un id inexistente hace fallar la consulta entera.
//!   4. Contexto = textos de los nodos en el orden de `node_list`, separados por
//!      una línea en blanco.
//!   5. Síntesis: segunda llamada al LLM con la pregunta y el contexto.

use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{AppError, AppResult},
    llm::{CompletionModel, GenerationParams},
    models::{node_index, outline, TreeNode},
};

/// Respuesta del LLM en la fase de selección de nodos.
#[derive(Debug, Clone, Deserialize)]
pub struct NodeSelection {
    #[serde(default)]
    pub thinking: String,
    pub node_list: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RagAnswer {
    pub answer: String,
    pub node_ids: Vec<String>,
}

pub fn build_search_prompt(question: &str, tree: &[TreeNode]) -> String {
    let tree_json = serde_json::to_string_pretty(&outline(tree)).unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"
You are given a question and a tree structure of a document.
Each node contains a node id, node title, and a corresponding summary.
Your task is to find all nodes that are likely to contain the answer to the question.

Question: {question}

Document tree structure:
{tree_json}

Please reply in the following JSON format:
{{
    "thinking": "<Your thinking process on which nodes are relevant to the question>",
    "node_list": ["node_id_1", "node_id_2", ..., "node_id_n"]
}}
Directly return the final JSON structure. Do not output anything else.
"#
    )
}

pub fn build_answer_prompt(question: &str, context: &str, history: Option<&str>) -> String {
    let history = match history {
        Some(h) if !h.is_empty() => format!("Conversation history:\n{h}\n\n"),
        _ => String::new(),
    };
    format!(
        r#"
Answer the question based on the context:

{history}Question: {question}
Context: {context}

Provide a clear, concise answer based only on the context provided.
"#
    )
}

/// Interpreta la respuesta de selección. Sólo se toleran espacios y un bloque
/// de código Markdown alrededor del JSON.
pub fn parse_node_selection(raw: &str) -> AppResult<NodeSelection> {
    let json = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(json).map_err(|e| AppError::NodeSelection(format!("{e}. Respuesta LLM: '{raw}'")))
}

/// Resuelve los nodos seleccionados y concatena su texto en el orden recibido.
pub fn assemble_context(tree: &[TreeNode], node_ids: &[String]) -> AppResult<String> {
    let index = node_index(tree);
    let mut texts = Vec::with_capacity(node_ids.len());
    for node_id in node_ids {
        let node = index
            .get(node_id.as_str())
            .ok_or_else(|| AppError::UnknownNode(node_id.clone()))?;
        debug!(
            "Nodo: {}\t Página: {}\t Título: {}",
            node.node_id, node.page_index, node.title
        );
        texts.push(node.text.as_str());
    }
    Ok(texts.join("\n\n"))
}

/// Lanza la consulta en dos fases contra el árbol ya descargado.
/// `history` se añade al prompt de síntesis cuando viene informado.
pub async fn answer_question(
    llm: &dyn CompletionModel,
    params: &GenerationParams,
    question: &str,
    tree: &[TreeNode],
    history: Option<&str>,
) -> AppResult<RagAnswer> {
    // 1) Selección de nodos
    let search_prompt = build_search_prompt(question, tree);
    let raw_selection = llm.complete(&search_prompt, params).await?;
    let selection = parse_node_selection(&raw_selection)?;
    debug!("Razonamiento: {}", selection.thinking);

    // 2) Contexto
    let context = assemble_context(tree, &selection.node_list)?;
    debug!(
        "Contexto recuperado ({} nodos, {} caracteres)",
        selection.node_list.len(),
        context.chars().count()
    );

    // 3) Síntesis
    let answer_prompt = build_answer_prompt(question, &context, history);
    let answer = llm.complete(&answer_prompt, params).await?;
    info!("Respuesta generada a partir de {} nodos", selection.node_list.len());

    Ok(RagAnswer {
        answer,
        node_ids: selection.node_list,
    })
}
