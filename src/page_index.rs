//! Cliente del servicio externo de árbol de documentos (API de PageIndex).
//!
//! API pública:
//!   - `DocumentService::submit_document(&Path)` → `doc_id`
//!   - `DocumentService::is_retrieval_ready(&str)`
//!   - `DocumentService::get_tree(&str)` → árbol con resúmenes y texto completo.
//!
//! Ninguna llamada se reintenta.

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, Response};
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;

use crate::{config::AppConfig, models::DocumentTree};

#[async_trait]
pub trait DocumentService: Send + Sync {
    /// Envía el documento al servicio y devuelve su identificador.
    async fn submit_document(&self, path: &Path) -> Result<String>;

    /// `true` cuando el árbol del documento ya se puede consultar.
    async fn is_retrieval_ready(&self, doc_id: &str) -> Result<bool>;

    /// Árbol completo (resúmenes incluidos) de un documento listo.
    async fn get_tree(&self, doc_id: &str) -> Result<DocumentTree>;
}

#[derive(Deserialize)]
struct SubmitResponse {
    doc_id: String,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(default)]
    status: String,
    #[serde(default)]
    retrieval_ready: bool,
}

#[derive(Deserialize)]
struct TreeResponse {
    result: DocumentTree,
}

#[derive(Debug, Clone)]
pub struct PageIndexClient {
    http: Client,
    base_url: Url,
    api_key: String,
}

impl PageIndexClient {
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        Self::new(&cfg.pageindex_base_url, &cfg.pageindex_api_key)
    }

    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        // `join` necesita la barra final para no sustituir el último segmento.
        let base_url = if base_url.ends_with('/') {
            Url::parse(base_url)
        } else {
            Url::parse(&format!("{base_url}/"))
        }
        .with_context(|| format!("URL base de PageIndex inválida: {base_url}"))?;

        Ok(Self {
            http: Client::builder().build()?,
            base_url,
            api_key: api_key.to_string(),
        })
    }

    fn doc_url(&self, doc_id: &str) -> Result<Url> {
        Ok(self.base_url.join(&format!("doc/{doc_id}/"))?)
    }

    async fn check(resp: Response, action: &str) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(anyhow!("{action} falló con estado {}: {body}", status.as_u16()))
    }
}

#[async_trait]
impl DocumentService for PageIndexClient {
    async fn submit_document(&self, path: &Path) -> Result<String> {
        let content = tokio::fs::read(path)
            .await
            .with_context(|| format!("No se pudo leer {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "document.pdf".to_string());
        let mime = mime_guess::from_path(path).first_or_octet_stream();

        let part = multipart::Part::bytes(content)
            .file_name(filename)
            .mime_str(mime.essence_str())?;
        let form = multipart::Form::new().part("file", part);

        let resp = self
            .http
            .post(self.base_url.join("doc/")?)
            .header("api_key", &self.api_key)
            .multipart(form)
            .send()
            .await
            .context("No se pudo contactar con PageIndex")?;
        let submitted: SubmitResponse = Self::check(resp, "El envío del documento")
            .await?
            .json()
            .await
            .context("Respuesta de envío de PageIndex inesperada")?;

        info!("Documento enviado a PageIndex con doc_id: {}", submitted.doc_id);
        Ok(submitted.doc_id)
    }

    async fn is_retrieval_ready(&self, doc_id: &str) -> Result<bool> {
        let resp = self
            .http
            .get(self.doc_url(doc_id)?)
            .header("api_key", &self.api_key)
            .send()
            .await
            .context("No se pudo contactar con PageIndex")?;
        let status: StatusResponse = Self::check(resp, "La consulta de estado")
            .await?
            .json()
            .await
            .context("Respuesta de estado de PageIndex inesperada")?;

        debug!("Documento {doc_id}: estado '{}', listo: {}", status.status, status.retrieval_ready);
        Ok(status.retrieval_ready)
    }

    async fn get_tree(&self, doc_id: &str) -> Result<DocumentTree> {
        let mut url = self.doc_url(doc_id)?;
        url.query_pairs_mut()
            .append_pair("type", "tree")
            .append_pair("summary", "true");

        let resp = self
            .http
            .get(url)
            .header("api_key", &self.api_key)
            .send()
            .await
            .context("No se pudo contactar con PageIndex")?;
        let tree: TreeResponse = Self::check(resp, "La descarga del árbol")
            .await?
            .json()
            .await
            .context("Árbol de PageIndex inesperado")?;
        Ok(tree.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        extract::{Multipart, Path as AxumPath, Query},
        http::{HeaderMap, StatusCode},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::{json, Value};
    use std::collections::HashMap;

    async fn submit(headers: HeaderMap, mut multipart: Multipart) -> (StatusCode, Json<Value>) {
        if headers.get("api_key").and_then(|v| v.to_str().ok()) != Some("clave") {
            return (StatusCode::UNAUTHORIZED, Json(json!({"detail": "api key"})));
        }
        while let Ok(Some(field)) = multipart.next_field().await {
            if field.name() == Some("file") {
                let filename = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.unwrap_or_default();
                if filename.ends_with(".pdf") && bytes.starts_with(b"%PDF") {
                    return (StatusCode::OK, Json(json!({"doc_id": "pi-123"})));
                }
            }
        }
        (StatusCode::BAD_REQUEST, Json(json!({"detail": "sin fichero"})))
    }

    async fn doc(
        AxumPath(doc_id): AxumPath<String>,
        Query(query): Query<HashMap<String, String>>,
    ) -> (StatusCode, Json<Value>) {
        if doc_id != "pi-123" {
            return (StatusCode::NOT_FOUND, Json(json!({"detail": "no existe"})));
        }
        if query.get("type").map(String::as_str) == Some("tree") {
            return (
                StatusCode::OK,
                Json(json!({
                    "status": "completed",
                    "result": [{
                        "node_id": "0000",
                        "title": "Informe",
                        "summary": "Resumen",
                        "page_index": 1,
                        "text": "Texto completo",
                        "nodes": [{"node_id": "0001", "title": "Anexo", "page_index": 4, "text": "Anexo"}]
                    }]
                })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({"status": "completed", "retrieval_ready": true})),
        )
    }

    async fn spawn_mock() -> String {
        let app = Router::new()
            .route("/doc/", post(submit))
            .route("/doc/:doc_id/", get(doc));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn test_submit_document_returns_doc_id() {
        let base = spawn_mock().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.pdf");
        std::fs::write(&path, b"%PDF-1.7 contenido").unwrap();

        let client = PageIndexClient::new(&base, "clave").unwrap();
        assert_eq!(client.submit_document(&path).await.unwrap(), "pi-123");
    }

    #[tokio::test]
    async fn test_submit_with_bad_key_is_an_error() {
        let base = spawn_mock().await;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("abc.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let client = PageIndexClient::new(&base, "otra").unwrap();
        let err = client.submit_document(&path).await.unwrap_err();
        assert!(err.to_string().contains("401"));
    }

    #[tokio::test]
    async fn test_readiness_and_tree() {
        let base = spawn_mock().await;
        let client = PageIndexClient::new(&format!("{base}/"), "clave").unwrap();

        assert!(client.is_retrieval_ready("pi-123").await.unwrap());

        let tree = client.get_tree("pi-123").await.unwrap();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].text, "Texto completo");
        assert_eq!(tree[0].nodes[0].node_id, "0001");
        assert!(tree[0].nodes[0].summary.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_document_is_an_error() {
        let base = spawn_mock().await;
        let client = PageIndexClient::new(&base, "clave").unwrap();
        assert!(client.is_retrieval_ready("desconocido").await.is_err());
    }
}
