//! Almacén de PDFs: registro en memoria `pdf_id -> PdfRecord` más los ficheros en disco.
//!
//! El mapa está protegido por un `Mutex` que nunca se mantiene a través de un `.await`.
//! La escritura del fichero y la inserción del registro no son atómicas entre sí.

use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::fs;
use tracing::{debug, info};

use crate::{
    error::{AppError, AppResult},
    models::PdfRecord,
};

#[derive(Debug, Clone)]
pub struct PdfStore {
    storage_dir: PathBuf,
    records: Arc<Mutex<HashMap<String, PdfRecord>>>,
}

impl PdfStore {
    pub fn new(storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            storage_dir: storage_dir.into(),
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn storage_dir(&self) -> &Path {
        &self.storage_dir
    }

    /// Crea el directorio de almacenamiento si no existe.
    pub async fn ensure_storage_dir(&self) -> AppResult<()> {
        fs::create_dir_all(&self.storage_dir).await?;
        info!("Directorio de PDFs asegurado: {}", self.storage_dir().display());
        Ok(())
    }

    /// Escribe el contenido como `<storage>/<pdf_id>.pdf` y devuelve la ruta.
    pub async fn persist_file(&self, pdf_id: &str, content: &[u8]) -> AppResult<PathBuf> {
        fs::create_dir_all(&self.storage_dir).await?;
        let path = self.storage_dir.join(format!("{pdf_id}.pdf"));
        fs::write(&path, content).await?;
        info!("Fichero guardado en: {}", path.display());
        Ok(path)
    }

    /// Borra un fichero si existe. Un fichero ausente no es un error.
    pub async fn remove_file(path: &Path) -> AppResult<()> {
        match fs::remove_file(path).await {
            Ok(()) => {
                info!("Fichero eliminado: {}", path.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("El fichero {} ya no existía", path.display());
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn put(&self, pdf_id: &str, record: PdfRecord) -> AppResult<()> {
        let mut records = self.lock();
        if records.contains_key(pdf_id) {
            return Err(AppError::DuplicateKey(pdf_id.to_string()));
        }
        records.insert(pdf_id.to_string(), record);
        Ok(())
    }

    pub fn get(&self, pdf_id: &str) -> AppResult<PdfRecord> {
        self.lock()
            .get(pdf_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(pdf_id.to_string()))
    }

    /// Elimina el registro y después su fichero (si sigue en disco).
    pub async fn delete(&self, pdf_id: &str) -> AppResult<PdfRecord> {
        let record = self
            .lock()
            .remove(pdf_id)
            .ok_or_else(|| AppError::NotFound(pdf_id.to_string()))?;
        Self::remove_file(Path::new(&record.file_path)).await?;
        Ok(record)
    }

    /// Todos los registros, del más antiguo al más reciente.
    pub fn list(&self) -> Vec<PdfRecord> {
        let mut records: Vec<PdfRecord> = self.lock().values().cloned().collect();
        records.sort_by(|a, b| a.upload_time.cmp(&b.upload_time));
        records
    }

    pub fn ids(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    // Las secciones críticas son operaciones sueltas sobre el HashMap:
    // un lock envenenado sigue siendo consistente.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, PdfRecord>> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
