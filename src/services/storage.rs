use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

use super::media;

pub const ALLOWED_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/x-icon",
    "video/mp4",
    "video/quicktime",
];

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported file type '{0}': only images or MP4/MOV videos are accepted")]
    UnsupportedType(String),
    #[error("invalid file name '{0}'")]
    InvalidName(String),
    #[error("file '{0}' not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A file received from a multipart form.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: Option<String>,
    pub content_type: String,
    pub bytes: Bytes,
}

#[derive(Debug)]
pub struct StoredFile {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

/// Per-tenant file storage. Stored names are opaque and unique per tenant.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Validate, optimize and persist an upload; returns the stored file name.
    async fn save(&self, tenant: &str, upload: Upload) -> Result<String, StoreError>;
    async fn open(&self, tenant: &str, file_name: &str) -> Result<StoredFile, StoreError>;
    async fn delete(&self, tenant: &str, file_name: &str) -> Result<(), StoreError>;
}

/// Files under `<root>/<tenant>/<uuid><ext>`.
pub struct LocalFileStore {
    root: PathBuf,
    max_image_dimension: u32,
}

impl LocalFileStore {
    pub fn new(root: impl Into<PathBuf>, max_image_dimension: u32) -> Self {
        Self {
            root: root.into(),
            max_image_dimension,
        }
    }

    fn path_for(&self, tenant: &str, file_name: &str) -> Result<PathBuf, StoreError> {
        if !is_single_component(tenant) {
            return Err(StoreError::InvalidName(tenant.to_string()));
        }
        if !is_single_component(file_name) {
            return Err(StoreError::InvalidName(file_name.to_string()));
        }
        Ok(self.root.join(tenant).join(file_name))
    }
}

#[async_trait]
impl FileStore for LocalFileStore {
    async fn save(&self, tenant: &str, upload: Upload) -> Result<String, StoreError> {
        if !ALLOWED_CONTENT_TYPES.contains(&upload.content_type.as_str()) {
            return Err(StoreError::UnsupportedType(upload.content_type));
        }

        let file_name = format!(
            "{}{}",
            Uuid::new_v4(),
            extension_for(upload.file_name.as_deref(), &upload.content_type)
        );
        let path = self.path_for(tenant, &file_name)?;
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
        }

        let bytes = media::optimize_image(&upload.bytes, &upload.content_type, self.max_image_dimension);
        tokio::fs::write(&path, &bytes).await?;
        tracing::debug!(tenant, file = %file_name, size = bytes.len(), "Stored upload");
        Ok(file_name)
    }

    async fn open(&self, tenant: &str, file_name: &str) -> Result<StoredFile, StoreError> {
        let path = self.path_for(tenant, file_name)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(file_name.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        let content_type = mime_guess::from_path(&path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();
        Ok(StoredFile { bytes, content_type })
    }

    async fn delete(&self, tenant: &str, file_name: &str) -> Result<(), StoreError> {
        let path = self.path_for(tenant, file_name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

fn is_single_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Lowercased extension of the client's file name, falling back to one derived
/// from the content type.
fn extension_for(file_name: Option<&str>, content_type: &str) -> String {
    let from_name = file_name
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|e| e.to_ascii_lowercase());
    let ext = from_name.or_else(|| {
        mime_guess::get_mime_extensions_str(content_type)
            .and_then(|exts| exts.first())
            .map(|e| e.to_string())
    });
    ext.map(|e| format!(".{e}")).unwrap_or_default()
}
