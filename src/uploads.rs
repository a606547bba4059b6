use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::storage::{StorageClient, UploadProgress};

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Error uploading file: {0}")]
    Failed(String),
    #[error("Error resolving file URL: {0}")]
    Url(String),
}

/// A file part received from a form, ready to be written to the object store.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub file_name: String,
    pub content_type: String,
    pub body: Bytes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredMedia {
    pub key: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

const VIDEO_EXTENSIONS: [&str; 4] = ["mp4", "ogg", "webm", "mkv"];

impl MediaKind {
    pub fn from_key(key: &str) -> Self {
        match extension(key) {
            Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => MediaKind::Video,
            _ => MediaKind::Image,
        }
    }
}

fn extension(name: &str) -> Option<String> {
    let (_, ext) = name.rsplit_once('.')?;
    if ext.is_empty() || ext.contains('/') {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

pub(crate) fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        "video/mp4" => Some("mp4"),
        "video/ogg" => Some("ogg"),
        "video/webm" => Some("webm"),
        "video/x-matroska" => Some("mkv"),
        _ => None,
    }
}

/// Object key under `prefix`; the uuid keeps same-named uploads apart.
pub fn object_key(prefix: &str, file_name: &str, content_type: &str) -> String {
    let stem: String = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect();
    let stem = stem.trim_matches(['.', '-']);
    let name = match (stem.is_empty(), extension(stem)) {
        (false, Some(_)) => stem.to_string(),
        (false, None) => format!("{stem}.{}", ext_from_mime(content_type).unwrap_or("bin")),
        (true, _) => format!("file.{}", ext_from_mime(content_type).unwrap_or("bin")),
    };
    format!("{}/{}-{}", prefix.trim_end_matches('/'), Uuid::new_v4(), name)
}

/// Writes the file and resolves its retrieval URL. `on_progress` sees every tick;
/// the future resolves only at a terminal state. On error no blob is left behind.
pub async fn upload(
    storage: &dyn StorageClient,
    key: String,
    file: UploadRequest,
    on_progress: &(dyn Fn(UploadProgress) + Send + Sync),
) -> Result<StoredMedia, UploadError> {
    let size = file.body.len();
    storage
        .put_object(&key, file.body, &file.content_type, on_progress)
        .await
        .map_err(|e| {
            warn!(error = %e, %key, "upload failed");
            UploadError::Failed(e.to_string())
        })?;
    let url = match storage.object_url(&key).await {
        Ok(url) => url,
        Err(e) => {
            warn!(error = %e, %key, "url resolution failed; releasing blob");
            remove_quietly(storage, &key).await;
            return Err(UploadError::Url(e.to_string()));
        }
    };
    info!(%key, size, "upload complete");
    Ok(StoredMedia { key, url })
}

/// Progress sink that reports through tracing.
pub fn log_progress(key: &str) -> impl Fn(UploadProgress) + Send + Sync + '_ {
    move |p: UploadProgress| {
        debug!(
            %key,
            transferred = p.transferred,
            total = p.total,
            percent = p.fraction() * 100.0,
            "upload progress"
        );
    }
}

/// Best-effort removal; failures are logged and left for reconciliation.
pub async fn remove_quietly(storage: &dyn StorageClient, key: &str) -> bool {
    match storage.delete_object(key).await {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, %key, "blob delete failed; object left behind");
            false
        }
    }
}

pub async fn resolve_url(storage: &dyn StorageClient, key: &str) -> Result<String, UploadError> {
    storage
        .object_url(key)
        .await
        .map_err(|e| UploadError::Url(e.to_string()))
}
