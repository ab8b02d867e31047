//! Media upload and browsing
//!
//! Uploads go straight to object storage: the backend presigns a target per
//! file, the client PUTs the bytes, then asks the backend to confirm the key.

mod gallery;
mod transcode;
mod uploader;

pub use gallery::{MediaGallery, MediaOwner};
pub use transcode::{ImageTranscoder, TranscodeResult};
pub use uploader::{MediaUploader, UploadOutcome, UploadReport};

use crate::models::PresignRequest;
use bytes::Bytes;
use error_types::{ClientError, ClientResult};
use mime::Mime;
use std::path::Path;
use uuid::Uuid;

/// A file selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    /// Declared MIME type, also sent as the upload's `Content-Type`
    pub content_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(file_name: impl Into<String>, content_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, deriving the content type from its extension
    pub async fn from_path(path: impl AsRef<Path>) -> ClientResult<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| {
            ClientError::storage(format!("failed to read {}", path.display()), Some(e))
        })?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        let content_type = content_type_for(path).to_string();

        Ok(Self::new(file_name, content_type, data))
    }

    /// The declared content type, if it parses
    pub fn mime(&self) -> Option<Mime> {
        parse_mime(&self.content_type)
    }

    pub fn is_image(&self) -> bool {
        self.mime().is_some_and(|m| m.type_() == mime::IMAGE)
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub(crate) fn presign_request(&self, post_id: Option<Uuid>) -> PresignRequest {
        PresignRequest {
            file_name: self.file_name.clone(),
            content_type: self.content_type.clone(),
            file_size: self.size(),
            post_id,
        }
    }
}

/// Parse a declared content type. Type and subtype compare case-insensitively.
pub(crate) fn parse_mime(content_type: &str) -> Option<Mime> {
    content_type.trim().to_ascii_lowercase().parse().ok()
}

fn content_type_for(path: &Path) -> Mime {
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();

    let declared = match ext.as_str() {
        "jpg" | "jpeg" => return mime::IMAGE_JPEG,
        "png" => return mime::IMAGE_PNG,
        "gif" => return mime::IMAGE_GIF,
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => return mime::APPLICATION_OCTET_STREAM,
    };
    declared.parse().unwrap_or(mime::APPLICATION_OCTET_STREAM)
}
