use super::{ImageTranscoder, UploadFile};
use crate::api::MediaApi;
use crate::models::{MediaStatus, PresignResponse};
use error_types::ClientResult;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What happened to one file of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub file_name: String,
    /// Storage key, when a target was presigned
    pub key: Option<String>,
    /// `Available` once confirmed, `Pending` when stored but unconfirmed
    pub status: MediaStatus,
    pub error: Option<String>,
}

impl UploadOutcome {
    fn failed(file_name: String, key: Option<String>, error: impl ToString) -> Self {
        Self {
            file_name,
            key,
            status: MediaStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReport {
    pub outcomes: Vec<UploadOutcome>,
}

impl UploadReport {
    pub fn count(&self, status: MediaStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Every file was stored and confirmed
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.status == MediaStatus::Available)
    }
}

pub struct MediaUploader {
    api: Arc<dyn MediaApi>,
    transcoder: Arc<ImageTranscoder>,
}

impl MediaUploader {
    pub fn new(api: Arc<dyn MediaApi>, transcoder: Arc<ImageTranscoder>) -> Self {
        Self { api, transcoder }
    }

    /// Attach files to a post: one presign call, then concurrent uploads
    ///
    /// Presigning failures propagate. Individual upload failures are recorded
    /// in the report and never undo the uploads that succeeded.
    pub async fn upload_for_post(&self, post_id: Uuid, files: Vec<UploadFile>) -> ClientResult<UploadReport> {
        if files.is_empty() {
            return Ok(UploadReport::default());
        }

        let requests: Vec<_> = files.iter().map(|f| f.presign_request(Some(post_id))).collect();
        let targets = self.api.presign_batch(&requests).await?;
        if targets.len() != files.len() {
            warn!(
                %post_id,
                files = files.len(),
                targets = targets.len(),
                "Presign returned a different number of targets than files"
            );
        }

        let mut targets = targets.into_iter();
        let uploads = files.into_iter().map(|file| {
            let target = targets.next();
            async move {
                match target {
                    Some(target) => self.upload_one(file, target).await,
                    None => UploadOutcome::failed(file.file_name, None, "no upload target"),
                }
            }
        });

        let report = UploadReport {
            outcomes: join_all(uploads).await,
        };

        info!(
            %post_id,
            available = report.count(MediaStatus::Available),
            pending = report.count(MediaStatus::Pending),
            failed = report.count(MediaStatus::Failed),
            "Media upload finished"
        );
        Ok(report)
    }

    async fn upload_one(&self, file: UploadFile, target: PresignResponse) -> UploadOutcome {
        if let Err(e) = self.put(&file, &target).await {
            warn!(file = %file.file_name, key = %target.key, error = %e, "Media upload failed");
            return UploadOutcome::failed(file.file_name, Some(target.key), e);
        }

        match self.api.confirm_upload(&target.key).await {
            Ok(()) => UploadOutcome {
                file_name: file.file_name,
                key: Some(target.key),
                status: MediaStatus::Available,
                error: None,
            },
            Err(e) => {
                warn!(key = %target.key, error = %e, "Upload stored but not confirmed");
                UploadOutcome {
                    file_name: file.file_name,
                    key: Some(target.key),
                    status: MediaStatus::Pending,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Transcode if possible, then PUT to the presigned URL
    pub(crate) async fn put(&self, file: &UploadFile, target: &PresignResponse) -> ClientResult<()> {
        let data = if file.is_image() {
            match self
                .transcoder
                .clone()
                .transcode_async(file.content_type.clone(), file.data.clone())
                .await
            {
                Ok(result) => result.data,
                Err(e) => {
                    debug!(file = %file.file_name, error = %e, "Uploading original bytes");
                    file.data.clone()
                }
            }
        } else {
            file.data.clone()
        };

        self.api
            .upload_object(&target.url, &file.content_type, data)
            .await
    }
}
