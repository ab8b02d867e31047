//! Image transcoder - shrinks images before they are uploaded
//!
//! Downscales an image so neither side exceeds the configured dimension and
//! re-encodes it in its declared format. JPEG output steps its quality down
//! until the result fits the size budget. The presigned upload target is bound
//! to the declared content type, so the format never changes.
//!
//! Uses `spawn_blocking` for CPU-intensive operations to avoid blocking the async runtime.

use super::parse_mime;
use crate::config::ImageConfig;
use bytes::Bytes;
use error_types::{ClientError, ClientResult};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageOutputFormat};
use std::io::Cursor;
use std::sync::Arc;
use tracing::debug;

/// Lowest JPEG quality the size budget may push the encoder to
const MIN_JPEG_QUALITY: u8 = 40;
const QUALITY_STEP: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Target {
    Jpeg,
    Png,
}

impl Target {
    fn for_content_type(content_type: &str) -> Option<Self> {
        let declared = parse_mime(content_type)?;
        let essence = declared.essence_str();
        if essence == mime::IMAGE_JPEG.essence_str() || essence == "image/jpg" {
            Some(Target::Jpeg)
        } else if essence == mime::IMAGE_PNG.essence_str() {
            Some(Target::Png)
        } else {
            None
        }
    }
}

/// Result of transcoding
#[derive(Debug)]
pub struct TranscodeResult {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
    /// `false` when the original bytes were kept
    pub transcoded: bool,
}

pub struct ImageTranscoder {
    config: ImageConfig,
}

impl ImageTranscoder {
    pub fn new(config: ImageConfig) -> Self {
        Self { config }
    }

    /// Whether `content_type` is a format this transcoder re-encodes
    pub fn supports(content_type: &str) -> bool {
        Target::for_content_type(content_type).is_some()
    }

    /// Shrink an image (blocking version)
    ///
    /// Unsupported types and images the encoder cannot make smaller come back
    /// unchanged.
    pub fn transcode(&self, content_type: &str, original: Bytes) -> ClientResult<TranscodeResult> {
        let Some(target) = Target::for_content_type(content_type) else {
            return Ok(Self::passthrough(original));
        };

        let img = image::load_from_memory(&original)
            .map_err(|e| ClientError::parse(format!("{content_type} image"), e))?;

        let (orig_w, orig_h) = img.dimensions();
        debug!(
            original_width = orig_w,
            original_height = orig_h,
            original_size = original.len(),
            "Transcoding image before upload"
        );

        let img = if orig_w > self.config.max_dimension || orig_h > self.config.max_dimension {
            let (new_w, new_h) = self.calculate_dimensions(orig_w, orig_h);
            img.resize_exact(new_w.max(1), new_h.max(1), FilterType::Triangle)
        } else {
            img
        };
        let (width, height) = img.dimensions();

        let data = match target {
            Target::Jpeg => self.encode_jpeg_within_budget(&img)?,
            Target::Png => encode(&img, ImageOutputFormat::Png)?,
        };

        if data.len() >= original.len() {
            debug!(size = data.len(), "Transcoding did not shrink image, keeping original");
            return Ok(TranscodeResult {
                data: original,
                width: orig_w,
                height: orig_h,
                transcoded: false,
            });
        }

        debug!(width, height, size = data.len(), "Image transcoded");

        Ok(TranscodeResult {
            data,
            width,
            height,
            transcoded: true,
        })
    }

    /// Shrink an image on the blocking thread pool
    pub async fn transcode_async(
        self: Arc<Self>,
        content_type: String,
        original: Bytes,
    ) -> ClientResult<TranscodeResult> {
        if !Self::supports(&content_type) {
            return Ok(Self::passthrough(original));
        }

        tokio::task::spawn_blocking(move || self.transcode(&content_type, original))
            .await
            .map_err(|e| ClientError::parse("image transcoding task", e))?
    }

    fn passthrough(original: Bytes) -> TranscodeResult {
        TranscodeResult {
            data: original,
            width: 0,
            height: 0,
            transcoded: false,
        }
    }

    fn encode_jpeg_within_budget(&self, img: &DynamicImage) -> ClientResult<Bytes> {
        let mut quality = self.config.quality;
        loop {
            let data = encode(img, ImageOutputFormat::Jpeg(quality))?;
            let fits = data.len() as u64 <= self.config.max_bytes;
            if fits || quality <= MIN_JPEG_QUALITY {
                return Ok(data);
            }
            quality = quality.saturating_sub(QUALITY_STEP).max(MIN_JPEG_QUALITY);
        }
    }

    /// Calculate new dimensions maintaining aspect ratio
    fn calculate_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        let max_dim = self.config.max_dimension;

        if width > height {
            let ratio = max_dim as f32 / width as f32;
            (max_dim, ((height as f32) * ratio).round() as u32)
        } else {
            let ratio = max_dim as f32 / height as f32;
            (((width as f32) * ratio).round() as u32, max_dim)
        }
    }
}

fn encode(img: &DynamicImage, format: ImageOutputFormat) -> ClientResult<Bytes> {
    let mut buf = Vec::new();
    let mut cursor = Cursor::new(&mut buf);

    img.write_to(&mut cursor, format)
        .map_err(|e| ClientError::parse("image encoding", e))?;

    Ok(Bytes::from(buf))
}
