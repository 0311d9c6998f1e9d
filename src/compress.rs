//! Receipt image downscaling before upload.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageReader;
use tracing::debug;

use crate::config::ReceiptConfig;
use crate::models::Upload;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    pub max_width: u32,
    /// 1-100.
    pub jpeg_quality: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_width: 1024,
            jpeg_quality: 70,
        }
    }
}

impl From<&ReceiptConfig> for CompressionSettings {
    fn from(config: &ReceiptConfig) -> Self {
        Self {
            max_width: config.max_width,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Could not process image {file}: {source}")]
pub struct CompressError {
    file: String,
    #[source]
    source: image::ImageError,
}

fn jpeg_name(file_name: &str) -> String {
    let stem = match file_name.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file_name,
    };
    format!("{stem}.jpg")
}

/// Scale an image down to `max_width` (keeping its aspect ratio) and
/// re-encode it as JPEG. Anything that is not an image, such as a PDF, is
/// returned unchanged.
pub fn compress_receipt(
    upload: &Upload,
    settings: &CompressionSettings,
) -> Result<Upload, CompressError> {
    if !upload.is_image() {
        return Ok(upload.clone());
    }
    let err = |source| CompressError {
        file: upload.file_name.clone(),
        source,
    };

    let decoded = ImageReader::new(Cursor::new(&upload.bytes))
        .with_guessed_format()
        .map_err(|e| err(image::ImageError::IoError(e)))?
        .decode()
        .map_err(err)?;

    let (width, height) = (decoded.width(), decoded.height());
    let max_width = settings.max_width.max(1);
    let resized = if width > max_width {
        let scaled_height = (u64::from(height) * u64::from(max_width) / u64::from(width)).max(1);
        decoded.resize_exact(max_width, scaled_height as u32, FilterType::Triangle)
    } else {
        decoded
    };

    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, settings.jpeg_quality.clamp(1, 100))
        .encode_image(&resized.to_rgb8())
        .map_err(err)?;

    debug!(
        file = %upload.file_name,
        from_bytes = upload.len(),
        to_bytes = bytes.len(),
        width = resized.width(),
        height = resized.height(),
        "Receipt compressed"
    );
    Ok(Upload::new(jpeg_name(&upload.file_name), "image/jpeg", bytes))
}
