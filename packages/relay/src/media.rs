//! Media compliance for sinks with upload limits.
//!
//! Mastodon rejects images over 16 MiB or 8.3 megapixels. Oversized images are
//! downscaled uniformly to fit the pixel budget, then re-encoded as JPEG at
//! decreasing quality until the byte budget is met.

use std::io::Write;
use std::path::{Path, PathBuf};

use image::{imageops::FilterType, GenericImageView, ImageReader};
use tempfile::TempPath;
use tracing::{debug, info};

use crate::artifacts::ScratchFile;
use crate::error::{SinkError, SinkResult};

/// JPEG qualities tried in order.
const QUALITY_STEPS: [u8; 3] = [85, 75, 65];

/// Upload limits of a sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaLimits {
    pub max_bytes: u64,
    pub max_pixels: u64,
}

impl MediaLimits {
    pub const MASTODON: MediaLimits = MediaLimits {
        max_bytes: 16 * 1024 * 1024,
        max_pixels: 8_300_000,
    };
}

/// File to upload: the original, or a re-encoded copy removed on drop.
#[derive(Debug)]
pub enum PreparedMedia {
    Original(PathBuf),
    Reencoded(TempPath),
}

impl PreparedMedia {
    pub fn path(&self) -> &Path {
        match self {
            PreparedMedia::Original(p) => p,
            PreparedMedia::Reencoded(p) => p,
        }
    }

    pub fn is_reencoded(&self) -> bool {
        matches!(self, PreparedMedia::Reencoded(_))
    }
}

/// Make `path` fit `limits`, returning the file to upload.
///
/// Decoding and encoding are CPU bound and run on the blocking pool.
pub async fn prepare_for_upload(path: &Path, limits: MediaLimits) -> SinkResult<PreparedMedia> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || prepare_blocking(&path, limits))
        .await
        .map_err(|e| SinkError::Media(format!("media task failed: {}", e)))?
}

fn prepare_blocking(path: &Path, limits: MediaLimits) -> SinkResult<PreparedMedia> {
    let size = std::fs::metadata(path)?.len();

    let img = ImageReader::open(path)?
        .with_guessed_format()?
        .decode()
        .map_err(|e| SinkError::Media(format!("decode failed: {}", e)))?;

    let (width, height) = img.dimensions();
    let pixels = u64::from(width) * u64::from(height);

    if size <= limits.max_bytes && pixels <= limits.max_pixels {
        return Ok(PreparedMedia::Original(path.to_path_buf()));
    }

    let img = if pixels > limits.max_pixels {
        let (new_w, new_h) = scaled_dimensions(width, height, limits.max_pixels);
        info!(width, height, new_w, new_h, "Downscaling image for upload");
        img.resize_exact(new_w, new_h, FilterType::Lanczos3)
    } else {
        img
    };

    // JPEG has no alpha channel
    let rgb = img.to_rgb8();

    for quality in QUALITY_STEPS {
        let mut encoded = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, quality)
            .encode_image(&rgb)
            .map_err(|e| SinkError::Media(format!("encode failed: {}", e)))?;

        let len = encoded.len() as u64;
        debug!(quality, bytes = len, "Re-encoded image");
        if len <= limits.max_bytes {
            let (mut file, temp_path) = ScratchFile::create(None, "mastodon-img-", ".jpg")
                .map_err(|e| SinkError::Media(e.to_string()))?;
            file.write_all(&encoded)?;
            file.flush()?;
            return Ok(PreparedMedia::Reencoded(temp_path));
        }
    }

    Err(SinkError::Media(format!(
        "unable to reduce image below {} bytes even after resizing and compression",
        limits.max_bytes
    )))
}

/// Largest size with the same aspect ratio and at most `max_pixels` pixels.
pub fn scaled_dimensions(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let pixels = u64::from(width) * u64::from(height);
    if pixels <= max_pixels {
        return (width, height);
    }

    let factor = (max_pixels as f64 / pixels as f64).sqrt();
    let new_w = ((f64::from(width) * factor) as u32).max(1);
    let new_h = ((f64::from(height) * factor) as u32).max(1);
    (new_w, new_h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_png(dir: &Path, width: u32, height: u32) -> PathBuf {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let path = dir.join("asset.png");
        img.save(&path).unwrap();
        path
    }

    #[test]
    fn test_scaled_dimensions_keeps_aspect() {
        assert_eq!(scaled_dimensions(100, 50, 10_000), (100, 50));

        let (w, h) = scaled_dimensions(7680, 4320, 8_300_000);
        assert!(u64::from(w) * u64::from(h) <= 8_300_000);
        let ratio = f64::from(w) / f64::from(h);
        assert!((ratio - 16.0 / 9.0).abs() < 0.01);
    }

    #[tokio::test]
    async fn test_compliant_image_is_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 40, 30);

        let prepared = prepare_for_upload(&path, MediaLimits::MASTODON).await.unwrap();
        assert!(!prepared.is_reencoded());
        assert_eq!(prepared.path(), path.as_path());
    }

    #[tokio::test]
    async fn test_oversized_image_is_downscaled_and_cleaned_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 40, 30);
        let limits = MediaLimits {
            max_bytes: 10 * 1024 * 1024,
            max_pixels: 600,
        };

        let prepared = prepare_for_upload(&path, limits).await.unwrap();
        assert!(prepared.is_reencoded());

        let out = image::open(prepared.path()).unwrap();
        let (w, h) = out.dimensions();
        assert!(u64::from(w) * u64::from(h) <= 600);
        assert_eq!((w, h), (28, 21));

        let reencoded = prepared.path().to_path_buf();
        drop(prepared);
        assert!(!reencoded.exists());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_unreachable_byte_budget_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_png(dir.path(), 40, 30);
        let limits = MediaLimits {
            max_bytes: 16,
            max_pixels: 8_300_000,
        };

        let err = prepare_for_upload(&path, limits).await.unwrap_err();
        assert!(matches!(err, SinkError::Media(_)));
    }
}
