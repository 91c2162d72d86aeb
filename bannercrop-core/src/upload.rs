//! Upload Validation
//!
//! Policy checks run before anything touches the network. Dimension decoding
//! holds a scratch handle for the file's bytes; the handle is released when it
//! drops, which covers success, decode failure and a dropped (cancelled) future.

use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing::debug;

use crate::geometry::Dimensions;
use crate::hashing::sha256_hex;
use crate::MAX_UPLOAD_BYTES;

pub const IMAGE_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/webp",
    "image/gif",
    "image/avif",
];

pub const VIDEO_MIME_TYPES: &[&str] = &["video/mp4", "video/webm", "video/ogg"];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum UploadError {
    #[error("Unsupported media type: {0}")]
    InvalidMimeType(String),

    #[error("File is {size} bytes, limit is {limit}")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Unreadable image: {0}")]
    UnreadableImage(String),

    #[error("Upload cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

/// A candidate upload held in memory.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub filename: String,
    pub mime_type: String,
    bytes: Arc<[u8]>,
}

impl UploadFile {
    pub fn new(filename: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn checksum(&self) -> String {
        sha256_hex(&self.bytes)
    }
}

/// Counts scratch handles so callers can see that every one was released.
#[derive(Debug, Clone, Default)]
pub struct ScratchLedger {
    inner: Arc<LedgerCounts>,
}

#[derive(Debug, Default)]
struct LedgerCounts {
    acquired: AtomicUsize,
    released: AtomicUsize,
}

impl ScratchLedger {
    pub fn acquired(&self) -> usize {
        self.inner.acquired.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    /// Handles not yet released. Safe to read while handles come and go.
    pub fn outstanding(&self) -> usize {
        // Released never passes acquired, so reading it first keeps the pair ordered.
        let released = self.released();
        self.acquired().saturating_sub(released)
    }

    fn acquire(&self, bytes: Arc<[u8]>) -> ScratchHandle {
        let id = self.inner.acquired.fetch_add(1, Ordering::SeqCst);
        debug!(handle = id, size = bytes.len(), "Acquired scratch handle");
        ScratchHandle {
            id,
            bytes,
            ledger: self.clone(),
        }
    }
}

/// Temporary view over upload bytes, released exactly once on drop.
pub struct ScratchHandle {
    id: usize,
    bytes: Arc<[u8]>,
    ledger: ScratchLedger,
}

impl ScratchHandle {
    fn bytes(&self) -> Arc<[u8]> {
        Arc::clone(&self.bytes)
    }
}

impl Drop for ScratchHandle {
    fn drop(&mut self) {
        self.ledger.inner.released.fetch_add(1, Ordering::SeqCst);
        debug!(handle = self.id, "Released scratch handle");
    }
}

pub struct UploadValidator {
    max_bytes: u64,
    scratch: ScratchLedger,
}

impl UploadValidator {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            scratch: ScratchLedger::default(),
        }
    }

    pub fn scratch(&self) -> &ScratchLedger {
        &self.scratch
    }

    /// Size is checked first, so an oversize file fails the same way whatever its type.
    pub fn check(&self, mime_type: &str, size: u64) -> Result<MediaKind, UploadError> {
        if size > self.max_bytes {
            return Err(UploadError::FileTooLarge {
                size,
                limit: self.max_bytes,
            });
        }
        media_kind(mime_type).ok_or_else(|| UploadError::InvalidMimeType(mime_type.to_string()))
    }

    pub fn validate(&self, file: &UploadFile) -> Result<MediaKind, UploadError> {
        self.check(&file.mime_type, file.size())
    }

    /// Natural pixel size of an image upload. Videos yield `None`.
    pub async fn read_natural_dimensions(
        &self,
        file: &UploadFile,
    ) -> Result<Option<Dimensions>, UploadError> {
        if self.validate(file)? == MediaKind::Video {
            return Ok(None);
        }

        let handle = self.scratch.acquire(Arc::clone(&file.bytes));
        let bytes = handle.bytes();
        let mime_type = file.mime_type.clone();

        let decoded = tokio::task::spawn_blocking(move || decode_dimensions(&mime_type, &bytes))
            .await
            .map_err(|e| UploadError::UnreadableImage(format!("decoder task failed: {}", e)))?;
        drop(handle);

        let dims = decoded?;
        debug!(
            filename = %file.filename,
            width = dims.width,
            height = dims.height,
            "Decoded natural dimensions"
        );
        Ok(Some(dims))
    }
}

impl Default for UploadValidator {
    fn default() -> Self {
        Self::new(MAX_UPLOAD_BYTES)
    }
}

pub fn media_kind(mime_type: &str) -> Option<MediaKind> {
    if IMAGE_MIME_TYPES.contains(&mime_type) {
        Some(MediaKind::Image)
    } else if VIDEO_MIME_TYPES.contains(&mime_type) {
        Some(MediaKind::Video)
    } else {
        None
    }
}

fn decode_dimensions(mime_type: &str, bytes: &[u8]) -> Result<Dimensions, UploadError> {
    let (width, height) = if mime_type == "image/avif" {
        // The image crate has no pure-Rust AVIF decoder; the container header is enough.
        let avif = avif_parse::read_avif(&mut Cursor::new(bytes))
            .map_err(|e| UploadError::UnreadableImage(format!("AVIF container: {:?}", e)))?;
        let meta = avif
            .primary_item_metadata()
            .map_err(|e| UploadError::UnreadableImage(format!("AVIF metadata: {:?}", e)))?;
        (meta.max_frame_width.get(), meta.max_frame_height.get())
    } else {
        image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| UploadError::UnreadableImage(e.to_string()))?
            .into_dimensions()
            .map_err(|e| UploadError::UnreadableImage(e.to_string()))?
    };

    if width == 0 || height == 0 {
        return Err(UploadError::UnreadableImage(format!(
            "zero-sized image {}x{}",
            width, height
        )));
    }
    Ok(Dimensions::new(width, height))
}

#[cfg(test)]
pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbImage::new(width, height);
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oversize_fails_regardless_of_mime() {
        let validator = UploadValidator::default();
        for mime in ["image/png", "video/mp4", "text/plain", ""] {
            let err = validator.check(mime, MAX_UPLOAD_BYTES + 1).unwrap_err();
            assert_eq!(
                err,
                UploadError::FileTooLarge { size: MAX_UPLOAD_BYTES + 1, limit: MAX_UPLOAD_BYTES }
            );
        }
    }

    #[test]
    fn test_limit_is_inclusive() {
        let validator = UploadValidator::default();
        assert_eq!(validator.check("image/gif", MAX_UPLOAD_BYTES), Ok(MediaKind::Image));
    }

    #[test]
    fn test_unknown_mime_rejected() {
        let validator = UploadValidator::default();
        for mime in ["image/bmp", "image/svg+xml", "video/quicktime", "IMAGE/PNG", "application/pdf"] {
            assert_eq!(
                validator.check(mime, 10),
                Err(UploadError::InvalidMimeType(mime.to_string()))
            );
        }
    }

    #[test]
    fn test_allowed_sets() {
        let validator = UploadValidator::default();
        for mime in IMAGE_MIME_TYPES {
            assert_eq!(validator.check(mime, 1), Ok(MediaKind::Image));
        }
        for mime in VIDEO_MIME_TYPES {
            assert_eq!(validator.check(mime, 1), Ok(MediaKind::Video));
        }
    }

    #[tokio::test]
    async fn test_reads_png_dimensions_and_releases_handle() {
        let validator = UploadValidator::default();
        let file = UploadFile::new("hero.png", "image/png", png_bytes(40, 16));

        let dims = validator.read_natural_dimensions(&file).await.unwrap();
        assert_eq!(dims, Some(Dimensions::new(40, 16)));
        assert_eq!(validator.scratch().acquired(), 1);
        assert_eq!(validator.scratch().outstanding(), 0);
    }

    #[tokio::test]
    async fn test_decode_failure_releases_handle() {
        let validator = UploadValidator::default();
        let file = UploadFile::new("broken.png", "image/png", b"not an image".to_vec());

        let err = validator.read_natural_dimensions(&file).await.unwrap_err();
        assert!(matches!(err, UploadError::UnreadableImage(_)));
        assert_eq!(validator.scratch().acquired(), 1);
        assert_eq!(validator.scratch().released(), 1);
    }

    #[tokio::test]
    async fn test_video_skips_decode() {
        let validator = UploadValidator::default();
        let file = UploadFile::new("clip.mp4", "video/mp4", vec![0; 32]);

        assert_eq!(validator.read_natural_dimensions(&file).await, Ok(None));
        assert_eq!(validator.scratch().acquired(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_read_releases_handle() {
        let validator = UploadValidator::default();
        let file = UploadFile::new("hero.png", "image/png", png_bytes(64, 64));

        // A zero timeout polls the read once, then drops it.
        let _ = tokio::time::timeout(
            std::time::Duration::ZERO,
            validator.read_natural_dimensions(&file),
        )
        .await;

        assert_eq!(validator.scratch().acquired(), 1);
        assert_eq!(validator.scratch().outstanding(), 0);
    }

    #[test]
    fn test_outstanding_under_concurrent_release() {
        let ledger = ScratchLedger::default();
        let bytes: Arc<[u8]> = Arc::from(vec![0u8; 16]);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                let ledger = ledger.clone();
                let bytes = Arc::clone(&bytes);
                scope.spawn(move || {
                    for _ in 0..2000 {
                        drop(ledger.acquire(Arc::clone(&bytes)));
                    }
                });
            }
            for _ in 0..20_000 {
                std::hint::black_box(ledger.outstanding());
            }
        });

        assert_eq!(ledger.acquired(), 8000);
        assert_eq!(ledger.outstanding(), 0);
    }
}
