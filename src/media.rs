//! Uploaded image storage under the media root.
//!
//! Files land in `<media_root>/uploads/recipe/<uuid>.<ext>` and are served
//! back under `/media`. Only payloads whose leading bytes identify a PNG,
//! JPEG, GIF or WebP image are accepted.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

pub const MEDIA_URL: &str = "/media";
pub const RECIPE_UPLOAD_DIR: &str = "uploads/recipe";

#[derive(Error, Debug)]
pub enum MediaError {
    #[error("No file was submitted.")]
    Missing,
    #[error("The submitted file is empty.")]
    Empty,
    #[error("Upload a valid image. The file you uploaded was either not an image or a corrupted image.")]
    NotAnImage,
    #[error("Ensure this file is no larger than {0} bytes.")]
    TooLarge(usize),
    #[error("media io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Problems with the payload itself, as opposed to server-side IO.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, MediaError::Io(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageFormat {
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(ImageFormat::Png)
        } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(ImageFormat::Jpeg)
        } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            Some(ImageFormat::Gif)
        } else if bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
            Some(ImageFormat::Webp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Gif => "gif",
            ImageFormat::Webp => "webp",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredImage {
    /// Public path, e.g. `/media/uploads/recipe/<uuid>.png`.
    pub url: String,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    root: PathBuf,
    max_bytes: usize,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>, max_bytes: usize) -> Self {
        Self {
            root: root.into(),
            max_bytes,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Validate without touching the filesystem.
    pub fn check_image(&self, bytes: &[u8]) -> Result<ImageFormat, MediaError> {
        if bytes.is_empty() {
            return Err(MediaError::Empty);
        }
        if bytes.len() > self.max_bytes {
            return Err(MediaError::TooLarge(self.max_bytes));
        }
        ImageFormat::sniff(bytes).ok_or(MediaError::NotAnImage)
    }

    pub async fn save_recipe_image(&self, bytes: &[u8]) -> Result<StoredImage, MediaError> {
        let format = self.check_image(bytes)?;
        let file_name = format!("{}.{}", Uuid::new_v4(), format.extension());
        let dir = self.root.join(RECIPE_UPLOAD_DIR);
        tokio::fs::create_dir_all(&dir).await?;

        let path = dir.join(&file_name);
        tokio::fs::write(&path, bytes).await?;
        debug!(path = %path.display(), size = bytes.len(), "Stored recipe image");

        Ok(StoredImage {
            url: format!("{MEDIA_URL}/{RECIPE_UPLOAD_DIR}/{file_name}"),
            path,
        })
    }

    /// Best-effort cleanup of a file written for an upload that did not stick.
    pub async fn discard(&self, image: &StoredImage) {
        if let Err(e) = tokio::fs::remove_file(&image.path).await {
            warn!(path = %image.path.display(), error = %e, "Failed to remove orphaned upload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    fn temp_store(name: &str) -> (MediaStore, PathBuf) {
        let root = std::env::temp_dir().join(format!("recipe_media_{name}_{}", Uuid::new_v4()));
        (MediaStore::new(&root, 64), root)
    }

    #[test]
    fn test_sniff_formats() {
        assert_eq!(ImageFormat::sniff(PNG_BYTES), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::sniff(b"GIF89a...."), Some(ImageFormat::Gif));
        assert_eq!(ImageFormat::sniff(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::sniff(b"not an image"), None);
    }

    #[test]
    fn test_check_image_rejects_empty_and_oversized() {
        let (store, _) = temp_store("check");
        assert!(matches!(store.check_image(b""), Err(MediaError::Empty)));
        assert!(matches!(store.check_image(&[0x89; 65]), Err(MediaError::TooLarge(64))));
        assert!(matches!(store.check_image(b"plain text"), Err(MediaError::NotAnImage)));
    }

    #[tokio::test]
    async fn test_save_recipe_image_writes_uuid_file() {
        let (store, root) = temp_store("save");
        let stored = store.save_recipe_image(PNG_BYTES).await.unwrap();

        assert!(stored.url.starts_with("/media/uploads/recipe/"));
        assert!(stored.url.ends_with(".png"));
        assert_eq!(std::fs::read(&stored.path).unwrap(), PNG_BYTES);

        store.discard(&stored).await;
        assert!(!stored.path.exists());
        let _ = std::fs::remove_dir_all(root);
    }
}
