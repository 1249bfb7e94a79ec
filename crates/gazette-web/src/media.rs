use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use tokio::fs;
use tracing::{info, warn};
use uuid::Uuid;

/// Largest accepted upload, in bytes.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

#[derive(Debug, Clone, Copy)]
pub enum MediaKind {
    ArticleImage,
    Avatar,
}

impl MediaKind {
    fn dir(&self) -> &'static str {
        match self {
            MediaKind::ArticleImage => "article-images",
            MediaKind::Avatar => "avatars",
        }
    }
}

/// Manages uploaded images on disk.
///
/// Files live at `{root}/{kind}/{uuid}.{ext}`; the database stores the path
/// relative to the root, and `/media/` serves the root read-only.
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        for kind in [MediaKind::ArticleImage, MediaKind::Avatar] {
            fs::create_dir_all(root.join(kind.dir())).await?;
        }
        info!("Media root: {}", root.display());
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Store an image and return its path relative to the media root.
    pub async fn save(&self, kind: MediaKind, extension: &str, data: &[u8]) -> Result<String> {
        let relative = format!("{}/{}.{}", kind.dir(), Uuid::new_v4(), extension);
        fs::write(self.root.join(&relative), data).await?;
        info!("Stored {} ({} bytes)", relative, data.len());
        Ok(relative)
    }

    /// Remove a stored file. A file that is already gone is not an error.
    pub async fn delete(&self, relative: &str) -> Result<()> {
        if relative.contains("..") || Path::new(relative).is_absolute() {
            bail!("Refusing to delete media path {:?}", relative);
        }
        match fs::remove_file(self.root.join(relative)).await {
            Ok(()) => {
                info!("Deleted media {}", relative);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Media {} already gone", relative);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Best-effort removal for cleanup paths where failure should not abort the request.
    pub async fn discard(&self, relative: &str) {
        if let Err(e) = self.delete(relative).await {
            warn!("Failed to delete media {}: {}", relative, e);
        }
    }
}

/// Sniff the image format from its leading bytes. Returns the file extension.
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("png")
    } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("jpg")
    } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        Some("gif")
    } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        Some("webp")
    } else {
        None
    }
}
