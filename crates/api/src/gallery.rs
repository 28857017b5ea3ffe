//! Filesystem gallery of generated images.
//!
//! [`GalleryStore`] is the production [`ArtifactStore`]: every bound
//! payload is written as `img_<millis>_<prompt_id>.<ext>` with a JSON
//! sidecar of the same stem holding the prompt id, creation time and the
//! caller's metadata. The directory is served statically under
//! [`GALLERY_URL_PREFIX`].

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use atelier_core::artifact::{ArtifactRef, ArtifactRequest, ArtifactStore, StorageError};
use atelier_core::types::Timestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// URL path the gallery directory is mounted at.
pub const GALLERY_URL_PREFIX: &str = "/gallery";

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Contents of the `.json` file written next to each image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sidecar {
    pub prompt_id: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// One gallery entry as returned by [`GalleryStore::list`].
#[derive(Debug, Clone, Serialize)]
pub struct GalleryImage {
    pub filename: String,
    pub url: String,
    pub created_at: Timestamp,
    pub prompt_id: Option<String>,
    pub metadata: serde_json::Value,
}

/// Image gallery rooted at a directory.
#[derive(Debug, Clone)]
pub struct GalleryStore {
    dir: PathBuf,
}

impl GalleryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the gallery directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> Result<(), StorageError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        Ok(())
    }

    /// All images, newest first.
    ///
    /// A missing directory is an empty gallery. Unreadable sidecars are
    /// logged and the image is listed without metadata.
    pub async fn list(&self) -> Result<Vec<GalleryImage>, StorageError> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut images = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if !is_image(&path) {
                continue;
            }
            let Some(filename) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let filename = filename.to_string();

            let sidecar = self.read_sidecar(&path).await;
            let created_at = match &sidecar {
                Some(sidecar) => sidecar.created_at,
                None => {
                    let modified = entry.metadata().await?.modified()?;
                    DateTime::<Utc>::from(modified)
                }
            };

            images.push(GalleryImage {
                url: image_url(&filename),
                created_at,
                prompt_id: sidecar.as_ref().map(|s| s.prompt_id.clone()),
                metadata: sidecar.map(|s| s.metadata).unwrap_or(serde_json::Value::Null),
                filename,
            });
        }

        images.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.filename.cmp(&a.filename))
        });
        Ok(images)
    }

    /// Delete one image and its sidecar.
    pub async fn delete(&self, filename: &str) -> Result<(), StorageError> {
        validate_filename(filename)?;
        let path = self.dir.join(filename);

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StorageError::NotFound(filename.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        match tokio::fs::remove_file(path.with_extension("json")).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(filename = %filename, error = %e, "Failed to remove sidecar");
            }
        }

        tracing::info!(filename = %filename, "Gallery image deleted");
        Ok(())
    }

    /// Delete several images. Names are all validated before anything is
    /// removed; names that do not exist are skipped.
    ///
    /// Returns the names that were actually deleted.
    pub async fn delete_many(&self, filenames: &[String]) -> Result<Vec<String>, StorageError> {
        for filename in filenames {
            validate_filename(filename)?;
        }

        let mut deleted = Vec::with_capacity(filenames.len());
        for filename in filenames {
            match self.delete(filename).await {
                Ok(()) => deleted.push(filename.clone()),
                Err(StorageError::NotFound(_)) => {
                    tracing::debug!(filename = %filename, "Batch delete skipped missing image");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(deleted)
    }

    // ---- private helpers ----

    async fn read_sidecar(&self, image: &Path) -> Option<Sidecar> {
        let raw = tokio::fs::read(image.with_extension("json")).await.ok()?;
        match serde_json::from_slice(&raw) {
            Ok(sidecar) => Some(sidecar),
            Err(e) => {
                tracing::warn!(image = %image.display(), error = %e, "Ignoring unreadable sidecar");
                None
            }
        }
    }
}

#[async_trait::async_trait]
impl ArtifactStore for GalleryStore {
    async fn store(
        &self,
        bytes: &[u8],
        request: &ArtifactRequest<'_>,
    ) -> Result<ArtifactRef, StorageError> {
        let created_at = Utc::now();
        let stem = format!(
            "img_{}_{}",
            created_at.timestamp_millis(),
            sanitize(request.job_id)
        );
        let filename = format!("{stem}.{}", request.format.extension());

        self.ensure_dir().await?;
        tokio::fs::write(self.dir.join(&filename), bytes).await?;

        let sidecar = Sidecar {
            prompt_id: request.job_id.to_string(),
            created_at,
            metadata: request.metadata.clone(),
        };
        let json = serde_json::to_vec_pretty(&sidecar)?;
        tokio::fs::write(self.dir.join(format!("{stem}.json")), json).await?;

        tracing::debug!(
            prompt_id = %request.job_id,
            filename = %filename,
            bytes = bytes.len(),
            "Image saved to gallery",
        );

        Ok(ArtifactRef {
            url: image_url(&filename),
            filename,
        })
    }
}

/// Reject anything that could escape the gallery directory, and anything
/// that is not an image (sidecars go with their image, never on their own).
pub fn validate_filename(filename: &str) -> Result<(), StorageError> {
    let invalid = filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.starts_with('.')
        || !is_image(Path::new(filename));
    if invalid {
        return Err(StorageError::InvalidName(filename.to_string()));
    }
    Ok(())
}

fn image_url(filename: &str) -> String {
    format!("{GALLERY_URL_PREFIX}/{filename}")
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// Keep prompt ids filesystem-safe.
fn sanitize(id: &str) -> String {
    id.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}
