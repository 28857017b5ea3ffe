//! Artifact storage seam.
//!
//! The tracker hands every attributed payload to an [`ArtifactStore`]
//! and records the returned [`ArtifactRef`] on the job. The filesystem
//! gallery in the API crate is the production implementation.

use serde::{Deserialize, Serialize};

/// Image encoding announced in the binary frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
}

impl ImageFormat {
    /// Map ComfyUI's header format code (1 = JPEG, 2 = PNG).
    ///
    /// Unknown codes fall back to PNG, which is what `SaveImageWebsocket`
    /// emits.
    pub fn from_code(code: u32) -> Self {
        match code {
            1 => Self::Jpeg,
            _ => Self::Png,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Reference to a stored artifact, as exposed to pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    /// File name inside the gallery.
    pub filename: String,
    /// Public URL the artifact is served from.
    pub url: String,
}

/// What the store needs to know besides the raw bytes.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactRequest<'a> {
    pub job_id: &'a str,
    pub format: ImageFormat,
    /// Caller metadata, persisted next to the artifact.
    pub metadata: &'a serde_json::Value,
}

/// Errors raised by artifact stores.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Sidecar serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid artifact name: {0}")]
    InvalidName(String),

    #[error("Artifact not found: {0}")]
    NotFound(String),
}

/// Durable home for generated artifacts.
#[async_trait::async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Persist `bytes` and return a reference the job can carry.
    async fn store(
        &self,
        bytes: &[u8],
        request: &ArtifactRequest<'_>,
    ) -> Result<ArtifactRef, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_codes() {
        assert_eq!(ImageFormat::from_code(1), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_code(2), ImageFormat::Png);
        assert_eq!(ImageFormat::from_code(99), ImageFormat::Png);
        assert_eq!(ImageFormat::Jpeg.extension(), "jpg");
    }
}
