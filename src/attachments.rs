//! Attachment ingestion — turns downloaded image bytes into stored attachments.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use crate::error::AttachmentError;

/// Content type of every onboarding image.
pub const IMAGE_JPEG: &str = "image/jpeg";

const JPEG_MAGIC: [u8; 3] = [0xFF, 0xD8, 0xFF];

/// Raw bytes handed to the ingestion pipeline.
#[derive(Debug, Clone)]
pub struct AttachmentInput {
    pub content_type: String,
    pub data: Vec<u8>,
    pub size: u64,
}

impl AttachmentInput {
    pub fn jpeg(data: Vec<u8>) -> Self {
        Self {
            content_type: IMAGE_JPEG.to_string(),
            size: data.len() as u64,
            data,
        }
    }
}

/// An attachment after local processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedAttachment {
    pub id: Uuid,
    pub path: PathBuf,
    pub content_type: String,
    pub size: u64,
}

/// Attachment ingestion collaborator.
#[async_trait]
pub trait AttachmentProcessor: Send + Sync {
    /// Process one attachment. Fails on malformed input.
    async fn process(&self, input: AttachmentInput) -> Result<ProcessedAttachment, AttachmentError>;

    /// Remove a stored attachment. Already-missing files are not an error.
    async fn discard(&self, path: &Path) -> Result<(), AttachmentError>;
}

/// Writes validated JPEG attachments to a local directory.
pub struct LocalAttachmentProcessor {
    dir: PathBuf,
}

impl LocalAttachmentProcessor {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

fn validate(input: &AttachmentInput) -> Result<(), AttachmentError> {
    if input.data.is_empty() {
        return Err(AttachmentError::Malformed {
            reason: "empty attachment".into(),
        });
    }
    if input.size != input.data.len() as u64 {
        return Err(AttachmentError::Malformed {
            reason: format!(
                "declared size {} does not match {} bytes",
                input.size,
                input.data.len()
            ),
        });
    }
    if input.content_type == IMAGE_JPEG && !input.data.starts_with(&JPEG_MAGIC) {
        return Err(AttachmentError::Malformed {
            reason: "missing JPEG signature".into(),
        });
    }
    Ok(())
}

#[async_trait]
impl AttachmentProcessor for LocalAttachmentProcessor {
    async fn process(&self, input: AttachmentInput) -> Result<ProcessedAttachment, AttachmentError> {
        validate(&input)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let id = Uuid::new_v4();
        let path = self.dir.join(format!("{id}.jpg"));
        tokio::fs::write(&path, &input.data).await?;

        debug!(attachment_id = %id, size = input.size, "Attachment stored");
        Ok(ProcessedAttachment {
            id,
            path,
            content_type: input.content_type,
            size: input.size,
        })
    }

    async fn discard(&self, path: &Path) -> Result<(), AttachmentError> {
        match tokio::fs::remove_file(path).await {
            Ok(()) => {
                debug!(path = %path.display(), "Attachment removed");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
