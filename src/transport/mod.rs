//! Remote collaborators: the story CDN and the account record sync.

pub mod http;

use async_trait::async_trait;

use crate::error::{SyncError, TransportError};
use crate::story::manifest::Manifest;

pub use http::{HttpAccountSync, HttpStoryTransport, NoopAccountSync};

/// Fetches the manifest and images of the onboarding story.
#[async_trait]
pub trait StoryTransport: Send + Sync {
    /// Fetch the current manifest.
    async fn get_manifest(&self) -> Result<Manifest, TransportError>;

    /// Fetch image bytes for `filenames`, returned in the same order.
    async fn download_images(
        &self,
        version: &str,
        filenames: &[String],
    ) -> Result<Vec<Vec<u8>>, TransportError>;
}

/// Account record synchronization.
#[async_trait]
pub trait AccountSync: Send + Sync {
    /// Run one account record round-trip. Resolves once the local mirror of
    /// the record (including `hasViewedOnboardingStory`) is up to date.
    async fn run_sync(&self) -> Result<(), SyncError>;
}
