//! reqwest-backed story transport and account sync.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::try_join_all;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info};

use super::{AccountSync, StoryTransport};
use crate::error::{SyncError, TransportError};
use crate::store::traits::StoryStore;
use crate::story::manifest::Manifest;

const MANIFEST_PATH: &str = "dynamic/desktop/stories/onboarding/manifest.json";
const IMAGE_PATH_PREFIX: &str = "static/desktop/stories/onboarding";

fn build_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to build HTTP client with timeout, using defaults");
            reqwest::Client::new()
        })
}

/// Story CDN client.
pub struct HttpStoryTransport {
    base_url: String,
    client: reqwest::Client,
}

impl HttpStoryTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_client(timeout),
        }
    }

    fn manifest_url(&self) -> String {
        format!("{}/{MANIFEST_PATH}", self.base_url)
    }

    fn image_url(&self, version: &str, filename: &str) -> String {
        format!("{}/{IMAGE_PATH_PREFIX}/{version}/{filename}.jpg", self.base_url)
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response, TransportError> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        if !resp.status().is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: resp.status().as_u16(),
            });
        }
        Ok(resp)
    }

    async fn download_image(&self, version: &str, filename: &str) -> Result<Vec<u8>, TransportError> {
        let url = self.image_url(version, filename);
        let bytes = self
            .get(&url)
            .await?
            .bytes()
            .await
            .map_err(|e| TransportError::RequestFailed {
                url: url.clone(),
                reason: e.to_string(),
            })?;
        debug!(url = %url, size = bytes.len(), "Onboarding image downloaded");
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl StoryTransport for HttpStoryTransport {
    async fn get_manifest(&self) -> Result<Manifest, TransportError> {
        let url = self.manifest_url();
        let manifest: Manifest = self
            .get(&url)
            .await?
            .json()
            .await
            .map_err(|e| TransportError::InvalidManifest(e.to_string()))?;
        info!(version = %manifest.version, locales = manifest.languages.len(), "Onboarding manifest fetched");
        Ok(manifest)
    }

    async fn download_images(
        &self,
        version: &str,
        filenames: &[String],
    ) -> Result<Vec<Vec<u8>>, TransportError> {
        // try_join_all keeps input order regardless of completion order.
        try_join_all(
            filenames
                .iter()
                .map(|filename| self.download_image(version, filename)),
        )
        .await
    }
}

/// Wire shape of the account record fields this crate cares about.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AccountRecord {
    #[serde(default)]
    has_viewed_onboarding_story: bool,
}

/// Pulls the account record over HTTP and mirrors the view flag locally.
pub struct HttpAccountSync {
    url: String,
    token: Option<SecretString>,
    client: reqwest::Client,
    store: Arc<dyn StoryStore>,
}

impl HttpAccountSync {
    pub fn new(
        url: &str,
        token: Option<SecretString>,
        timeout: Duration,
        store: Arc<dyn StoryStore>,
    ) -> Self {
        Self {
            url: url.to_string(),
            token,
            client: build_client(timeout),
            store,
        }
    }
}

#[async_trait]
impl AccountSync for HttpAccountSync {
    async fn run_sync(&self) -> Result<(), SyncError> {
        let mut request = self.client.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token.expose_secret());
        }

        let resp = request
            .send()
            .await
            .map_err(|e| SyncError::Failed(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(SyncError::Failed(format!(
                "account record request returned HTTP {}",
                resp.status()
            )));
        }
        let record: AccountRecord = resp
            .json()
            .await
            .map_err(|e| SyncError::Failed(format!("invalid account record: {e}")))?;

        mirror_view_flag(self.store.as_ref(), record.has_viewed_onboarding_story).await
    }
}

/// The flag only moves from false to true.
async fn mirror_view_flag(store: &dyn StoryStore, remote_viewed: bool) -> Result<(), SyncError> {
    if remote_viewed && !store.has_viewed().await.map_err(|e| SyncError::Failed(e.to_string()))? {
        store
            .set_has_viewed(true)
            .await
            .map_err(|e| SyncError::Failed(e.to_string()))?;
        info!("Onboarding story was viewed on another device");
    }
    Ok(())
}

/// Sync that completes immediately; the local flag stays authoritative.
#[derive(Debug, Default)]
pub struct NoopAccountSync;

#[async_trait]
impl AccountSync for NoopAccountSync {
    async fn run_sync(&self) -> Result<(), SyncError> {
        debug!("No account endpoint configured, skipping sync");
        Ok(())
    }
}
