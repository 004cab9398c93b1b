//! Story state machine — tracks how far the onboarding story got on this device.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StoryError;

/// Per-device phase of the onboarding story.
///
/// NotStarted → SyncPending → Downloading → Downloaded, with Deleted reachable
/// from every non-terminal phase once the user has viewed the story.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoryPhase {
    #[default]
    NotStarted,
    SyncPending,
    Downloading,
    Downloaded,
    Deleted,
}

impl StoryPhase {
    /// Check if a transition from `self` to `target` is valid.
    pub fn can_transition_to(&self, target: StoryPhase) -> bool {
        use StoryPhase::*;
        match (self, target) {
            (Deleted, _) => false,
            (_, Deleted) => true,
            _ => matches!(
                (self, target),
                (NotStarted, SyncPending)
                    | (NotStarted, Downloading)
                    | (SyncPending, Downloading)
                    | (Downloading, Downloading)
                    | (Downloading, Downloaded)
            ),
        }
    }

    /// Whether nothing further happens in this phase without user action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Downloaded | Self::Deleted)
    }
}

impl std::fmt::Display for StoryPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotStarted => "not_started",
            Self::SyncPending => "sync_pending",
            Self::Downloading => "downloading",
            Self::Downloaded => "downloaded",
            Self::Deleted => "deleted",
        };
        write!(f, "{s}")
    }
}

/// Persisted story record.
///
/// Stored in the `settings` table under key `"onboardingStory"`. Writing it
/// with `phase = Downloaded` is the commit point of a download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryRecord {
    pub phase: StoryPhase,
    /// Provisional ids while `Downloading`, committed ids once `Downloaded`.
    #[serde(default)]
    pub message_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manifest_version: Option<String>,
    /// Attachment files written for a provisional batch.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachment_paths: Vec<PathBuf>,
    pub updated_at: DateTime<Utc>,
}

impl Default for StoryRecord {
    fn default() -> Self {
        Self {
            phase: StoryPhase::NotStarted,
            message_ids: Vec::new(),
            manifest_version: None,
            attachment_paths: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

impl StoryRecord {
    /// Ids of a completed download, if any. Provisional ids never count.
    pub fn committed_message_ids(&self) -> Option<&[Uuid]> {
        match self.phase {
            StoryPhase::Downloaded => Some(&self.message_ids),
            _ => None,
        }
    }

    /// Ids written ahead of a batch that never committed.
    pub fn orphaned_message_ids(&self) -> Option<&[Uuid]> {
        match self.phase {
            StoryPhase::Downloading if !self.message_ids.is_empty() => Some(&self.message_ids),
            _ => None,
        }
    }

    /// Attachment files of a batch that never committed.
    pub fn orphaned_attachment_paths(&self) -> &[PathBuf] {
        match self.phase {
            StoryPhase::Downloading => &self.attachment_paths,
            _ => &[],
        }
    }

    /// Move to `target`, replacing the tracked ids. Tracked attachment paths are cleared.
    pub fn transition(
        &mut self,
        target: StoryPhase,
        message_ids: Vec<Uuid>,
        manifest_version: Option<String>,
    ) -> Result<(), StoryError> {
        if !self.phase.can_transition_to(target) {
            return Err(StoryError::InvalidTransition {
                from: self.phase.to_string(),
                to: target.to_string(),
            });
        }
        self.phase = target;
        self.message_ids = message_ids;
        self.manifest_version = manifest_version;
        self.attachment_paths.clear();
        self.updated_at = Utc::now();
        Ok(())
    }
}
