//! Storage-side collaborator traits used by the story coordinator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::story::message::StoryMessage;
use crate::story::state::StoryRecord;

/// Settings keys owned by the onboarding story.
pub mod settings_keys {
    /// Mirror of the account record's view flag (JSON bool).
    pub const HAS_VIEWED_ONBOARDING_STORY: &str = "hasViewedOnboardingStory";
    /// The `StoryRecord` (JSON object).
    pub const ONBOARDING_STORY: &str = "onboardingStory";
}

/// The singleton system conversation hosting the story.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemConversation {
    pub id: Uuid,
    /// Identity messages in this conversation are attributed to.
    pub service_id: String,
    pub name: String,
}

/// Narrow local key-value interface for story state.
///
/// Individual reads and writes are atomic; there are no cross-key transactions.
#[async_trait]
pub trait StoryStore: Send + Sync {
    /// Local mirror of `hasViewedOnboardingStory`. Missing means false.
    async fn has_viewed(&self) -> Result<bool, DatabaseError>;

    /// Update the local mirror. Durable on return.
    async fn set_has_viewed(&self, viewed: bool) -> Result<(), DatabaseError>;

    /// Load the story record, if one was ever written.
    async fn load_record(&self) -> Result<Option<StoryRecord>, DatabaseError>;

    /// Replace the story record. Durable on return.
    async fn save_record(&self, record: &StoryRecord) -> Result<(), DatabaseError>;
}

/// Batched message persistence.
#[async_trait]
pub trait MessageWriter: Send + Sync {
    /// Durably write every message, or fail.
    async fn save_messages(&self, messages: &[StoryMessage]) -> Result<(), DatabaseError>;

    /// Delete messages by id. Unknown ids are ignored. Returns the number removed.
    async fn delete_messages(&self, ids: &[Uuid]) -> Result<usize, DatabaseError>;
}

/// Source of the system conversation.
#[async_trait]
pub trait ConversationProvider: Send + Sync {
    /// Return the system conversation, creating it on first use.
    async fn get_or_create_system_conversation(&self) -> Result<SystemConversation, DatabaseError>;
}

/// Removes a downloaded story after the user viewed it.
#[async_trait]
pub trait StoryCleanup: Send + Sync {
    /// Delete the local story if one exists. Idempotent.
    async fn find_and_delete_if_exists(&self) -> Result<(), DatabaseError>;
}
