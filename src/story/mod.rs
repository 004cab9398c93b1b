//! Onboarding story — a short run of system images shown once per account.
//!
//! The coordinator reconciles local state with the synced account record,
//! downloads the story at most once, and removes it after it was viewed.

pub mod coordinator;
pub mod manifest;
pub mod message;
pub mod state;

pub use coordinator::{
    CoordinatorSettings, DownloadTrigger, OnboardingStoryCoordinator, StoryDeps, StoryEvent,
    StoryOutcome,
};
pub use manifest::{LocaleFallback, Manifest};
pub use message::{ReadStatus, SeenStatus, StoryMessage};
pub use state::{StoryPhase, StoryRecord};
