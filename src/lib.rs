//! Onboarding story — downloads, persists and retires the system onboarding story.

pub mod attachments;
pub mod config;
pub mod error;
pub mod locale;
pub mod store;
pub mod story;
pub mod transport;
