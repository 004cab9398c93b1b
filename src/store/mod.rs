//! Persistence layer — libSQL-backed storage for story state and messages.

pub mod libsql_backend;
pub mod migrations;
pub mod traits;

pub use libsql_backend::LibSqlBackend;
pub use traits::{ConversationProvider, MessageWriter, StoryCleanup, StoryStore, SystemConversation};
