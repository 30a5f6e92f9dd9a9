//! Postpilot - content-to-social-post automation
//!
//! This library turns ingested content into platform-targeted posts that
//! optionally pass through human approval before scheduled publication.
//! The lifecycle is driven by independent periodic triggers; concurrency
//! safety comes from conditional state transitions, not from coordination
//! between the triggers.

pub mod approval;
pub mod channel;
pub mod config;
pub mod content;
pub mod credentials;
pub mod db;
pub mod error;
pub mod logging;
pub mod orchestrator;
pub mod publishers;
pub mod scheduling;
pub mod triggers;
pub mod types;

// Re-export commonly used types
pub use approval::ApprovalGateway;
pub use config::Config;
pub use credentials::CredentialManager;
pub use db::Database;
pub use error::{PostPilotError, Result};
pub use orchestrator::{GenerateRequest, PostOrchestrator};
pub use types::{ApprovalStatus, Platform, Post, PostStatus};
