//! Core types for Postpilot

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Publishing targets supported by the pipeline.
///
/// Limits and hashtag handling are fixed per platform: short-form platforms
/// fold hashtags into the body under a hard character ceiling, long-form
/// platforms carry hashtags as a separate field.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Platform {
    Mastodon,
    Bluesky,
    Linkedin,
}

impl Platform {
    /// Lowercase identifier used in storage, config, and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Mastodon => "mastodon",
            Platform::Bluesky => "bluesky",
            Platform::Linkedin => "linkedin",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "mastodon" => Some(Platform::Mastodon),
            "bluesky" => Some(Platform::Bluesky),
            "linkedin" => Some(Platform::Linkedin),
            _ => None,
        }
    }

    /// Hard character ceiling for the composed post body.
    pub fn character_limit(&self) -> usize {
        match self {
            Platform::Mastodon => 500,
            Platform::Bluesky => 280,
            Platform::Linkedin => 3000,
        }
    }

    /// Short-form platforms fold hashtags into the body; long-form platforms
    /// keep them as a separate field.
    pub fn folds_hashtags(&self) -> bool {
        match self {
            Platform::Mastodon | Platform::Bluesky => true,
            Platform::Linkedin => false,
        }
    }

    pub fn all() -> &'static [Platform] {
        &[Platform::Mastodon, Platform::Bluesky, Platform::Linkedin]
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of a post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PostStatus {
    Draft,
    PendingApproval,
    Scheduled,
    Publishing,
    Published,
    Failed,
    Rejected,
    Cancelled,
}

impl PostStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostStatus::Draft => "draft",
            PostStatus::PendingApproval => "pending_approval",
            PostStatus::Scheduled => "scheduled",
            PostStatus::Publishing => "publishing",
            PostStatus::Published => "published",
            PostStatus::Failed => "failed",
            PostStatus::Rejected => "rejected",
            PostStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "draft" => Some(PostStatus::Draft),
            "pending_approval" => Some(PostStatus::PendingApproval),
            "scheduled" => Some(PostStatus::Scheduled),
            "publishing" => Some(PostStatus::Publishing),
            "published" => Some(PostStatus::Published),
            "failed" => Some(PostStatus::Failed),
            "rejected" => Some(PostStatus::Rejected),
            "cancelled" => Some(PostStatus::Cancelled),
            _ => None,
        }
    }

    /// Terminal states are never left once entered.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PostStatus::Published
                | PostStatus::Failed
                | PostStatus::Rejected
                | PostStatus::Cancelled
        )
    }
}

impl std::fmt::Display for PostStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Approval sub-state of a post.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Expired,
    AutoApproved,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
            ApprovalStatus::Expired => "expired",
            ApprovalStatus::AutoApproved => "auto_approved",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            "expired" => Some(ApprovalStatus::Expired),
            "auto_approved" => Some(ApprovalStatus::AutoApproved),
            _ => None,
        }
    }
}

impl std::fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The joint (status, approval_status) combinations a post may occupy.
///
/// Every transition is a guarded update, so an off-table pair can only mean a
/// bug in the transition statements themselves. Tests assert against this.
pub fn is_valid_state_pair(status: PostStatus, approval: ApprovalStatus) -> bool {
    use ApprovalStatus as A;
    use PostStatus as S;
    match (status, approval) {
        // Draft exists only between insert and the first transition.
        (S::Draft, A::Pending) => true,
        (S::PendingApproval, A::Pending) => true,
        (S::Scheduled, A::Approved) | (S::Scheduled, A::AutoApproved) => true,
        (S::Publishing, A::Approved) | (S::Publishing, A::AutoApproved) => true,
        (S::Published, A::Approved) | (S::Published, A::AutoApproved) => true,
        (S::Failed, A::Approved) | (S::Failed, A::AutoApproved) => true,
        (S::Rejected, A::Rejected) => true,
        (S::Cancelled, A::Expired) => true,
        _ => false,
    }
}

/// One platform-targeted unit of generated content tracked through the
/// lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub user_id: String,
    pub source_ref: String,
    pub platform: Platform,
    pub content: String,
    pub hashtags: Vec<String>,
    pub status: PostStatus,
    pub approval_status: ApprovalStatus,
    pub scheduled_for: Option<i64>,
    pub published_at: Option<i64>,
    pub external_id: Option<String>,
    pub external_url: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub approval_message_ref: Option<String>,
    pub created_at: i64,
}

impl Post {
    /// Create a draft post. Every post starts here; the orchestrator moves it
    /// on with a guarded transition immediately after insert.
    pub fn new(
        user_id: String,
        source_ref: String,
        platform: Platform,
        content: String,
        hashtags: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id,
            source_ref,
            platform,
            content,
            hashtags,
            status: PostStatus::Draft,
            approval_status: ApprovalStatus::Pending,
            scheduled_for: None,
            published_at: None,
            external_id: None,
            external_url: None,
            error_message: None,
            retry_count: 0,
            approval_message_ref: None,
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}

/// Human decision carried by an inbound approval event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved,
    Rejected,
}

/// How an approval request ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ApprovalResolution {
    Approved,
    Rejected,
    Expired,
}

impl ApprovalResolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalResolution::Approved => "approved",
            ApprovalResolution::Rejected => "rejected",
            ApprovalResolution::Expired => "expired",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "approved" => Some(ApprovalResolution::Approved),
            "rejected" => Some(ApprovalResolution::Rejected),
            "expired" => Some(ApprovalResolution::Expired),
            _ => None,
        }
    }
}

impl From<ApprovalDecision> for ApprovalResolution {
    fn from(decision: ApprovalDecision) -> Self {
        match decision {
            ApprovalDecision::Approved => ApprovalResolution::Approved,
            ApprovalDecision::Rejected => ApprovalResolution::Rejected,
        }
    }
}

/// One outstanding or resolved approval message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub id: String,
    pub post_id: String,
    pub destination: String,
    pub sent_at: i64,
    pub expires_at: i64,
    pub resolved: bool,
    pub resolution: Option<ApprovalResolution>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<i64>,
}

impl ApprovalRequest {
    pub fn new(post_id: String, destination: String, sent_at: i64, expires_at: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            post_id,
            destination,
            sent_at,
            expires_at,
            resolved: false,
            resolution: None,
            resolved_by: None,
            resolved_at: None,
        }
    }
}

/// Per (user, platform) authorization material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformCredential {
    pub user_id: String,
    pub platform: Platform,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: i64,
    pub updated_at: i64,
}

impl PlatformCredential {
    pub fn is_expired(&self, now: i64) -> bool {
        now >= self.expires_at
    }
}

/// Reference to a successfully published artifact on an external platform.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PublishedArtifact {
    pub external_id: String,
    pub external_url: Option<String>,
}
