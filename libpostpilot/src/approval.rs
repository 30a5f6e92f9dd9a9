//! Approval gateway
//!
//! Bridges the orchestrator and the human-operated message channel: sends
//! approval prompts with decodable action tokens, maps inbound responses to
//! lifecycle transitions, and delivers best-effort outcome notifications.
//!
//! The gateway never writes post state itself. Every resolution goes through
//! the orchestrator's conditional transition API, which also makes duplicate
//! responses harmless: the second one finds nothing pending and no-ops.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::channel::{decode_action, encode_action, ActionKind, InboundEvent, MessageChannel};
use crate::db::Database;
use crate::error::ApprovalSendError;
use crate::orchestrator::PostOrchestrator;
use crate::scheduling::APPROVAL_WINDOW_SECS;
use crate::types::{ApprovalDecision, ApprovalRequest, Platform, Post};

/// Result of one publish attempt, as reported to the originating actor.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Succeeded { url: Option<String> },
    Failed { error: String },
}

pub struct ApprovalGateway {
    db: Arc<Database>,
    channel: Arc<dyn MessageChannel>,
}

impl ApprovalGateway {
    pub fn new(db: Arc<Database>, channel: Arc<dyn MessageChannel>) -> Self {
        Self { db, channel }
    }

    /// Send an approval prompt for a post and record the outstanding request.
    ///
    /// Returns the channel's opaque message reference. Any failure along the
    /// way (send or bookkeeping) surfaces as `ApprovalSendError`, which the
    /// orchestrator answers with its auto-approve fallback.
    pub async fn send_approval_request(
        &self,
        destination: &str,
        post: &Post,
    ) -> std::result::Result<String, ApprovalSendError> {
        let text = approval_prompt(post);
        let actions: Vec<String> = ActionKind::all()
            .iter()
            .map(|kind| encode_action(*kind, &post.id))
            .collect();

        let message_ref = self.channel.send(destination, &text, &actions).await?;

        let now = chrono::Utc::now().timestamp();
        let request = ApprovalRequest::new(
            post.id.clone(),
            destination.to_string(),
            now,
            now + APPROVAL_WINDOW_SECS,
        );

        if let Err(e) = self.db.create_approval_request(&request).await {
            // The prompt is out but we cannot track it; treat the whole send
            // as failed so the post is not left waiting on an answer nobody
            // recorded. A late response then simply finds nothing pending.
            warn!(post_id = %post.id, error = %e, "failed to record approval request");
            return Err(ApprovalSendError(format!(
                "approval request not recorded: {}",
                e
            )));
        }

        info!(post_id = %post.id, destination, message_ref = %message_ref, "approval request sent");
        Ok(message_ref)
    }

    /// Single ingestion entry point for inbound channel events.
    ///
    /// Decodes structured actions and free-text replies, dispatches to the
    /// orchestrator, and swallows everything else. Never returns an error:
    /// the inbound channel expects a fast acknowledgment regardless of what
    /// happened internally.
    pub async fn handle_inbound_event(
        &self,
        orchestrator: &PostOrchestrator,
        event: InboundEvent,
    ) {
        match event {
            InboundEvent::Action { token, actor } => {
                let Some((kind, post_id)) = decode_action(&token) else {
                    debug!(%token, "ignoring unrecognized action token");
                    return;
                };

                match kind {
                    ActionKind::Approve => {
                        self.dispatch_resolution(
                            orchestrator,
                            &post_id,
                            ApprovalDecision::Approved,
                            &actor,
                        )
                        .await;
                    }
                    ActionKind::Reject => {
                        self.dispatch_resolution(
                            orchestrator,
                            &post_id,
                            ApprovalDecision::Rejected,
                            &actor,
                        )
                        .await;
                    }
                    ActionKind::Edit | ActionKind::Schedule => {
                        debug!(%post_id, action = kind.as_str(), "action not supported");
                    }
                }
            }
            InboundEvent::Text {
                sender,
                body,
                actor,
            } => {
                let Some(decision) = classify_reply(&body) else {
                    debug!(%sender, "ignoring unrecognized reply");
                    return;
                };

                match self.db.latest_unresolved_for_destination(&sender).await {
                    Ok(Some(request)) => {
                        self.dispatch_resolution(orchestrator, &request.post_id, decision, &actor)
                            .await;
                    }
                    Ok(None) => {
                        debug!(%sender, "reply without an outstanding approval request");
                    }
                    Err(e) => {
                        warn!(%sender, error = %e, "failed to scope free-text reply");
                    }
                }
            }
        }
    }

    async fn dispatch_resolution(
        &self,
        orchestrator: &PostOrchestrator,
        post_id: &str,
        decision: ApprovalDecision,
        actor: &str,
    ) {
        match orchestrator.resolve_approval(post_id, decision, actor).await {
            Ok(outcome) => {
                debug!(post_id, actor, ?decision, ?outcome, "approval event handled");
            }
            Err(e) => {
                warn!(post_id, actor, error = %e, "approval event failed");
            }
        }
    }

    /// Best-effort, fire-and-forget outcome notification. A delivery failure
    /// is logged and never reverses the underlying transition.
    pub async fn notify_outcome(
        &self,
        destination: &str,
        platform: Platform,
        outcome: &PublishOutcome,
    ) {
        let text = match outcome {
            PublishOutcome::Succeeded { url } => match url {
                Some(url) => format!("Post published on {}: {}", platform, url),
                None => format!("Post published on {}.", platform),
            },
            PublishOutcome::Failed { error } => {
                format!("Publishing on {} failed: {}", platform, error)
            }
        };

        if let Err(e) = self.channel.send(destination, &text, &[]).await {
            warn!(destination, platform = %platform, error = %e, "outcome notification failed");
        }
    }
}

/// Human-readable approval prompt for a post.
fn approval_prompt(post: &Post) -> String {
    let mut text = format!(
        "New post for {}\n\n{}\n",
        post.platform, post.content
    );
    if !post.hashtags.is_empty() {
        let tags: Vec<String> = post
            .hashtags
            .iter()
            .map(|t| format!("#{}", t.trim_start_matches('#')))
            .collect();
        text.push_str(&format!("\nHashtags: {}\n", tags.join(" ")));
    }
    text.push_str("\nApprove publication?");
    text
}

/// Map a free-text reply to a decision, or None when it is neither clearly
/// affirmative nor clearly negative.
fn classify_reply(body: &str) -> Option<ApprovalDecision> {
    match body.trim().to_lowercase().as_str() {
        "yes" | "y" | "ok" | "approve" | "approved" | "si" | "sí" => {
            Some(ApprovalDecision::Approved)
        }
        "no" | "n" | "reject" | "rejected" => Some(ApprovalDecision::Rejected),
        _ => None,
    }
}
