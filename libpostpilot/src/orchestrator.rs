//! Post lifecycle orchestration
//!
//! The orchestrator is the single owner of post state. It decides whether a
//! freshly generated post needs approval, computes publish slots, claims and
//! publishes due posts, and records outcomes. Every transition is a guarded
//! update through the store, so the periodic triggers driving these
//! operations may overlap freely: whoever hits the guard first wins and the
//! others no-op.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, warn};

use crate::approval::{ApprovalGateway, PublishOutcome};
use crate::content::{
    adapt_for_platform, ContentFeed, ContentGenerator, GenerationPreferences, SourceContent,
    UserDirectory,
};
use crate::credentials::CredentialManager;
use crate::db::Database;
use crate::error::{PostPilotError, Result};
use crate::publishers::{PublishContent, PublisherRegistry};
use crate::scheduling::{approval_cutoff, next_preferred_slot_ts};
use crate::types::{ApprovalDecision, ApprovalResolution, Platform, Post, PostStatus};

/// Default worker-pool width for publish sweeps. Kept small so a batch does
/// not overwhelm rate-limited platform APIs.
pub const DEFAULT_PUBLISH_WORKERS: usize = 5;

/// Request to generate posts for one piece of source content.
#[derive(Debug, Clone)]
pub struct GenerateRequest {
    pub source: SourceContent,
    pub user_id: String,
    pub platforms: Vec<Platform>,
    pub require_approval: bool,
    pub preferences: GenerationPreferences,
}

/// Per-platform result of a generate call.
#[derive(Debug, Clone)]
pub struct PostOutcome {
    pub platform: Platform,
    pub post_id: Option<String>,
    pub status: Option<PostStatus>,
    pub error: Option<String>,
}

/// Result of a resolve call. `AlreadyResolved` and `NotFound` are defined
/// no-ops, which is what makes duplicate human input safe to replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Approved,
    Rejected,
    AlreadyResolved,
    NotFound,
}

/// Tally of one publish sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub due: usize,
    pub published: usize,
    pub failed: usize,
    /// Claim misses: another sweep got there first.
    pub skipped: usize,
}

enum ItemResult {
    Published,
    Failed,
    Skipped,
}

pub struct PostOrchestrator {
    db: Arc<Database>,
    gateway: Arc<ApprovalGateway>,
    credentials: Arc<CredentialManager>,
    publishers: PublisherRegistry,
    generator: Arc<dyn ContentGenerator>,
    feed: Arc<dyn ContentFeed>,
    directory: Arc<dyn UserDirectory>,
    publish_workers: usize,
}

impl PostOrchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<ApprovalGateway>,
        credentials: Arc<CredentialManager>,
        publishers: PublisherRegistry,
        generator: Arc<dyn ContentGenerator>,
        feed: Arc<dyn ContentFeed>,
        directory: Arc<dyn UserDirectory>,
        publish_workers: usize,
    ) -> Self {
        Self {
            db,
            gateway,
            credentials,
            publishers,
            generator,
            feed,
            directory,
            publish_workers: publish_workers.max(1),
        }
    }

    /// Generate one post per requested platform from a piece of source
    /// content.
    ///
    /// Generator failures are isolated per platform. Without required
    /// approval the post is auto-approved into the next publish slot. With
    /// required approval the post waits on the gateway; if the approval
    /// channel cannot take the request, the post falls back to the
    /// auto-approved path rather than sticking in draft (delivery
    /// degradation, logged at warn).
    pub async fn generate(&self, request: &GenerateRequest) -> Result<Vec<PostOutcome>> {
        let now = chrono::Utc::now().timestamp();
        let mut outcomes = Vec::with_capacity(request.platforms.len());

        for platform in &request.platforms {
            let generated = match self
                .generator
                .generate(&request.source, &request.preferences)
                .await
            {
                Ok(generated) => generated,
                Err(e) => {
                    warn!(
                        platform = %platform,
                        source = %request.source.reference,
                        error = %e,
                        "content generation failed"
                    );
                    outcomes.push(PostOutcome {
                        platform: *platform,
                        post_id: None,
                        status: None,
                        error: Some(e.to_string()),
                    });
                    continue;
                }
            };

            let adapted = adapt_for_platform(&generated.text, &generated.hashtags, *platform);
            let post = Post::new(
                request.user_id.clone(),
                request.source.reference.clone(),
                *platform,
                adapted.body,
                adapted.hashtags,
            );

            if let Err(e) = self.db.create_post(&post).await {
                warn!(platform = %platform, error = %e, "failed to store generated post");
                outcomes.push(PostOutcome {
                    platform: *platform,
                    post_id: None,
                    status: None,
                    error: Some(e.to_string()),
                });
                continue;
            }

            let status = if request.require_approval {
                self.route_through_approval(&post, now).await?
            } else {
                self.schedule_auto_approved(&post.id, now).await?
            };

            outcomes.push(PostOutcome {
                platform: *platform,
                post_id: Some(post.id),
                status: Some(status),
                error: None,
            });
        }

        Ok(outcomes)
    }

    /// Try to park the post behind a human approval; fall back to
    /// auto-approval when the channel is unavailable.
    async fn route_through_approval(&self, post: &Post, now: i64) -> Result<PostStatus> {
        let destination = self.directory.destination_for(&post.user_id);

        let send_result = match destination {
            Some(destination) => self.gateway.send_approval_request(&destination, post).await,
            None => Err(crate::error::ApprovalSendError(format!(
                "no approval destination configured for user {}",
                post.user_id
            ))),
        };

        match send_result {
            Ok(message_ref) => {
                self.db
                    .mark_pending_approval_if_draft(&post.id, &message_ref)
                    .await?;
                info!(post_id = %post.id, "post waiting for approval");
                Ok(PostStatus::PendingApproval)
            }
            Err(e) => {
                warn!(
                    post_id = %post.id,
                    error = %e,
                    "approval request undeliverable, falling back to auto-approval"
                );
                self.schedule_auto_approved(&post.id, now).await
            }
        }
    }

    async fn schedule_auto_approved(&self, post_id: &str, now: i64) -> Result<PostStatus> {
        let slot = next_preferred_slot_ts(now);
        self.db.schedule_if_draft(post_id, slot).await?;
        info!(post_id, scheduled_for = slot, "post scheduled");
        Ok(PostStatus::Scheduled)
    }

    /// Apply a human approval decision.
    ///
    /// Conditional on the approval still being pending; an already-resolved
    /// post reports `AlreadyResolved` and changes nothing, so duplicate
    /// responses are harmless.
    pub async fn resolve_approval(
        &self,
        post_id: &str,
        decision: ApprovalDecision,
        actor: &str,
    ) -> Result<ResolveOutcome> {
        let now = chrono::Utc::now().timestamp();

        if self.db.get_post(post_id).await?.is_none() {
            debug!(post_id, "resolution for unknown post");
            return Ok(ResolveOutcome::NotFound);
        }

        let applied = match decision {
            ApprovalDecision::Approved => {
                let slot = next_preferred_slot_ts(now);
                self.db.approve_if_pending(post_id, slot).await?
            }
            ApprovalDecision::Rejected => self.db.reject_if_pending(post_id).await?,
        };

        if !applied {
            debug!(post_id, actor, "approval already resolved");
            return Ok(ResolveOutcome::AlreadyResolved);
        }

        self.db
            .resolve_requests_for_post(post_id, ApprovalResolution::from(decision), Some(actor), now)
            .await?;

        match decision {
            ApprovalDecision::Approved => {
                info!(post_id, actor, "post approved");
                Ok(ResolveOutcome::Approved)
            }
            ApprovalDecision::Rejected => {
                info!(post_id, actor, "post rejected");
                Ok(ResolveOutcome::Rejected)
            }
        }
    }

    /// Cancel posts whose approval window has lapsed. Returns how many posts
    /// this sweep actually expired; posts resolved concurrently by a human
    /// are skipped without error.
    pub async fn expire_stale_pending_approvals(&self, now: i64) -> Result<u64> {
        let cutoff = approval_cutoff(now);
        let stale = self.db.list_stale_pending(cutoff).await?;
        let mut expired = 0u64;

        for post in stale {
            if self.db.expire_if_pending(&post.id).await? {
                self.db
                    .resolve_requests_for_post(&post.id, ApprovalResolution::Expired, None, now)
                    .await?;
                info!(post_id = %post.id, "approval window lapsed, post cancelled");
                expired += 1;
            }
        }

        if expired > 0 {
            info!(expired, "expiry sweep finished");
        }
        Ok(expired)
    }

    /// Publish every approved post that is due at `now`.
    ///
    /// Each post is claimed (`Scheduled -> Publishing`) before its adapter
    /// call; a missed claim means another overlapping sweep owns the post and
    /// is counted as skipped. Items run on a bounded worker pool and one
    /// item's failure never disturbs the rest of the batch.
    pub async fn publish_due_batch(&self, now: i64) -> Result<BatchReport> {
        let due = self.db.list_due_posts(now).await?;
        let mut report = BatchReport {
            due: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            return Ok(report);
        }

        debug!(due = report.due, "publish sweep starting");

        let results: Vec<ItemResult> = stream::iter(due)
            .map(|post| self.publish_one(post, now))
            .buffer_unordered(self.publish_workers)
            .collect()
            .await;

        for result in results {
            match result {
                ItemResult::Published => report.published += 1,
                ItemResult::Failed => report.failed += 1,
                ItemResult::Skipped => report.skipped += 1,
            }
        }

        info!(
            due = report.due,
            published = report.published,
            failed = report.failed,
            skipped = report.skipped,
            "publish sweep finished"
        );
        Ok(report)
    }

    async fn publish_one(&self, post: Post, now: i64) -> ItemResult {
        match self.db.claim_for_publishing(&post.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(post_id = %post.id, "claim missed, another sweep owns this post");
                return ItemResult::Skipped;
            }
            Err(e) => {
                warn!(post_id = %post.id, error = %e, "claim failed");
                return ItemResult::Skipped;
            }
        }

        // Claimed: from here on the post must land in published or failed.
        let token = match self
            .credentials
            .get_valid_token(&post.user_id, post.platform)
            .await
        {
            Ok(token) => token,
            Err(e) => {
                return self.fail_claimed(&post, &e.to_string(), false).await;
            }
        };

        let Some(publisher) = self.publishers.get(post.platform) else {
            return self
                .fail_claimed(&post, "no publisher adapter registered", false)
                .await;
        };

        let content = PublishContent {
            body: post.content.clone(),
            hashtags: post.hashtags.clone(),
        };

        match publisher.publish(&content, &token).await {
            Ok(artifact) => {
                if let Err(e) = self
                    .db
                    .mark_published_if_publishing(
                        &post.id,
                        now,
                        &artifact.external_id,
                        artifact.external_url.as_deref(),
                    )
                    .await
                {
                    error!(post_id = %post.id, error = %e, "published but could not record");
                    return ItemResult::Failed;
                }

                info!(
                    post_id = %post.id,
                    platform = %post.platform,
                    external_id = %artifact.external_id,
                    "post published"
                );
                self.notify(&post, PublishOutcome::Succeeded {
                    url: artifact.external_url.clone(),
                })
                .await;
                ItemResult::Published
            }
            Err(e) => {
                if e.is_retryable() {
                    warn!(post_id = %post.id, platform = %post.platform, error = %e, "publish failed");
                } else {
                    error!(post_id = %post.id, platform = %post.platform, error = %e, "publish failed");
                }
                self.fail_claimed(&post, &PostPilotError::from(e).to_string(), true)
                    .await
            }
        }
    }

    async fn fail_claimed(&self, post: &Post, message: &str, bump_retry: bool) -> ItemResult {
        if let Err(e) = self
            .db
            .mark_failed_if_publishing(&post.id, message, bump_retry)
            .await
        {
            error!(post_id = %post.id, error = %e, "could not record publish failure");
        }

        self.notify(post, PublishOutcome::Failed {
            error: message.to_string(),
        })
        .await;
        ItemResult::Failed
    }

    async fn notify(&self, post: &Post, outcome: PublishOutcome) {
        let Some(destination) = self.directory.destination_for(&post.user_id) else {
            debug!(post_id = %post.id, "no notification destination for user");
            return;
        };
        self.gateway
            .notify_outcome(&destination, post.platform, &outcome)
            .await;
    }

    /// Drain the content feed and generate posts for every pending item.
    /// Per-item failures are logged and isolated; consumed items are marked
    /// so later sweeps skip them.
    pub async fn auto_generate(&self) -> Result<Vec<PostOutcome>> {
        let pending = self.feed.pending().await?;
        let mut outcomes = Vec::new();

        for item in pending {
            let request = GenerateRequest {
                source: item.source,
                user_id: item.user_id,
                platforms: item.platforms,
                require_approval: item.require_approval,
                preferences: GenerationPreferences::default(),
            };

            match self.generate(&request).await {
                Ok(mut generated) => {
                    if let Err(e) = self.feed.mark_consumed(&request.source.reference).await {
                        warn!(
                            source = %request.source.reference,
                            error = %e,
                            "could not mark feed item consumed"
                        );
                    }
                    outcomes.append(&mut generated);
                }
                Err(e) => {
                    warn!(source = %request.source.reference, error = %e, "generation sweep item failed");
                }
            }
        }

        Ok(outcomes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::mock::MockChannel;
    use crate::content::mock::{MockDirectory, MockFeed, MockGenerator};
    use crate::credentials::mock::MockRefresher;
    use crate::error::PlatformError;
    use crate::publishers::mock::MockPublisher;
    use crate::types::{ApprovalStatus, PlatformCredential};
    use tempfile::TempDir;

    struct Harness {
        db: Arc<Database>,
        channel: Arc<MockChannel>,
        orchestrator: PostOrchestrator,
        _tmp: TempDir,
    }

    async fn harness(channel: MockChannel, publishers: PublisherRegistry) -> Harness {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());

        let channel = Arc::new(channel);
        let gateway = Arc::new(ApprovalGateway::new(
            Arc::clone(&db),
            channel.clone() as Arc<dyn crate::channel::MessageChannel>,
        ));
        let credentials = Arc::new(CredentialManager::new(
            Arc::clone(&db),
            Arc::new(MockRefresher::success(3_600)),
        ));

        let orchestrator = PostOrchestrator::new(
            Arc::clone(&db),
            gateway,
            credentials,
            publishers,
            Arc::new(MockGenerator::success(vec!["rust".to_string()])),
            Arc::new(MockFeed::default()),
            Arc::new(MockDirectory::with(&[("user-1", "chat-1")])),
            DEFAULT_PUBLISH_WORKERS,
        );

        Harness {
            db,
            channel,
            orchestrator,
            _tmp: tmp,
        }
    }

    fn request(platforms: Vec<Platform>, require_approval: bool) -> GenerateRequest {
        GenerateRequest {
            source: SourceContent {
                reference: "item-1".to_string(),
                title: "Release notes".to_string(),
                summary: "Plenty of fixes".to_string(),
                url: None,
            },
            user_id: "user-1".to_string(),
            platforms,
            require_approval,
            preferences: GenerationPreferences::default(),
        }
    }

    async fn seed_credential(db: &Database) {
        db.upsert_credential(&PlatformCredential {
            user_id: "user-1".to_string(),
            platform: Platform::Bluesky,
            access_token: "valid-token".to_string(),
            refresh_token: None,
            expires_at: chrono::Utc::now().timestamp() + 3_600,
            updated_at: 0,
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_generate_auto_approved() {
        let h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], false))
            .await
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].status, Some(PostStatus::Scheduled));

        let post = h
            .db
            .get_post(outcomes[0].post_id.as_ref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(post.approval_status, ApprovalStatus::AutoApproved);
        assert_eq!(
            post.scheduled_for,
            Some(next_preferred_slot_ts(post.created_at))
        );
        // No approval traffic on the auto path.
        assert_eq!(h.channel.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_generate_with_approval() {
        let h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], true))
            .await
            .unwrap();
        assert_eq!(outcomes[0].status, Some(PostStatus::PendingApproval));

        let post = h
            .db
            .get_post(outcomes[0].post_id.as_ref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(post.status, PostStatus::PendingApproval);
        assert_eq!(post.approval_status, ApprovalStatus::Pending);
        assert!(post.approval_message_ref.is_some());
        assert_eq!(h.channel.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_generate_falls_back_when_channel_down() {
        let h = harness(MockChannel::unreachable("offline"), PublisherRegistry::new()).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], true))
            .await
            .unwrap();
        // Not stuck in draft: scheduled on the auto-approved path.
        assert_eq!(outcomes[0].status, Some(PostStatus::Scheduled));

        let post = h
            .db
            .get_post(outcomes[0].post_id.as_ref().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(post.approval_status, ApprovalStatus::AutoApproved);
    }

    #[tokio::test]
    async fn test_generate_isolates_sibling_platforms() {
        let mut h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;
        h.orchestrator.generator = Arc::new(MockGenerator::failure("model down"));

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky, Platform::Linkedin], false))
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            assert!(outcome.post_id.is_none());
            assert!(outcome.error.as_ref().unwrap().contains("model down"));
        }
    }

    #[tokio::test]
    async fn test_resolve_approval_idempotent() {
        let h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], true))
            .await
            .unwrap();
        let post_id = outcomes[0].post_id.clone().unwrap();

        let first = h
            .orchestrator
            .resolve_approval(&post_id, ApprovalDecision::Approved, "alice")
            .await
            .unwrap();
        assert_eq!(first, ResolveOutcome::Approved);

        // Same decision again, and a conflicting one: both no-ops.
        let dup = h
            .orchestrator
            .resolve_approval(&post_id, ApprovalDecision::Approved, "alice")
            .await
            .unwrap();
        assert_eq!(dup, ResolveOutcome::AlreadyResolved);

        let conflicting = h
            .orchestrator
            .resolve_approval(&post_id, ApprovalDecision::Rejected, "bob")
            .await
            .unwrap();
        assert_eq!(conflicting, ResolveOutcome::AlreadyResolved);

        let post = h.db.get_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Scheduled);
        assert_eq!(post.approval_status, ApprovalStatus::Approved);
    }

    #[tokio::test]
    async fn test_resolve_approval_unknown_post() {
        let h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let outcome = h
            .orchestrator
            .resolve_approval("no-such-post", ApprovalDecision::Approved, "alice")
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_publish_due_batch_success() {
        let mut publishers = PublisherRegistry::new();
        let publisher = MockPublisher::success(Platform::Bluesky);
        let (calls, _bodies) = publisher.counters();
        publishers.register(Arc::new(publisher));

        let h = harness(MockChannel::reachable(), publishers).await;
        seed_credential(&h.db).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], false))
            .await
            .unwrap();
        let post_id = outcomes[0].post_id.clone().unwrap();
        let post = h.db.get_post(&post_id).await.unwrap().unwrap();

        // Sweep at the scheduled time.
        let report = h
            .orchestrator
            .publish_due_batch(post.scheduled_for.unwrap())
            .await
            .unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(report.failed, 0);
        assert_eq!(*calls.lock().unwrap(), 1);

        let post = h.db.get_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Published);
        assert!(post.external_id.is_some());
        assert!(post.published_at.is_some());

        // Outcome notification went out.
        assert!(h
            .channel
            .sent()
            .iter()
            .any(|m| m.text.contains("published on bluesky")));
    }

    #[tokio::test]
    async fn test_publish_due_batch_nothing_due() {
        let h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let report = h.orchestrator.publish_due_batch(0).await.unwrap();
        assert_eq!(report, BatchReport::default());
    }

    #[tokio::test]
    async fn test_publish_platform_failure_is_terminal() {
        let mut publishers = PublisherRegistry::new();
        publishers.register(Arc::new(MockPublisher::failure(
            Platform::Bluesky,
            PlatformError::RateLimited("try later".to_string()),
        )));

        let h = harness(MockChannel::reachable(), publishers).await;
        seed_credential(&h.db).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], false))
            .await
            .unwrap();
        let post_id = outcomes[0].post_id.clone().unwrap();
        let post = h.db.get_post(&post_id).await.unwrap().unwrap();

        let report = h
            .orchestrator
            .publish_due_batch(post.scheduled_for.unwrap())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        let post = h.db.get_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Failed);
        assert_eq!(post.retry_count, 1);
        assert!(post.error_message.unwrap().contains("Rate limit"));

        // Still due? No: failed posts are terminal and never reselected.
        let report = h
            .orchestrator
            .publish_due_batch(chrono::Utc::now().timestamp() + 1_000_000)
            .await
            .unwrap();
        assert_eq!(report.due, 0);
    }

    #[tokio::test]
    async fn test_publish_missing_credential_fails_without_retry_bump() {
        let mut publishers = PublisherRegistry::new();
        publishers.register(Arc::new(MockPublisher::success(Platform::Bluesky)));

        let h = harness(MockChannel::reachable(), publishers).await;
        // No credential seeded.

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], false))
            .await
            .unwrap();
        let post_id = outcomes[0].post_id.clone().unwrap();
        let post = h.db.get_post(&post_id).await.unwrap().unwrap();

        let report = h
            .orchestrator
            .publish_due_batch(post.scheduled_for.unwrap())
            .await
            .unwrap();
        assert_eq!(report.failed, 1);

        let post = h.db.get_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Failed);
        assert_eq!(post.retry_count, 0);
        assert!(post.error_message.unwrap().contains("No credential"));
    }

    const APPROVAL_WINDOW_TEST: i64 = crate::scheduling::APPROVAL_WINDOW_SECS;

    #[tokio::test]
    async fn test_expire_stale_pending() {
        let h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let outcomes = h
            .orchestrator
            .generate(&request(vec![Platform::Bluesky], true))
            .await
            .unwrap();
        let post_id = outcomes[0].post_id.clone().unwrap();
        let post = h.db.get_post(&post_id).await.unwrap().unwrap();

        // Just inside the window: nothing expires.
        let expired = h
            .orchestrator
            .expire_stale_pending_approvals(post.created_at + APPROVAL_WINDOW_TEST - 10)
            .await
            .unwrap();
        assert_eq!(expired, 0);

        // Past the window: the post is cancelled.
        let expired = h
            .orchestrator
            .expire_stale_pending_approvals(post.created_at + APPROVAL_WINDOW_TEST + 10)
            .await
            .unwrap();
        assert_eq!(expired, 1);

        let post = h.db.get_post(&post_id).await.unwrap().unwrap();
        assert_eq!(post.status, PostStatus::Cancelled);
        assert_eq!(post.approval_status, ApprovalStatus::Expired);

        // Late human approval after expiry: a defined no-op.
        let outcome = h
            .orchestrator
            .resolve_approval(&post_id, ApprovalDecision::Approved, "alice")
            .await
            .unwrap();
        assert_eq!(outcome, ResolveOutcome::AlreadyResolved);
    }

    #[tokio::test]
    async fn test_auto_generate_consumes_feed() {
        let mut h = harness(MockChannel::reachable(), PublisherRegistry::new()).await;

        let feed = Arc::new(MockFeed::with_items(vec![crate::content::FeedItem {
            source: SourceContent {
                reference: "item-9".to_string(),
                title: "Title".to_string(),
                summary: "Summary".to_string(),
                url: None,
            },
            user_id: "user-1".to_string(),
            platforms: vec![Platform::Bluesky, Platform::Mastodon],
            require_approval: false,
        }]));
        h.orchestrator.feed = feed.clone();

        let outcomes = h.orchestrator.auto_generate().await.unwrap();
        assert_eq!(outcomes.len(), 2);
        assert_eq!(feed.consumed(), vec!["item-9".to_string()]);

        // A second sweep finds nothing pending.
        let outcomes = h.orchestrator.auto_generate().await.unwrap();
        assert!(outcomes.is_empty());
    }
}
