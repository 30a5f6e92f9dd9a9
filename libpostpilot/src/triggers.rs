//! Periodic trigger loops
//!
//! Four independent, uncoordinated loops drive the pipeline: content fetch,
//! post generation, the publish sweep, and the approval-expiry sweep. A
//! trigger owns no state: each tick calls exactly one batch operation and
//! logs the batch result. Overlap between loops (or between daemon
//! instances) is safe because every transition underneath is a guarded
//! update; the triggers themselves make no exclusivity assumptions.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::config::TriggersConfig;
use crate::content::ContentFeed;
use crate::error::Result;
use crate::orchestrator::PostOrchestrator;

/// Parsed trigger cadences.
#[derive(Debug, Clone, Copy)]
pub struct TriggerIntervals {
    pub fetch: Duration,
    pub generate: Duration,
    pub publish: Duration,
    pub expire: Duration,
}

impl TriggerIntervals {
    pub fn from_config(config: &TriggersConfig) -> Result<Self> {
        Ok(Self {
            fetch: config.fetch_interval()?,
            generate: config.generate_interval()?,
            publish: config.publish_interval()?,
            expire: config.expire_interval()?,
        })
    }
}

pub struct TriggerSet {
    orchestrator: Arc<PostOrchestrator>,
    feed: Arc<dyn ContentFeed>,
    intervals: TriggerIntervals,
}

impl TriggerSet {
    pub fn new(
        orchestrator: Arc<PostOrchestrator>,
        feed: Arc<dyn ContentFeed>,
        intervals: TriggerIntervals,
    ) -> Self {
        Self {
            orchestrator,
            feed,
            intervals,
        }
    }

    /// Spawn all four trigger loops. The returned handles run until aborted
    /// or the runtime shuts down.
    pub fn spawn(&self) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::with_capacity(4);

        {
            let feed = Arc::clone(&self.feed);
            let period = self.intervals.fetch;
            handles.push(tokio::spawn(async move {
                run_loop("fetch", period, move || {
                    let feed = Arc::clone(&feed);
                    async move {
                        match feed.refresh().await {
                            Ok(fetched) => debug!(fetched, "content fetch finished"),
                            Err(e) => warn!(error = %e, "content fetch failed"),
                        }
                    }
                })
                .await;
            }));
        }

        {
            let orchestrator = Arc::clone(&self.orchestrator);
            let period = self.intervals.generate;
            handles.push(tokio::spawn(async move {
                run_loop("generate", period, move || {
                    let orchestrator = Arc::clone(&orchestrator);
                    async move {
                        match orchestrator.auto_generate().await {
                            Ok(outcomes) => debug!(posts = outcomes.len(), "generation sweep finished"),
                            Err(e) => warn!(error = %e, "generation sweep failed"),
                        }
                    }
                })
                .await;
            }));
        }

        {
            let orchestrator = Arc::clone(&self.orchestrator);
            let period = self.intervals.publish;
            handles.push(tokio::spawn(async move {
                run_loop("publish", period, move || {
                    let orchestrator = Arc::clone(&orchestrator);
                    async move {
                        let now = chrono::Utc::now().timestamp();
                        match orchestrator.publish_due_batch(now).await {
                            Ok(report) => debug!(?report, "publish sweep finished"),
                            Err(e) => warn!(error = %e, "publish sweep failed"),
                        }
                    }
                })
                .await;
            }));
        }

        {
            let orchestrator = Arc::clone(&self.orchestrator);
            let period = self.intervals.expire;
            handles.push(tokio::spawn(async move {
                run_loop("expire", period, move || {
                    let orchestrator = Arc::clone(&orchestrator);
                    async move {
                        let now = chrono::Utc::now().timestamp();
                        match orchestrator.expire_stale_pending_approvals(now).await {
                            Ok(expired) => debug!(expired, "expiry sweep finished"),
                            Err(e) => warn!(error = %e, "expiry sweep failed"),
                        }
                    }
                })
                .await;
            }));
        }

        info!(
            fetch = ?self.intervals.fetch,
            generate = ?self.intervals.generate,
            publish = ?self.intervals.publish,
            expire = ?self.intervals.expire,
            "trigger loops started"
        );
        handles
    }

    /// Run each batch operation exactly once, in pipeline order. Used by the
    /// daemon's `--once` flag.
    pub async fn run_once(&self) -> Result<()> {
        let now = chrono::Utc::now().timestamp();

        if let Err(e) = self.feed.refresh().await {
            warn!(error = %e, "content fetch failed");
        }
        self.orchestrator.auto_generate().await?;
        self.orchestrator.publish_due_batch(now).await?;
        self.orchestrator.expire_stale_pending_approvals(now).await?;
        Ok(())
    }
}

/// Tick forever with a small random start offset, so several loops (or
/// several daemon instances) do not all fire at the same instant.
async fn run_loop<F, Fut>(name: &'static str, period: Duration, mut tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    tokio::time::sleep(start_jitter(period)).await;

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        debug!(trigger = name, "trigger fired");
        tick().await;
    }
}

fn start_jitter(period: Duration) -> Duration {
    let cap = (period / 10).min(Duration::from_secs(60));
    if cap.is_zero() {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=cap.as_millis() as u64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::approval::ApprovalGateway;
    use crate::channel::mock::MockChannel;
    use crate::content::mock::{MockDirectory, MockFeed, MockGenerator};
    use crate::content::{FeedItem, SourceContent};
    use crate::credentials::mock::MockRefresher;
    use crate::credentials::CredentialManager;
    use crate::db::Database;
    use crate::orchestrator::DEFAULT_PUBLISH_WORKERS;
    use crate::publishers::PublisherRegistry;
    use crate::types::Platform;
    use tempfile::TempDir;

    fn feed_item(reference: &str) -> FeedItem {
        FeedItem {
            source: SourceContent {
                reference: reference.to_string(),
                title: "Title".to_string(),
                summary: "Summary".to_string(),
                url: None,
            },
            user_id: "user-1".to_string(),
            platforms: vec![Platform::Bluesky],
            require_approval: false,
        }
    }

    async fn build(feed: Arc<MockFeed>) -> (Arc<PostOrchestrator>, Arc<Database>, TempDir) {
        let tmp = TempDir::new().unwrap();
        let db_path = tmp.path().join("test.db");
        let db = Arc::new(Database::new(db_path.to_str().unwrap()).await.unwrap());

        let gateway = Arc::new(ApprovalGateway::new(
            Arc::clone(&db),
            Arc::new(MockChannel::reachable()),
        ));
        let credentials = Arc::new(CredentialManager::new(
            Arc::clone(&db),
            Arc::new(MockRefresher::success(3_600)),
        ));

        let orchestrator = Arc::new(PostOrchestrator::new(
            Arc::clone(&db),
            gateway,
            credentials,
            PublisherRegistry::new(),
            Arc::new(MockGenerator::success(vec![])),
            feed,
            Arc::new(MockDirectory::default()),
            DEFAULT_PUBLISH_WORKERS,
        ));

        (orchestrator, db, tmp)
    }

    #[test]
    fn test_intervals_from_config() {
        let config = TriggersConfig::default();
        let intervals = TriggerIntervals::from_config(&config).unwrap();
        assert_eq!(intervals.fetch, Duration::from_secs(4 * 3600));
        assert_eq!(intervals.publish, Duration::from_secs(3600));
    }

    #[test]
    fn test_start_jitter_bounds() {
        for _ in 0..32 {
            let jitter = start_jitter(Duration::from_secs(600));
            assert!(jitter <= Duration::from_secs(60));
        }
        assert_eq!(start_jitter(Duration::ZERO), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_run_once_drives_whole_pipeline() {
        let feed = Arc::new(MockFeed::with_items(vec![feed_item("item-1")]));
        let (orchestrator, db, _tmp) = build(Arc::clone(&feed)).await;

        let triggers = TriggerSet::new(
            Arc::clone(&orchestrator),
            feed.clone(),
            TriggerIntervals {
                fetch: Duration::from_secs(1),
                generate: Duration::from_secs(1),
                publish: Duration::from_secs(1),
                expire: Duration::from_secs(1),
            },
        );

        triggers.run_once().await.unwrap();

        // The feed item became a scheduled post.
        assert_eq!(feed.consumed(), vec!["item-1".to_string()]);
        let scheduled = db
            .list_posts_by_status(crate::types::PostStatus::Scheduled, 10)
            .await
            .unwrap();
        assert_eq!(scheduled.len(), 1);
    }

    #[tokio::test]
    async fn test_spawned_loops_tick() {
        let feed = Arc::new(MockFeed::with_items(vec![feed_item("item-2")]));
        let (orchestrator, db, _tmp) = build(Arc::clone(&feed)).await;

        let triggers = TriggerSet::new(
            Arc::clone(&orchestrator),
            feed.clone(),
            TriggerIntervals {
                fetch: Duration::from_millis(20),
                generate: Duration::from_millis(20),
                publish: Duration::from_millis(20),
                expire: Duration::from_millis(20),
            },
        );

        let handles = triggers.spawn();
        tokio::time::sleep(Duration::from_millis(300)).await;
        for handle in &handles {
            handle.abort();
        }

        // The generation loop consumed the feed item.
        assert_eq!(feed.consumed(), vec!["item-2".to_string()]);
        let scheduled = db
            .list_posts_by_status(crate::types::PostStatus::Scheduled, 10)
            .await
            .unwrap();
        assert_eq!(scheduled.len(), 1);
    }
}
