//! Mock publisher implementation for testing
//!
//! A configurable adapter that can simulate successes, classified failures,
//! and latency, and records every call for verification. Available in all
//! builds so integration tests and the daemon's mock wiring can use it.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use crate::error::PlatformError;
use crate::types::{Platform, PublishedArtifact};

use super::{PublishContent, PublisherAdapter};

/// Configuration for mock publisher behavior
#[derive(Clone)]
pub struct MockPublisherConfig {
    pub platform: Platform,

    /// Error returned on every publish attempt, if set
    pub fail_with: Option<PlatformError>,

    /// Delay before completing a publish (simulates network latency)
    pub delay: Duration,

    /// Number of times publish has been called
    pub publish_call_count: Arc<Mutex<usize>>,

    /// Bodies that have been published (for verification)
    pub published_bodies: Arc<Mutex<Vec<String>>>,

    /// Tokens publish was invoked with (for credential assertions)
    pub seen_tokens: Arc<Mutex<Vec<String>>>,
}

impl MockPublisherConfig {
    fn new(platform: Platform) -> Self {
        Self {
            platform,
            fail_with: None,
            delay: Duration::from_millis(0),
            publish_call_count: Arc::new(Mutex::new(0)),
            published_bodies: Arc::new(Mutex::new(Vec::new())),
            seen_tokens: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

/// Mock publisher for testing
pub struct MockPublisher {
    config: MockPublisherConfig,
}

impl MockPublisher {
    pub fn new(config: MockPublisherConfig) -> Self {
        Self { config }
    }

    /// A publisher that always succeeds
    pub fn success(platform: Platform) -> Self {
        Self::new(MockPublisherConfig::new(platform))
    }

    /// A publisher that always fails with the given error
    pub fn failure(platform: Platform, error: PlatformError) -> Self {
        let mut config = MockPublisherConfig::new(platform);
        config.fail_with = Some(error);
        Self::new(config)
    }

    /// A publisher with artificial latency
    pub fn with_delay(platform: Platform, delay: Duration) -> Self {
        let mut config = MockPublisherConfig::new(platform);
        config.delay = delay;
        Self::new(config)
    }

    /// Get the number of times publish was called
    pub fn publish_call_count(&self) -> usize {
        *self.config.publish_call_count.lock().unwrap()
    }

    /// Get all bodies that were published
    pub fn published_bodies(&self) -> Vec<String> {
        self.config.published_bodies.lock().unwrap().clone()
    }

    /// Get the access tokens publish was invoked with
    pub fn seen_tokens(&self) -> Vec<String> {
        self.config.seen_tokens.lock().unwrap().clone()
    }

    /// Shared handles for asserting on calls after the publisher has been
    /// moved into a registry.
    pub fn counters(&self) -> (Arc<Mutex<usize>>, Arc<Mutex<Vec<String>>>) {
        (
            Arc::clone(&self.config.publish_call_count),
            Arc::clone(&self.config.published_bodies),
        )
    }
}

#[async_trait]
impl PublisherAdapter for MockPublisher {
    fn platform(&self) -> Platform {
        self.config.platform
    }

    async fn publish(
        &self,
        content: &PublishContent,
        access_token: &str,
    ) -> std::result::Result<PublishedArtifact, PlatformError> {
        *self.config.publish_call_count.lock().unwrap() += 1;
        self.config
            .seen_tokens
            .lock()
            .unwrap()
            .push(access_token.to_string());

        if !self.config.delay.is_zero() {
            sleep(self.config.delay).await;
        }

        if let Some(error) = &self.config.fail_with {
            return Err(error.clone());
        }

        self.config
            .published_bodies
            .lock()
            .unwrap()
            .push(content.body.clone());

        let external_id = format!("{}-{}", self.config.platform, uuid::Uuid::new_v4());
        let external_url = format!("https://{}.example/{}", self.config.platform, external_id);
        Ok(PublishedArtifact {
            external_id,
            external_url: Some(external_url),
        })
    }
}
