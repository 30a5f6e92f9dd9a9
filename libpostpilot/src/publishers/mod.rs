//! Publisher abstraction
//!
//! One adapter per platform turns adapted content plus an access token into a
//! published artifact reference, or a classified failure. Concrete HTTP
//! clients live outside this crate; a configurable mock ships for wiring and
//! tests (and is the only adapter `create_publishers` knows how to build).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::Config;
use crate::error::{ConfigError, PlatformError, Result};
use crate::types::{Platform, PublishedArtifact};

pub mod mock;

/// Content handed to a publisher adapter: the composed body and, for
/// platforms that keep them separate, the hashtag list.
#[derive(Debug, Clone)]
pub struct PublishContent {
    pub body: String,
    pub hashtags: Vec<String>,
}

/// Platform publishing client.
///
/// `publish` performs exactly one attempt; retries, claims, and bookkeeping
/// belong to the caller. Call timeouts are the adapter's own concern and
/// surface as `PlatformError`.
#[async_trait]
pub trait PublisherAdapter: Send + Sync {
    /// The platform this adapter publishes to.
    fn platform(&self) -> Platform;

    /// Publish the content with the given access token.
    async fn publish(
        &self,
        content: &PublishContent,
        access_token: &str,
    ) -> std::result::Result<PublishedArtifact, PlatformError>;
}

/// Adapter lookup by platform.
#[derive(Clone, Default)]
pub struct PublisherRegistry {
    adapters: HashMap<Platform, Arc<dyn PublisherAdapter>>,
}

impl std::fmt::Debug for PublisherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherRegistry")
            .field("platforms", &self.platforms())
            .finish()
    }
}

impl PublisherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn PublisherAdapter>) {
        self.adapters.insert(adapter.platform(), adapter);
    }

    pub fn get(&self, platform: Platform) -> Option<Arc<dyn PublisherAdapter>> {
        self.adapters.get(&platform).cloned()
    }

    pub fn platforms(&self) -> Vec<Platform> {
        self.adapters.keys().copied().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Build adapters for all enabled platforms in the configuration.
///
/// Only the in-crate `mock` adapter can be constructed here; real platform
/// clients are registered by the embedding application.
pub fn create_publishers(config: &Config) -> Result<PublisherRegistry> {
    let mut registry = PublisherRegistry::new();

    for platform in Platform::all() {
        let Some(platform_config) = config.platform(*platform) else {
            continue;
        };
        if !platform_config.enabled {
            continue;
        }

        match platform_config.adapter.as_str() {
            "mock" => {
                registry.register(Arc::new(mock::MockPublisher::success(*platform)));
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    field: format!("platforms.{}.adapter", platform.as_str()),
                    reason: format!(
                        "unknown adapter '{}'; register custom adapters through PublisherRegistry",
                        other
                    ),
                }
                .into());
            }
        }
    }

    Ok(registry)
}
