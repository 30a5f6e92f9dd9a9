//! Credential management
//!
//! Owns per-user, per-platform access credentials and exposes a single
//! valid-token lookup that refreshes on demand. Refreshes for one
//! (user, platform) key are serialized: most providers invalidate a refresh
//! token on use, so two concurrent refreshes against the same token can burn
//! one of them. After taking the per-key lock the credential is re-read so a
//! concurrent winner's work is reused instead of repeated.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::db::Database;
use crate::error::{CredentialError, Result};
use crate::types::Platform;

/// Tokens returned by a successful refresh.
#[derive(Debug, Clone)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Some providers rotate the refresh token on every use.
    pub refresh_token: Option<String>,
    pub expires_in_secs: i64,
}

/// External OAuth refresh endpoint. The initial consent handshake is not
/// handled here; only ongoing refresh.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(
        &self,
        platform: Platform,
        refresh_token: &str,
    ) -> std::result::Result<RefreshedToken, CredentialError>;
}

type RefreshKey = (String, Platform);

pub struct CredentialManager {
    db: Arc<Database>,
    refresher: Arc<dyn TokenRefresher>,
    refresh_locks: Mutex<HashMap<RefreshKey, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(db: Arc<Database>, refresher: Arc<dyn TokenRefresher>) -> Self {
        Self {
            db,
            refresher,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Return an access token that is valid at the time of the call,
    /// refreshing and persisting first when the stored one has expired.
    pub async fn get_valid_token(&self, user_id: &str, platform: Platform) -> Result<String> {
        let now = chrono::Utc::now().timestamp();

        let credential = self
            .db
            .get_credential(user_id, platform)
            .await?
            .ok_or(CredentialError::Missing)?;

        if !credential.is_expired(now) {
            return Ok(credential.access_token);
        }

        // Expired: serialize the refresh per (user, platform).
        let lock = self.lock_for(user_id, platform).await;
        let _guard = lock.lock().await;

        // Re-read under the lock; a concurrent caller may have refreshed
        // while we waited.
        let now = chrono::Utc::now().timestamp();
        let credential = self
            .db
            .get_credential(user_id, platform)
            .await?
            .ok_or(CredentialError::Missing)?;

        if !credential.is_expired(now) {
            debug!(
                user_id,
                platform = %platform,
                "credential already refreshed by a concurrent caller"
            );
            return Ok(credential.access_token);
        }

        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or(CredentialError::Expired)?;

        let refreshed = self.refresher.refresh(platform, refresh_token).await?;
        let new_expires_at = now + refreshed.expires_in_secs;
        let new_refresh_token = refreshed
            .refresh_token
            .as_deref()
            .or(credential.refresh_token.as_deref());

        let applied = self
            .db
            .update_tokens_if(
                user_id,
                platform,
                credential.expires_at,
                &refreshed.access_token,
                new_refresh_token,
                new_expires_at,
                now,
            )
            .await?;

        if !applied {
            // Someone else moved the row despite the per-key lock (e.g. an
            // out-of-band credential update). Their tokens win.
            warn!(
                user_id,
                platform = %platform,
                "refreshed tokens discarded: credential changed underneath"
            );
            let current = self
                .db
                .get_credential(user_id, platform)
                .await?
                .ok_or(CredentialError::Missing)?;
            return Ok(current.access_token);
        }

        debug!(user_id, platform = %platform, "credential refreshed");
        Ok(refreshed.access_token)
    }

    async fn lock_for(&self, user_id: &str, platform: Platform) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry((user_id.to_string(), platform))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

/// Mock refresher for wiring and tests.
pub mod mock {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::{RefreshedToken, TokenRefresher};
    use crate::error::CredentialError;
    use crate::types::Platform;

    pub struct MockRefresher {
        fail_with: Option<CredentialError>,
        expires_in_secs: i64,
        calls: AtomicUsize,
    }

    impl MockRefresher {
        pub fn success(expires_in_secs: i64) -> Self {
            Self {
                fail_with: None,
                expires_in_secs,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn failure(error: CredentialError) -> Self {
            Self {
                fail_with: Some(error),
                expires_in_secs: 0,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TokenRefresher for MockRefresher {
        async fn refresh(
            &self,
            _platform: Platform,
            refresh_token: &str,
        ) -> std::result::Result<RefreshedToken, CredentialError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);

            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }

            Ok(RefreshedToken {
                access_token: format!("refreshed-{}-{}", refresh_token, n),
                refresh_token: Some(format!("rotated-{}-{}", refresh_token, n)),
                expires_in_secs: self.expires_in_secs,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockRefresher;
    use super::*;
    use crate::error::PostPilotError;
    use crate::types::PlatformCredential;
    use tempfile::TempDir;

    async fn setup() -> (Arc<Database>, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("test.db");
        let db = Database::new(db_path.to_str().unwrap()).await.unwrap();
        (Arc::new(db), temp_dir)
    }

    fn credential(expires_at: i64, refresh_token: Option<&str>) -> PlatformCredential {
        PlatformCredential {
            user_id: "user-1".to_string(),
            platform: Platform::Mastodon,
            access_token: "stored-token".to_string(),
            refresh_token: refresh_token.map(str::to_string),
            expires_at,
            updated_at: 0,
        }
    }

    fn far_future() -> i64 {
        chrono::Utc::now().timestamp() + 3_600
    }

    #[tokio::test]
    async fn test_valid_token_returned_without_refresh() {
        let (db, _tmp) = setup().await;
        db.upsert_credential(&credential(far_future(), Some("refresh-1")))
            .await
            .unwrap();

        let refresher = Arc::new(MockRefresher::success(3_600));
        let manager = CredentialManager::new(Arc::clone(&db), refresher.clone());

        let token = manager
            .get_valid_token("user-1", Platform::Mastodon)
            .await
            .unwrap();
        assert_eq!(token, "stored-token");
        assert_eq!(refresher.call_count(), 0);
    }

    #[tokio::test]
    async fn test_expired_token_refreshed_and_persisted() {
        let (db, _tmp) = setup().await;
        db.upsert_credential(&credential(100, Some("refresh-1")))
            .await
            .unwrap();

        let refresher = Arc::new(MockRefresher::success(3_600));
        let manager = CredentialManager::new(Arc::clone(&db), refresher.clone());

        let token = manager
            .get_valid_token("user-1", Platform::Mastodon)
            .await
            .unwrap();
        assert!(token.starts_with("refreshed-refresh-1"));
        assert_eq!(refresher.call_count(), 1);

        // New expiry and rotated refresh token persisted.
        let stored = db
            .get_credential("user-1", Platform::Mastodon)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.access_token, token);
        assert!(stored.expires_at > chrono::Utc::now().timestamp());
        assert!(stored
            .refresh_token
            .as_deref()
            .unwrap()
            .starts_with("rotated-refresh-1"));
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token() {
        let (db, _tmp) = setup().await;
        db.upsert_credential(&credential(100, None)).await.unwrap();

        let manager =
            CredentialManager::new(Arc::clone(&db), Arc::new(MockRefresher::success(3_600)));

        let err = manager
            .get_valid_token("user-1", Platform::Mastodon)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PostPilotError::Credential(CredentialError::Expired)
        ));
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let (db, _tmp) = setup().await;
        let manager =
            CredentialManager::new(Arc::clone(&db), Arc::new(MockRefresher::success(3_600)));

        let err = manager
            .get_valid_token("nobody", Platform::Bluesky)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PostPilotError::Credential(CredentialError::Missing)
        ));
    }

    #[tokio::test]
    async fn test_refresh_failure_surfaces() {
        let (db, _tmp) = setup().await;
        db.upsert_credential(&credential(100, Some("refresh-1")))
            .await
            .unwrap();

        let manager = CredentialManager::new(
            Arc::clone(&db),
            Arc::new(MockRefresher::failure(CredentialError::RefreshFailed(
                "token revoked".to_string(),
            ))),
        );

        let err = manager
            .get_valid_token("user-1", Platform::Mastodon)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PostPilotError::Credential(CredentialError::RefreshFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_refresh_serialized_single_call() {
        let (db, _tmp) = setup().await;
        db.upsert_credential(&credential(100, Some("refresh-1")))
            .await
            .unwrap();

        let refresher = Arc::new(MockRefresher::success(3_600));
        let manager = Arc::new(CredentialManager::new(Arc::clone(&db), refresher.clone()));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let manager = Arc::clone(&manager);
            handles.push(tokio::spawn(async move {
                manager.get_valid_token("user-1", Platform::Mastodon).await
            }));
        }

        let mut tokens = Vec::new();
        for handle in handles {
            tokens.push(handle.await.unwrap().unwrap());
        }

        // One refresh served every caller: the winner refreshed, the rest
        // re-read the stored token under the lock.
        assert_eq!(refresher.call_count(), 1);
        for token in &tokens {
            assert_eq!(token, &tokens[0]);
        }
    }
}
