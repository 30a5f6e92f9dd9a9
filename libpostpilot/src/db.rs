//! Database operations for Postpilot
//!
//! Every lifecycle transition is a guarded UPDATE: the statement names the
//! state it requires and `rows_affected` reports whether the transition
//! applied. Callers treat a missed guard as a defined no-op, which is what
//! makes overlapping trigger firings safe. Plain overwrites of `status`,
//! `approval_status`, or token/expiry columns are deliberately not offered.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{
    ApprovalRequest, ApprovalResolution, ApprovalStatus, Platform, PlatformCredential, Post,
    PostStatus,
};

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    pub async fn new(db_path: &str) -> Result<Self> {
        // Expand path and create parent directories
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // WAL keeps concurrent sweep writers from tripping over readers; the
        // busy timeout covers the brief writer-vs-writer window.
        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            expanded_path.replace('\\', "/")
        ))
        .map_err(DbError::SqlxError)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(DbError::SqlxError)?;

        // Run migrations
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    /// Raw pool access, for the inspection CLI's read-only statistics.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Insert a freshly created post (always in draft state).
    pub async fn create_post(&self, post: &Post) -> Result<()> {
        let hashtags =
            serde_json::to_string(&post.hashtags).map_err(|e| DbError::CorruptRow(e.to_string()))?;

        sqlx::query(
            r#"
            INSERT INTO posts (
                id, user_id, source_ref, platform, content, hashtags,
                status, approval_status, scheduled_for, published_at,
                external_id, external_url, error_message, retry_count,
                approval_message_ref, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.user_id)
        .bind(&post.source_ref)
        .bind(post.platform.as_str())
        .bind(&post.content)
        .bind(hashtags)
        .bind(post.status.as_str())
        .bind(post.approval_status.as_str())
        .bind(post.scheduled_for)
        .bind(post.published_at)
        .bind(&post.external_id)
        .bind(&post.external_url)
        .bind(&post.error_message)
        .bind(post.retry_count)
        .bind(&post.approval_message_ref)
        .bind(post.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    /// Get a post by ID
    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, source_ref, platform, content, hashtags,
                   status, approval_status, scheduled_for, published_at,
                   external_id, external_url, error_message, retry_count,
                   approval_message_ref, created_at
            FROM posts WHERE id = ?
            "#,
        )
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_post).transpose()
    }

    /// Draft -> PendingApproval, recording the outbound approval message ref.
    pub async fn mark_pending_approval_if_draft(
        &self,
        post_id: &str,
        message_ref: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'pending_approval', approval_message_ref = ?
            WHERE id = ? AND status = 'draft'
            "#,
        )
        .bind(message_ref)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Draft -> Scheduled on the auto-approved path.
    pub async fn schedule_if_draft(&self, post_id: &str, scheduled_for: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'scheduled', approval_status = 'auto_approved', scheduled_for = ?
            WHERE id = ? AND status = 'draft'
            "#,
        )
        .bind(scheduled_for)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// PendingApproval -> Scheduled on a human approval. Guarded on the
    /// approval still being pending, so a duplicate or late approval is a
    /// no-op.
    pub async fn approve_if_pending(&self, post_id: &str, scheduled_for: i64) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET approval_status = 'approved', status = 'scheduled', scheduled_for = ?
            WHERE id = ? AND status = 'pending_approval' AND approval_status = 'pending'
            "#,
        )
        .bind(scheduled_for)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// PendingApproval -> Rejected (terminal).
    pub async fn reject_if_pending(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET approval_status = 'rejected', status = 'rejected'
            WHERE id = ? AND status = 'pending_approval' AND approval_status = 'pending'
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// PendingApproval -> Cancelled when the approval window lapses. Loses
    /// gracefully to a concurrent human resolution.
    pub async fn expire_if_pending(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET approval_status = 'expired', status = 'cancelled'
            WHERE id = ? AND status = 'pending_approval' AND approval_status = 'pending'
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// The publish claim: Scheduled -> Publishing. Exactly one of any number
    /// of concurrent claimants sees `true`.
    pub async fn claim_for_publishing(&self, post_id: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'publishing'
            WHERE id = ? AND status = 'scheduled'
            "#,
        )
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Publishing -> Published with the external artifact reference.
    pub async fn mark_published_if_publishing(
        &self,
        post_id: &str,
        published_at: i64,
        external_id: &str,
        external_url: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'published', published_at = ?, external_id = ?, external_url = ?,
                error_message = NULL
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(published_at)
        .bind(external_id)
        .bind(external_url)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Publishing -> Failed. `bump_retry` distinguishes platform failures
    /// (counted) from credential failures (not counted).
    pub async fn mark_failed_if_publishing(
        &self,
        post_id: &str,
        error_message: &str,
        bump_retry: bool,
    ) -> Result<bool> {
        let bump: i64 = if bump_retry { 1 } else { 0 };

        let result = sqlx::query(
            r#"
            UPDATE posts
            SET status = 'failed', error_message = ?, retry_count = retry_count + ?
            WHERE id = ? AND status = 'publishing'
            "#,
        )
        .bind(error_message)
        .bind(bump)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }

    /// Posts eligible for the publish sweep: scheduled, approved or
    /// auto-approved, due at or before `now`.
    pub async fn list_due_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, source_ref, platform, content, hashtags,
                   status, approval_status, scheduled_for, published_at,
                   external_id, external_url, error_message, retry_count,
                   approval_message_ref, created_at
            FROM posts
            WHERE status = 'scheduled'
              AND approval_status IN ('approved', 'auto_approved')
              AND scheduled_for IS NOT NULL
              AND scheduled_for <= ?
            ORDER BY scheduled_for ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Posts whose approval has been pending since before `cutoff`.
    pub async fn list_stale_pending(&self, cutoff: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, source_ref, platform, content, hashtags,
                   status, approval_status, scheduled_for, published_at,
                   external_id, external_url, error_message, retry_count,
                   approval_message_ref, created_at
            FROM posts
            WHERE status = 'pending_approval'
              AND approval_status = 'pending'
              AND created_at < ?
            ORDER BY created_at ASC
            "#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Posts in a given state, newest first.
    pub async fn list_posts_by_status(
        &self,
        status: PostStatus,
        limit: usize,
    ) -> Result<Vec<Post>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, source_ref, platform, content, hashtags,
                   status, approval_status, scheduled_for, published_at,
                   external_id, external_url, error_message, retry_count,
                   approval_message_ref, created_at
            FROM posts
            WHERE status = ?
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(status.as_str())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.into_iter().map(row_to_post).collect()
    }

    /// Post counts per lifecycle state.
    pub async fn count_posts_by_status(&self) -> Result<Vec<(String, i64)>> {
        let rows = sqlx::query(
            r#"
            SELECT status, COUNT(*) AS n FROM posts GROUP BY status ORDER BY status
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(rows
            .iter()
            .map(|r| (r.get::<String, _>("status"), r.get::<i64, _>("n")))
            .collect())
    }

    // ========================================================================
    // Approval requests
    // ========================================================================

    pub async fn create_approval_request(&self, request: &ApprovalRequest) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO approval_requests (
                id, post_id, destination, sent_at, expires_at,
                resolved, resolution, resolved_by, resolved_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&request.id)
        .bind(&request.post_id)
        .bind(&request.destination)
        .bind(request.sent_at)
        .bind(request.expires_at)
        .bind(request.resolved as i64)
        .bind(request.resolution.map(|r| r.as_str()))
        .bind(&request.resolved_by)
        .bind(request.resolved_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_approval_request(&self, request_id: &str) -> Result<Option<ApprovalRequest>> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, destination, sent_at, expires_at,
                   resolved, resolution, resolved_by, resolved_at
            FROM approval_requests WHERE id = ?
            "#,
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_request).transpose()
    }

    /// The destination's most recent unresolved request, for scoping
    /// free-text replies.
    pub async fn latest_unresolved_for_destination(
        &self,
        destination: &str,
    ) -> Result<Option<ApprovalRequest>> {
        let row = sqlx::query(
            r#"
            SELECT id, post_id, destination, sent_at, expires_at,
                   resolved, resolution, resolved_by, resolved_at
            FROM approval_requests
            WHERE destination = ? AND resolved = 0
            ORDER BY sent_at DESC
            LIMIT 1
            "#,
        )
        .bind(destination)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_request).transpose()
    }

    /// Resolve every unresolved request for a post. First writer wins;
    /// returns how many rows actually flipped.
    pub async fn resolve_requests_for_post(
        &self,
        post_id: &str,
        resolution: ApprovalResolution,
        resolved_by: Option<&str>,
        resolved_at: i64,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE approval_requests
            SET resolved = 1, resolution = ?, resolved_by = ?, resolved_at = ?
            WHERE post_id = ? AND resolved = 0
            "#,
        )
        .bind(resolution.as_str())
        .bind(resolved_by)
        .bind(resolved_at)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    // ========================================================================
    // Credentials
    // ========================================================================

    /// Insert or replace the stored credential for (user, platform).
    pub async fn upsert_credential(&self, credential: &PlatformCredential) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO credentials (
                user_id, platform, access_token, refresh_token, expires_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&credential.user_id)
        .bind(credential.platform.as_str())
        .bind(&credential.access_token)
        .bind(&credential.refresh_token)
        .bind(credential.expires_at)
        .bind(credential.updated_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_credential(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> Result<Option<PlatformCredential>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, platform, access_token, refresh_token, expires_at, updated_at
            FROM credentials
            WHERE user_id = ? AND platform = ?
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.map(row_to_credential).transpose()
    }

    /// Persist refreshed tokens, guarded on the expiry the refresher started
    /// from. A stale writer (another refresh won in between) is a no-op.
    pub async fn update_tokens_if(
        &self,
        user_id: &str,
        platform: Platform,
        expected_expires_at: i64,
        access_token: &str,
        refresh_token: Option<&str>,
        new_expires_at: i64,
        updated_at: i64,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE credentials
            SET access_token = ?, refresh_token = ?, expires_at = ?, updated_at = ?
            WHERE user_id = ? AND platform = ? AND expires_at = ?
            "#,
        )
        .bind(access_token)
        .bind(refresh_token)
        .bind(new_expires_at)
        .bind(updated_at)
        .bind(user_id)
        .bind(platform.as_str())
        .bind(expected_expires_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

fn row_to_post(row: sqlx::sqlite::SqliteRow) -> Result<Post> {
    let platform_str: String = row.get("platform");
    let platform = Platform::parse_str(&platform_str)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown platform: {}", platform_str)))?;

    let status_str: String = row.get("status");
    let status = PostStatus::parse_str(&status_str)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown status: {}", status_str)))?;

    let approval_str: String = row.get("approval_status");
    let approval_status = ApprovalStatus::parse_str(&approval_str).ok_or_else(|| {
        DbError::CorruptRow(format!("unknown approval status: {}", approval_str))
    })?;

    let hashtags_json: String = row.get("hashtags");
    let hashtags: Vec<String> = serde_json::from_str(&hashtags_json)
        .map_err(|e| DbError::CorruptRow(format!("bad hashtags column: {}", e)))?;

    Ok(Post {
        id: row.get("id"),
        user_id: row.get("user_id"),
        source_ref: row.get("source_ref"),
        platform,
        content: row.get("content"),
        hashtags,
        status,
        approval_status,
        scheduled_for: row.get("scheduled_for"),
        published_at: row.get("published_at"),
        external_id: row.get("external_id"),
        external_url: row.get("external_url"),
        error_message: row.get("error_message"),
        retry_count: row.get("retry_count"),
        approval_message_ref: row.get("approval_message_ref"),
        created_at: row.get("created_at"),
    })
}

fn row_to_request(row: sqlx::sqlite::SqliteRow) -> Result<ApprovalRequest> {
    let resolution = row
        .get::<Option<String>, _>("resolution")
        .map(|s| {
            ApprovalResolution::parse_str(&s)
                .ok_or_else(|| DbError::CorruptRow(format!("unknown resolution: {}", s)))
        })
        .transpose()?;

    Ok(ApprovalRequest {
        id: row.get("id"),
        post_id: row.get("post_id"),
        destination: row.get("destination"),
        sent_at: row.get("sent_at"),
        expires_at: row.get("expires_at"),
        resolved: row.get::<i64, _>("resolved") != 0,
        resolution,
        resolved_by: row.get("resolved_by"),
        resolved_at: row.get("resolved_at"),
    })
}

fn row_to_credential(row: sqlx::sqlite::SqliteRow) -> Result<PlatformCredential> {
    let platform_str: String = row.get("platform");
    let platform = Platform::parse_str(&platform_str)
        .ok_or_else(|| DbError::CorruptRow(format!("unknown platform: {}", platform_str)))?;

    Ok(PlatformCredential {
        user_id: row.get("user_id"),
        platform,
        access_token: row.get("access_token"),
        refresh_token: row.get("refresh_token"),
        expires_at: row.get("expires_at"),
        updated_at: row.get("updated_at"),
    })
}
