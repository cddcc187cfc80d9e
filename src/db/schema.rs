use tracing::info;

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    pub(crate) async fn initialize_schema(&self) -> Result<(), sqlx::Error> {
        let mut conn = self.pool().acquire().await?;
        sqlx::query(
            r#"
            -- Queued and in-flight funding searches
            CREATE TABLE IF NOT EXISTS search_requests (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                request_uuid TEXT NOT NULL UNIQUE,
                profile_json TEXT NOT NULL,
                profile_hash TEXT NOT NULL,
                mode TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending', -- pending, searching, auditing, complete, failed
                thought TEXT,
                report_uuid TEXT,
                error TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_search_requests_status ON search_requests (status, created_at);
            CREATE INDEX IF NOT EXISTS idx_search_requests_profile_hash ON search_requests (profile_hash);

            -- Completed reports, newest first, capped at the 50 most recent
            CREATE TABLE IF NOT EXISTS search_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report_uuid TEXT NOT NULL UNIQUE,
                profile_name TEXT NOT NULL,
                report_json TEXT NOT NULL,
                model TEXT NOT NULL,
                generated_at TEXT NOT NULL,
                opportunity_count INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_search_history_generated_at ON search_history (generated_at);

            -- Registry lookup results keyed by the normalized query
            CREATE TABLE IF NOT EXISTS enrichment_cache (
                cache_key TEXT PRIMARY KEY,
                profile_json TEXT NOT NULL,
                cached_at TEXT NOT NULL,
                hit_count INTEGER NOT NULL DEFAULT 0,
                last_accessed TEXT
            );

            -- Autosaved partial profiles, one per authenticated client
            CREATE TABLE IF NOT EXISTS profile_drafts (
                draft_key TEXT PRIMARY KEY,
                profile_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            -- Single-row searches-performed counter
            CREATE TABLE IF NOT EXISTS request_counter (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                count INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await?;

        info!(target: TARGET_DB, "Tables ensured to exist");
        Ok(())
    }
}
