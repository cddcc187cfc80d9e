use sqlx::Row;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    /// Cached registry lookup for a query, bumping the hit counters on a hit.
    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn get_cached_enrichment(
        &self,
        cache_key: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT profile_json FROM enrichment_cache WHERE cache_key = ?1")
            .bind(cache_key)
            .fetch_optional(self.pool())
            .await?;

        if let Some(row) = row {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time travel")
                .as_secs()
                .to_string();

            sqlx::query(
                "UPDATE enrichment_cache SET hit_count = hit_count + 1, last_accessed = ?1 WHERE cache_key = ?2",
            )
            .bind(&now)
            .bind(cache_key)
            .execute(self.pool())
            .await?;

            debug!(target: TARGET_DB, "Enrichment cache hit: {}", cache_key);
            Ok(Some(row.get("profile_json")))
        } else {
            Ok(None)
        }
    }

    /// Store a registry lookup result, replacing any earlier answer for the
    /// same query.
    #[instrument(target = "db", level = "info", skip(self, profile_json))]
    pub async fn put_cached_enrichment(
        &self,
        cache_key: &str,
        profile_json: &str,
    ) -> Result<(), sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time travel")
            .as_secs()
            .to_string();

        sqlx::query(
            r#"
            INSERT INTO enrichment_cache (cache_key, profile_json, cached_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(cache_key) DO UPDATE SET profile_json = excluded.profile_json, cached_at = excluded.cached_at
            "#,
        )
        .bind(cache_key)
        .bind(profile_json)
        .bind(&now)
        .execute(self.pool())
        .await?;

        debug!(target: TARGET_DB, "Cached enrichment for: {}", cache_key);
        Ok(())
    }

    /// Entry count and accumulated hits, for the maintenance CLI.
    pub async fn enrichment_cache_stats(&self) -> Result<(i64, i64), sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) as entries, COALESCE(SUM(hit_count), 0) as hits FROM enrichment_cache",
        )
        .fetch_one(self.pool())
        .await?;

        Ok((row.get("entries"), row.get("hits")))
    }

    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn clear_enrichment_cache(&self) -> Result<u64, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM enrichment_cache")
            .execute(self.pool())
            .await?
            .rows_affected();

        debug!(target: TARGET_DB, "Cleared {} enrichment cache entries", affected);
        Ok(affected)
    }
}
