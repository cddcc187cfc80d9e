use sha2::{Digest, Sha256};
use sqlx::Row;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, error, instrument};

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    /// Queue a funding search. A resubmit of an identical profile while an
    /// earlier request is still in flight is absorbed: the caller gets the
    /// in-flight request's uuid back instead of a second queue entry.
    #[instrument(target = "db", level = "info", skip(self, profile_json))]
    pub async fn add_search_request(
        &self,
        request_uuid: &str,
        profile_json: &str,
        mode: &str,
    ) -> Result<String, sqlx::Error> {
        if profile_json.trim().is_empty() {
            error!(target: TARGET_DB, "Attempted to queue an empty profile");
            return Err(sqlx::Error::Protocol("Empty profile provided".into()));
        }

        let mut hasher = Sha256::new();
        hasher.update(profile_json.as_bytes());
        hasher.update(mode.as_bytes());
        let profile_hash = format!("{:x}", hasher.finalize());

        let existing = sqlx::query(
            r#"
            SELECT request_uuid FROM search_requests
            WHERE profile_hash = ?1 AND status IN ('pending', 'searching', 'auditing')
            LIMIT 1
            "#,
        )
        .bind(&profile_hash)
        .fetch_optional(self.pool())
        .await?;

        if let Some(row) = existing {
            let existing_uuid: String = row.get("request_uuid");
            debug!(target: TARGET_DB, "Identical search already in flight: {}", existing_uuid);
            return Ok(existing_uuid);
        }

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time travel")
            .as_secs()
            .to_string();

        debug!(target: TARGET_DB, "Queueing search request: {}", request_uuid);
        sqlx::query(
            r#"
            INSERT INTO search_requests (request_uuid, profile_json, profile_hash, mode, status, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
            ON CONFLICT(request_uuid) DO NOTHING
            "#,
        )
        .bind(request_uuid)
        .bind(profile_json)
        .bind(&profile_hash)
        .bind(mode)
        .bind(&now)
        .execute(self.pool())
        .await?;

        Ok(request_uuid.to_string())
    }

    /// Claim the oldest pending search request, moving it to 'searching' in
    /// the same transaction so no two workers pick up the same one.
    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn claim_next_search_request(
        &self,
    ) -> Result<Option<(String, String, String)>, sqlx::Error> {
        let mut transaction = self.pool().begin().await?;
        let row = sqlx::query(
            r#"
            SELECT id, request_uuid, profile_json, mode
            FROM search_requests
            WHERE status = 'pending'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .fetch_optional(&mut *transaction)
        .await?;

        if let Some(row) = row {
            let id: i64 = row.get("id");
            let request_uuid: String = row.get("request_uuid");
            let profile_json: String = row.get("profile_json");
            let mode: String = row.get("mode");

            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .expect("time travel")
                .as_secs()
                .to_string();

            sqlx::query(
                "UPDATE search_requests SET status = 'searching', updated_at = ?1 WHERE id = ?2",
            )
            .bind(&now)
            .bind(id)
            .execute(&mut *transaction)
            .await?;
            transaction.commit().await?;
            debug!(target: TARGET_DB, "Claimed search request: {}", request_uuid);

            Ok(Some((request_uuid, profile_json, mode)))
        } else {
            transaction.rollback().await?;
            Ok(None)
        }
    }

    /// Record a progress stage and message on an in-flight request. A uuid
    /// with no queue row (one-shot CLI searches) is a no-op.
    pub async fn update_search_progress(
        &self,
        request_uuid: &str,
        status: &str,
        thought: &str,
    ) -> Result<(), sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time travel")
            .as_secs()
            .to_string();

        sqlx::query(
            "UPDATE search_requests SET status = ?1, thought = ?2, updated_at = ?3 WHERE request_uuid = ?4",
        )
        .bind(status)
        .bind(thought)
        .bind(&now)
        .bind(request_uuid)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn complete_search_request(
        &self,
        request_uuid: &str,
        report_uuid: &str,
    ) -> Result<(), sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time travel")
            .as_secs()
            .to_string();

        sqlx::query(
            r#"
            UPDATE search_requests
            SET status = 'complete', report_uuid = ?1, updated_at = ?2
            WHERE request_uuid = ?3
            "#,
        )
        .bind(report_uuid)
        .bind(&now)
        .bind(request_uuid)
        .execute(self.pool())
        .await?;

        debug!(target: TARGET_DB, "Search request completed: {}", request_uuid);
        Ok(())
    }

    #[instrument(target = "db", level = "info", skip(self, error_text))]
    pub async fn fail_search_request(
        &self,
        request_uuid: &str,
        error_text: &str,
    ) -> Result<(), sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time travel")
            .as_secs()
            .to_string();

        sqlx::query(
            r#"
            UPDATE search_requests
            SET status = 'failed', error = ?1, updated_at = ?2
            WHERE request_uuid = ?3
            "#,
        )
        .bind(error_text)
        .bind(&now)
        .bind(request_uuid)
        .execute(self.pool())
        .await?;

        error!(target: TARGET_DB, "Search request failed: {}: {}", request_uuid, error_text);
        Ok(())
    }

    /// Status, progress message, report uuid, and error for one request.
    pub async fn get_search_request(
        &self,
        request_uuid: &str,
    ) -> Result<Option<(String, Option<String>, Option<String>, Option<String>)>, sqlx::Error>
    {
        let row = sqlx::query(
            r#"
            SELECT status, thought, report_uuid, error
            FROM search_requests
            WHERE request_uuid = ?1
            "#,
        )
        .bind(request_uuid)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(|row| {
            (
                row.get("status"),
                row.get("thought"),
                row.get("report_uuid"),
                row.get("error"),
            )
        }))
    }

    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn count_pending_search_requests(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query(
            "SELECT COUNT(*) as count FROM search_requests WHERE status = 'pending'",
        )
        .fetch_one(self.pool())
        .await?;

        let count: i64 = row.get("count");
        debug!(target: TARGET_DB, "Counted {} pending search requests", count);
        Ok(count)
    }
}
