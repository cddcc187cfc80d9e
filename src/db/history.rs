use sqlx::Row;
use tracing::{debug, error, info, instrument};

use super::core::Database;
use crate::TARGET_DB;

/// The dashboard only ever shows the most recent reports; older ones are
/// trimmed on every insert.
const MAX_HISTORY_ITEMS: i64 = 50;

impl Database {
    /// Store a completed report and trim the history to its cap.
    #[instrument(target = "db", level = "info", skip(self, report_json))]
    pub async fn add_history_report(
        &self,
        report_uuid: &str,
        profile_name: &str,
        report_json: &str,
        model: &str,
        generated_at: &str,
        opportunity_count: i64,
    ) -> Result<(), sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO search_history (report_uuid, profile_name, report_json, model, generated_at, opportunity_count)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(report_uuid)
        .bind(profile_name)
        .bind(report_json)
        .bind(model)
        .bind(generated_at)
        .bind(opportunity_count)
        .execute(self.pool())
        .await;

        match result {
            Ok(_) => {
                debug!(target: TARGET_DB, "Stored report in history: {}", report_uuid);
            }
            Err(sqlx::Error::Database(db_err))
                if db_err.message().contains("UNIQUE constraint failed") =>
            {
                debug!(target: TARGET_DB, "Duplicate report_uuid detected, skipping insert: {}", report_uuid);
                return Ok(());
            }
            Err(e) => {
                error!(target: TARGET_DB, "Failed to store report in history: {:?}", e);
                return Err(e);
            }
        }

        let trimmed = sqlx::query(
            r#"
            DELETE FROM search_history
            WHERE id NOT IN (SELECT id FROM search_history ORDER BY id DESC LIMIT ?1)
            "#,
        )
        .bind(MAX_HISTORY_ITEMS)
        .execute(self.pool())
        .await?
        .rows_affected();

        if trimmed > 0 {
            debug!(target: TARGET_DB, "Trimmed {} old reports from history", trimmed);
        }
        Ok(())
    }

    /// All stored reports, newest first.
    pub async fn list_history(
        &self,
    ) -> Result<Vec<(String, String, String, String, String, i64)>, sqlx::Error> {
        let rows = sqlx::query(
            r#"
            SELECT report_uuid, profile_name, report_json, model, generated_at, opportunity_count
            FROM search_history
            ORDER BY id DESC
            "#,
        )
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.get("report_uuid"),
                    row.get("profile_name"),
                    row.get("report_json"),
                    row.get("model"),
                    row.get("generated_at"),
                    row.get("opportunity_count"),
                )
            })
            .collect())
    }

    pub async fn get_history_report(
        &self,
        report_uuid: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT report_json FROM search_history WHERE report_uuid = ?1")
            .bind(report_uuid)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|row| row.get("report_json")))
    }

    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn delete_history_report(&self, report_uuid: &str) -> Result<bool, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM search_history WHERE report_uuid = ?1")
            .bind(report_uuid)
            .execute(self.pool())
            .await?
            .rows_affected();

        debug!(target: TARGET_DB, "Deleted {} history report(s) for {}", affected, report_uuid);
        Ok(affected > 0)
    }

    #[instrument(target = "db", level = "info", skip(self))]
    pub async fn clear_history(&self) -> Result<u64, sqlx::Error> {
        let affected = sqlx::query("DELETE FROM search_history")
            .execute(self.pool())
            .await?
            .rows_affected();

        info!(target: TARGET_DB, "Cleared {} reports from history", affected);
        Ok(affected)
    }

    pub async fn count_history(&self) -> Result<i64, sqlx::Error> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM search_history")
            .fetch_one(self.pool())
            .await?;

        let count: i64 = row.get("count");
        Ok(count)
    }
}
