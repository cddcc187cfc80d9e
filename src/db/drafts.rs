use sqlx::Row;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, instrument};

use super::core::Database;
use crate::TARGET_DB;

impl Database {
    /// Autosave a partial profile for a client.
    #[instrument(target = "db", level = "info", skip(self, profile_json))]
    pub async fn save_profile_draft(
        &self,
        draft_key: &str,
        profile_json: &str,
    ) -> Result<(), sqlx::Error> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time travel")
            .as_secs()
            .to_string();

        sqlx::query(
            r#"
            INSERT INTO profile_drafts (draft_key, profile_json, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(draft_key) DO UPDATE SET profile_json = excluded.profile_json, updated_at = excluded.updated_at
            "#,
        )
        .bind(draft_key)
        .bind(profile_json)
        .bind(&now)
        .execute(self.pool())
        .await?;

        debug!(target: TARGET_DB, "Saved profile draft for: {}", draft_key);
        Ok(())
    }

    pub async fn get_profile_draft(
        &self,
        draft_key: &str,
    ) -> Result<Option<String>, sqlx::Error> {
        let row = sqlx::query("SELECT profile_json FROM profile_drafts WHERE draft_key = ?1")
            .bind(draft_key)
            .fetch_optional(self.pool())
            .await?;

        Ok(row.map(|row| row.get("profile_json")))
    }
}
