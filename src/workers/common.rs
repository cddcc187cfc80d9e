use tracing::debug;
use uuid::Uuid;

use crate::db::core::Database;
use crate::report::GrantReport;
use crate::{LLMParams, TARGET_DB};

/// Parameters shared by a full search run: the two model configurations and
/// the database handle used for progress updates and history storage.
pub struct SearchJobParams<'a> {
    pub search_params: &'a LLMParams,
    pub audit_params: &'a LLMParams,
    pub db: &'a Database,
}

/// Stores a finished report in history and returns the uuid it was filed
/// under.
pub async fn store_report(
    db: &Database,
    report: &GrantReport,
    model: &str,
) -> Result<String, sqlx::Error> {
    let report_uuid = Uuid::new_v4().to_string();
    let report_json = serde_json::to_string(report).unwrap_or_else(|_| "{}".to_string());

    db.add_history_report(
        &report_uuid,
        &report.profile_name,
        &report_json,
        model,
        &report.generated_at,
        report.opportunities.len() as i64,
    )
    .await?;

    debug!(target: TARGET_DB, "Filed report {} for '{}'", report_uuid, report.profile_name);
    Ok(report_uuid)
}
