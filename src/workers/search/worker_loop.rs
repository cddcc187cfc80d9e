use anyhow::Result;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

use crate::db::core::Database;
use crate::profile::{OrgProfile, SearchMode};
use crate::util::weighted_sleep;
use crate::workers::common::{store_report, SearchJobParams};
use crate::{LLMParams, WorkerDetail, TARGET_DB, TARGET_LLM_REQUEST};

use super::pipeline::run_grant_search;

/// Main search worker loop that continuously claims queued search requests,
/// runs the pipeline and files the finished report.
pub async fn search_loop(
    worker_id: i16,
    search_params: LLMParams,
    audit_params: LLMParams,
) -> Result<()> {
    let db = Database::instance().await;

    let worker_detail = WorkerDetail {
        name: "search worker".to_string(),
        id: worker_id,
        model: search_params.model.clone(),
    };

    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: starting search_loop (audit model {}).", worker_detail.name, worker_detail.id, worker_detail.model, audit_params.model);

    let params = SearchJobParams {
        search_params: &search_params,
        audit_params: &audit_params,
        db,
    };

    loop {
        match db.claim_next_search_request().await {
            Ok(Some((request_uuid, profile_json, mode))) => {
                // The mode column is what the caller submitted; it wins over
                // whatever the profile JSON carries.
                let profile = match serde_json::from_str::<OrgProfile>(&profile_json) {
                    Ok(mut profile) => {
                        profile.search_mode = SearchMode::from(mode.as_str());
                        profile
                    }
                    Err(e) => {
                        error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: request {} carries unreadable profile JSON: {}", worker_detail.name, worker_detail.id, worker_detail.model, request_uuid, e);
                        let _ = db
                            .fail_search_request(&request_uuid, "Profil illisible.")
                            .await;
                        continue;
                    }
                };

                info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: claimed request {} for '{}' ({} search).", worker_detail.name, worker_detail.id, worker_detail.model, request_uuid, profile.name, profile.search_mode);

                let report =
                    run_grant_search(&profile, &request_uuid, &params, &worker_detail).await;

                match store_report(db, &report, &search_params.model).await {
                    Ok(report_uuid) => {
                        if let Err(e) =
                            db.complete_search_request(&request_uuid, &report_uuid).await
                        {
                            error!(target: TARGET_DB, "Failed to mark request {} complete: {:?}", request_uuid, e);
                        }
                        if let Err(e) = db.bump_request_counter().await {
                            warn!(target: TARGET_DB, "Failed to bump request counter: {:?}", e);
                        }
                    }
                    Err(e) => {
                        error!(target: TARGET_DB, "Failed to store report for request {}: {:?}", request_uuid, e);
                        let _ = db
                            .fail_search_request(&request_uuid, "Échec d'enregistrement du rapport.")
                            .await;
                    }
                }
            }
            Ok(None) => {
                debug!(target: TARGET_LLM_REQUEST, "[{} {} {}]: no queued search requests.", worker_detail.name, worker_detail.id, worker_detail.model);
                weighted_sleep().await;
            }
            Err(e) => {
                error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: error claiming search request ({:?}), sleeping for 5 seconds.", worker_detail.name, worker_detail.id, worker_detail.model, e);
                sleep(Duration::from_secs(5)).await; // Wait and retry
            }
        }
    }
}
