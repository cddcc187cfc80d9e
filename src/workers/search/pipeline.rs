use chrono::Local;
use std::time::Instant;
use tracing::{error, info, warn};

use crate::db::core::Database;
use crate::llm::generate_llm_response;
use crate::profile::{OrgProfile, SearchMode};
use crate::prompt;
use crate::report::{
    clean_and_parse_json, normalize_report, parse_audit_verdict, parse_report, AuditVerdict,
    GrantReport,
};
use crate::workers::common::SearchJobParams;
use crate::{WorkerDetail, TARGET_DB, TARGET_LLM_REQUEST};

// Progress messages shown on the dashboard while a request is in flight.
const THOUGHT_ANALYZE: &str = "J'analyse ton profil et ton secteur...";
const THOUGHT_SEARCH_FAST: &str = "⚡ Recherche Éclair (Focus Portails Officiels)...";
const THOUGHT_SEARCH_DEEP: &str = "🕵️ Investigation 360° (Presse, Fondations, Monitor)...";
const THOUGHT_FILTERING: &str = "Je filtre les sources non officielles et les dates dépassées...";
const THOUGHT_AUDIT: &str = "Je soumets le rapport à la Challengeuse pour validation...";
const THOUGHT_REFINE: &str = "La Challengeuse a des remarques : j'affine mes requêtes...";
const THOUGHT_AUDIT_OK: &str = "Audit validé ! Je prépare le rapport final...";
const THOUGHT_FINALIZING: &str = "Mise en forme de la synthèse...";

/// How many times a report may be sent back for another search pass before
/// the best effort ships anyway.
const MAX_REFINEMENTS: usize = 2;

// Correction text for passes that never reached the reviewer. Worded like
// reviewer feedback so the search prompt treats every refinement the same way.
const CORRECTION_UNREADABLE: &str = "Ta réponse précédente était illisible (JSON invalide ou tronqué). Reprends la recherche et réponds uniquement avec l'objet JSON demandé, sans texte autour.";
const CORRECTION_NO_USABLE: &str = "Ton rapport précédent ne contenait aucune opportunité exploitable : dates limites dépassées, URL manquantes ou doublons. Trouve des dispositifs actuellement ouverts, avec pour chacun une URL officielle vérifiable et une date limite future.";

/// Runs the full pipeline for one profile: grounded search, parse, normalize,
/// reviewer audit, bounded refinement. Always returns a report; when every
/// pass fails it is the degraded default so the request still completes.
pub async fn run_grant_search(
    profile: &OrgProfile,
    request_uuid: &str,
    params: &SearchJobParams<'_>,
    worker_detail: &WorkerDetail,
) -> GrantReport {
    let db = params.db;
    let start_time = Instant::now();

    note_progress(db, request_uuid, "searching", THOUGHT_ANALYZE).await;

    let search_thought = match profile.search_mode {
        SearchMode::Fast => THOUGHT_SEARCH_FAST,
        SearchMode::Deep => THOUGHT_SEARCH_DEEP,
    };

    let mut correction: Option<String> = None;
    let mut best_effort: Option<GrantReport> = None;

    for pass in 0..=MAX_REFINEMENTS {
        note_progress(db, request_uuid, "searching", search_thought).await;

        let search_prompt = prompt::grant_search_prompt(profile, correction.as_deref());
        let response =
            match generate_llm_response(&search_prompt, params.search_params, worker_detail).await {
                Some(response) => response,
                None => {
                    // The model never answered across all retries. There is
                    // nothing to refine against, so ship what we have.
                    error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: no search response on pass {}, returning {} report.", worker_detail.name, worker_detail.id, worker_detail.model, pass + 1, if best_effort.is_some() { "previous" } else { "degraded" });
                    return best_effort.unwrap_or_else(|| GrantReport::degraded(&profile.name));
                }
            };

        note_progress(db, request_uuid, "searching", THOUGHT_FILTERING).await;

        let value = match clean_and_parse_json(&response.text) {
            Some(value) => value,
            None => {
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: unparseable search response on pass {} ({} chars).", worker_detail.name, worker_detail.id, worker_detail.model, pass + 1, response.text.len());
                correction = Some(CORRECTION_UNREADABLE.to_string());
                continue;
            }
        };

        let parsed = parse_report(&value, profile, response.sources);
        let candidate_count = parsed.opportunities.len();
        let report = normalize_report(parsed, Local::now().date_naive());

        if report.opportunities.is_empty() {
            warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: no usable opportunities on pass {} ({} candidates before filtering).", worker_detail.name, worker_detail.id, worker_detail.model, pass + 1, candidate_count);
            best_effort = Some(report);
            correction = Some(CORRECTION_NO_USABLE.to_string());
            continue;
        }

        note_progress(db, request_uuid, "auditing", THOUGHT_AUDIT).await;

        let report_json = serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string());
        let audit_prompt = prompt::audit_report_prompt(profile, &report_json);
        match generate_llm_response(&audit_prompt, params.audit_params, worker_detail).await {
            Some(audit_response) => match parse_audit_verdict(&audit_response.text) {
                AuditVerdict::Approved => {
                    note_progress(db, request_uuid, "auditing", THOUGHT_AUDIT_OK).await;
                    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: report approved on pass {} with {} opportunities in {:.2}s.", worker_detail.name, worker_detail.id, worker_detail.model, pass + 1, report.opportunities.len(), start_time.elapsed().as_secs_f64());
                    note_progress(db, request_uuid, "auditing", THOUGHT_FINALIZING).await;
                    return report;
                }
                AuditVerdict::Refine(corrections) => {
                    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: reviewer sent pass {} back: {}", worker_detail.name, worker_detail.id, worker_detail.model, pass + 1, corrections);
                    note_progress(db, request_uuid, "searching", THOUGHT_REFINE).await;
                    best_effort = Some(report);
                    correction = Some(corrections);
                    continue;
                }
            },
            None => {
                // Reviewer unreachable. The report already parsed and
                // normalized cleanly, so it ships unaudited.
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: reviewer unreachable on pass {}, accepting report as-is.", worker_detail.name, worker_detail.id, worker_detail.model, pass + 1);
                note_progress(db, request_uuid, "auditing", THOUGHT_FINALIZING).await;
                return report;
            }
        }
    }

    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: refinements exhausted after {:.2}s, returning {} report.", worker_detail.name, worker_detail.id, worker_detail.model, start_time.elapsed().as_secs_f64(), if best_effort.is_some() { "last normalized" } else { "degraded" });
    note_progress(db, request_uuid, "auditing", THOUGHT_FINALIZING).await;
    best_effort.unwrap_or_else(|| GrantReport::degraded(&profile.name))
}

/// Progress updates are cosmetic; a failed write must never abort a search.
async fn note_progress(db: &Database, request_uuid: &str, status: &str, thought: &str) {
    if let Err(e) = db.update_search_progress(request_uuid, status, thought).await {
        warn!(target: TARGET_DB, "Failed to record progress for {}: {:?}", request_uuid, e);
    }
}
