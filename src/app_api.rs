use anyhow::Result;
use axum::extract::{Json, Path, Query};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::TypedHeader;
use axum_extra::headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use once_cell::sync::Lazy;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Mutex;
use tokio::net::TcpListener;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::Database;
use crate::environment::get_env_var_or;
use crate::llm::generate_llm_response;
use crate::metrics::SystemInfo;
use crate::profile::{
    format_enterprise_number, is_valid_enterprise_number, OrgProfile, ProfileFragment, SearchMode,
};
use crate::prompt;
use crate::report::{
    clean_and_parse_json, earliest_deadline, parse_profile_fragment, GrantReport, DEADLINE_SENTINEL,
};
use crate::{GeminiClient, LLMParams, WorkerDetail};

/// Registry lookups run nearly deterministic; the search temperature lives in
/// the worker configuration.
const ENRICHMENT_TEMPERATURE: f32 = 0.1;

/// Represents the response for an authentication request, containing a JWT token.
#[derive(Serialize)]
struct AuthResponse {
    token: String,
}

/// Represents the claims stored in a JWT token.
#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String, // Subject (the caller's client id)
    exp: usize,  // Expiration time (as a timestamp)
}

/// Represents the request payload for authentication, containing a client ID.
#[derive(Deserialize)]
struct AuthRequest {
    client_id: String,
}

/// Request payload for submitting a search: the profile plus an optional mode
/// override ("fast" or "deep").
#[derive(Deserialize)]
struct SearchSubmission {
    profile: OrgProfile,
    #[serde(default)]
    mode: Option<String>,
}

/// Request payload for a registry enrichment lookup.
#[derive(Deserialize)]
struct EnrichRequest {
    query: String,
}

#[derive(Deserialize)]
struct HistoryQuery {
    #[serde(default)]
    sort: Option<String>,
}

/// Static private key used for encoding and decoding JWT tokens.
static PRIVATE_KEY: Lazy<Mutex<Vec<u8>>> = Lazy::new(|| {
    let rng = SystemRandom::new();
    let mut key_bytes = vec![0u8; 32]; // 256-bit key for HMAC
    rng.fill(&mut key_bytes)
        .expect("Failed to generate secure random bytes");
    Mutex::new(key_bytes)
});

/// Static encoding key for generating JWT tokens.
static ENCODING_KEY: Lazy<EncodingKey> = Lazy::new(|| {
    let key = PRIVATE_KEY.lock().unwrap();
    EncodingKey::from_secret(&key)
});

/// Static decoding key for validating JWT tokens.
static DECODING_KEY: Lazy<DecodingKey> = Lazy::new(|| {
    let key = PRIVATE_KEY.lock().unwrap();
    DecodingKey::from_secret(&key)
});

/// Shared model client for enrichment lookups. Search workers carry their own.
static GEMINI_CLIENT: Lazy<Option<GeminiClient>> = Lazy::new(GeminiClient::from_env);

/// Main application loop, setting up and running the Axum-based API server.
pub async fn app_api_loop() -> Result<()> {
    let app = Router::new()
        .route("/status", get(status_check))
        .route("/authenticate", post(authenticate))
        .route("/searches", post(submit_search))
        .route("/searches/{id}", get(get_search))
        .route("/history", get(list_history).delete(clear_history))
        .route(
            "/history/{id}",
            get(get_history_item).delete(delete_history_item),
        )
        .route("/enrich", post(enrich_profile))
        .route("/profile", get(get_profile_draft).put(put_profile_draft));

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(8080);
    let addr = format!("0.0.0.0:{}", port);

    let listener = TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    info!("Server running on http://{}", addr);

    axum::serve(listener, app.into_make_service())
        .await
        .unwrap();

    Ok(())
}

/// Client ids are caller-chosen handles, not secrets; only their shape is
/// checked.
fn valid_client_id(client_id: &str) -> bool {
    (8..=64).contains(&client_id.len())
        && client_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// Validates a bearer token and returns the caller's client id.
fn validate_token(token: &str) -> Result<String, StatusCode> {
    decode::<Claims>(token, &DECODING_KEY, &Validation::new(Algorithm::HS256))
        .map(|data| data.claims.sub)
        .map_err(|e| {
            warn!("JWT validation failed: {:#?}", e);
            StatusCode::UNAUTHORIZED
        })
}

/// Handles authentication requests by validating the client ID and returning a JWT token.
async fn authenticate(Json(payload): Json<AuthRequest>) -> Result<Json<AuthResponse>, StatusCode> {
    info!("Authenticating client_id: {}", payload.client_id);

    if !valid_client_id(&payload.client_id) {
        tracing::error!("Invalid client id format: {}", payload.client_id);
        return Err(StatusCode::BAD_REQUEST);
    }

    let claims = Claims {
        sub: payload.client_id.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp() as usize,
    };

    let token = encode(&Header::new(Algorithm::HS256), &claims, &ENCODING_KEY)
        .expect("Failed to encode JWT");

    Ok(Json(AuthResponse { token }))
}

/// Checks the server's status, optionally validating a JWT if provided.
async fn status_check(
    auth_header: Option<TypedHeader<Authorization<Bearer>>>,
) -> Result<Json<Value>, StatusCode> {
    if let Some(TypedHeader(auth_header)) = auth_header {
        let token = auth_header.token();
        if decode::<Claims>(token, &DECODING_KEY, &Validation::new(Algorithm::HS256)).is_err() {
            info!("Invalid JWT provided for status check");
            return Err(StatusCode::UNAUTHORIZED);
        }
    }

    let db = Database::instance().await;
    let stats = db
        .collect_stats()
        .await
        .unwrap_or_else(|_| "unavailable".to_string());
    let request_count = db.request_count().await.unwrap_or(0);
    let system = SystemInfo::collect();

    Ok(Json(json!({
        "status": "OK",
        "version": env!("CARGO_PKG_VERSION"),
        "request_count": request_count,
        "db_stats": stats,
        "memory_used": system.memory_usage,
        "memory_total": system.memory_total,
        "cpu_usage": system.cpu_usage,
        "uptime": system.uptime,
        "threads": system.thread_count,
    })))
}

/// Queues a search for the submitted profile and replies 202 with the request
/// uuid to poll. Double-submits of an identical in-flight profile return the
/// original uuid.
async fn submit_search(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Json(payload): Json<SearchSubmission>,
) -> Result<(StatusCode, Json<Value>), StatusCode> {
    validate_token(auth_header.token())?;

    if payload.profile.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let mut profile = payload.profile;
    if let Some(mode) = payload.mode.as_deref() {
        profile.search_mode = SearchMode::from(mode);
    }

    let profile_json =
        serde_json::to_string(&profile).map_err(|_| StatusCode::BAD_REQUEST)?;
    let request_uuid = Uuid::new_v4().to_string();

    let db = Database::instance().await;
    match db
        .add_search_request(&request_uuid, &profile_json, &profile.search_mode.to_string())
        .await
    {
        Ok(accepted_uuid) => {
            info!(
                "Queued search request {} for '{}' ({} mode)",
                accepted_uuid, profile.name, profile.search_mode
            );
            Ok((
                StatusCode::ACCEPTED,
                Json(json!({ "request_uuid": accepted_uuid })),
            ))
        }
        Err(sqlx::Error::Protocol(e)) => {
            warn!("Rejected search request: {}", e);
            Err(StatusCode::BAD_REQUEST)
        }
        Err(e) => {
            warn!("Failed to queue search request: {:#?}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Returns the status and progress message of a request, and the report once
/// it completes.
async fn get_search(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Path(request_uuid): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    validate_token(auth_header.token())?;

    let db = Database::instance().await;
    match db.get_search_request(&request_uuid).await {
        Ok(Some((status, thought, report_uuid, error))) => {
            let mut body = json!({
                "request_uuid": request_uuid,
                "status": status,
                "thought": thought,
            });
            if status == "complete" {
                if let Some(report_uuid) = report_uuid {
                    if let Ok(Some(report_json)) = db.get_history_report(&report_uuid).await {
                        body["report_uuid"] = json!(report_uuid);
                        body["report"] =
                            serde_json::from_str(&report_json).unwrap_or(Value::Null);
                    }
                }
            }
            if let Some(error) = error {
                body["error"] = json!(error);
            }
            Ok(Json(body))
        }
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!("Failed to look up search request {}: {:#?}", request_uuid, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Lists stored reports, newest first, or by next closing deadline with
/// `?sort=deadline`.
async fn list_history(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Value>, StatusCode> {
    validate_token(auth_header.token())?;

    let db = Database::instance().await;
    let rows = db.list_history().await.map_err(|e| {
        warn!("Failed to list history: {:#?}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    let mut items: Vec<Value> = Vec::with_capacity(rows.len());
    for (report_uuid, profile_name, report_json, model, generated_at, opportunity_count) in rows {
        let next_deadline = serde_json::from_str::<GrantReport>(&report_json)
            .map(|report| earliest_deadline(&report).to_string())
            .unwrap_or_else(|_| DEADLINE_SENTINEL.to_string());
        items.push(json!({
            "report_uuid": report_uuid,
            "profile_name": profile_name,
            "model": model,
            "generated_at": generated_at,
            "opportunity_count": opportunity_count,
            "next_deadline": next_deadline,
        }));
    }

    if query.sort.as_deref() == Some("deadline") {
        // ISO dates compare correctly as strings.
        items.sort_by(|a, b| {
            let a_key = a["next_deadline"].as_str().unwrap_or(DEADLINE_SENTINEL);
            let b_key = b["next_deadline"].as_str().unwrap_or(DEADLINE_SENTINEL);
            a_key.cmp(b_key)
        });
    }

    Ok(Json(json!({ "history": items })))
}

/// Returns one stored report in full.
async fn get_history_item(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Path(report_uuid): Path<String>,
) -> Result<Json<Value>, StatusCode> {
    validate_token(auth_header.token())?;

    let db = Database::instance().await;
    match db.get_history_report(&report_uuid).await {
        Ok(Some(report_json)) => serde_json::from_str::<Value>(&report_json)
            .map(Json)
            .map_err(|e| {
                warn!("Stored report {} is unreadable: {:#?}", report_uuid, e);
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!("Failed to load report {}: {:#?}", report_uuid, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Deletes one stored report.
async fn delete_history_item(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Path(report_uuid): Path<String>,
) -> Result<StatusCode, StatusCode> {
    validate_token(auth_header.token())?;

    let db = Database::instance().await;
    match db.delete_history_report(&report_uuid).await {
        Ok(true) => Ok(StatusCode::OK),
        Ok(false) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!("Failed to delete report {}: {:#?}", report_uuid, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Clears the whole history.
async fn clear_history(
    auth_header: TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, StatusCode> {
    validate_token(auth_header.token())?;

    let db = Database::instance().await;
    match db.clear_history().await {
        Ok(deleted) => Ok(Json(json!({ "deleted": deleted }))),
        Err(e) => {
            warn!("Failed to clear history: {:#?}", e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Registry enrichment lookup, cache first. Model failures return the
/// degraded fragment rather than an error so the caller's form still fills.
async fn enrich_profile(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Json(payload): Json<EnrichRequest>,
) -> Result<Json<Value>, StatusCode> {
    validate_token(auth_header.token())?;

    let query = payload.query.trim();
    if query.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let cache_key = query.to_lowercase();
    let db = Database::instance().await;

    if let Ok(Some(cached_json)) = db.get_cached_enrichment(&cache_key).await {
        if let Ok(cached) = serde_json::from_str::<Value>(&cached_json) {
            return Ok(Json(cached));
        }
    }

    let params = match GEMINI_CLIENT.as_ref() {
        Some(client) => LLMParams {
            client: client.clone(),
            model: get_env_var_or("SEARCH_MODEL", "gemini-2.5-flash"),
            temperature: ENRICHMENT_TEMPERATURE,
            require_json: None,
            web_search: true,
        },
        None => {
            warn!("No model endpoint configured, returning degraded enrichment for '{}'", query);
            let fragment = ProfileFragment::degraded(query);
            return Ok(Json(serde_json::to_value(&fragment).unwrap_or(Value::Null)));
        }
    };

    let worker_detail = WorkerDetail {
        name: "enrichment".to_string(),
        id: 0,
        model: params.model.clone(),
    };

    let enrichment_prompt = prompt::enrichment_prompt(query);
    let parsed = generate_llm_response(&enrichment_prompt, &params, &worker_detail)
        .await
        .and_then(|response| clean_and_parse_json(&response.text))
        .map(|value| parse_profile_fragment(&value));

    let fragment = match parsed {
        Some(mut fragment) => {
            // The model sometimes omits the number it was asked about.
            if fragment.enterprise_number.is_none() && is_valid_enterprise_number(query) {
                fragment.enterprise_number = format_enterprise_number(query);
            }

            let has_name = fragment
                .name
                .as_deref()
                .map(|n| !n.trim().is_empty())
                .unwrap_or(false);
            if has_name {
                let fragment_json =
                    serde_json::to_string(&fragment).unwrap_or_else(|_| "{}".to_string());
                if let Err(e) = db.put_cached_enrichment(&cache_key, &fragment_json).await {
                    warn!("Failed to cache enrichment for '{}': {:#?}", cache_key, e);
                }
            }
            fragment
        }
        None => {
            info!("Registry lookup failed for '{}', returning degraded fragment", query);
            ProfileFragment::degraded(query)
        }
    };

    Ok(Json(serde_json::to_value(&fragment).unwrap_or(Value::Null)))
}

/// Returns the caller's saved profile draft.
async fn get_profile_draft(
    auth_header: TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, StatusCode> {
    let client_id = validate_token(auth_header.token())?;

    let db = Database::instance().await;
    match db.get_profile_draft(&client_id).await {
        Ok(Some(profile_json)) => serde_json::from_str::<Value>(&profile_json)
            .map(Json)
            .map_err(|e| {
                warn!("Stored draft for {} is unreadable: {:#?}", client_id, e);
                StatusCode::INTERNAL_SERVER_ERROR
            }),
        Ok(None) => Err(StatusCode::NOT_FOUND),
        Err(e) => {
            warn!("Failed to load draft for {}: {:#?}", client_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// Saves the caller's profile draft, replacing any previous one.
async fn put_profile_draft(
    auth_header: TypedHeader<Authorization<Bearer>>,
    Json(payload): Json<OrgProfile>,
) -> Result<StatusCode, StatusCode> {
    let client_id = validate_token(auth_header.token())?;

    let profile_json = serde_json::to_string(&payload).map_err(|_| StatusCode::BAD_REQUEST)?;

    let db = Database::instance().await;
    match db.save_profile_draft(&client_id, &profile_json).await {
        Ok(()) => Ok(StatusCode::OK),
        Err(e) => {
            warn!("Failed to save draft for {}: {:#?}", client_id, e);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_client_ids() {
        assert!(valid_client_id("dashboard-1"));
        assert!(valid_client_id("Team_Bruxelles_2026"));
        assert!(valid_client_id("abcd1234"));
    }

    #[test]
    fn test_invalid_client_ids() {
        assert!(!valid_client_id("short"));
        assert!(!valid_client_id("has spaces in it"));
        assert!(!valid_client_id("accentué-éèê"));
        assert!(!valid_client_id(&"x".repeat(65)));
    }
}
