use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::{LLMParams, WorkerDetail, TARGET_LLM_REQUEST};

/// Per-attempt ceiling. Grounded search calls routinely run for minutes.
const LLM_TIMEOUT_SECS: u64 = 300;

/// A web source the model grounded its answer on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRef {
    pub url: String,
    pub title: String,
}

/// Text and grounding sources extracted from a generateContent response.
#[derive(Debug, Clone, Default)]
pub struct ModelResponse {
    pub text: String,
    pub sources: Vec<SourceRef>,
}

pub async fn generate_llm_response(
    prompt: &str,
    params: &LLMParams,
    worker_detail: &WorkerDetail,
) -> Option<ModelResponse> {
    let max_retries = 3;
    let mut model_response: Option<ModelResponse> = None;
    let mut backoff = 2;

    debug!(target: TARGET_LLM_REQUEST, "[{} {} {}]: starting LLM request ({} prompt chars).",
        worker_detail.name, worker_detail.id, worker_detail.model, prompt.len());

    let url = params.client.generate_url(&params.model);
    let payload = build_payload(prompt, params);

    for retry_count in 0..max_retries {
        let request = params
            .client
            .http()
            .post(&url)
            .header("Content-Type", "application/json")
            .body(payload.to_string())
            .send();

        match timeout(Duration::from_secs(LLM_TIMEOUT_SECS), request).await {
            Ok(Ok(response)) => {
                let status = response.status();
                if status.is_success() {
                    match response.json::<Value>().await {
                        Ok(body) => match extract_response(&body) {
                            Some(extracted) => {
                                debug!(target: TARGET_LLM_REQUEST, "[{} {} {}]: LLM response received ({} chars, {} sources).",
                                    worker_detail.name, worker_detail.id, worker_detail.model, extracted.text.len(), extracted.sources.len());
                                model_response = Some(extracted);
                                break;
                            }
                            None => {
                                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: response carried no candidates.",
                                    worker_detail.name, worker_detail.id, worker_detail.model);
                            }
                        },
                        Err(e) => {
                            warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: failed to decode response body: {}",
                                worker_detail.name, worker_detail.id, worker_detail.model, e);
                        }
                    }
                } else if status.as_u16() == 429 || status.is_server_error() {
                    warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: transient status {} from endpoint.",
                        worker_detail.name, worker_detail.id, worker_detail.model, status);
                } else {
                    // Remaining 4xx statuses mean the request itself is bad
                    // (invalid key, malformed payload). Retrying cannot help.
                    let error_text = response.text().await.unwrap_or_default();
                    error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: permanent status {}: {}",
                        worker_detail.name, worker_detail.id, worker_detail.model, status, error_text);
                    return None;
                }

                if retry_count < max_retries - 1 {
                    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: Retrying LLM request... ({}/{})",
                        worker_detail.name, worker_detail.id, worker_detail.model, retry_count + 1, max_retries);
                } else {
                    error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: failed to generate response after {} retries",
                        worker_detail.name, worker_detail.id, worker_detail.model, max_retries);
                }
            }
            Ok(Err(e)) => {
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: error sending request: {}",
                    worker_detail.name, worker_detail.id, worker_detail.model, e);
                if retry_count < max_retries - 1 {
                    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: Retrying LLM request... ({}/{})",
                        worker_detail.name, worker_detail.id, worker_detail.model, retry_count + 1, max_retries);
                } else {
                    error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: failed to generate response after {} retries",
                        worker_detail.name, worker_detail.id, worker_detail.model, max_retries);
                }
            }
            Err(_) => {
                warn!(target: TARGET_LLM_REQUEST, "[{} {} {}]: LLM request timed out",
                    worker_detail.name, worker_detail.id, worker_detail.model);
                if retry_count < max_retries - 1 {
                    info!(target: TARGET_LLM_REQUEST, "[{} {} {}]: Retrying LLM request... ({}/{})",
                        worker_detail.name, worker_detail.id, worker_detail.model, retry_count + 1, max_retries);
                } else {
                    error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: failed to generate response after {} retries due to timeouts",
                        worker_detail.name, worker_detail.id, worker_detail.model, max_retries);
                }
            }
        }

        if retry_count < max_retries - 1 {
            let jitter = rand::rng().random_range(0..200);
            debug!(target: TARGET_LLM_REQUEST, "[{} {} {}]: backing off for {} seconds before retry",
                worker_detail.name, worker_detail.id, worker_detail.model, backoff);
            sleep(Duration::from_secs(backoff) + Duration::from_millis(jitter)).await;
            backoff *= 2; // Exponential backoff
        }
    }

    match model_response {
        Some(response) if !response.text.is_empty() => Some(response),
        _ => {
            error!(target: TARGET_LLM_REQUEST, "[{} {} {}]: no usable response generated after all retries",
                worker_detail.name, worker_detail.id, worker_detail.model);
            None
        }
    }
}

/// Builds the generateContent payload. Grounded requests carry the
/// google_search tool and must keep the text/plain MIME type: the endpoint
/// rejects the tool combined with application/json.
fn build_payload(prompt: &str, params: &LLMParams) -> Value {
    let mut generation_config = json!({ "temperature": params.temperature });
    if params.web_search {
        generation_config["responseMimeType"] = json!("text/plain");
    } else if params.require_json.unwrap_or(false) {
        generation_config["responseMimeType"] = json!("application/json");
    }

    let mut payload = json!({
        "contents": [{ "parts": [{ "text": prompt }] }],
        "generationConfig": generation_config,
    });
    if params.web_search {
        payload["tools"] = json!([{ "google_search": {} }]);
    }
    payload
}

/// Concatenates the first candidate's text parts and collects grounding
/// sources. Returns None when the body carries no candidates at all.
fn extract_response(body: &Value) -> Option<ModelResponse> {
    let candidate = body.get("candidates").and_then(Value::as_array)?.first()?;

    let mut text = String::new();
    if let Some(parts) = candidate
        .get("content")
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
    {
        for part in parts {
            if let Some(fragment) = part.get("text").and_then(Value::as_str) {
                text.push_str(fragment);
            }
        }
    }

    let mut sources = Vec::new();
    if let Some(chunks) = candidate
        .get("groundingMetadata")
        .and_then(|metadata| metadata.get("groundingChunks"))
        .and_then(Value::as_array)
    {
        for chunk in chunks {
            if let Some(web) = chunk.get("web") {
                let url = web.get("uri").and_then(Value::as_str).unwrap_or_default();
                if url.is_empty() {
                    continue;
                }
                let title = web.get("title").and_then(Value::as_str).unwrap_or(url);
                sources.push(SourceRef {
                    url: url.to_string(),
                    title: title.to_string(),
                });
            }
        }
    }

    Some(ModelResponse { text, sources })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GeminiClient;

    fn test_params(web_search: bool, require_json: Option<bool>) -> LLMParams {
        LLMParams {
            client: GeminiClient::new(
                "https://generativelanguage.googleapis.com/v1beta".to_string(),
                "test-key".to_string(),
            ),
            model: "gemini-2.5-flash".to_string(),
            temperature: 0.4,
            require_json,
            web_search,
        }
    }

    #[test]
    fn test_grounded_payload_forces_plain_text() {
        let payload = build_payload("bonjour", &test_params(true, Some(true)));
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            json!("text/plain")
        );
        assert_eq!(payload["tools"], json!([{ "google_search": {} }]));
    }

    #[test]
    fn test_ungrounded_json_payload() {
        let payload = build_payload("bonjour", &test_params(false, Some(true)));
        assert_eq!(
            payload["generationConfig"]["responseMimeType"],
            json!("application/json")
        );
        assert!(payload.get("tools").is_none());
    }

    #[test]
    fn test_plain_payload_sets_no_mime_type() {
        let payload = build_payload("bonjour", &test_params(false, None));
        assert!(payload["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_extract_response_concatenates_parts_and_sources() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Premier " }, { "text": "second" }] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "web": { "uri": "https://www.wallonie.be/aides", "title": "Aides" } },
                        { "web": { "uri": "" } },
                        { "other": {} }
                    ]
                }
            }]
        });
        let response = extract_response(&body).unwrap();
        assert_eq!(response.text, "Premier second");
        assert_eq!(response.sources.len(), 1);
        assert_eq!(response.sources[0].url, "https://www.wallonie.be/aides");
    }

    #[test]
    fn test_extract_response_untitled_source_falls_back_to_url() {
        let body = json!({
            "candidates": [{
                "content": { "parts": [] },
                "groundingMetadata": {
                    "groundingChunks": [{ "web": { "uri": "https://example.be" } }]
                }
            }]
        });
        let response = extract_response(&body).unwrap();
        assert_eq!(response.sources[0].title, "https://example.be");
    }

    #[test]
    fn test_extract_response_without_candidates() {
        assert!(extract_response(&json!({})).is_none());
        assert!(extract_response(&json!({ "candidates": [] })).is_none());
    }

    #[test]
    fn test_generate_url_shape() {
        let params = test_params(false, None);
        assert_eq!(
            params.client.generate_url(&params.model),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-flash:generateContent?key=test-key"
        );
    }
}
