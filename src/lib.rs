pub mod app_api;
pub mod db;
pub mod environment;
pub mod llm;
pub mod logging;
pub mod metrics;
pub mod profile;
pub mod prompt;
pub mod report;
pub mod util;
pub mod workers;

pub const TARGET_LLM_REQUEST: &str = "llm_request";
pub const TARGET_DB: &str = "db_query";

/// Handle on the hosted generation endpoint. One client is shared by every
/// worker; reqwest pools connections internally.
#[derive(Clone, Debug)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        GeminiClient {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    /// Reads GEMINI_BASE_URL and GEMINI_API_KEY; the key is required.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").ok()?;
        if api_key.trim().is_empty() {
            return None;
        }
        let base_url = std::env::var("GEMINI_BASE_URL")
            .unwrap_or_else(|_| "https://generativelanguage.googleapis.com/v1beta".to_string());
        Some(GeminiClient::new(base_url, api_key))
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn generate_url(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        )
    }
}

#[derive(Clone)]
pub struct LLMParams {
    pub client: GeminiClient,
    pub model: String,
    pub temperature: f32,
    pub require_json: Option<bool>,
    pub web_search: bool,
}

#[derive(Clone, Debug)]
pub struct WorkerDetail {
    pub name: String,
    pub id: i16,
    pub model: String,
}
