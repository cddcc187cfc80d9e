use anyhow::Result;
use std::env;
use tracing::{error, info};

use maecenas::db::Database;
use maecenas::environment::get_env_var_or;
use maecenas::workers::search::search_loop;
use maecenas::{app_api, logging, GeminiClient, LLMParams};

/// Reviewer passes run colder than the search itself.
const AUDIT_TEMPERATURE: f32 = 0.2;

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    info!(
        "Starting maecenas {} (built {}, commit {})",
        env!("CARGO_PKG_VERSION"),
        env!("BUILD_TIMESTAMP"),
        option_env!("GIT_HASH").unwrap_or("unknown")
    );

    let client = match GeminiClient::from_env() {
        Some(client) => client,
        None => {
            error!("GEMINI_API_KEY environment variable required");
            std::process::exit(1);
        }
    };

    // Warm up the database before any worker races to it.
    let db = Database::instance().await;
    let pending = db.count_pending_search_requests().await.unwrap_or(0);
    info!("Database ready ({} searches already queued)", pending);

    let search_model = get_env_var_or("SEARCH_MODEL", "gemini-2.5-flash");
    let audit_model = get_env_var_or("AUDIT_MODEL", &search_model);

    let temperature: f32 = env::var("LLM_TEMPERATURE")
        .unwrap_or("0.4".to_string())
        .parse()
        .unwrap_or(0.4);

    let worker_count: i16 = env::var("SEARCH_WORKERS")
        .unwrap_or("2".to_string())
        .parse()
        .unwrap_or(2);

    info!(
        "Spawning {} search workers (search model {}, audit model {}, temperature {})",
        worker_count, search_model, audit_model, temperature
    );

    for worker_id in 0..worker_count {
        let search_params = LLMParams {
            client: client.clone(),
            model: search_model.clone(),
            temperature,
            require_json: None,
            web_search: true,
        };
        let audit_params = LLMParams {
            client: client.clone(),
            model: audit_model.clone(),
            temperature: AUDIT_TEMPERATURE,
            require_json: None,
            web_search: false,
        };

        tokio::spawn(async move {
            if let Err(e) = search_loop(worker_id, search_params, audit_params).await {
                error!("search worker {} exited: {:?}", worker_id, e);
            }
        });
    }

    // The API serves until the process is killed.
    app_api::app_api_loop().await
}
