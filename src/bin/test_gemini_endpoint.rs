use anyhow::Result;
use std::process;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use maecenas::environment::get_env_var_or;
use maecenas::llm::generate_llm_response;
use maecenas::{GeminiClient, LLMParams, WorkerDetail};

const TEST_PROMPT: &str = "Réponds par le seul mot: opérationnel";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    println!("GEMINI ENDPOINT STATUS REPORT");
    println!("=============================");

    let client = match GeminiClient::from_env() {
        Some(client) => client,
        None => {
            println!("❌ GEMINI_API_KEY is not set");
            process::exit(1);
        }
    };

    let search_model = get_env_var_or("SEARCH_MODEL", "gemini-2.5-flash");
    let audit_model = get_env_var_or("AUDIT_MODEL", &search_model);

    let mut up_count = 0;
    let mut models = vec![search_model.clone()];
    if audit_model != search_model {
        models.push(audit_model);
    }

    for model in &models {
        let params = LLMParams {
            client: client.clone(),
            model: model.clone(),
            temperature: 0.0,
            require_json: None,
            web_search: false,
        };
        let worker_detail = WorkerDetail {
            name: "endpoint probe".to_string(),
            id: 0,
            model: model.clone(),
        };

        let started = Instant::now();
        match generate_llm_response(TEST_PROMPT, &params, &worker_detail).await {
            Some(response) => {
                up_count += 1;
                println!("✅ {} - UP ({:.1}s)", model, started.elapsed().as_secs_f64());
                println!("  ℹ️ Replied: {}", response.text.trim());
            }
            None => {
                println!("❌ {} - DOWN", model);
            }
        }
        println!();
    }

    println!("📋 Summary: {}/{} models UP", up_count, models.len());

    if up_count < models.len() {
        process::exit(1);
    }

    Ok(())
}
