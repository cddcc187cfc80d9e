use anyhow::Result;
use clap::Parser;
use colored::Colorize;
use prettytable::{Cell, Row as PrettyRow, Table};
use std::env;
use std::process;
use uuid::Uuid;

use maecenas::db::core::Database;
use maecenas::environment::get_env_var_or;
use maecenas::logging;
use maecenas::profile::{OrgProfile, SearchMode, Sector};
use maecenas::report::GrantReport;
use maecenas::workers::search::pipeline::run_grant_search;
use maecenas::workers::{store_report, SearchJobParams};
use maecenas::{GeminiClient, LLMParams, WorkerDetail};

#[derive(Parser)]
#[clap(
    name = "run_search",
    about = "Run a grant search for one organization from the command line"
)]
struct Cli {
    /// Organization name
    #[clap(short, long)]
    name: String,

    /// Activity sector (French label, e.g. "Culture & Arts")
    #[clap(short, long, default_value = "Autre")]
    sector: String,

    /// Region ("Bruxelles-Capitale", "Wallonie", ...)
    #[clap(short, long, default_value = "Belgique (Fédéral)")]
    region: String,

    /// What the organization does, in a sentence or two
    #[clap(short, long, default_value = "")]
    description: String,

    /// Annual budget bracket
    #[clap(short, long, default_value = "< 50k€")]
    budget: String,

    /// BCE/KBO enterprise number, if known
    #[clap(short, long)]
    enterprise_number: Option<String>,

    /// Website, if any
    #[clap(short, long)]
    website: Option<String>,

    /// Search mode: "fast" or "deep"
    #[clap(short, long, default_value = "deep")]
    mode: String,

    /// Skip storing the report in history
    #[clap(long)]
    no_store: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::configure_logging();

    let args = Cli::parse();

    let client = match GeminiClient::from_env() {
        Some(client) => client,
        None => {
            eprintln!(
                "{}",
                "GEMINI_API_KEY environment variable required".bright_red()
            );
            process::exit(1);
        }
    };

    let profile = OrgProfile {
        enterprise_number: args.enterprise_number,
        name: args.name,
        website: args.website,
        sector: Sector::from(args.sector.as_str()),
        region: args.region,
        description: args.description,
        budget: args.budget,
        search_mode: SearchMode::from(args.mode.as_str()),
    };

    let search_model = get_env_var_or("SEARCH_MODEL", "gemini-2.5-flash");
    let audit_model = get_env_var_or("AUDIT_MODEL", &search_model);
    let temperature: f32 = env::var("LLM_TEMPERATURE")
        .unwrap_or("0.4".to_string())
        .parse()
        .unwrap_or(0.4);

    let search_params = LLMParams {
        client: client.clone(),
        model: search_model,
        temperature,
        require_json: None,
        web_search: true,
    };
    let audit_params = LLMParams {
        client,
        model: audit_model,
        temperature: 0.2,
        require_json: None,
        web_search: false,
    };

    let worker_detail = WorkerDetail {
        name: "cli search".to_string(),
        id: 0,
        model: search_params.model.clone(),
    };

    let db = Database::instance().await;
    let params = SearchJobParams {
        search_params: &search_params,
        audit_params: &audit_params,
        db,
    };

    println!("{}", "═".repeat(100).bright_blue());
    println!(
        "{}  {} ({}, {})",
        "GRANT SEARCH".bright_blue(),
        profile.name.bright_yellow(),
        profile.sector,
        profile.search_mode
    );
    println!("{}", "═".repeat(100).bright_blue());

    // Progress updates go to a queue row that does not exist; that is a no-op.
    let request_uuid = Uuid::new_v4().to_string();
    let report = run_grant_search(&profile, &request_uuid, &params, &worker_detail).await;

    print_report(&report);

    if !args.no_store {
        let report_uuid = store_report(db, &report, &search_params.model).await?;
        println!(
            "\n{} {}",
            "Stored in history as".dimmed(),
            report_uuid.dimmed()
        );
    }

    Ok(())
}

fn print_report(report: &GrantReport) {
    println!("\n{}", report.executive_summary.bright_green());

    if report.opportunities.is_empty() {
        println!("{}", "No opportunities survived filtering.".bright_yellow());
    } else {
        let mut table = Table::new();
        table.add_row(PrettyRow::new(vec![
            Cell::new("Score"),
            Cell::new("Title"),
            Cell::new("Provider"),
            Cell::new("Type"),
            Cell::new("Deadline"),
            Cell::new("URL"),
        ]));

        for opportunity in &report.opportunities {
            table.add_row(PrettyRow::new(vec![
                Cell::new(&opportunity.relevance_score.to_string()),
                Cell::new(&opportunity.title),
                Cell::new(&opportunity.provider),
                Cell::new(&opportunity.opportunity_type.to_string()),
                Cell::new(&opportunity.deadline_date),
                Cell::new(&opportunity.url),
            ]));
        }

        table.printstd();
    }

    println!("\n{}", "STRATEGIC ADVICE".bright_blue());
    println!("{}", "─".repeat(80).dimmed());
    println!("{}", report.strategic_advice);

    if !report.sources.is_empty() {
        println!("\n{}", "SOURCES".bright_blue());
        println!("{}", "─".repeat(80).dimmed());
        for source in &report.sources {
            println!("  {} {}", source.title.bright_magenta(), source.url);
        }
    }
}
