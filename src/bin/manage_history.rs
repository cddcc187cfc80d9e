use anyhow::Result;
use chrono::{DateTime, Local};
use clap::{Parser, Subcommand};
use prettytable::{Cell, Row as PrettyRow, Table};
use std::io::{self, Write};

use maecenas::db::core::Database;
use maecenas::report::{earliest_deadline, GrantReport};

#[derive(Parser)]
#[clap(name = "history-manager", about = "Manage stored grant reports")]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List stored reports
    List {
        /// Number of reports to show
        #[clap(short, long, default_value = "20")]
        limit: usize,

        /// Sort by next closing deadline instead of recency
        #[clap(short, long)]
        by_deadline: bool,
    },

    /// Show one report in full
    Show {
        /// Report uuid
        #[clap(required = true)]
        id: String,

        /// Print the raw stored JSON instead of a table
        #[clap(short, long)]
        raw: bool,
    },

    /// Delete one report
    Delete {
        /// Report uuid
        #[clap(required = true)]
        id: String,
    },

    /// Delete every stored report
    Clear {
        /// Skip the confirmation prompt
        #[clap(short, long)]
        yes: bool,
    },

    /// Display history and cache statistics
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    maecenas::logging::configure_logging();

    let args = Cli::parse();

    let db = Database::instance().await;

    match args.command {
        Commands::List { limit, by_deadline } => {
            list_reports(db, limit, by_deadline).await?;
        }
        Commands::Show { id, raw } => {
            show_report(db, &id, raw).await?;
        }
        Commands::Delete { id } => {
            if db.delete_history_report(&id).await? {
                println!("✅ Deleted report {}", id);
            } else {
                println!("❌ No report found with uuid {}", id);
            }
        }
        Commands::Clear { yes } => {
            clear_reports(db, yes).await?;
        }
        Commands::Stats => {
            show_stats(db).await?;
        }
    }

    Ok(())
}

/// Lists reports in a formatted table
async fn list_reports(db: &Database, limit: usize, by_deadline: bool) -> Result<()> {
    let rows = db.list_history().await?;

    if rows.is_empty() {
        println!("No reports stored.");
        return Ok(());
    }

    let mut entries: Vec<(String, String, String, String, i64, String)> = rows
        .into_iter()
        .map(
            |(report_uuid, profile_name, report_json, model, generated_at, opportunity_count)| {
                let next_deadline = serde_json::from_str::<GrantReport>(&report_json)
                    .map(|report| earliest_deadline(&report).to_string())
                    .unwrap_or_else(|_| "?".to_string());
                (
                    report_uuid,
                    profile_name,
                    model,
                    generated_at,
                    opportunity_count,
                    next_deadline,
                )
            },
        )
        .collect();

    if by_deadline {
        entries.sort_by(|a, b| a.5.cmp(&b.5));
    }

    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("UUID"),
        Cell::new("Organization"),
        Cell::new("Model"),
        Cell::new("Generated"),
        Cell::new("Opportunities"),
        Cell::new("Next Deadline"),
    ]));

    for (report_uuid, profile_name, model, generated_at, opportunity_count, next_deadline) in
        entries.into_iter().take(limit)
    {
        // Format dates for readability
        let generated = DateTime::parse_from_rfc3339(&generated_at)
            .map(|dt| {
                dt.with_timezone(&Local)
                    .format("%Y-%m-%d %H:%M")
                    .to_string()
            })
            .unwrap_or(generated_at);

        table.add_row(PrettyRow::new(vec![
            Cell::new(&report_uuid),
            Cell::new(&profile_name),
            Cell::new(&model),
            Cell::new(&generated),
            Cell::new(&opportunity_count.to_string()),
            Cell::new(&next_deadline),
        ]));
    }

    table.printstd();
    Ok(())
}

/// Shows one report's opportunities and narrative
async fn show_report(db: &Database, report_uuid: &str, raw: bool) -> Result<()> {
    let report_json = match db.get_history_report(report_uuid).await? {
        Some(report_json) => report_json,
        None => {
            println!("❌ No report found with uuid {}", report_uuid);
            return Ok(());
        }
    };

    if raw {
        println!("{}", report_json);
        return Ok(());
    }

    let report: GrantReport = serde_json::from_str(&report_json)?;

    println!("Report for: {}", report.profile_name);
    println!("Generated:  {}", report.generated_at);
    println!();
    println!("{}", report.executive_summary);
    println!();

    if report.opportunities.is_empty() {
        println!("(no opportunities)");
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

    println!();
    println!("{}", report.strategic_advice);

    if !report.sources.is_empty() {
        println!();
        println!("Sources:");
        for source in &report.sources {
            println!("  {} - {}", source.title, source.url);
        }
    }

    Ok(())
}

/// Clears the whole history after confirmation
async fn clear_reports(db: &Database, yes: bool) -> Result<()> {
    if !yes {
        // Confirm with user before proceeding
        print!("⚠️ This operation cannot be undone. Continue? [y/N] ");
        io::stdout().flush()?;

        let mut input = String::new();
        io::stdin().read_line(&mut input)?;

        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Operation cancelled");
            return Ok(());
        }
    }

    let deleted = db.clear_history().await?;
    println!("✅ Deleted {} reports", deleted);
    Ok(())
}

/// Prints history, cache and counter statistics
async fn show_stats(db: &Database) -> Result<()> {
    let history_count = db.count_history().await?;
    let pending = db.count_pending_search_requests().await?;
    let (cache_entries, cache_hits) = db.enrichment_cache_stats().await?;
    let request_count = db.request_count().await?;

    let mut table = Table::new();
    table.add_row(PrettyRow::new(vec![
        Cell::new("Stored reports"),
        Cell::new(&history_count.to_string()),
    ]));
    table.add_row(PrettyRow::new(vec![
        Cell::new("Pending searches"),
        Cell::new(&pending.to_string()),
    ]));
    table.add_row(PrettyRow::new(vec![
        Cell::new("Enrichment cache entries"),
        Cell::new(&cache_entries.to_string()),
    ]));
    table.add_row(PrettyRow::new(vec![
        Cell::new("Enrichment cache hits"),
        Cell::new(&cache_hits.to_string()),
    ]));
    table.add_row(PrettyRow::new(vec![
        Cell::new("Public request counter"),
        Cell::new(&request_count.to_string()),
    ]));

    table.printstd();
    Ok(())
}
