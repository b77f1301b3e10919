use auction_harvester::recovery::{
    compute_recovery, log_run, normalize_category, recovery_client, RecoveryOptions,
};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::prelude::*;
use url::Url;

#[derive(Parser, Debug)]
#[command(about = "Compute the recovery percentage for an auction result set.")]
struct Args {
    /// Live-auction or past-auctions results URL
    #[arg(long)]
    url: String,

    /// Items per page (past auctions)
    #[arg(long)]
    limit: Option<u32>,

    /// Max pages to scan (past auctions)
    #[arg(long)]
    pages: Option<u32>,

    /// Parallel page requests
    #[arg(long, default_value_t = 6)]
    concurrency: usize,

    /// Filter listings by category (electronics, appliances, miscellaneous)
    #[arg(long)]
    category: Option<String>,

    /// CSV log file for tracking runs
    #[arg(long, default_value = "recovery_runs.csv")]
    log_file: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| "info,hyper=warn,reqwest=info".into()),
        )
        .init();

    let args = Args::parse();
    let url = Url::parse(args.url.trim())?;
    let category = args.category.as_deref().and_then(normalize_category);

    let options = RecoveryOptions {
        limit: args.limit,
        max_pages: args.pages,
        concurrency: args.concurrency,
        category: category.clone(),
    };
    let client = recovery_client()?;
    let (report, mode) = compute_recovery(&client, &url, &options).await?;

    let label = match (mode, &category) {
        ("live-auction", Some(category)) => format!("{category} in that auction"),
        ("live-auction", None) => "the auction".to_string(),
        _ => "the search results".to_string(),
    };
    println!("Recovery for {label}:");
    println!();
    println!("{report}");

    log_run(&args.log_file, url.as_str(), category.as_deref(), mode, &report)?;
    Ok(())
}
