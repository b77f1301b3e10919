use auction_harvester::fetch::{Credentials, HttpClient};
use auction_harvester::frontier::CrawlLimits;
use auction_harvester::sites::{Site, SiteProfile};
use auction_harvester::store::Store;
use auction_harvester::{run_scrape, RunOptions};
use clap::Parser;
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::info;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(about = "Scrape liquidation-marketplace auction listings.")]
struct Args {
    /// Site to scrape
    #[arg(long, value_enum)]
    site: Site,

    /// Override start URL(s). Can be used multiple times.
    #[arg(long = "start-url")]
    start_urls: Vec<String>,

    /// Base output directory
    #[arg(long, default_value = "auctions")]
    out_base: PathBuf,

    /// Output year directory (default: current year)
    #[arg(long)]
    year: Option<String>,

    /// Max listing pages to crawl
    #[arg(long)]
    max_pages: Option<usize>,

    /// Max auction detail pages to scrape
    #[arg(long)]
    max_auctions: Option<usize>,

    /// Delay between requests (seconds)
    #[arg(long, default_value_t = 1.0)]
    delay: f64,

    /// Download manifest files when available
    #[arg(long)]
    manifest: bool,

    /// Skip auctions already present in the log
    #[arg(long)]
    resume: bool,

    /// Path to a Netscape-format cookie jar file
    #[arg(long)]
    cookie_file: Option<PathBuf>,

    /// Raw Cookie header value to include in requests
    #[arg(long)]
    cookie_header: Option<String>,

    /// Additional request header in the form 'Key: Value' (repeatable)
    #[arg(long = "header")]
    headers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let args = Args::parse();

    let start_urls = (!args.start_urls.is_empty()).then(|| args.start_urls.clone());
    let profile = SiteProfile::new(args.site, start_urls);

    let extra_headers = args
        .headers
        .iter()
        .filter_map(|header| header.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();
    let credentials = Credentials {
        cookie_file: args.cookie_file,
        cookie_header: args.cookie_header,
        extra_headers,
    };
    let client = HttpClient::new(Duration::from_secs_f64(args.delay.max(0.0)), &credentials)?;

    let year = args
        .year
        .unwrap_or_else(|| chrono::Local::now().format("%Y").to_string());
    let store = Store::open(&args.out_base, profile.name(), &year)?;

    let options = RunOptions {
        limits: CrawlLimits {
            max_pages: args.max_pages,
            max_details: args.max_auctions,
        },
        resume: args.resume,
        download_manifests: args.manifest,
    };

    let summary = run_scrape(&client, &profile, &options, &store).await?;
    info!(
        "Appended {}, skipped {}, failed {}",
        summary.appended, summary.skipped, summary.failed
    );
    println!("{}", store.site_root().display());

    Ok(())
}
