//! Crawl-and-extract pipeline for liquidation-auction marketplaces:
//! listing-page frontier, per-site detail extraction, and an append-only
//! resumable store.

use std::path::Path;
use tracing::{debug, info, warn};
use url::Url;

pub mod error;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod parse;
pub mod record;
pub mod recovery;
pub mod sites;
pub mod store;

mod utils;

pub use error::ScrapeError;
pub use record::ListingRecord;

use crate::extract::extract_detail;
use crate::fetch::PageFetcher;
use crate::frontier::{crawl_listings, CrawlLimits};
use crate::sites::{Site, SiteProfile};
use crate::store::Store;

pub struct RunOptions {
    pub limits: CrawlLimits,
    pub resume: bool,
    pub download_manifests: bool,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub appended: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// One full scrape run: crawl listings, then fetch, extract and persist each
/// discovered detail page.
///
/// Per-item failures are absorbed and logged; only a completely unreachable
/// source or a login redirect surfaces as an error.
pub async fn run_scrape<F: PageFetcher>(
    fetcher: &F,
    profile: &SiteProfile,
    options: &RunOptions,
    store: &Store,
) -> Result<RunSummary, ScrapeError> {
    let outcome = crawl_listings(fetcher, profile, &options.limits, store.run_log()).await?;
    if outcome.pages_fetched == 0 {
        return Err(ScrapeError::SourceUnavailable(profile.name().to_string()));
    }

    let existing = store.load_log()?;
    let mut logged_urls = Store::logged_urls(&existing);
    info!(
        "{} entries already logged, {} detail URLs discovered",
        existing.len(),
        outcome.detail_urls.len()
    );

    let mut summary = RunSummary::default();
    let mut new_records = Vec::new();

    for url in &outcome.detail_urls {
        if options.resume && logged_urls.contains(url.as_str()) {
            debug!("Already logged, skipping {}", url);
            summary.skipped += 1;
            continue;
        }

        let page = match fetcher.fetch_page(url).await {
            Ok(page) => page,
            Err(err) => {
                warn!("Detail fetch failed for {url}: {err}");
                store
                    .run_log()
                    .append(&format!("detail_fetch_failed url={url} error={err}"))?;
                summary.failed += 1;
                continue;
            }
        };

        // Links inside the page resolve against wherever the fetch landed;
        // the frontier URL stays the record's identity and resume key.
        let fields = extract_detail(profile.site, &page.body, &page.final_url);
        let record = ListingRecord::new(url.to_string(), profile.name(), utils::get_now(), fields);
        debug!("Extracted {url}\n{record}");

        let item_id = item_id_for(profile.site, &record, url);
        let item_dir = store.write_detail_artifacts(&record, &page.body, item_id.as_deref())?;

        if options.download_manifests {
            if let Some(manifest) = record.get_str("manifest_url") {
                if let Err(err) = download_manifest(fetcher, manifest, &item_dir, store).await {
                    warn!("Manifest download failed for {manifest}: {err}");
                    store
                        .run_log()
                        .append(&format!("manifest_download_failed url={manifest} error={err}"))?;
                }
            }
        }

        store.append_record(&record)?;
        logged_urls.insert(record.url.clone());
        new_records.push(record);
        summary.appended += 1;
    }

    let mut all_records = existing;
    all_records.extend(new_records);
    store.write_summary(&all_records)?;

    info!(
        "Run finished: {} appended, {} skipped, {} failed",
        summary.appended, summary.skipped, summary.failed
    );
    Ok(summary)
}

fn item_id_for(site: Site, record: &ListingRecord, url: &Url) -> Option<String> {
    match site {
        Site::Techliquidators => record
            .get_str("auction_id")
            .map(ToString::to_string)
            .or_else(|| sites::techliquidators::auction_id(url)),
        Site::Liquidation => sites::liquidation::lot_id(url),
    }
}

async fn download_manifest<F: PageFetcher>(
    fetcher: &F,
    manifest: &str,
    item_dir: &Path,
    store: &Store,
) -> Result<(), ScrapeError> {
    let manifest_url = Url::parse(manifest)?;
    let bytes = fetcher.fetch_bytes(&manifest_url).await?;
    store.write_manifest(item_dir, &bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::testing::{detail_url, listing_page, page_url, StubFetcher};
    use pretty_assertions::assert_eq;

    fn detail_page(title: &str) -> String {
        format!(
            r#"<html><head><meta property="og:title" content="{title}"></head>
            <body><ul><li>Current Bid: $10.00</li></ul></body></html>"#
        )
    }

    fn fixture_pages() -> Vec<(String, String)> {
        let d1 = detail_url("ml1");
        let d2 = detail_url("ml2");
        vec![
            (page_url(1), listing_page(&[&d1, &d2], &[])),
            (d1, detail_page("Pallet One")),
            (d2, detail_page("Pallet Two")),
        ]
    }

    fn profile() -> SiteProfile {
        SiteProfile::new(Site::Techliquidators, Some(vec![page_url(1)]))
    }

    fn options(resume: bool) -> RunOptions {
        RunOptions {
            limits: CrawlLimits::default(),
            resume,
            download_manifests: false,
        }
    }

    #[tokio::test]
    async fn resume_performs_zero_additional_detail_fetches() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "techliquidators", "2026").unwrap();

        let first = StubFetcher::new(fixture_pages());
        let summary = run_scrape(&first, &profile(), &options(true), &store)
            .await
            .unwrap();
        assert_eq!(summary.appended, 2);
        // One listing page plus two detail pages.
        assert_eq!(first.fetch_count(), 3);

        let second = StubFetcher::new(fixture_pages());
        let summary = run_scrape(&second, &profile(), &options(true), &store)
            .await
            .unwrap();
        assert_eq!(summary.appended, 0);
        assert_eq!(summary.skipped, 2);
        // Only the listing crawl ran; no detail page was fetched again.
        assert_eq!(second.fetch_count(), 1);

        // Exactly one log entry per URL across both runs.
        let log = store.load_log().unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(Store::logged_urls(&log).len(), 2);
    }

    #[tokio::test]
    async fn unreachable_source_surfaces_as_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "techliquidators", "2026").unwrap();
        let fetcher = StubFetcher::new(Vec::new());

        let result = run_scrape(&fetcher, &profile(), &options(false), &store).await;
        assert!(matches!(result, Err(ScrapeError::SourceUnavailable(_))));
    }

    #[tokio::test]
    async fn failed_detail_fetches_are_absorbed() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "techliquidators", "2026").unwrap();

        let d1 = detail_url("ml1");
        let d2 = detail_url("ml2");
        // d1 is discovered but never resolvable.
        let fetcher = StubFetcher::new(vec![
            (page_url(1), listing_page(&[&d1, &d2], &[])),
            (d2.clone(), detail_page("Pallet Two")),
        ]);

        let summary = run_scrape(&fetcher, &profile(), &options(false), &store)
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.appended, 1);

        let logged = std::fs::read_to_string(store.site_root().join("scrape.log")).unwrap();
        assert!(logged.contains("detail_fetch_failed"));
        assert!(logged.contains(&d1));

        let log = store.load_log().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].url, d2);
    }

    #[tokio::test]
    async fn manifests_download_when_enabled() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path(), "techliquidators", "2026").unwrap();

        let d1 = detail_url("ml1");
        let manifest_url = "https://www.techliquidators.com/manifests/ml1.xlsx";
        let body = r#"<html><body><h1>Pallet One</h1>
            <a class="listing-details__download-manifest-link" href="/manifests/ml1.xlsx">m</a>
            </body></html>"#
            .to_string();
        let fetcher = StubFetcher::new(vec![
            (page_url(1), listing_page(&[&d1], &[])),
            (d1, body),
            (manifest_url.to_string(), "xlsx-bytes".to_string()),
        ]);

        let options = RunOptions {
            limits: CrawlLimits::default(),
            resume: false,
            download_manifests: true,
        };
        run_scrape(&fetcher, &profile(), &options, &store)
            .await
            .unwrap();

        let manifest_path = store
            .site_root()
            .join("techliquidators_ml1_pallet-one")
            .join("manifest.xlsx");
        let bytes = std::fs::read(manifest_path).unwrap();
        assert_eq!(bytes, b"xlsx-bytes");
    }
}
