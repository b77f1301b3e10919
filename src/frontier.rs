//! Breadth-first traversal of listing pages. The frontier is run-scoped
//! state and is never persisted; an interrupted listing crawl restarts from
//! the configured start URLs on the next run.

use crate::error::ScrapeError;
use crate::fetch::{looks_like_login, PageFetcher};
use crate::sites::{classify, collect_links, scan_raw_links, SiteProfile};
use crate::store::RunLog;
use scraper::Html;
use std::collections::{HashSet, VecDeque};
use tracing::{info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The pagination queue drained.
    Exhausted,
    /// The visited count reached the configured page budget.
    BudgetReached,
}

#[derive(Debug, Clone, Default)]
pub struct CrawlLimits {
    pub max_pages: Option<usize>,
    pub max_details: Option<usize>,
}

#[derive(Debug)]
pub struct CrawlOutcome {
    pub detail_urls: Vec<Url>,
    pub termination: Termination,
    pub pages_fetched: usize,
}

#[derive(Debug, Default)]
pub struct CrawlFrontier {
    queue: VecDeque<Url>,
    enqueued: HashSet<Url>,
    visited: HashSet<Url>,
    details: Vec<Url>,
    seen_details: HashSet<Url>,
}

impl CrawlFrontier {
    pub fn from_start_urls(start_urls: &[String]) -> Result<CrawlFrontier, ScrapeError> {
        let mut frontier = CrawlFrontier::default();
        for start in start_urls {
            frontier.enqueue(Url::parse(start)?);
        }
        Ok(frontier)
    }

    pub fn enqueue(&mut self, url: Url) {
        if !self.visited.contains(&url) && self.enqueued.insert(url.clone()) {
            self.queue.push_back(url);
        }
    }

    /// Next queued URL that has not been visited yet.
    fn pop_pending(&mut self) -> Option<Url> {
        while let Some(url) = self.queue.pop_front() {
            if !self.visited.contains(&url) {
                return Some(url);
            }
        }
        None
    }

    fn add_details<I: IntoIterator<Item = Url>>(&mut self, urls: I) {
        for url in urls {
            if self.seen_details.insert(url.clone()) {
                self.details.push(url);
            }
        }
    }

    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

/// Drive the frontier to termination and return the discovered detail URLs
/// in first-seen order.
///
/// A single unreachable listing page is logged and skipped; landing on a
/// login page aborts the run, since nothing useful can be crawled without a
/// session.
pub async fn crawl_listings<F: PageFetcher>(
    fetcher: &F,
    profile: &SiteProfile,
    limits: &CrawlLimits,
    log: &RunLog,
) -> Result<CrawlOutcome, ScrapeError> {
    let mut frontier = CrawlFrontier::from_start_urls(&profile.start_urls)?;
    let mut pages_fetched = 0usize;

    let termination = loop {
        let Some(url) = frontier.pop_pending() else {
            break Termination::Exhausted;
        };
        if limits
            .max_pages
            .is_some_and(|max| frontier.visited_count() >= max)
        {
            break Termination::BudgetReached;
        }
        frontier.visited.insert(url.clone());

        let page = match fetcher.fetch_page(&url).await {
            Ok(page) => page,
            Err(err) => {
                warn!("Listing fetch failed for {url}: {err}");
                log.append(&format!("listing_fetch_failed url={url} error={err}"))?;
                continue;
            }
        };
        if looks_like_login(&page.final_url) {
            return Err(ScrapeError::AuthRequired(page.final_url.to_string()));
        }
        pages_fetched += 1;

        let doc = Html::parse_document(&page.body);
        let mut links = collect_links(&doc, &url);
        links.extend(scan_raw_links(&page.body, &url, profile));

        let classified = classify(&url, links, profile);
        frontier.add_details(classified.detail);
        for next_page in classified.pagination {
            frontier.enqueue(next_page);
        }
    };

    let mut detail_urls = frontier.details;
    if let Some(max) = limits.max_details {
        detail_urls.truncate(max);
    }
    info!(
        "Listing crawl finished: {} pages fetched, {} detail URLs, {:?}",
        pages_fetched,
        detail_urls.len(),
        termination
    );

    Ok(CrawlOutcome {
        detail_urls,
        termination,
        pages_fetched,
    })
}
