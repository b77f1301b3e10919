//! Aggregate recovery computation over paginated auction result sets.
//!
//! Listing cards carry a retail price and a final (or current) price; the
//! recovery percentage is the ratio of the two summed over every card. Page
//! fetches beyond the first run through a bounded worker pool; sums and
//! counts are commutative, so results merge in completion order.

use crate::error::ScrapeError;
use crate::fetch::USER_AGENT;
use futures::stream::{self, StreamExt};
use lazy_regex::regex;
use std::fmt;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::warn;
use url::Url;

const CARD_START: &str = r#"class="card listing-card lot-card""#;
const PAGINATION_WINDOW: usize = 2500;

#[derive(Debug, Clone, PartialEq)]
pub struct ListingCard {
    pub retail: f64,
    pub final_price: f64,
    pub listing_url: Option<String>,
}

#[derive(Debug, Default, PartialEq)]
pub struct RecoveryReport {
    pub count: usize,
    pub retail_total: f64,
    pub final_total: f64,
}

impl RecoveryReport {
    pub fn from_cards<'a, I>(cards: I) -> RecoveryReport
    where
        I: IntoIterator<Item = &'a ListingCard>,
    {
        let mut report = RecoveryReport::default();
        for card in cards {
            report.count += 1;
            report.retail_total += card.retail;
            report.final_total += card.final_price;
        }
        report
    }

    pub fn recovery_pct(&self) -> f64 {
        if self.retail_total > 0.0 {
            self.final_total / self.retail_total * 100.0
        } else {
            0.0
        }
    }
}

impl fmt::Display for RecoveryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "- Listings counted: {}", self.count)?;
        writeln!(f, "- Total retail: {}", format_money(self.retail_total))?;
        writeln!(f, "- Total final price: {}", format_money(self.final_total))?;
        write!(f, "- Recovery percentage: {:.2}%", self.recovery_pct())
    }
}

#[derive(Debug, Clone)]
pub struct RecoveryOptions {
    pub limit: Option<u32>,
    pub max_pages: Option<u32>,
    pub concurrency: usize,
    pub category: Option<String>,
}

impl Default for RecoveryOptions {
    fn default() -> Self {
        RecoveryOptions {
            limit: None,
            max_pages: None,
            concurrency: 6,
            category: None,
        }
    }
}

pub fn recovery_client() -> Result<reqwest::Client, ScrapeError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(std::time::Duration::from_secs(30))
        .build()?)
}

/// Split the raw HTML on the card-start marker and read one card per block.
/// Blocks missing either price are not listings and contribute nothing.
pub fn parse_cards(html: &str) -> Vec<ListingCard> {
    let starts: Vec<usize> = html.match_indices(CARD_START).map(|(index, _)| index).collect();
    let mut cards = Vec::new();
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(html.len());
        let block = &html[start..end];

        let retail = regex!(r#"retail-price-amount">\s*\$\s*([0-9,]+(?:\.[0-9]{2})?)"#)
            .captures(block)
            .and_then(|caps| caps[1].replace(',', "").parse::<f64>().ok());
        let final_price = regex!(r"au-price price[\s\S]*?\$\s*([0-9,]+(?:\.[0-9]{2})?)")
            .captures(block)
            .and_then(|caps| caps[1].replace(',', "").parse::<f64>().ok());
        let (Some(retail), Some(final_price)) = (retail, final_price) else {
            continue;
        };

        let listing_url = regex!(r#"href="(https://www\.quickbidz\.com/listing/[^"]+)""#)
            .captures(block)
            .map(|caps| caps[1].to_string());
        cards.push(ListingCard {
            retail,
            final_price,
            listing_url,
        });
    }
    cards
}

/// Highest page number referenced in the pagination block of a results
/// page, 1 when no pagination exists.
pub fn detect_max_page(html: &str) -> u32 {
    let Some(m) = regex!(r"pagination"i).find(html) else {
        return 1;
    };
    let mut end = (m.start() + PAGINATION_WINDOW).min(html.len());
    while !html.is_char_boundary(end) {
        end += 1;
    }
    let block = &html[m.start()..end];
    regex!(r"page=(\d+)")
        .captures_iter(block)
        .filter_map(|caps| caps[1].parse().ok())
        .max()
        .unwrap_or(1)
}

/// Rewrite the `page` (and optionally `limit`) query parameters, keeping
/// everything else intact.
pub fn with_page(url: &Url, page: u32, limit: Option<u32>) -> Url {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| key != "page" && (limit.is_none() || key != "limit"))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    pairs.push(("page".to_string(), page.to_string()));
    if let Some(limit) = limit {
        pairs.push(("limit".to_string(), limit.to_string()));
    }

    let mut rewritten = url.clone();
    rewritten
        .query_pairs_mut()
        .clear()
        .extend_pairs(pairs.iter().map(|(key, value)| (key.as_str(), value.as_str())));
    rewritten
}

pub fn normalize_category(value: &str) -> Option<String> {
    let normalized = value.trim().to_lowercase();
    if normalized.is_empty() {
        return None;
    }
    let canonical = match normalized.as_str() {
        "electronics" | "appliances" | "electronics-appliances" => "electronics-appliances",
        other => other,
    };
    Some(canonical.to_string())
}

async fn fetch_html(client: &reqwest::Client, url: &Url) -> Result<String, ScrapeError> {
    Ok(client
        .get(url.clone())
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?)
}

/// Category slug from a listing page's breadcrumb trail.
async fn category_slug_from_listing(client: &reqwest::Client, url: &str) -> Option<String> {
    let url = Url::parse(url).ok()?;
    let html = match fetch_html(client, &url).await {
        Ok(html) => html,
        Err(err) => {
            warn!("Breadcrumb lookup failed for {url}: {err}");
            return None;
        }
    };
    let nav = regex!(r#"(?s)<nav aria-label="breadcrumb".*?</nav>"#).find(&html)?;
    regex!(r"https://www\.quickbidz\.com/category/([a-z0-9\-]+)")
        .captures(nav.as_str())
        .map(|caps| caps[1].to_string())
}

async fn filter_cards_by_category(
    client: &reqwest::Client,
    cards: Vec<ListingCard>,
    category: &str,
    concurrency: usize,
) -> Vec<ListingCard> {
    stream::iter(cards)
        .map(|card| async move {
            let Some(listing_url) = card.listing_url.clone() else {
                return None;
            };
            let slug = category_slug_from_listing(client, &listing_url).await;
            (slug.as_deref() == Some(category)).then_some(card)
        })
        .buffer_unordered(concurrency.max(1))
        .filter_map(|card| async move { card })
        .collect()
        .await
}

/// Aggregate a live-auction page (optionally restricted to one category) or
/// a paginated past-auctions result set. Returns the report and the mode
/// label for the run log.
pub async fn compute_recovery(
    client: &reqwest::Client,
    url: &Url,
    options: &RecoveryOptions,
) -> Result<(RecoveryReport, &'static str), ScrapeError> {
    if url.path().contains("/live-auction/") {
        let html = fetch_html(client, url).await?;
        let mut cards = parse_cards(&html);
        if let Some(category) = &options.category {
            cards = filter_cards_by_category(client, cards, category, options.concurrency).await;
        }
        return Ok((RecoveryReport::from_cards(&cards), "live-auction"));
    }

    let mut base = url.clone();
    if let Some(category) = &options.category {
        base.query_pairs_mut().append_pair("category_slug", category);
    }

    let first_url = with_page(&base, 1, options.limit);
    let first_html = fetch_html(client, &first_url).await?;
    let mut max_page = detect_max_page(&first_html);
    if let Some(cap) = options.max_pages {
        max_page = max_page.min(cap);
    }

    let mut cards = parse_cards(&first_html);
    if max_page > 1 {
        // One writer merges everything after the workers complete; ordering
        // does not matter for sums.
        let page_results: Vec<Vec<ListingCard>> = stream::iter(2..=max_page)
            .map(|page| {
                let page_url = with_page(&base, page, options.limit);
                async move {
                    match fetch_html(client, &page_url).await {
                        Ok(html) => parse_cards(&html),
                        Err(err) => {
                            warn!("Page fetch failed for {page_url}: {err}");
                            Vec::new()
                        }
                    }
                }
            })
            .buffer_unordered(options.concurrency.max(1))
            .collect()
            .await;
        for page_cards in page_results {
            cards.extend(page_cards);
        }
    }

    Ok((RecoveryReport::from_cards(&cards), "past-auctions"))
}

/// Append one row per run to the CSV log, writing the header once.
pub fn log_run(
    path: &Path,
    url: &str,
    category: Option<&str>,
    mode: &str,
    report: &RecoveryReport,
) -> Result<(), ScrapeError> {
    let write_header = !path.exists() || path.metadata()?.len() == 0;
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(file);
    if write_header {
        writer.write_record([
            "timestamp_utc",
            "url",
            "category",
            "mode",
            "items_count",
            "retail_total",
            "final_total",
            "recovery_pct",
        ])?;
    }
    let timestamp = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    writer.write_record([
        timestamp.as_str(),
        url,
        category.unwrap_or(""),
        mode,
        &report.count.to_string(),
        &format!("{:.2}", report.retail_total),
        &format!("{:.2}", report.final_total),
        &format!("{:.2}", report.recovery_pct()),
    ])?;
    writer.flush()?;
    Ok(())
}

pub fn format_money(value: f64) -> String {
    let formatted = format!("{:.2}", value);
    let (int_part, frac_part) = formatted.split_once('.').unwrap_or((formatted.as_str(), "00"));
    let mut grouped = String::new();
    let digits: Vec<char> = int_part.chars().collect();
    for (i, digit) in digits.iter().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 && *digit != '-' {
            grouped.push(',');
        }
        grouped.push(*digit);
    }
    format!("${grouped}.{frac_part}")
}
