//! Per-marketplace configuration: start URLs, URL matchers, and the tier-1
//! extraction hooks that differ between sites.

pub mod liquidation;
pub mod techliquidators;

use itertools::Itertools;
use lazy_regex::{regex, Regex};
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use url::Url;

const E: &str = "Invalid selector";
lazy_static! {
    static ref A: Selector = Selector::parse("a[href]").expect(E);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Site {
    Techliquidators,
    Liquidation,
}

impl Site {
    pub fn name(self) -> &'static str {
        match self {
            Site::Techliquidators => "techliquidators",
            Site::Liquidation => "liquidation",
        }
    }
}

/// Immutable per-source crawl configuration, constructed once per run.
pub struct SiteProfile {
    pub site: Site,
    pub start_urls: Vec<String>,
    detail_patterns: Vec<&'static Regex>,
    pagination_patterns: Vec<&'static Regex>,
    raw_link_patterns: Vec<&'static Regex>,
}

impl SiteProfile {
    pub fn new(site: Site, start_urls: Option<Vec<String>>) -> SiteProfile {
        match site {
            Site::Techliquidators => SiteProfile {
                site,
                start_urls: start_urls.unwrap_or_else(|| {
                    vec!["https://www.techliquidators.com/lots/?auction=true".to_string()]
                }),
                detail_patterns: vec![regex!(r"/detail/[^/]+/[^/?#]+"i)],
                pagination_patterns: vec![regex!(r"/lots/\?"), regex!(r"page=")],
                raw_link_patterns: vec![regex!(r"/detail/[a-z0-9\-_/]+"i), regex!(r"[?&]page=\d+"i)],
            },
            Site::Liquidation => SiteProfile {
                site,
                start_urls: start_urls.unwrap_or_else(|| {
                    vec!["https://www.liquidation.com/c/FergusonHome".to_string()]
                }),
                detail_patterns: vec![regex!(r"/auction/\d+|/p/\d+|/lot/\d+"i)],
                pagination_patterns: vec![regex!(r"/c/FergusonHome"), regex!(r"page=")],
                raw_link_patterns: vec![
                    regex!(r"/c/FergusonHome[^\x22'\s>]+"i),
                    regex!(r"[?&]page=\d+"i),
                ],
            },
        }
    }

    pub fn name(&self) -> &'static str {
        self.site.name()
    }
}

/// Anchor hrefs resolved against the fetched page, trimmed and deduplicated
/// in first-seen order. Fragment-only links are skipped.
pub fn collect_links(doc: &Html, base: &Url) -> Vec<Url> {
    doc.select(&A)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty() && !href.starts_with('#'))
        .filter_map(|href| base.join(href).ok())
        .unique()
        .collect()
}

/// Secondary raw-text pass for links the markup only materializes through
/// scripts. Query fragments (`?page=`/`&page=`) are rebased onto the page's
/// path; path fragments are joined as usual.
pub fn scan_raw_links(html: &str, base: &Url, profile: &SiteProfile) -> Vec<Url> {
    let mut links = Vec::new();
    for pattern in &profile.raw_link_patterns {
        for m in pattern.find_iter(html) {
            let fragment = m.as_str();
            let resolved = if fragment.starts_with('?') || fragment.starts_with('&') {
                let mut page = base.clone();
                page.set_query(Some(&fragment[1..]));
                page.set_fragment(None);
                Some(page)
            } else {
                base.join(fragment).ok()
            };
            if let Some(link) = resolved {
                links.push(link);
            }
        }
    }
    links.into_iter().unique().collect()
}

#[derive(Debug, Default, PartialEq)]
pub struct Classified {
    pub detail: Vec<Url>,
    pub pagination: Vec<Url>,
}

/// Partition discovered links into detail and pagination candidates.
///
/// Cross-host links are discarded before any matcher runs. A link may land
/// in both sets: a page can be worth crawling and worth extracting.
pub fn classify<I>(base: &Url, links: I, profile: &SiteProfile) -> Classified
where
    I: IntoIterator<Item = Url>,
{
    let mut classified = Classified::default();
    for link in links {
        if link.host_str() != base.host_str() {
            continue;
        }
        let target = link.as_str();
        if profile.detail_patterns.iter().any(|p| p.is_match(target)) {
            classified.detail.push(link.clone());
        }
        if profile
            .pagination_patterns
            .iter()
            .any(|p| p.is_match(target))
        {
            classified.pagination.push(link);
        }
    }
    classified
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn cross_host_links_are_excluded_from_both_sets() {
        let profile = SiteProfile::new(Site::Techliquidators, None);
        let base = url("https://www.techliquidators.com/lots/?auction=true");
        let links = vec![
            url("https://www.techliquidators.com/detail/ml100/pallet-a"),
            url("https://www.techliquidators.com/detail/ml101/pallet-b"),
            url("https://www.techliquidators.com/detail/ml102/pallet-c"),
            url("https://www.techliquidators.com/lots/?auction=true&page=2"),
            url("https://www.techliquidators.com/lots/?auction=true&page=3"),
            url("https://cdn.example.com/detail/ml103/pallet-d"),
        ];
        let classified = classify(&base, links, &profile);
        assert_eq!(classified.detail.len(), 3);
        assert_eq!(classified.pagination.len(), 2);
        assert!(!classified
            .detail
            .iter()
            .chain(&classified.pagination)
            .any(|l| l.host_str() == Some("cdn.example.com")));
    }

    #[test]
    fn a_link_may_be_both_detail_and_pagination() {
        let profile = SiteProfile::new(Site::Techliquidators, None);
        let base = url("https://www.techliquidators.com/lots/");
        let links = vec![url(
            "https://www.techliquidators.com/detail/ml100/pallet-a?page=2",
        )];
        let classified = classify(&base, links, &profile);
        assert_eq!(classified.detail.len(), 1);
        assert_eq!(classified.pagination.len(), 1);
    }

    #[test]
    fn anchors_resolve_against_the_page() {
        let html = r##"
            <a href="/detail/ml100/pallet-a">a</a>
            <a href="#reviews">skip</a>
            <a href="/detail/ml100/pallet-a">dup</a>
            <a href="https://www.techliquidators.com/lots/?page=2">next</a>
        "##;
        let doc = Html::parse_document(html);
        let base = url("https://www.techliquidators.com/lots/");
        let links = collect_links(&doc, &base);
        assert_eq!(
            links,
            vec![
                url("https://www.techliquidators.com/detail/ml100/pallet-a"),
                url("https://www.techliquidators.com/lots/?page=2"),
            ]
        );
    }

    #[test]
    fn raw_scan_rebases_page_queries() {
        let profile = SiteProfile::new(Site::Techliquidators, None);
        let base = url("https://www.techliquidators.com/lots/?auction=true");
        let html = r#"<script>nav("&page=4"); go("/detail/ml200/mixed-lot")</script>"#;
        let links = scan_raw_links(html, &base, &profile);
        assert!(links.contains(&url("https://www.techliquidators.com/lots/?page=4")));
        assert!(links.contains(&url("https://www.techliquidators.com/detail/ml200/mixed-lot")));
    }
}
