//! HTTP transport. One client per run; listing and detail fetches share a
//! politeness delay measured between request starts.

use crate::error::ScrapeError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, COOKIE};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Session credentials handed through from the caller. Contents are opaque;
/// they are loaded into request headers and never interpreted.
#[derive(Debug, Default)]
pub struct Credentials {
    pub cookie_file: Option<PathBuf>,
    pub cookie_header: Option<String>,
    pub extra_headers: Vec<(String, String)>,
}

pub struct FetchedPage {
    pub final_url: Url,
    pub body: String,
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, ScrapeError>;

    /// Binary download (manifest files).
    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, ScrapeError>;
}

pub struct HttpClient {
    client: reqwest::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpClient {
    pub fn new(delay: Duration, credentials: &Credentials) -> Result<HttpClient, ScrapeError> {
        let mut headers = HeaderMap::new();

        let mut cookie = credentials.cookie_header.clone();
        if cookie.is_none() {
            if let Some(path) = &credentials.cookie_file {
                match cookie_header_from_netscape(path) {
                    Ok(loaded) => cookie = loaded,
                    Err(err) => warn!("Could not read cookie file {}: {err}", path.display()),
                }
            }
        }
        if let Some(cookie) = cookie {
            let value = HeaderValue::from_str(&cookie)
                .map_err(|_| ScrapeError::InvalidHeader("Cookie".to_string()))?;
            headers.insert(COOKIE, value);
        }

        for (key, value) in &credentials.extra_headers {
            let name = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| ScrapeError::InvalidHeader(key.clone()))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| ScrapeError::InvalidHeader(key.clone()))?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .default_headers(headers)
            .build()?;

        Ok(HttpClient {
            client,
            delay,
            last_request: Mutex::new(None),
        })
    }

    async fn pace(&self) {
        let mut last_request = self.last_request.lock().await;
        if let Some(last) = last_request.take() {
            let elapsed = last.elapsed();
            if elapsed < self.delay {
                tokio::time::sleep(self.delay - elapsed).await;
            }
        }
        last_request.replace(Instant::now());
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch_page(&self, url: &Url) -> Result<FetchedPage, ScrapeError> {
        self.pace().await;
        debug!("Visit {}", url);
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        let final_url = response.url().clone();
        let body = response.text().await?;
        Ok(FetchedPage { final_url, body })
    }

    async fn fetch_bytes(&self, url: &Url) -> Result<Vec<u8>, ScrapeError> {
        self.pace().await;
        debug!("Download {}", url);
        let response = self.client.get(url.clone()).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// A fetch that lands here means the session cookies are missing or stale.
pub fn looks_like_login(url: &Url) -> bool {
    let path = url.path().to_lowercase();
    path.contains("login") || path.contains("signin") || path.contains("sign-in")
}

/// Build a `Cookie` header from a Netscape-format cookie jar. Only the
/// name/value columns are read; everything else stays opaque.
fn cookie_header_from_netscape(path: &Path) -> Result<Option<String>, ScrapeError> {
    let contents = std::fs::read_to_string(path)?;
    let mut cookies = Vec::new();
    for line in contents.lines() {
        let line = line.strip_prefix("#HttpOnly_").unwrap_or(line);
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let columns: Vec<&str> = line.split('\t').collect();
        if let [_, _, _, _, _, name, value] = columns.as_slice() {
            cookies.push(format!("{name}={value}"));
        }
    }
    if cookies.is_empty() {
        Ok(None)
    } else {
        Ok(Some(cookies.join("; ")))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn netscape_jar_becomes_a_cookie_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# Netscape HTTP Cookie File").unwrap();
        writeln!(file).unwrap();
        writeln!(file, ".techliquidators.com\tTRUE\t/\tTRUE\t0\tsession\tabc123").unwrap();
        writeln!(file, "#HttpOnly_.techliquidators.com\tTRUE\t/\tTRUE\t0\ttoken\txyz").unwrap();
        writeln!(file, "malformed line").unwrap();

        let header = cookie_header_from_netscape(file.path()).unwrap();
        assert_eq!(header, Some("session=abc123; token=xyz".to_string()));
    }

    #[test]
    fn empty_jar_yields_no_header() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# comments only").unwrap();
        assert_eq!(cookie_header_from_netscape(file.path()).unwrap(), None);
    }

    #[test]
    fn login_redirects_are_recognized() {
        let login = Url::parse("https://www.techliquidators.com/account/Login?next=/lots/").unwrap();
        let lots = Url::parse("https://www.techliquidators.com/lots/?page=2").unwrap();
        assert!(looks_like_login(&login));
        assert!(!looks_like_login(&lots));
    }
}
