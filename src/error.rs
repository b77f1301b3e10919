#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("Request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("Serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV write failed: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid header '{0}'")]
    InvalidHeader(String),

    #[error("No listing page could be fetched for {0}")]
    SourceUnavailable(String),

    #[error("Redirected to login page at {0}; session cookies missing or expired")]
    AuthRequired(String),
}
