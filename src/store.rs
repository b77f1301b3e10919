//! Resumable persistence. Everything durable lives under
//! `<out_base>/<site>/<year>/`: an append-only JSONL log keyed by URL, a
//! summary CSV regenerated after every run, a timestamped error log, and one
//! artifact directory per extracted item.

use crate::error::ScrapeError;
use crate::parse::slugify;
use crate::record::ListingRecord;
use crate::utils::get_now;
use itertools::Itertools;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Fixed summary columns, in output order. Fields observed on some records
/// but absent here are appended as extra columns, sorted.
pub const SUMMARY_FIELDS: [&str; 17] = [
    "site",
    "url",
    "title",
    "auction_id",
    "lot_id",
    "lot_number",
    "current_bid_value",
    "lot_price_value",
    "msrp_value",
    "retail_value_value",
    "items_count_value",
    "total_items_value",
    "condition",
    "warehouse",
    "location",
    "auction_end",
    "manifest_url",
];

/// Append-only `[timestamp] message` log for per-item failures.
pub struct RunLog {
    path: PathBuf,
}

impl RunLog {
    pub fn new(path: PathBuf) -> RunLog {
        RunLog { path }
    }

    pub fn append(&self, message: &str) -> Result<(), ScrapeError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "[{}] {}", get_now().to_rfc3339(), message)?;
        Ok(())
    }
}

pub struct Store {
    site: String,
    site_root: PathBuf,
    index_path: PathBuf,
    summary_path: PathBuf,
    log: RunLog,
}

impl Store {
    pub fn open(out_base: &Path, site: &str, year: &str) -> Result<Store, ScrapeError> {
        let site_root = out_base.join(site).join(year);
        fs::create_dir_all(&site_root)?;
        Ok(Store {
            site: site.to_string(),
            index_path: site_root.join("index.jsonl"),
            summary_path: site_root.join("index.csv"),
            log: RunLog::new(site_root.join("scrape.log")),
            site_root,
        })
    }

    pub fn site_root(&self) -> &Path {
        &self.site_root
    }

    pub fn run_log(&self) -> &RunLog {
        &self.log
    }

    /// All log entries appended so far. Blank and malformed lines are
    /// skipped; a damaged line must never block a resume.
    pub fn load_log(&self) -> Result<Vec<ListingRecord>, ScrapeError> {
        if !self.index_path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.index_path)?;
        Ok(contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    pub fn logged_urls(records: &[ListingRecord]) -> HashSet<String> {
        records.iter().map(|record| record.url.clone()).collect()
    }

    /// Durably append one record: one key-sorted JSON object per line.
    pub fn append_record(&self, record: &ListingRecord) -> Result<(), ScrapeError> {
        let value = serde_json::to_value(record)?;
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.index_path)?;
        writeln!(file, "{}", serde_json::to_string(&value)?)?;
        Ok(())
    }

    /// Per-item artifacts: verbatim HTML snapshot, key-sorted JSON record,
    /// and a single-row CSV flattening. Returns the item directory.
    pub fn write_detail_artifacts(
        &self,
        record: &ListingRecord,
        html: &str,
        item_id: Option<&str>,
    ) -> Result<PathBuf, ScrapeError> {
        let item_dir = self.site_root.join(self.item_folder(record, item_id));
        fs::create_dir_all(&item_dir)?;

        fs::write(item_dir.join("raw.html"), html)?;

        let value = serde_json::to_value(record)?;
        fs::write(
            item_dir.join("auction.json"),
            serde_json::to_string_pretty(&value)?,
        )?;

        let row = as_row(&value);
        let mut writer = csv::Writer::from_path(item_dir.join("auction.csv"))?;
        writer.write_record(row.keys())?;
        writer.write_record(row.values().map(|cell| flatten_cell(cell)))?;
        writer.flush()?;

        debug!("Wrote artifacts to {}", item_dir.display());
        Ok(item_dir)
    }

    pub fn write_manifest(&self, item_dir: &Path, bytes: &[u8]) -> Result<(), ScrapeError> {
        fs::write(item_dir.join("manifest.xlsx"), bytes)?;
        Ok(())
    }

    /// Rebuild the summary projection over the full accumulated log.
    pub fn write_summary(&self, records: &[ListingRecord]) -> Result<(), ScrapeError> {
        let rows: Vec<BTreeMap<String, Value>> = records
            .iter()
            .map(|record| Ok(as_row(&serde_json::to_value(record)?)))
            .collect::<Result<_, ScrapeError>>()?;

        let extra_columns: Vec<&str> = rows
            .iter()
            .flat_map(|row| row.keys().map(String::as_str))
            .filter(|key| !SUMMARY_FIELDS.contains(key))
            .sorted()
            .dedup()
            .collect();
        let columns: Vec<&str> = SUMMARY_FIELDS.into_iter().chain(extra_columns).collect();

        let mut writer = csv::Writer::from_path(&self.summary_path)?;
        writer.write_record(&columns)?;
        for row in &rows {
            writer.write_record(
                columns
                    .iter()
                    .map(|column| row.get(*column).map_or(String::new(), flatten_cell)),
            )?;
        }
        writer.flush()?;
        Ok(())
    }

    fn item_folder(&self, record: &ListingRecord, item_id: Option<&str>) -> String {
        let slug = record
            .get_str("title")
            .map(slugify)
            .filter(|slug| !slug.is_empty())
            .unwrap_or_else(|| slugify(last_url_segment(&record.url)));

        let mut parts = vec![self.site.as_str()];
        if let Some(id) = item_id {
            parts.push(id);
        }
        if !slug.is_empty() {
            parts.push(&slug);
        }
        parts.join("_")
    }
}

fn last_url_segment(url: &str) -> &str {
    url.trim_end_matches('/').rsplit('/').next().unwrap_or(url)
}

fn as_row(value: &Value) -> BTreeMap<String, Value> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// One CSV cell: lists joined with "; ", nested mappings as JSON
/// sub-documents, nulls as empty strings.
fn flatten_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            })
            .join("; "),
        other => other.to_string(),
    }
}
