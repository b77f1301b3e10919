//! Generic extraction shared by every marketplace: label/value harvesting,
//! the controlled label vocabulary, and page-level metadata readers.

use crate::parse::{collapse_ws, normalize_label};
use crate::record::FieldMap;
use crate::sites::Site;
use lazy_static::lazy_static;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use std::collections::HashMap;
use url::Url;

const E: &str = "Invalid selector";
lazy_static! {
    static ref DL: Selector = Selector::parse("dl").expect(E);
    static ref DT: Selector = Selector::parse("dt").expect(E);
    static ref DD: Selector = Selector::parse("dd").expect(E);
    static ref LI: Selector = Selector::parse("li").expect(E);
    static ref H1: Selector = Selector::parse("h1").expect(E);
    static ref ANY: Selector = Selector::parse("*").expect(E);
    static ref OG_TITLE: Selector = Selector::parse(r#"meta[property="og:title"]"#).expect(E);
    static ref OG_DESCRIPTION: Selector =
        Selector::parse(r#"meta[property="og:description"]"#).expect(E);
    static ref OG_IMAGE: Selector = Selector::parse(r#"meta[property="og:image"]"#).expect(E);
    static ref LD_JSON: Selector =
        Selector::parse(r#"script[type="application/ld+json"]"#).expect(E);
}

lazy_static! {
    /// Controlled vocabulary mapping normalized on-page labels to canonical
    /// field names. Labels outside this map never touch a canonical field.
    static ref LABEL_MAP: HashMap<&'static str, &'static str> = HashMap::from([
        ("lot #", "lot_number"),
        ("lot number", "lot_number"),
        ("auction id", "auction_id"),
        ("condition", "condition"),
        ("location", "location"),
        ("est. msrp", "msrp"),
        ("msrp", "msrp"),
        ("retail value", "retail_value"),
        ("quantity", "quantity"),
        ("units", "quantity"),
        ("pallet count", "pallet_count"),
        ("buyer premium", "buyer_premium"),
        ("auction ends", "auction_end"),
        ("auction end", "auction_end"),
        ("bidding ends", "auction_end"),
        ("bidding starts", "auction_start"),
        ("start time", "auction_start"),
        ("end time", "auction_end"),
        ("current bid", "current_bid"),
        ("reserve", "reserve"),
        ("seller", "seller"),
        ("manifest", "manifest"),
        ("lot id", "lot_id"),
        ("total items", "total_items"),
        ("weight", "weight"),
    ]);
}

pub fn canonical_field(label: &str) -> Option<&'static str> {
    LABEL_MAP.get(normalize_label(label).as_str()).copied()
}

/// Visible text of an element with whitespace collapsed.
pub fn element_text(el: ElementRef) -> String {
    collapse_ws(&el.text().collect::<Vec<_>>().join(" "))
}

/// Harvest label/value candidates from the three generic shapes auction
/// pages use: definition lists, colon-separated list items, and label-class
/// elements followed by a value sibling.
pub fn harvest_label_pairs(doc: &Html) -> Vec<(String, String)> {
    let mut pairs = Vec::new();

    for dl in doc.select(&DL) {
        let terms: Vec<_> = dl.select(&DT).collect();
        let defs: Vec<_> = dl.select(&DD).collect();
        if terms.is_empty() || terms.len() != defs.len() {
            continue;
        }
        for (term, def) in terms.into_iter().zip(defs) {
            let label = element_text(term);
            let value = element_text(def);
            if !label.is_empty() && !value.is_empty() {
                pairs.push((label, value));
            }
        }
    }

    for li in doc.select(&LI) {
        let text = element_text(li);
        if let Some((label, value)) = text.split_once(':') {
            let label = label.trim();
            let value = value.trim();
            if !label.is_empty() && !value.is_empty() {
                pairs.push((label.to_string(), value.to_string()));
            }
        }
    }

    for el in doc.select(&ANY) {
        let is_label = el
            .value()
            .classes()
            .any(|class| class.to_lowercase().contains("label"));
        if !is_label {
            continue;
        }
        let Some(sibling) = el.next_siblings().find_map(ElementRef::wrap) else {
            continue;
        };
        let label = element_text(el);
        let value = element_text(sibling);
        if !label.is_empty() && !value.is_empty() {
            pairs.push((label, value));
        }
    }

    pairs
}

/// Drop candidates that look like scraped template fragments rather than
/// content: long labels, template placeholders, interrogative labels.
pub fn filter_pairs(pairs: Vec<(String, String)>) -> Vec<(String, String)> {
    pairs
        .into_iter()
        .filter(|(label, value)| {
            !label.is_empty()
                && !value.is_empty()
                && !label.contains('?')
                && !label.contains("{{")
                && !label.contains("}}")
                && label.len() <= 48
        })
        .collect()
}

/// Map filtered pairs through the controlled vocabulary, in page order.
/// Duplicate canonical fields are resolved first-wins by the tier merge.
pub fn normalize_pairs(pairs: &[(String, String)]) -> Vec<(String, Value)> {
    pairs
        .iter()
        .filter_map(|(label, value)| {
            canonical_field(label).map(|field| (field.to_string(), Value::from(value.as_str())))
        })
        .collect()
}

/// Filtered pair list in its recorded form.
pub fn pairs_to_value(pairs: &[(String, String)]) -> Value {
    Value::Array(
        pairs
            .iter()
            .map(|(label, value)| {
                serde_json::json!({ "label": label, "value": value })
            })
            .collect(),
    )
}

fn meta_content(doc: &Html, selector: &Selector) -> Option<String> {
    doc.select(selector)
        .next()
        .and_then(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
}

pub fn og_title(doc: &Html) -> Option<String> {
    meta_content(doc, &OG_TITLE)
}

pub fn og_description(doc: &Html) -> Option<String> {
    meta_content(doc, &OG_DESCRIPTION)
}

pub fn og_images(doc: &Html) -> Vec<String> {
    doc.select(&OG_IMAGE)
        .filter_map(|el| el.value().attr("content"))
        .map(|content| content.trim().to_string())
        .filter(|content| !content.is_empty())
        .collect()
}

pub fn h1_text(doc: &Html) -> Option<String> {
    doc.select(&H1)
        .next()
        .map(element_text)
        .filter(|text| !text.is_empty())
}

/// Embedded structured-data payloads. Malformed blocks are skipped, never
/// fatal.
pub fn ld_json_payloads(doc: &Html) -> Vec<Value> {
    doc.select(&LD_JSON)
        .filter_map(|script| {
            let raw = script.text().collect::<String>();
            serde_json::from_str::<Value>(&raw).ok()
        })
        .collect()
}

fn ld_entries(payloads: &[Value]) -> impl Iterator<Item = &Value> {
    payloads.iter().flat_map(|payload| match payload {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    })
}

pub fn ld_name(payloads: &[Value]) -> Option<String> {
    ld_entries(payloads)
        .filter_map(|entry| entry.get("name"))
        .find_map(Value::as_str)
        .map(ToString::to_string)
}

pub fn ld_description(payloads: &[Value]) -> Option<String> {
    ld_entries(payloads)
        .filter_map(|entry| entry.get("description"))
        .find_map(Value::as_str)
        .map(ToString::to_string)
}

pub fn ld_images(payloads: &[Value]) -> Vec<String> {
    for entry in ld_entries(payloads) {
        match entry.get("image") {
            Some(Value::String(image)) => return vec![image.clone()],
            Some(Value::Array(images)) => {
                return images
                    .iter()
                    .filter_map(Value::as_str)
                    .map(ToString::to_string)
                    .collect()
            }
            _ => continue,
        }
    }
    Vec::new()
}

/// Resolve a full field map for one detail page.
pub fn extract_detail(site: Site, html: &str, url: &Url) -> FieldMap {
    let doc = Html::parse_document(html);
    match site {
        Site::Techliquidators => crate::sites::techliquidators::extract(&doc, url),
        Site::Liquidation => crate::sites::liquidation::extract(&doc, url),
    }
}
