//! TechLiquidators detail pages: the richest tier-1 surface of the
//! supported marketplaces (pricing widget, outline boxes, bid history,
//! downloadable manifests).

use crate::extract::{
    element_text, filter_pairs, h1_text, harvest_label_pairs, ld_description, ld_images,
    ld_json_payloads, ld_name, normalize_pairs, og_description, og_images, og_title,
    pairs_to_value,
};
use crate::parse::{dedupe_preserve, normalize_label};
use crate::record::{apply_orig_retail, derive_numeric, resolve_tiers, FieldMap, TierMaps};
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use url::Url;

const E: &str = "Invalid selector";
lazy_static! {
    static ref LISTING_TITLE: Selector =
        Selector::parse(r#"[edit-listing-title="true"]"#).expect(E);
    static ref PRICING_BOX: Selector = Selector::parse(r#"[lot-pricing-box="true"]"#).expect(E);
    static ref OUTLINE_BOX: Selector = Selector::parse(".listing-outline-box").expect(E);
    static ref OUTLINE_ITEM: Selector = Selector::parse(".spacing-bottom").expect(E);
    static ref STRONG: Selector = Selector::parse("strong").expect(E);
    static ref BID_TABLE: Selector =
        Selector::parse("#bid-history-modal-dialog table").expect(E);
    static ref BID_ROW: Selector = Selector::parse("tbody tr").expect(E);
    static ref TD: Selector = Selector::parse("td").expect(E);
    static ref MANIFEST_LINK: Selector =
        Selector::parse("a.listing-details__download-manifest-link").expect(E);
    static ref GALLERY_IMG: Selector =
        Selector::parse("img.listing-images__thumb, img.listing-images__image").expect(E);
}

/// Pricing-widget attributes carried verbatim, and the subset promoted to
/// canonical fields.
const PRICING_ATTRS: [&str; 7] = [
    "items-count",
    "subtotal-cents",
    "default-shipping-cents",
    "shipping-method",
    "bid-count",
    "current-bid",
    "listing-name",
];
const PRICING_PROMOTED: [(&str, &str); 6] = [
    ("listing-name", "lot_id"),
    ("items-count", "items_count"),
    ("bid-count", "bid_count"),
    ("shipping-method", "shipping_method"),
    ("subtotal-cents", "subtotal_cents"),
    ("default-shipping-cents", "default_shipping_cents"),
];

pub fn auction_id(url: &Url) -> Option<String> {
    regex!(r"/detail/([^/]+)/"i)
        .captures(url.as_str())
        .map(|caps| caps[1].to_lowercase())
}

fn listing_title(doc: &Html) -> Option<String> {
    doc.select(&LISTING_TITLE)
        .next()
        .and_then(|el| el.value().attr("title"))
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
}

fn pricing_attrs(doc: &Html) -> Vec<(String, String)> {
    let Some(node) = doc.select(&PRICING_BOX).next() else {
        return Vec::new();
    };
    PRICING_ATTRS
        .iter()
        .filter_map(|key| {
            node.value()
                .attr(key)
                .map(|value| (key.to_string(), value.to_string()))
        })
        .collect()
}

fn outline_fields(doc: &Html) -> Vec<(String, String)> {
    let mut fields = Vec::new();
    for outline_box in doc.select(&OUTLINE_BOX) {
        for item in outline_box.select(&OUTLINE_ITEM) {
            let Some(strong) = item.select(&STRONG).next() else {
                continue;
            };
            let strong_text = element_text(strong);
            let label = normalize_label(strong_text.trim_end_matches(':'));
            let value = element_text(item)
                .replacen(&strong_text, "", 1)
                .trim()
                .to_string();
            if !label.is_empty() && !value.is_empty() {
                fields.push((label, value));
            }
        }
    }
    fields
}

fn bid_history(doc: &Html) -> Vec<Value> {
    let Some(table) = doc.select(&BID_TABLE).next() else {
        return Vec::new();
    };
    table
        .select(&BID_ROW)
        .filter_map(|row| {
            let cells: Vec<String> = row.select(&TD).map(element_text).collect();
            match cells.as_slice() {
                [customer, bid, date] => Some(json!({
                    "customer": customer,
                    "bid": bid,
                    "date": date,
                })),
                _ => None,
            }
        })
        .collect()
}

fn manifest_url(doc: &Html, base: &Url) -> Option<String> {
    doc.select(&MANIFEST_LINK)
        .next()
        .and_then(|link| link.value().attr("href"))
        .and_then(|href| base.join(href).ok())
        .map(|joined| joined.to_string())
}

fn gallery_images(doc: &Html) -> Vec<String> {
    doc.select(&GALLERY_IMG)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| src.trim().to_string())
        .collect()
}

pub(crate) fn extract(doc: &Html, url: &Url) -> FieldMap {
    let title_attr = listing_title(doc);
    let pricing = pricing_attrs(doc);
    let outline = outline_fields(doc);
    let bids = bid_history(doc);
    let payloads = ld_json_payloads(doc);

    let mut images = og_images(doc);
    images.extend(gallery_images(doc));
    let mut images = dedupe_preserve(images);
    if images.is_empty() {
        images = dedupe_preserve(ld_images(&payloads));
    }

    let pairs = filter_pairs(harvest_label_pairs(doc));

    let mut structured: Vec<(String, Value)> = Vec::new();
    if let Some(title) = &title_attr {
        structured.push(("title".to_string(), json!(title)));
    }
    if let Some(manifest) = manifest_url(doc, url) {
        structured.push(("manifest_url".to_string(), json!(manifest)));
    }
    for (attr, field) in PRICING_PROMOTED {
        if let Some((_, value)) = pricing.iter().find(|(key, _)| key == attr) {
            structured.push((field.to_string(), json!(value)));
        }
    }
    if !pricing.is_empty() {
        let map: serde_json::Map<String, Value> = pricing
            .iter()
            .map(|(key, value)| (key.clone(), json!(value)))
            .collect();
        structured.push(("pricing_attrs".to_string(), Value::Object(map)));
    }
    if let Some(latest) = bids.first() {
        structured.push(("latest_bid".to_string(), latest.clone()));
        structured.push(("bid_history".to_string(), Value::Array(bids.clone())));
    }
    structured.push(("images".to_string(), json!(images)));

    let mut labeled = normalize_pairs(&pairs);
    labeled.push(("kv_pairs".to_string(), pairs_to_value(&pairs)));

    let mut metadata: Vec<(String, Value)> = Vec::new();
    if let Some(title) = og_title(doc) {
        metadata.push(("title".to_string(), json!(title)));
    }
    if let Some(title) = h1_text(doc) {
        metadata.push(("title".to_string(), json!(title)));
    }
    if let Some(name) = ld_name(&payloads) {
        metadata.push(("title".to_string(), json!(name)));
    }
    if let Some(description) = og_description(doc) {
        metadata.push(("description".to_string(), json!(description)));
    }
    if let Some(title) = title_attr.as_deref().filter(|t| t.contains(" - ")) {
        metadata.push(("description".to_string(), json!(title)));
    }
    if let Some(description) = ld_description(&payloads) {
        metadata.push(("description".to_string(), json!(description)));
    }
    if let Some(id) = auction_id(url) {
        metadata.push(("auction_id".to_string(), json!(id)));
    }
    for (label, field) in [("condition", "condition"), ("warehouse", "warehouse"), ("lot size", "lot_size")] {
        if let Some((_, value)) = outline.iter().find(|(key, _)| key == label) {
            metadata.push((field.to_string(), json!(value)));
        }
    }
    if !outline.is_empty() {
        let map: serde_json::Map<String, Value> = outline
            .iter()
            .map(|(key, value)| (key.clone(), json!(value)))
            .collect();
        metadata.push(("outline_fields".to_string(), Value::Object(map)));
    }

    let mut fields = resolve_tiers(TierMaps {
        structured,
        labeled,
        metadata,
    });

    // The marketplace serves boilerplate og tags on listings it has not
    // curated; structured data is the better source there.
    if let Some(name) = ld_name(&payloads) {
        let stale = fields
            .get("title")
            .and_then(Value::as_str)
            .is_some_and(|t| t.to_lowercase().starts_with("techliquidators"));
        if stale {
            fields.insert("title".to_string(), json!(name));
        }
    }
    if let Some(description) = ld_description(&payloads) {
        let stale = fields
            .get("description")
            .and_then(Value::as_str)
            .is_some_and(|d| d.to_lowercase().starts_with("source discounted"));
        if stale {
            fields.insert("description".to_string(), json!(description));
        }
    }

    derive_numeric(&mut fields);
    if let Some(title) = &title_attr {
        apply_orig_retail(&mut fields, title);
    }
    fields
}
