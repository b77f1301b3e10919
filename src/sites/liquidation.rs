//! Liquidation.com detail pages: no pricing widget or bid-history dialog,
//! so the label and metadata tiers carry most of the weight.

use crate::extract::{
    filter_pairs, h1_text, harvest_label_pairs, ld_description, ld_json_payloads, ld_name,
    normalize_pairs, og_description, og_images, og_title, pairs_to_value,
};
use crate::parse::dedupe_preserve;
use crate::record::{derive_numeric, resolve_tiers, FieldMap, TierMaps};
use lazy_regex::regex;
use lazy_static::lazy_static;
use scraper::{Html, Selector};
use serde_json::{json, Value};
use url::Url;

const E: &str = "Invalid selector";
lazy_static! {
    static ref ANCHOR: Selector = Selector::parse("a[href]").expect(E);
    static ref IMG: Selector = Selector::parse("img[src]").expect(E);
}

pub fn lot_id(url: &Url) -> Option<String> {
    regex!(r"/(auction|p|lot)/(\d+)"i)
        .captures(url.as_str())
        .map(|caps| caps[2].to_string())
}

fn manifest_url(doc: &Html, base: &Url) -> Option<String> {
    doc.select(&ANCHOR)
        .filter_map(|link| link.value().attr("href"))
        .find(|href| {
            let href = href.to_lowercase();
            href.contains("manifest") || href.ends_with(".xlsx") || href.ends_with(".csv")
        })
        .and_then(|href| base.join(href).ok())
        .map(|joined| joined.to_string())
}

fn page_images(doc: &Html) -> Vec<String> {
    doc.select(&IMG)
        .filter_map(|img| img.value().attr("src"))
        .filter(|src| src.contains("http"))
        .map(ToString::to_string)
        .collect()
}

pub(crate) fn extract(doc: &Html, url: &Url) -> FieldMap {
    let payloads = ld_json_payloads(doc);

    let mut images = og_images(doc);
    images.extend(page_images(doc));
    let images = dedupe_preserve(images);

    let pairs = filter_pairs(harvest_label_pairs(doc));

    let mut structured: Vec<(String, Value)> = Vec::new();
    if let Some(manifest) = manifest_url(doc, url) {
        structured.push(("manifest_url".to_string(), json!(manifest)));
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
    if let Some(description) = ld_description(&payloads) {
        metadata.push(("description".to_string(), json!(description)));
    }

    let mut fields = resolve_tiers(TierMaps {
        structured,
        labeled,
        metadata,
    });
    derive_numeric(&mut fields);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const DETAIL_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta property="og:title" content="Ferguson Home Returns, 12 Pallets">
  <meta property="og:image" content="https://images.liquidation.com/lot/88123/main.jpg">
</head>
<body>
  <h1>Ferguson Home Returns</h1>
  <ul>
    <li>Current Bid: $2,300.00</li>
    <li>Retail Value: $18,900.00</li>
    <li>Quantity: 640</li>
    <li>Condition: Customer Returns</li>
  </ul>
  <img src="https://images.liquidation.com/lot/88123/2.jpg">
  <img src="/static/sprite.png">
  <a href="/docs/lot-88123-manifest.csv">Download manifest</a>
  <script type="application/ld+json">{"description": "Mixed plumbing returns."}</script>
</body>
</html>"#;

    fn extracted() -> FieldMap {
        let doc = Html::parse_document(DETAIL_PAGE);
        let url = Url::parse("https://www.liquidation.com/auction/88123").unwrap();
        extract(&doc, &url)
    }

    #[test]
    fn lot_id_reads_any_detail_path_shape() {
        for path in ["/auction/88123", "/p/88123", "/lot/88123?x=1"] {
            let url = Url::parse(&format!("https://www.liquidation.com{path}")).unwrap();
            assert_eq!(lot_id(&url), Some("88123".to_string()));
        }
        let other = Url::parse("https://www.liquidation.com/c/FergusonHome").unwrap();
        assert_eq!(lot_id(&other), None);
    }

    #[test]
    fn labels_and_metadata_assemble_the_record() {
        let fields = extracted();
        assert_eq!(fields["title"], json!("Ferguson Home Returns, 12 Pallets"));
        assert_eq!(fields["description"], json!("Mixed plumbing returns."));
        assert_eq!(fields["condition"], json!("Customer Returns"));
        assert_eq!(fields["current_bid_value"], json!(2300.0));
        assert_eq!(fields["retail_value_value"], json!(18900.0));
        assert_eq!(fields["quantity_value"], json!(640));
    }

    #[test]
    fn manifest_detection_scans_all_anchors() {
        let fields = extracted();
        assert_eq!(
            fields["manifest_url"],
            json!("https://www.liquidation.com/docs/lot-88123-manifest.csv")
        );
    }

    #[test]
    fn relative_image_sources_are_dropped() {
        let fields = extracted();
        assert_eq!(
            fields["images"],
            json!([
                "https://images.liquidation.com/lot/88123/main.jpg",
                "https://images.liquidation.com/lot/88123/2.jpg"
            ])
        );
    }
}
