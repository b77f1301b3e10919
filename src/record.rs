use crate::parse::{parse_currency, parse_int, parse_weight_lbs};
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Open extension map carried by every record. `BTreeMap` keeps key order
/// deterministic, which the persistence contract relies on.
pub type FieldMap = BTreeMap<String, Value>;

/// One extracted auction lot.
///
/// The core identity fields are typed; everything harvested from the page
/// lives in the flattened extension map, so site-specific overflow fields
/// survive serialization without a schema change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingRecord {
    pub url: String,
    pub site: String,
    pub extracted_at: DateTime<FixedOffset>,
    #[serde(flatten)]
    pub fields: FieldMap,
}

impl ListingRecord {
    pub fn new(
        url: String,
        site: &str,
        extracted_at: DateTime<FixedOffset>,
        fields: FieldMap,
    ) -> Self {
        ListingRecord {
            url,
            site: site.to_string(),
            extracted_at,
            fields,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }
}

impl fmt::Display for ListingRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Url         : {}", self.url)?;
        writeln!(f, "Site        : {}", self.site)?;
        for key in ["title", "condition", "current_bid_value", "msrp_value"] {
            let value = self.fields.get(key).cloned().unwrap_or(Value::Null);
            writeln!(f, "{:<12}: {}", key, value)?;
        }
        Ok(())
    }
}

/// Ordered field candidates, one list per provenance tier.
///
/// Tier 1 holds site-specific DOM hooks (trusted verbatim), tier 2 the
/// normalized label/value pairs, tier 3 page metadata and other low-trust
/// fallbacks. Within a tier the first occurrence of a key wins.
#[derive(Debug, Default)]
pub struct TierMaps {
    pub structured: Vec<(String, Value)>,
    pub labeled: Vec<(String, Value)>,
    pub metadata: Vec<(String, Value)>,
}

/// Merge the three tiers in fixed precedence order. A key set by a higher
/// tier is never overwritten; null candidates contribute nothing.
pub fn resolve_tiers(tiers: TierMaps) -> FieldMap {
    let mut fields = FieldMap::new();
    let candidates = tiers
        .structured
        .into_iter()
        .chain(tiers.labeled)
        .chain(tiers.metadata);
    for (key, value) in candidates {
        if value.is_null() {
            continue;
        }
        fields.entry(key).or_insert(value);
    }
    fields
}

/// A field is unset when missing or null; an observed zero stays observed.
pub fn is_unset(fields: &FieldMap, key: &str) -> bool {
    matches!(fields.get(key), None | Some(Value::Null))
}

pub fn set_if_unset(fields: &mut FieldMap, key: &str, value: Value) {
    if !value.is_null() && is_unset(fields, key) {
        fields.insert(key.to_string(), value);
    }
}

fn text_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn field_text(fields: &FieldMap, key: &str) -> Option<String> {
    fields.get(key).and_then(text_of)
}

fn opt_f64(value: Option<f64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

fn opt_i64(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::from)
}

/// Deterministic numeric derivation over an assembled field map.
///
/// Currency and count fields always gain a `*_value` sibling (null on a
/// parse miss); the remaining derivations are recorded only when the raw
/// field was present and parsable.
pub fn derive_numeric(fields: &mut FieldMap) {
    for (raw, derived) in [
        ("msrp", "msrp_value"),
        ("retail_value", "retail_value_value"),
        ("current_bid", "current_bid_value"),
        ("buyer_premium", "buyer_premium_value"),
    ] {
        let parsed = field_text(fields, raw).and_then(|t| parse_currency(&t));
        fields.insert(derived.to_string(), opt_f64(parsed));
    }

    for (raw, derived) in [
        ("quantity", "quantity_value"),
        ("pallet_count", "pallet_count_value"),
    ] {
        let parsed = field_text(fields, raw).and_then(|t| parse_int(&t));
        fields.insert(derived.to_string(), opt_i64(parsed));
    }

    if let Some(parsed) = field_text(fields, "total_items").and_then(|t| parse_int(&t)) {
        fields.insert("total_items_value".to_string(), Value::from(parsed));
    }
    if let Some(parsed) = field_text(fields, "weight").and_then(|t| parse_weight_lbs(&t)) {
        fields.insert("weight_lbs".to_string(), Value::from(parsed));
    }
    if let Some(parsed) = field_text(fields, "items_count").and_then(|t| parse_int(&t)) {
        fields.insert("items_count_value".to_string(), Value::from(parsed));
    }

    // Sub-unit integer prices from the pricing widget are authoritative.
    if let Some(cents) = field_text(fields, "subtotal_cents").and_then(|t| t.parse::<f64>().ok()) {
        fields.insert("lot_price_value".to_string(), Value::from(cents / 100.0));
    }
    if let Some(cents) =
        field_text(fields, "default_shipping_cents").and_then(|t| t.parse::<f64>().ok())
    {
        fields.insert("default_shipping_value".to_string(), Value::from(cents / 100.0));
    }

    if is_unset(fields, "current_bid_value") {
        let fallback = fields
            .get("bid_history")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
            .filter_map(|row| row.get("bid"))
            .filter_map(Value::as_str)
            .find_map(parse_currency);
        if let Some(bid) = fallback {
            fields.insert("current_bid_value".to_string(), Value::from(bid));
        }
    }
}

/// Titles carrying an inline "Orig. Retail" price double as a retail-value
/// source when nothing better was on the page.
pub fn apply_orig_retail(fields: &mut FieldMap, listing_title: &str) {
    if !listing_title.to_lowercase().contains("orig. retail") {
        return;
    }
    let parsed = parse_currency(listing_title);
    fields.insert("orig_retail".to_string(), Value::from(listing_title));
    fields.insert("orig_retail_value".to_string(), opt_f64(parsed));
    if let Some(value) = parsed {
        set_if_unset(fields, "msrp_value", Value::from(value));
        set_if_unset(fields, "retail_value_value", Value::from(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn pair(key: &str, value: Value) -> (String, Value) {
        (key.to_string(), value)
    }

    #[test]
    fn higher_tier_is_never_overwritten() {
        let tiers = TierMaps {
            structured: vec![pair("lot_id", json!("BBY-123"))],
            labeled: vec![pair("lot_id", json!("from-label")), pair("condition", json!("Used"))],
            metadata: vec![pair("condition", json!("from-meta")), pair("title", json!("Pallet"))],
        };
        let fields = resolve_tiers(tiers);
        assert_eq!(fields["lot_id"], json!("BBY-123"));
        assert_eq!(fields["condition"], json!("Used"));
        assert_eq!(fields["title"], json!("Pallet"));
    }

    #[test]
    fn first_candidate_within_a_tier_wins() {
        let tiers = TierMaps {
            labeled: vec![pair("msrp", json!("$100")), pair("msrp", json!("$200"))],
            ..TierMaps::default()
        };
        assert_eq!(resolve_tiers(tiers)["msrp"], json!("$100"));
    }

    #[test]
    fn null_candidates_are_inert() {
        let tiers = TierMaps {
            structured: vec![pair("title", Value::Null)],
            metadata: vec![pair("title", json!("From og:title"))],
            ..TierMaps::default()
        };
        assert_eq!(resolve_tiers(tiers)["title"], json!("From og:title"));
    }

    #[test]
    fn currency_fields_gain_value_siblings() {
        let mut fields = FieldMap::new();
        fields.insert("msrp".into(), json!("Est. $12,500.00"));
        fields.insert("current_bid".into(), json!("no bids yet"));
        derive_numeric(&mut fields);
        assert_eq!(fields["msrp_value"], json!(12500.0));
        assert_eq!(fields["current_bid_value"], Value::Null);
        assert_eq!(fields["retail_value_value"], Value::Null);
    }

    #[test]
    fn subtotal_cents_drives_lot_price() {
        let mut fields = FieldMap::new();
        fields.insert("subtotal_cents".into(), json!("123456"));
        fields.insert("default_shipping_cents".into(), json!("9900"));
        derive_numeric(&mut fields);
        assert_eq!(fields["lot_price_value"], json!(1234.56));
        assert_eq!(fields["default_shipping_value"], json!(99.0));
    }

    #[test]
    fn bid_history_backfills_missing_current_bid() {
        let mut fields = FieldMap::new();
        fields.insert(
            "bid_history".into(),
            json!([
                {"customer": "c***1", "bid": "not a bid", "date": "01/02"},
                {"customer": "c***2", "bid": "$250.00", "date": "01/01"}
            ]),
        );
        derive_numeric(&mut fields);
        assert_eq!(fields["current_bid_value"], json!(250.0));
    }

    #[test]
    fn bid_history_never_overrides_observed_bid() {
        let mut fields = FieldMap::new();
        fields.insert("current_bid".into(), json!("$0.00"));
        fields.insert("bid_history".into(), json!([{"bid": "$250.00"}]));
        derive_numeric(&mut fields);
        // An observed zero is an observation, not an unset field.
        assert_eq!(fields["current_bid_value"], json!(0.0));
    }

    #[test]
    fn orig_retail_backfills_only_unset_values() {
        let mut fields = FieldMap::new();
        fields.insert("msrp_value".into(), json!(99.0));
        apply_orig_retail(&mut fields, "MacBooks (Orig. Retail $1,299.00)");
        assert_eq!(fields["orig_retail_value"], json!(1299.0));
        assert_eq!(fields["msrp_value"], json!(99.0));
        assert_eq!(fields["retail_value_value"], json!(1299.0));
    }

    #[test]
    fn plain_titles_leave_no_orig_retail() {
        let mut fields = FieldMap::new();
        apply_orig_retail(&mut fields, "Pallet of small appliances");
        assert!(fields.is_empty());
    }

    #[test]
    fn records_serialize_flat_and_key_sorted() {
        let mut fields = FieldMap::new();
        fields.insert("title".into(), json!("Pallet"));
        fields.insert("auction_id".into(), json!("ml10042"));
        let record = ListingRecord::new(
            "https://example.com/detail/ml10042/pallet".into(),
            "techliquidators",
            crate::utils::get_now(),
            fields,
        );
        let value = serde_json::to_value(&record).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["auction_id", "extracted_at", "site", "title", "url"]);

        let line = serde_json::to_string(&record).unwrap();
        let back: ListingRecord = serde_json::from_str(&line).unwrap();
        assert_eq!(back, record);
    }
}
