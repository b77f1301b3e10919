//! Total conversions from scraped text to typed values.
//!
//! Every parser returns `None` on malformed or absent input. `None` means
//! "field not observed", which downstream code must keep distinct from zero.

use itertools::Itertools;
use lazy_regex::regex;

/// First `$`-prefixed numeric token, thousands separators stripped.
pub fn parse_currency(value: &str) -> Option<f64> {
    let caps = regex!(r"\$\s*([0-9,]+(?:\.[0-9]{2})?)").captures(value)?;
    caps[1].replace(',', "").parse().ok()
}

/// First bare numeric token.
pub fn parse_int(value: &str) -> Option<i64> {
    let cleaned = value.replace(',', "");
    let caps = regex!(r"\b([0-9]+)\b").captures(&cleaned)?;
    caps[1].parse().ok()
}

/// Number immediately followed by an "lb" unit marker, case-insensitive.
pub fn parse_weight_lbs(value: &str) -> Option<f64> {
    let caps = regex!(r"([0-9,]+(?:\.[0-9]+)?)\s*lb"i).captures(value)?;
    caps[1].replace(',', "").parse().ok()
}

/// Collapse runs of whitespace into single spaces and trim.
pub fn collapse_ws(value: &str) -> String {
    regex!(r"\s+").replace_all(value.trim(), " ").into_owned()
}

/// Canonical form used for label lookup: trimmed, lowercased, whitespace
/// collapsed.
pub fn normalize_label(label: &str) -> String {
    collapse_ws(&label.to_lowercase())
}

pub fn slugify(value: &str) -> String {
    let value = value.trim().to_lowercase();
    let value = regex!(r"[^a-z0-9]+").replace_all(&value, "-");
    let value = regex!(r"-+").replace_all(&value, "-");
    value.trim_matches('-').to_string()
}

/// Trim entries, drop empties, keep the first occurrence of each value.
pub fn dedupe_preserve<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    values
        .into_iter()
        .map(|v| v.as_ref().trim().to_string())
        .filter(|v| !v.is_empty())
        .unique()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn currency_takes_first_dollar_token() {
        assert_eq!(parse_currency("Retail: $1,234.50 each"), Some(1234.50));
        assert_eq!(parse_currency("$ 99"), Some(99.0));
        assert_eq!(parse_currency("Bid $5.00 of $10.00"), Some(5.0));
    }

    #[test]
    fn currency_misses_are_none() {
        assert_eq!(parse_currency("no price"), None);
        assert_eq!(parse_currency(""), None);
        assert_eq!(parse_currency("1234.50"), None);
    }

    #[test]
    fn int_strips_separators() {
        assert_eq!(parse_int("1,024 units"), Some(1024));
        assert_eq!(parse_int("qty: 3"), Some(3));
        assert_eq!(parse_int("none"), None);
    }

    #[test]
    fn weight_requires_unit_marker() {
        assert_eq!(parse_weight_lbs("Approx. 42.5 lb"), Some(42.5));
        assert_eq!(parse_weight_lbs("1,200 LBS"), Some(1200.0));
        assert_eq!(parse_weight_lbs("42.5 kg"), None);
    }

    #[test]
    fn label_normalization() {
        assert_eq!(normalize_label("  Est.   MSRP "), "est. msrp");
        assert_eq!(normalize_label("Lot\n#"), "lot #");
    }

    #[test]
    fn slugify_collapses_punctuation() {
        assert_eq!(slugify("Apple MacBooks, Grade A/B!"), "apple-macbooks-grade-a-b");
        assert_eq!(slugify("--x--"), "x");
    }

    #[test]
    fn dedupe_keeps_first_seen_order() {
        let values = vec![" a ", "b", "", "a", "c", "b"];
        assert_eq!(dedupe_preserve(values), vec!["a", "b", "c"]);
    }
}
