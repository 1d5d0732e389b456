//! Field-level last-writer-wins merging of stage output into the live result.

use crate::pipeline::services::title::{
    self, derive_search_query, is_fallback_title, looks_generic, sanitize_title,
};
use crate::pipeline::types::{AnalysisResult, MarketStats, PartialResult};

pub const UNKNOWN: &str = "Unknown";

/// Specifics that every result shown to the user carries.
pub const DEFAULT_SPECIFIC_KEYS: [&str; 6] =
    ["Brand", "Model", "Type", "Color", "Material", "Condition"];

const CONDITION_KEY: &str = "Condition";

// (max pounds, price) in ascending weight order
const SHIPPING_TIERS: [(f64, f64); 3] = [(1.0, 5.50), (3.0, 9.50), (10.0, 15.00)];
const HEAVY_SHIPPING: f64 = 25.00;

/// The result used before identification reports and when it fails.
pub fn fallback_result() -> AnalysisResult {
    let mut result = AnalysisResult {
        title: title::FALLBACK_TITLE.to_string(),
        confidence: title::GENERIC_CONFIDENCE,
        generic: true,
        ..AnalysisResult::default()
    };
    enforce_default_specifics(&mut result);
    result
}

pub fn enforce_default_specifics(result: &mut AnalysisResult) {
    for key in DEFAULT_SPECIFIC_KEYS {
        result
            .specifics
            .entry(key.to_string())
            .or_insert_with(|| UNKNOWN.to_string());
    }
}

fn is_informative(value: &str) -> bool {
    let value = value.trim();
    !value.is_empty() && !value.eq_ignore_ascii_case(UNKNOWN)
}

fn informative(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| is_informative(v))
}

fn valid_amount(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v >= 0.0)
}

pub fn merge(mut base: AnalysisResult, patch: PartialResult) -> AnalysisResult {
    let patch_query = patch
        .search_query
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    match patch.title.map(|t| sanitize_title(&t)).filter(|t| !t.is_empty()) {
        Some(new_title) => {
            let query = patch_query.unwrap_or_else(|| derive_search_query(&new_title));
            let generic = looks_generic(&new_title, &query);
            // a generic title never replaces a resolved one
            if !generic || base.generic {
                base.title = new_title;
                base.search_query = query;
                if !generic {
                    base.generic = false;
                    base.confidence = base.confidence.max(title::RESOLVED_CONFIDENCE);
                }
            }
        }
        None => {
            if let Some(query) = patch_query {
                base.search_query = query;
            }
        }
    }

    if let Some(specifics) = patch.specifics {
        for (key, value) in specifics {
            let key = key.trim().to_string();
            if key.is_empty() {
                continue;
            }
            if is_informative(&value) {
                base.specifics.insert(key, value.trim().to_string());
            } else {
                base.specifics
                    .entry(key)
                    .or_insert_with(|| UNKNOWN.to_string());
            }
        }
    }

    if let Some(condition) = informative(patch.condition) {
        let slot = base
            .specifics
            .entry(CONDITION_KEY.to_string())
            .or_insert_with(|| UNKNOWN.to_string());
        if !is_informative(slot.as_str()) {
            *slot = condition.clone();
        }
        base.condition = Some(condition);
    }

    if let Some(price) = valid_amount(patch.price_estimate) {
        base.price_estimate = Some(price);
    }
    if let Some(shipping) = valid_amount(patch.shipping_estimate) {
        base.shipping_estimate = Some(shipping);
    }
    if let Some(weight) = informative(patch.weight_estimate) {
        base.weight_estimate = Some(weight);
    }
    if let Some(description) = informative(patch.description) {
        base.description = Some(description);
    }
    if let Some(stats) = patch.market_stats {
        base.market_stats = Some(sanitize_stats(stats));
    }

    if base.search_query.is_empty() && !base.title.is_empty() && !is_fallback_title(&base.title) {
        base.search_query = derive_search_query(&base.title);
    }
    enforce_default_specifics(&mut base);
    base
}

fn sanitize_stats(mut stats: MarketStats) -> MarketStats {
    for comp in stats.sold_comps.iter_mut().chain(stats.active_comps.iter_mut()) {
        comp.title = sanitize_title(&comp.title);
    }
    stats
}

/// Fills estimates whose source stage never delivered, from what other
/// stages did deliver.
pub fn apply_fallbacks(result: &mut AnalysisResult) {
    if result.price_estimate.is_none() {
        result.price_estimate = result
            .market_stats
            .as_ref()
            .and_then(|stats| stats.average_sold_price)
            .filter(|price| *price > 0.0)
            .map(|price| (price * 100.0).round() / 100.0);
    }
    if result.shipping_estimate.is_none() {
        result.shipping_estimate = result
            .weight_estimate
            .as_deref()
            .and_then(parse_weight_lbs)
            .map(shipping_for_weight);
    }
}

/// Parses strings like "12 oz", "2.5 lb", "500 g" or "1.2kg" into pounds.
pub fn parse_weight_lbs(weight: &str) -> Option<f64> {
    let weight = weight.trim();
    let split = weight
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(weight.len());
    let value: f64 = weight[..split].parse().ok()?;
    let unit = weight[split..].trim().to_ascii_lowercase();
    let pounds = match unit.trim_end_matches('.') {
        "oz" | "ounce" | "ounces" => value / 16.0,
        "lb" | "lbs" | "pound" | "pounds" => value,
        "g" | "gram" | "grams" => value / 453.592,
        "kg" | "kilogram" | "kilograms" => value * 2.20462,
        _ => return None,
    };
    (pounds > 0.0).then_some(pounds)
}

pub fn shipping_for_weight(pounds: f64) -> f64 {
    SHIPPING_TIERS
        .iter()
        .find(|(max, _)| pounds <= *max)
        .map(|(_, price)| *price)
        .unwrap_or(HEAVY_SHIPPING)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::types::Comparable;
    use indexmap::IndexMap;
    use std::collections::BTreeSet;

    fn specifics(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn populated(result: &AnalysisResult) -> BTreeSet<String> {
        let mut fields = BTreeSet::new();
        if !is_fallback_title(&result.title) {
            fields.insert("title".to_string());
        }
        if !result.search_query.is_empty() {
            fields.insert("searchQuery".to_string());
        }
        for (key, value) in &result.specifics {
            if is_informative(value) {
                fields.insert(format!("specifics.{}", key));
            }
        }
        let optional = [
            ("condition", result.condition.is_some()),
            ("priceEstimate", result.price_estimate.is_some()),
            ("shippingEstimate", result.shipping_estimate.is_some()),
            ("weightEstimate", result.weight_estimate.is_some()),
            ("description", result.description.is_some()),
            ("marketStats", result.market_stats.is_some()),
        ];
        for (name, present) in optional {
            if present {
                fields.insert(name.to_string());
            }
        }
        fields
    }

    #[test]
    fn fallback_result_carries_defaults() {
        let result = fallback_result();
        assert_eq!(result.title, title::FALLBACK_TITLE);
        assert!(result.search_query.is_empty());
        assert!(result.generic);
        for key in DEFAULT_SPECIFIC_KEYS {
            assert_eq!(result.specifics.get(key).map(String::as_str), Some(UNKNOWN));
        }
    }

    #[test]
    fn merge_is_monotonic() {
        let patches = vec![
            PartialResult {
                title: Some("Red Widget".into()),
                search_query: Some("red widget".into()),
                ..PartialResult::default()
            },
            PartialResult::default(),
            PartialResult {
                specifics: Some(specifics(&[("Brand", "Acme"), ("Color", "")])),
                weight_estimate: Some("12 oz".into()),
                ..PartialResult::default()
            },
            PartialResult {
                title: Some(title::FALLBACK_TITLE.into()),
                search_query: Some("".into()),
                specifics: Some(specifics(&[("Brand", "Unknown"), ("Color", "Red")])),
                description: Some("   ".into()),
                weight_estimate: Some("".into()),
                ..PartialResult::default()
            },
            PartialResult {
                description: Some("A red widget.".into()),
                price_estimate: Some(f64::NAN),
                condition: Some("Used".into()),
                ..PartialResult::default()
            },
            PartialResult {
                market_stats: Some(MarketStats::default()),
                price_estimate: Some(12.5),
                ..PartialResult::default()
            },
        ];

        let mut result = fallback_result();
        let mut seen = populated(&result);
        for patch in patches {
            result = merge(result, patch);
            let now = populated(&result);
            assert!(
                seen.is_subset(&now),
                "merge erased fields: before={:?} after={:?}",
                seen,
                now
            );
            seen = now;
        }
        assert_eq!(result.title, "Red Widget");
        assert_eq!(result.specifics["Brand"], "Acme");
        assert_eq!(result.specifics["Color"], "Red");
        assert_eq!(result.specifics["Condition"], "Used");
        assert_eq!(result.description.as_deref(), Some("A red widget."));
    }

    #[test]
    fn default_specifics_survive_every_merge() {
        let mut result = AnalysisResult::default();
        let patches = [
            PartialResult::default(),
            PartialResult {
                specifics: Some(specifics(&[("Model", "X-100"), ("Era", "1980s")])),
                ..PartialResult::default()
            },
        ];
        for patch in patches {
            result = merge(result, patch);
            for key in DEFAULT_SPECIFIC_KEYS {
                assert!(result.specifics.contains_key(key), "missing {}", key);
            }
        }
        assert_eq!(result.specifics["Model"], "X-100");
        assert_eq!(result.specifics["Brand"], UNKNOWN);
        assert_eq!(result.specifics["Era"], "1980s");
    }

    #[test]
    fn description_is_last_writer_wins() {
        let result = merge(
            fallback_result(),
            PartialResult {
                description: Some("placeholder".into()),
                ..PartialResult::default()
            },
        );
        let result = merge(
            result,
            PartialResult {
                description: Some("Generated listing copy".into()),
                ..PartialResult::default()
            },
        );
        assert_eq!(result.description.as_deref(), Some("Generated listing copy"));
    }

    #[test]
    fn refined_title_rederives_query() {
        let base = merge(
            fallback_result(),
            PartialResult {
                title: Some("Red Widget".into()),
                search_query: Some("red widget".into()),
                ..PartialResult::default()
            },
        );
        let refined = merge(
            base,
            PartialResult {
                title: Some("Acme Red Widget Model 7 (Estimated Sold)".into()),
                ..PartialResult::default()
            },
        );
        assert_eq!(refined.title, "Acme Red Widget Model 7");
        assert_eq!(refined.search_query, "acme red widget model 7");
    }

    #[test]
    fn generic_title_does_not_replace_resolved_one() {
        let base = merge(
            fallback_result(),
            PartialResult {
                title: Some("Red Widget".into()),
                ..PartialResult::default()
            },
        );
        assert!(!base.generic);
        assert_eq!(base.confidence, title::RESOLVED_CONFIDENCE);

        let merged = merge(
            base,
            PartialResult {
                title: Some("Unknown item detected".into()),
                ..PartialResult::default()
            },
        );
        assert_eq!(merged.title, "Red Widget");
        assert_eq!(merged.search_query, "red widget");
    }

    #[test]
    fn comparable_titles_are_sanitized() {
        let stats = MarketStats {
            sold_comps: vec![Comparable {
                title: "Red Widget (Estimated Sold)".into(),
                price: 10.0,
                url: None,
            }],
            ..MarketStats::default()
        };
        let result = merge(
            fallback_result(),
            PartialResult {
                market_stats: Some(stats),
                ..PartialResult::default()
            },
        );
        let stats = result.market_stats.expect("stats should be attached");
        assert_eq!(stats.sold_comps[0].title, "Red Widget");
    }

    #[test]
    fn fallbacks_fill_price_and_shipping() {
        let mut result = fallback_result();
        result.weight_estimate = Some("2.5 lb".into());
        result.market_stats = Some(MarketStats {
            average_sold_price: Some(19.996),
            ..MarketStats::default()
        });
        apply_fallbacks(&mut result);
        assert_eq!(result.price_estimate, Some(20.0));
        assert_eq!(result.shipping_estimate, Some(9.50));
    }

    #[test]
    fn fallbacks_do_not_override_stage_values() {
        let mut result = fallback_result();
        result.price_estimate = Some(5.0);
        result.shipping_estimate = Some(3.0);
        result.weight_estimate = Some("40 lb".into());
        apply_fallbacks(&mut result);
        assert_eq!(result.price_estimate, Some(5.0));
        assert_eq!(result.shipping_estimate, Some(3.0));
    }

    #[test]
    fn parses_weights() {
        assert_eq!(parse_weight_lbs("16 oz"), Some(1.0));
        assert_eq!(parse_weight_lbs("3lbs"), Some(3.0));
        assert!((parse_weight_lbs("1 kg").unwrap() - 2.20462).abs() < 1e-9);
        assert_eq!(parse_weight_lbs("heavy"), None);
        assert_eq!(parse_weight_lbs("12"), None);
        assert_eq!(shipping_for_weight(0.4), 5.50);
        assert_eq!(shipping_for_weight(11.0), HEAVY_SHIPPING);
    }
}
