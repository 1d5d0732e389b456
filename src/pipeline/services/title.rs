//! Title normalisation, search-query derivation and generic classification.

pub const FALLBACK_TITLE: &str = "Scanning...";

pub const GENERIC_CONFIDENCE: u8 = 30;
pub const RESOLVED_CONFIDENCE: u8 = 80;

const MAX_QUERY_WORDS: usize = 8;

const LOW_CONFIDENCE_PHRASES: [&str; 4] = [
    "item detected",
    "unknown item",
    "unidentified item",
    "generic item",
];

// Matched ASCII case-insensitively.
const MARKER_PHRASES: [&str; 4] = [
    "(estimated sold)",
    "estimated sold",
    "new listing",
    "shop on ebay",
];

/// Strips marketplace marker phrases and collapses whitespace. Runs to a
/// fixed point, so applying it twice gives the same string as applying it once.
pub fn sanitize_title(title: &str) -> String {
    let mut current = collapse_whitespace(title);
    loop {
        let next = collapse_whitespace(&strip_markers(&current));
        if next == current {
            return current;
        }
        current = next;
    }
}

fn strip_markers(title: &str) -> String {
    let mut out = title.to_string();
    for marker in MARKER_PHRASES {
        // ascii lowercasing keeps byte offsets aligned with `out`
        while let Some(start) = out.to_ascii_lowercase().find(marker) {
            out.replace_range(start..start + marker.len(), "");
        }
    }
    out.trim_matches(|c: char| c.is_whitespace() || matches!(c, '-' | '|' | ':'))
        .to_string()
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lowercased keyword query built from a title.
pub fn derive_search_query(title: &str) -> String {
    let cleaned: String = sanitize_title(title)
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '\'' {
                c.to_ascii_lowercase()
            } else {
                ' '
            }
        })
        .collect();
    cleaned
        .split_whitespace()
        .take(MAX_QUERY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn is_fallback_title(title: &str) -> bool {
    title.trim() == FALLBACK_TITLE
}

/// Legacy text heuristic, used when the recognizer does not say whether its
/// answer is generic.
pub fn looks_generic(title: &str, search_query: &str) -> bool {
    if search_query.trim().is_empty() || title.trim().is_empty() || is_fallback_title(title) {
        return true;
    }
    let lowered = title.to_lowercase();
    LOW_CONFIDENCE_PHRASES
        .iter()
        .any(|phrase| lowered.contains(phrase))
}

pub fn confidence_for(generic: bool) -> u8 {
    if generic {
        GENERIC_CONFIDENCE
    } else {
        RESOLVED_CONFIDENCE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_estimated_sold_suffix() {
        assert_eq!(
            sanitize_title("Vintage Lamp (Estimated Sold)"),
            "Vintage Lamp"
        );
        assert_eq!(sanitize_title("New Listing  Brass   Bell"), "Brass Bell");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let samples = [
            "",
            "   ",
            "Red Widget",
            "Red Widget (Estimated Sold)",
            "(Estim(Estimated Sold)ated Sold) Lamp",
            "NEW LISTING new listing Shop on eBay",
            "Café Mug – Estimated Sold – ",
            "- | : Toy Car : | -",
        ];
        for sample in samples {
            let once = sanitize_title(sample);
            let twice = sanitize_title(&once);
            assert_eq!(once, twice, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn nested_markers_are_fully_removed() {
        assert_eq!(sanitize_title("(Estim(Estimated Sold)ated Sold) Lamp"), "Lamp");
    }

    #[test]
    fn derives_lowercase_query() {
        assert_eq!(derive_search_query("Red Widget"), "red widget");
        assert_eq!(
            derive_search_query("Nintendo Game Boy, Color (Estimated Sold)"),
            "nintendo game boy color"
        );
    }

    #[test]
    fn query_is_capped() {
        let query = derive_search_query("a b c d e f g h i j k");
        assert_eq!(query.split(' ').count(), MAX_QUERY_WORDS);
    }

    #[test]
    fn generic_heuristics() {
        assert!(looks_generic(FALLBACK_TITLE, ""));
        assert!(looks_generic("Red Widget", ""));
        assert!(looks_generic("Electronic Item Detected", "electronic item"));
        assert!(!looks_generic("Red Widget", "red widget"));
    }

    #[test]
    fn confidence_bands() {
        assert_eq!(confidence_for(true), 30);
        assert_eq!(confidence_for(false), 80);
    }
}
