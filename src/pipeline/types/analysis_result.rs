use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// One comparable listing returned by marketplace search.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comparable {
    pub title: String,
    #[serde(default)]
    pub price: f64,
    #[serde(default)]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStats {
    pub sold_count: u32,
    pub active_count: u32,
    pub sell_through_rate: u32,
    pub average_sold_price: Option<f64>,
    pub active_comps: Vec<Comparable>,
    pub sold_comps: Vec<Comparable>,
}

/// The progressively filled record shown to the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub title: String,
    pub search_query: String,
    pub confidence: u8,
    pub generic: bool,
    pub sources: Vec<String>,
    pub specifics: IndexMap<String, String>,
    pub condition: Option<String>,
    pub price_estimate: Option<f64>,
    pub shipping_estimate: Option<f64>,
    pub weight_estimate: Option<String>,
    pub market_stats: Option<MarketStats>,
    pub description: Option<String>,
}

/// Any subset of result fields produced by a stage. Absent fields leave the
/// base untouched when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PartialResult {
    pub title: Option<String>,
    pub search_query: Option<String>,
    pub specifics: Option<IndexMap<String, String>>,
    pub condition: Option<String>,
    pub price_estimate: Option<f64>,
    pub shipping_estimate: Option<f64>,
    pub weight_estimate: Option<String>,
    pub description: Option<String>,
    pub market_stats: Option<MarketStats>,
}

impl PartialResult {
    pub fn is_empty(&self) -> bool {
        self == &PartialResult::default()
    }
}
