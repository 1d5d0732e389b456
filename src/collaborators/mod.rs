//! Request/response contracts of the external services the pipeline talks to.

pub mod fixture;

use crate::common::ProcessedImage;
use crate::error::CollaboratorError;
use crate::pipeline::types::{Comparable, PartialResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use fixture::{FixtureCollaborators, Scripted};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IdentifyResponse {
    pub title: String,
    pub search_query: String,
    pub sources: Vec<String>,
    /// Explicit generic/unresolved marker. When absent the pipeline falls
    /// back to text heuristics.
    pub generic: Option<bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ListingTab {
    Sold,
    Active,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompareResponse {
    pub items: Vec<Comparable>,
    pub average_price: f64,
    pub is_estimated: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SellThrough {
    pub active_count: u32,
    pub sold_count: u32,
    pub sell_through_rate: u32,
}

impl SellThrough {
    /// Sold-to-active ratio as a whole percentage.
    pub fn from_counts(sold_count: u32, active_count: u32) -> Self {
        let sell_through_rate = match (sold_count, active_count) {
            (0, 0) => 0,
            (_, 0) => 100,
            (sold, active) => ((sold as f64 / active as f64) * 100.0).round() as u32,
        };
        Self {
            active_count,
            sold_count,
            sell_through_rate,
        }
    }

    pub fn zeroed() -> Self {
        Self::default()
    }
}

#[async_trait]
pub trait Recognizer: Send + Sync {
    async fn identify(
        &self,
        image: &ProcessedImage,
        code: Option<&str>,
    ) -> Result<IdentifyResponse, CollaboratorError>;

    /// Direct lookup of a scanned code. `Ok(None)` means the code is unknown.
    async fn lookup_code(&self, code: &str) -> Result<Option<IdentifyResponse>, CollaboratorError>;

    async fn enrich(
        &self,
        image: &ProcessedImage,
        title: &str,
    ) -> Result<PartialResult, CollaboratorError>;
}

#[async_trait]
pub trait MarketSearch: Send + Sync {
    async fn compare(
        &self,
        query: &str,
        tab: ListingTab,
        condition: &str,
    ) -> Result<CompareResponse, CollaboratorError>;

    async fn sell_through(&self, query: &str) -> Result<SellThrough, CollaboratorError>;
}

#[async_trait]
pub trait Describer: Send + Sync {
    async fn generate(
        &self,
        title: &str,
        notes: &str,
        platform: &str,
    ) -> Result<String, CollaboratorError>;
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// `Ok(None)` tells the caller to keep its local encoded copy.
    async fn upload(&self, image: &ProcessedImage) -> Result<Option<String>, CollaboratorError>;
}
