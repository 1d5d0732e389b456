use super::{
    CompareResponse, Describer, IdentifyResponse, ListingTab, MarketSearch, ObjectStore,
    Recognizer, SellThrough,
};
use crate::common::ProcessedImage;
use crate::error::{AppError, CollaboratorError};
use crate::pipeline::types::PartialResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::debug;

/// How a scripted collaborator call behaves.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Scripted<T> {
    Reply {
        value: T,
        #[serde(default)]
        delay_ms: u64,
    },
    Fail {
        #[serde(default)]
        message: String,
    },
    Hang,
}

impl<T: Clone> Scripted<T> {
    pub fn reply(value: T) -> Self {
        Scripted::Reply { value, delay_ms: 0 }
    }

    pub fn delayed(value: T, delay_ms: u64) -> Self {
        Scripted::Reply { value, delay_ms }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Scripted::Fail {
            message: message.into(),
        }
    }

    pub async fn play(&self) -> Result<T, CollaboratorError> {
        match self {
            Scripted::Reply { value, delay_ms } => {
                if *delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(*delay_ms)).await;
                }
                Ok(value.clone())
            }
            Scripted::Fail { message } => Err(CollaboratorError::Transport(message.clone())),
            Scripted::Hang => std::future::pending().await,
        }
    }
}

/// Offline stand-in for every collaborator, driven by a JSON script.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FixtureCollaborators {
    pub identify: Scripted<IdentifyResponse>,
    pub lookup_code: Scripted<Option<IdentifyResponse>>,
    pub enrich: Scripted<PartialResult>,
    pub sold: Scripted<CompareResponse>,
    pub active: Scripted<CompareResponse>,
    pub sell_through: Scripted<SellThrough>,
    pub describe: Scripted<String>,
    pub upload: Scripted<Option<String>>,
    #[serde(skip)]
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
}

impl Default for FixtureCollaborators {
    fn default() -> Self {
        Self {
            identify: Scripted::fail("no recognizer scripted"),
            lookup_code: Scripted::reply(None),
            enrich: Scripted::reply(PartialResult::default()),
            sold: Scripted::reply(CompareResponse::default()),
            active: Scripted::reply(CompareResponse::default()),
            sell_through: Scripted::reply(SellThrough::zeroed()),
            describe: Scripted::fail("no describer scripted"),
            upload: Scripted::reply(None),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FixtureCollaborators {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Names of the calls made so far, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    fn record(&self, call: String) {
        debug!(call = %call, "Fixture collaborator called");
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

#[async_trait]
impl Recognizer for FixtureCollaborators {
    async fn identify(
        &self,
        _image: &ProcessedImage,
        code: Option<&str>,
    ) -> Result<IdentifyResponse, CollaboratorError> {
        self.record(format!("identify:{}", code.unwrap_or("-")));
        self.identify.play().await
    }

    async fn lookup_code(&self, code: &str) -> Result<Option<IdentifyResponse>, CollaboratorError> {
        self.record(format!("lookup_code:{}", code));
        self.lookup_code.play().await
    }

    async fn enrich(
        &self,
        _image: &ProcessedImage,
        title: &str,
    ) -> Result<PartialResult, CollaboratorError> {
        self.record(format!("enrich:{}", title));
        self.enrich.play().await
    }
}

#[async_trait]
impl MarketSearch for FixtureCollaborators {
    async fn compare(
        &self,
        query: &str,
        tab: ListingTab,
        _condition: &str,
    ) -> Result<CompareResponse, CollaboratorError> {
        self.record(format!("compare:{:?}:{}", tab, query));
        match tab {
            ListingTab::Sold => self.sold.play().await,
            ListingTab::Active => self.active.play().await,
        }
    }

    async fn sell_through(&self, query: &str) -> Result<SellThrough, CollaboratorError> {
        self.record(format!("sell_through:{}", query));
        self.sell_through.play().await
    }
}

#[async_trait]
impl Describer for FixtureCollaborators {
    async fn generate(
        &self,
        title: &str,
        _notes: &str,
        platform: &str,
    ) -> Result<String, CollaboratorError> {
        self.record(format!("describe:{}:{}", platform, title));
        self.describe.play().await
    }
}

#[async_trait]
impl ObjectStore for FixtureCollaborators {
    async fn upload(&self, _image: &ProcessedImage) -> Result<Option<String>, CollaboratorError> {
        self.record("upload".to_string());
        self.upload.play().await
    }
}
