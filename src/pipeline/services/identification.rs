use crate::collaborators::{IdentifyResponse, Recognizer};
use crate::common::ProcessedImage;
use crate::error::CollaboratorError;
use crate::pipeline::orchestration::deadline::race_with_fallback;
use crate::pipeline::orchestration::stage::{PipelineStage, StageReport};
use crate::pipeline::services::title::{
    self, confidence_for, derive_search_query, looks_generic, sanitize_title,
};
use crate::pipeline::types::AnalysisResult;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

/// Coarse identification of a captured item.
#[derive(Debug, Clone, PartialEq)]
pub struct Identification {
    pub title: String,
    pub search_query: String,
    pub sources: Vec<String>,
    pub generic: bool,
}

impl Identification {
    pub fn fallback() -> Self {
        Self {
            title: title::FALLBACK_TITLE.to_string(),
            search_query: String::new(),
            sources: Vec::new(),
            generic: true,
        }
    }

    fn from_response(response: IdentifyResponse) -> Self {
        let title = sanitize_title(&response.title);
        let search_query = response.search_query.trim().to_string();
        let heuristic = looks_generic(&title, &search_query);
        let generic = response.generic.unwrap_or(heuristic)
            // the fallback sentinel is never a resolved identification
            || title.is_empty()
            || title::is_fallback_title(&title);
        let title = if title.is_empty() {
            title::FALLBACK_TITLE.to_string()
        } else {
            title
        };
        // a resolved title always carries a query
        let search_query = if !generic && search_query.is_empty() {
            derive_search_query(&title)
        } else {
            search_query
        };
        Self {
            title,
            search_query,
            sources: response.sources,
            generic,
        }
    }

    pub fn confidence(&self) -> u8 {
        confidence_for(self.generic)
    }

    pub fn has_usable_title(&self) -> bool {
        !self.title.trim().is_empty()
    }

    /// The provisional result published as soon as identification resolves.
    pub fn into_result(self) -> AnalysisResult {
        let confidence = self.confidence();
        AnalysisResult {
            title: self.title,
            search_query: self.search_query,
            confidence,
            generic: self.generic,
            sources: self.sources,
            ..AnalysisResult::default()
        }
    }
}

pub struct IdentificationStage {
    recognizer: Arc<dyn Recognizer>,
    timeout: Duration,
}

impl IdentificationStage {
    pub fn new(recognizer: Arc<dyn Recognizer>, timeout: Duration) -> Self {
        Self {
            recognizer,
            timeout,
        }
    }

    /// Never fails: timeouts and errors resolve to [`Identification::fallback`].
    #[instrument(skip(self, image), fields(code = scanned_code.unwrap_or("-")))]
    pub async fn identify(
        &self,
        image: &ProcessedImage,
        scanned_code: Option<&str>,
    ) -> (Identification, StageReport) {
        let (response, report) = race_with_fallback(
            PipelineStage::Identification,
            self.timeout,
            self.recognize(image, scanned_code),
            || None,
        )
        .await;

        let identification = response
            .map(Identification::from_response)
            .unwrap_or_else(Identification::fallback);
        info!(
            title = %identification.title,
            generic = identification.generic,
            "Identification resolved"
        );
        (identification, report)
    }

    async fn recognize(
        &self,
        image: &ProcessedImage,
        scanned_code: Option<&str>,
    ) -> Result<Option<IdentifyResponse>, CollaboratorError> {
        if let Some(code) = scanned_code {
            if let Some(response) = self.recognizer.lookup_code(code).await? {
                debug!(code, "Resolved by code lookup");
                return Ok(Some(response));
            }
            debug!(code, "Code unknown, falling back to visual recognition");
        }
        self.recognizer
            .identify(image, scanned_code)
            .await
            .map(Some)
    }
}
