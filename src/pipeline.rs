use crate::config::AppConfig;
use crate::detect::{ImageInputError, IngestError, infer_item, normalize_image};
use crate::llm::{GeminiClient, VisionBackend, VisionImage};
use crate::models::{EnrichedResult, ItemRecord, PriceRecord};
use crate::query::select_query;
use crate::shopping::{SearchError, SerpApiClient, ShoppingSearch};
use std::{
    future::Future,
    sync::Arc,
    time::{Duration, Instant},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Identification plus price enrichment. Cheap to clone; the service
/// clients are shared, read-only handles.
#[derive(Clone)]
pub struct Pipeline {
    pub config: Arc<PipelineConfig>,
    vision: Option<Arc<dyn VisionBackend>>,
    search: Option<Arc<dyn ShoppingSearch>>,
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_images: usize,
    pub max_image_dimension: u32,
    pub vision_timeout: Duration,
    pub search_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_images: 6,
            max_image_dimension: 1536,
            vision_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(10),
        }
    }
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        vision: Option<Arc<dyn VisionBackend>>,
        search: Option<Arc<dyn ShoppingSearch>>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            vision,
            search,
        }
    }

    pub fn from_config(app: &AppConfig) -> Self {
        let vision = GeminiClient::from_config(&app.vision, app.connect_timeout)
            .map(|client| Arc::new(client) as Arc<dyn VisionBackend>);
        let search = SerpApiClient::from_config(&app.search, app.connect_timeout)
            .map(|client| Arc::new(client) as Arc<dyn ShoppingSearch>);
        let config = PipelineConfig {
            max_images: app.limits.max_images,
            max_image_dimension: app.limits.max_image_dimension,
            vision_timeout: app.vision.timeout,
            search_timeout: app.search.timeout,
        };
        Self::new(config, vision, search)
    }

    pub fn vision_configured(&self) -> bool {
        self.vision.is_some()
    }

    pub fn search_configured(&self) -> bool {
        self.search.is_some()
    }

    /// Identification only.
    pub async fn identify(&self, images: Vec<Vec<u8>>) -> Result<ItemRecord, PipelineError> {
        capture_stage(
            "identify",
            stages::identify(self.vision.as_deref(), images, &self.config),
        )
        .await
    }

    /// Identification followed by best-effort price enrichment. Only a failed
    /// identification fails the call.
    pub async fn run(&self, images: Vec<Vec<u8>>) -> Result<EnrichedResult, PipelineError> {
        let item = self.identify(images).await?;
        let price_info = self.enrich(&item).await;
        Ok(EnrichedResult { item, price_info })
    }

    /// Looks up a market price for `item`; every failure degrades to `None`.
    pub async fn enrich(&self, item: &ItemRecord) -> Option<PriceRecord> {
        let Some(query) = select_query(item) else {
            debug!(target: "itemlens.pipeline", "no_search_query_enrichment_skipped");
            crate::metrics::enrichment_outcome("skipped");
            return None;
        };

        let outcome = capture_stage(
            "resolve_price",
            stages::resolve_price(self.search.as_deref(), &query, self.config.search_timeout),
        )
        .await;

        match outcome {
            Ok(Some(price)) => {
                info!(
                    target: "itemlens.search",
                    query = %query,
                    price = ?price.price,
                    source = ?price.source,
                    "price_resolved"
                );
                crate::metrics::enrichment_outcome("found");
                Some(price)
            }
            Ok(None) => {
                let label = if self.search.is_some() {
                    "no_match"
                } else {
                    "skipped"
                };
                info!(target: "itemlens.search", query = %query, outcome = label, "price_not_resolved");
                crate::metrics::enrichment_outcome(label);
                None
            }
            Err(err) => {
                warn!(
                    target: "itemlens.search",
                    query = %query,
                    error = %err,
                    "price_enrichment_degraded"
                );
                crate::metrics::enrichment_outcome("degraded");
                None
            }
        }
    }
}

async fn capture_stage<T, E, Fut>(name: &'static str, fut: Fut) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
{
    let started = Instant::now();
    let outcome = fut.await;
    crate::metrics::stage_elapsed(name, started.elapsed().as_millis());
    outcome
}

#[derive(Debug, Error)]
#[error("stage `{stage}` failed: {message}")]
pub struct PipelineError {
    stage: &'static str,
    message: String,
    kind: PipelineErrorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineErrorKind {
    InvalidInput,
    Configuration,
    Upstream,
    Internal,
}

impl PipelineError {
    pub fn invalid_input(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::InvalidInput)
    }

    pub fn configuration(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Configuration)
    }

    pub fn upstream(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Upstream)
    }

    pub fn internal(stage: &'static str, message: impl Into<String>) -> Self {
        Self::with_kind(stage, message, PipelineErrorKind::Internal)
    }

    fn with_kind(stage: &'static str, message: impl Into<String>, kind: PipelineErrorKind) -> Self {
        Self {
            stage,
            message: message.into(),
            kind,
        }
    }

    pub fn stage(&self) -> &'static str {
        self.stage
    }

    pub fn kind(&self) -> PipelineErrorKind {
        self.kind
    }

    pub fn detail(&self) -> &str {
        &self.message
    }
}

pub mod stages {
    use super::*;

    pub async fn identify(
        vision: Option<&dyn VisionBackend>,
        images: Vec<Vec<u8>>,
        config: &PipelineConfig,
    ) -> Result<ItemRecord, PipelineError> {
        let Some(vision) = vision else {
            return Err(PipelineError::configuration(
                "identify",
                "vision service is not configured (GEMINI_API_KEY is not set)",
            ));
        };

        if images.is_empty() {
            return Err(PipelineError::invalid_input(
                "identify",
                "at least one image is required",
            ));
        }
        if images.len() > config.max_images {
            return Err(PipelineError::invalid_input(
                "identify",
                format!(
                    "too many images: {} (max {})",
                    images.len(),
                    config.max_images
                ),
            ));
        }
        if let Some(index) = images.iter().position(|bytes| bytes.is_empty()) {
            return Err(PipelineError::invalid_input(
                "identify",
                ImageInputError::Empty { index }.to_string(),
            ));
        }

        let normalized = normalize_images(images, config.max_image_dimension).await?;

        infer_item(vision, normalized, config.vision_timeout)
            .await
            .map_err(|err| {
                if let IngestError::Parse { raw, .. } = &err {
                    debug!(target: "itemlens.vision", raw = %raw, "unparsable_vision_output");
                }
                PipelineError::upstream("identify", err.to_string())
            })
    }

    /// `Ok(None)` covers both "no search credential" and "no listings".
    pub async fn resolve_price(
        search: Option<&dyn ShoppingSearch>,
        query: &str,
        timeout: Duration,
    ) -> Result<Option<PriceRecord>, SearchError> {
        let Some(search) = search else {
            debug!(target: "itemlens.search", "search_not_configured");
            return Ok(None);
        };
        let query = query.trim();
        if query.is_empty() {
            return Err(SearchError::EmptyQuery);
        }

        let listings = tokio::time::timeout(timeout, search.search(query))
            .await
            .map_err(|_| SearchError::Request(format!("timed out after {}s", timeout.as_secs())))??;

        Ok(listings.into_iter().next())
    }

    /// Decoding is CPU-bound, so it runs on the blocking pool.
    async fn normalize_images(
        images: Vec<Vec<u8>>,
        max_dimension: u32,
    ) -> Result<Vec<VisionImage>, PipelineError> {
        let decoded = tokio::task::spawn_blocking(move || {
            images
                .iter()
                .enumerate()
                .map(|(index, bytes)| normalize_image(index, bytes, max_dimension))
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|err| PipelineError::internal("identify", err.to_string()))?;

        decoded.map_err(|err| match err {
            ImageInputError::Encode { .. } => PipelineError::internal("identify", err.to_string()),
            ImageInputError::Empty { .. } | ImageInputError::Decode { .. } => {
                PipelineError::invalid_input("identify", err.to_string())
            }
        })
    }
}
