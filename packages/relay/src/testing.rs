//! Testing utilities including mock implementations.
//!
//! These let the poller, pipeline and scheduler be exercised without any
//! network access. Every mock records its calls for assertions.

use std::collections::{HashMap, HashSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::artifacts::ScratchFile;
use crate::error::{RelayError, Result, SinkError, SinkResult};
use crate::traits::{ArtifactFetcher, Catalog, Describer, ProcessItem, PublishSink};
use crate::types::{DiscoveredItem, PipelineOutcome, PipelineResult, PipelineStage};

/// An item with predictable asset URLs.
pub fn sample_item(id: &str) -> DiscoveredItem {
    DiscoveredItem::new(
        id,
        format!("https://w.example.test/full/wallhaven-{}.jpg", id),
        format!("https://th.example.test/orig/{}.jpg", id),
    )
    .with_uploader("tester")
    .with_resolution("1920x1080")
    .with_file("image/jpeg", 1024)
    .with_tags(["test"])
}

/// Tracks how many guarded sections run at once.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    current: AtomicUsize,
    max: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Enter a guarded section; leaving happens when the guard drops.
    pub fn enter(self: &Arc<Self>) -> GaugeGuard {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max.fetch_max(now, Ordering::SeqCst);
        GaugeGuard {
            gauge: Arc::clone(self),
        }
    }

    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous sections seen.
    pub fn max(&self) -> usize {
        self.max.load(Ordering::SeqCst)
    }
}

pub struct GaugeGuard {
    gauge: Arc<ConcurrencyGauge>,
}

impl Drop for GaugeGuard {
    fn drop(&mut self) {
        self.gauge.current.fetch_sub(1, Ordering::SeqCst);
    }
}

// ============================================================================
// Catalog
// ============================================================================

/// Record of a call made to the mock catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCatalogCall {
    Search { range: String },
    FetchItem { id: String },
}

/// A mock catalog with canned search results and items.
#[derive(Default)]
pub struct MockCatalog {
    ranges: RwLock<HashMap<String, Vec<String>>>,
    items: RwLock<HashMap<String, DiscoveredItem>>,
    failing_ranges: RwLock<HashSet<String>>,
    failing_fetches: RwLock<HashSet<String>>,

    /// In-flight count of this gauge is sampled on every search
    gauge: Option<Arc<ConcurrencyGauge>>,
    in_flight_at_search: RwLock<Vec<usize>>,

    calls: RwLock<Vec<MockCatalogCall>>,
}

impl MockCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search results for `range`. Items for the ids are created with
    /// `sample_item` unless added explicitly.
    pub fn with_range<I, S>(self, range: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: Vec<String> = ids.into_iter().map(Into::into).collect();
        {
            let mut items = self.items.write().unwrap();
            for id in &ids {
                items.entry(id.clone()).or_insert_with(|| sample_item(id));
            }
        }
        self.ranges.write().unwrap().insert(range.into(), ids);
        self
    }

    pub fn with_item(self, item: DiscoveredItem) -> Self {
        self.items.write().unwrap().insert(item.id.clone(), item);
        self
    }

    pub fn with_failing_range(self, range: impl Into<String>) -> Self {
        self.failing_ranges.write().unwrap().insert(range.into());
        self
    }

    pub fn with_failing_fetch(self, id: impl Into<String>) -> Self {
        self.failing_fetches.write().unwrap().insert(id.into());
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> Vec<MockCatalogCall> {
        self.calls.read().unwrap().clone()
    }

    /// Ids passed to `fetch_item`, in call order.
    pub fn fetched_ids(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                MockCatalogCall::FetchItem { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn search_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, MockCatalogCall::Search { .. }))
            .count()
    }

    /// Gauge readings taken at each search.
    pub fn in_flight_at_search(&self) -> Vec<usize> {
        self.in_flight_at_search.read().unwrap().clone()
    }
}

#[async_trait]
impl Catalog for MockCatalog {
    async fn search(&self, range: &str) -> Result<Vec<String>> {
        self.calls.write().unwrap().push(MockCatalogCall::Search {
            range: range.to_string(),
        });
        if let Some(gauge) = &self.gauge {
            self.in_flight_at_search.write().unwrap().push(gauge.current());
        }

        if self.failing_ranges.read().unwrap().contains(range) {
            return Err(RelayError::Network(
                format!("search for {} failed", range).into(),
            ));
        }

        Ok(self
            .ranges
            .read()
            .unwrap()
            .get(range)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_item(&self, id: &str) -> Result<DiscoveredItem> {
        self.calls.write().unwrap().push(MockCatalogCall::FetchItem { id: id.to_string() });

        if self.failing_fetches.read().unwrap().contains(id) {
            return Err(RelayError::Network(format!("detail for {} failed", id).into()));
        }

        self.items
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RelayError::NotFound { id: id.to_string() })
    }
}

// ============================================================================
// Artifact fetcher
// ============================================================================

/// Writes the requested URL into a real scratch file instead of downloading.
#[derive(Default)]
pub struct MockFetcher {
    failing_urls: RwLock<HashSet<String>>,
    scratch_dir: Option<PathBuf>,
    delay: Option<Duration>,
    fetched: RwLock<Vec<PathBuf>>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    /// Sleep before every download.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_failing_url(self, url: impl Into<String>) -> Self {
        self.failing_urls.write().unwrap().insert(url.into());
        self
    }

    /// Paths of every scratch file handed out.
    pub fn fetched_paths(&self) -> Vec<PathBuf> {
        self.fetched.read().unwrap().clone()
    }
}

#[async_trait]
impl ArtifactFetcher for MockFetcher {
    async fn fetch(&self, url: &str, prefix: &str, extension: &str) -> Result<ScratchFile> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing_urls.read().unwrap().contains(url) {
            return Err(RelayError::Network(format!("GET {} returned 404", url).into()));
        }

        let (mut file, path) = ScratchFile::create(self.scratch_dir.as_deref(), prefix, extension)?;
        file.write_all(url.as_bytes())?;
        self.fetched.write().unwrap().push(path.to_path_buf());

        Ok(ScratchFile::new(path, url.len() as u64))
    }
}

// ============================================================================
// Describer
// ============================================================================

/// Returns a fixed description, or fails every call.
pub struct MockDescriber {
    response: Option<String>,
    calls: AtomicUsize,
}

impl MockDescriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            response: Some(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Describer for MockDescriber {
    async fn describe(&self, _image: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.response {
            Some(text) => Ok(text.clone()),
            None => Err(RelayError::Description("model unavailable".into())),
        }
    }
}

// ============================================================================
// Sink
// ============================================================================

/// Record of one publish call.
#[derive(Debug, Clone)]
pub struct MockSinkCall {
    pub item_id: String,
    pub description: String,
    pub asset: PathBuf,
    /// Whether the asset existed on disk during the call
    pub asset_existed: bool,
}

/// A sink that records calls, optionally sleeping or failing.
pub struct MockSink {
    name: String,
    delay: Option<Duration>,
    fail: bool,
    gauge: Option<Arc<ConcurrencyGauge>>,
    calls: RwLock<Vec<MockSinkCall>>,
}

impl MockSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay: None,
            fail: false,
            gauge: None,
            calls: RwLock::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    pub fn calls(&self) -> Vec<MockSinkCall> {
        self.calls.read().unwrap().clone()
    }

    pub fn published_ids(&self) -> Vec<String> {
        self.calls().into_iter().map(|c| c.item_id).collect()
    }
}

#[async_trait]
impl PublishSink for MockSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(
        &self,
        item: &DiscoveredItem,
        description: &str,
        asset: &Path,
    ) -> SinkResult<()> {
        let _guard = self.gauge.as_ref().map(|g| g.enter());

        self.calls.write().unwrap().push(MockSinkCall {
            item_id: item.id.clone(),
            description: description.to_string(),
            asset: asset.to_path_buf(),
            asset_existed: asset.exists(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail {
            return Err(SinkError::Api {
                service: "mock",
                status: 500,
                body: format!("{} rejected {}", self.name, item.id),
            });
        }
        Ok(())
    }
}

// ============================================================================
// Item processor
// ============================================================================

/// Stands in for the item pipeline in scheduler tests.
#[derive(Default)]
pub struct MockProcessor {
    delay: Option<Duration>,
    aborting: HashSet<String>,
    panicking: HashSet<String>,
    gauge: Option<Arc<ConcurrencyGauge>>,
    processed: RwLock<Vec<String>>,
}

impl MockProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report `id` as aborted at artifact acquisition.
    pub fn aborting(mut self, id: impl Into<String>) -> Self {
        self.aborting.insert(id.into());
        self
    }

    /// Panic while processing `id`.
    pub fn panicking(mut self, id: impl Into<String>) -> Self {
        self.panicking.insert(id.into());
        self
    }

    pub fn with_gauge(mut self, gauge: Arc<ConcurrencyGauge>) -> Self {
        self.gauge = Some(gauge);
        self
    }

    /// Ids whose processing completed, in completion order.
    pub fn processed(&self) -> Vec<String> {
        self.processed.read().unwrap().clone()
    }
}

#[async_trait]
impl ProcessItem for MockProcessor {
    async fn process(&self, item: DiscoveredItem, _cancel: &CancellationToken) -> PipelineResult {
        let _guard = self.gauge.as_ref().map(|g| g.enter());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panicking.contains(&item.id) {
            panic!("processor panicked on {}", item.id);
        }

        self.processed.write().unwrap().push(item.id.clone());

        if self.aborting.contains(&item.id) {
            return PipelineResult::aborted(item.id, PipelineStage::Artifacts, "download failed");
        }

        PipelineResult {
            item_id: item.id,
            described: true,
            sinks: Vec::new(),
            outcome: PipelineOutcome::Committed,
        }
    }
}
