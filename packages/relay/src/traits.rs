//! Collaborator seams.
//!
//! The core depends on these traits only; concrete HTTP and SQLite
//! implementations live in `catalog`, `describer`, `sinks`, `artifacts` and
//! `ledger`, and the `testing` module provides fakes.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::artifacts::ScratchFile;
use crate::error::{Result, SinkResult};
use crate::types::{DiscoveredItem, PipelineResult};

/// Durable set of item ids that have been fully published.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Whether `id` was committed. Absence is `Ok(false)`, never an error.
    async fn is_sent(&self, id: &str) -> Result<bool>;

    /// Record `id` as published. Marking an id twice is a no-op.
    async fn mark_sent(&self, id: &str) -> Result<()>;
}

/// The external image catalog.
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Candidate ids for one discovery range.
    async fn search(&self, range: &str) -> Result<Vec<String>>;

    /// Full detail for one id.
    async fn fetch_item(&self, id: &str) -> Result<DiscoveredItem>;
}

/// Generates a short text description of an image.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, image: &Path) -> Result<String>;
}

/// A publishing destination.
#[async_trait]
pub trait PublishSink: Send + Sync {
    /// Short name used in logs and outcomes.
    fn name(&self) -> &str;

    /// Publish one item. `asset` is the downloaded primary asset.
    async fn publish(&self, item: &DiscoveredItem, description: &str, asset: &Path)
        -> SinkResult<()>;
}

/// Downloads remote assets into scratch files owned by the caller.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Download `url`; the returned file is deleted when dropped.
    async fn fetch(&self, url: &str, prefix: &str, extension: &str) -> Result<ScratchFile>;
}

/// Drives one item from discovery to commit. The scheduler only sees this.
#[async_trait]
pub trait ProcessItem: Send + Sync {
    async fn process(&self, item: DiscoveredItem, cancel: &CancellationToken) -> PipelineResult;
}
