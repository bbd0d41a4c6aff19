//! The per-item pipeline: artifacts, description, fan-out, commit.
//!
//! ```text
//! Discovered ─► ArtifactsAcquired ─► Described? ─► Published ─► Committed
//!      │               │
//!      └── abort ◄─────┘  (no sink call, no ledger write)
//! ```
//!
//! Scratch files live for the duration of `process` and are removed when it
//! returns, whichever way it returns.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::RelayError;
use crate::fanout::FanOut;
use crate::traits::{ArtifactFetcher, Describer, Ledger, ProcessItem};
use crate::types::{DiscoveredItem, PipelineOutcome, PipelineResult, PipelineStage};

/// Wallhaven thumbnails are always JPEG
const THUMBNAIL_EXTENSION: &str = ".jpg";

pub struct ItemPipeline {
    fetcher: Arc<dyn ArtifactFetcher>,
    describer: Option<Arc<dyn Describer>>,
    fanout: FanOut,
    ledger: Arc<dyn Ledger>,
}

impl ItemPipeline {
    pub fn new(fetcher: Arc<dyn ArtifactFetcher>, fanout: FanOut, ledger: Arc<dyn Ledger>) -> Self {
        Self {
            fetcher,
            describer: None,
            fanout,
            ledger,
        }
    }

    /// Describe thumbnails before publishing. Without a describer every
    /// description is empty.
    pub fn with_describer(mut self, describer: Arc<dyn Describer>) -> Self {
        self.describer = Some(describer);
        self
    }

    async fn describe(&self, item: &DiscoveredItem, thumbnail: &Path) -> String {
        let Some(describer) = &self.describer else {
            return String::new();
        };

        match describer.describe(thumbnail).await {
            Ok(text) => text,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Description failed, continuing without one");
                String::new()
            }
        }
    }
}

fn cancelled(item_id: &str, stage: PipelineStage) -> PipelineResult {
    debug!(item_id, stage = %stage, "Pipeline cancelled");
    PipelineResult::aborted(item_id, stage, RelayError::Cancelled.to_string())
}

#[async_trait]
impl ProcessItem for ItemPipeline {
    async fn process(&self, item: DiscoveredItem, cancel: &CancellationToken) -> PipelineResult {
        if cancel.is_cancelled() {
            return cancelled(&item.id, PipelineStage::Artifacts);
        }

        let thumbnail = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&item.id, PipelineStage::Artifacts),
            fetched = self.fetcher.fetch(&item.thumbnail, "thumb-", THUMBNAIL_EXTENSION) => fetched,
        };
        let thumbnail = match thumbnail {
            Ok(file) => file,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Thumbnail download failed");
                return PipelineResult::aborted(
                    &item.id,
                    PipelineStage::Artifacts,
                    format!("thumbnail download failed: {}", e),
                );
            }
        };

        let extension = item.file_extension();
        let asset = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&item.id, PipelineStage::Artifacts),
            fetched = self.fetcher.fetch(&item.path, "image-", &extension) => fetched,
        };
        let asset = match asset {
            Ok(file) => file,
            Err(e) => {
                warn!(item_id = %item.id, error = %e, "Image download failed");
                return PipelineResult::aborted(
                    &item.id,
                    PipelineStage::Artifacts,
                    format!("image download failed: {}", e),
                );
            }
        };
        debug!(item_id = %item.id, bytes = asset.len(), "Artifacts acquired");

        let description = tokio::select! {
            biased;
            _ = cancel.cancelled() => return cancelled(&item.id, PipelineStage::Description),
            text = self.describe(&item, thumbnail.path()) => text,
        };

        if cancel.is_cancelled() {
            return cancelled(&item.id, PipelineStage::Publish);
        }

        // From here on the item runs to completion so no sink is posted twice
        let sinks = self.fanout.publish(&item, &description, asset.path()).await;

        let outcome = match self.ledger.mark_sent(&item.id).await {
            Ok(()) => {
                info!(
                    item_id = %item.id,
                    failed_sinks = sinks.iter().filter(|s| !s.is_success()).count(),
                    "Item committed"
                );
                PipelineOutcome::Committed
            }
            Err(e) => {
                error!(item_id = %item.id, error = %e, "Failed to mark item as sent");
                PipelineOutcome::CommitFailed {
                    reason: e.to_string(),
                }
            }
        };

        PipelineResult {
            item_id: item.id,
            described: !description.is_empty(),
            sinks,
            outcome,
        }
    }
}
