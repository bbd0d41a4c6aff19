//! Values that flow through the relay: discovered items and per-item and
//! per-cycle outcomes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One catalog entry, as resolved by the detail endpoint.
///
/// Identity is `id` alone; two fetches of the same id are the same item even
/// if their metadata differs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveredItem {
    /// Catalog identifier (e.g. `94x38z`)
    pub id: String,

    /// Canonical display page
    pub url: String,

    pub uploader: String,

    /// e.g. `3840x2160`
    pub resolution: String,

    /// Size of the primary asset in bytes
    pub file_size: u64,

    /// MIME type of the primary asset
    pub file_type: String,

    /// Primary asset URL
    pub path: String,

    /// Thumbnail asset URL
    pub thumbnail: String,

    /// Tag names in catalog order
    #[serde(default)]
    pub tags: Vec<String>,
}

impl DiscoveredItem {
    /// Create an item with the given id and asset URLs; other fields empty.
    pub fn new(id: impl Into<String>, path: impl Into<String>, thumbnail: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            url: format!("https://wallhaven.cc/w/{}", id),
            id,
            uploader: String::new(),
            resolution: String::new(),
            file_size: 0,
            file_type: "image/jpeg".to_string(),
            path: path.into(),
            thumbnail: thumbnail.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_uploader(mut self, uploader: impl Into<String>) -> Self {
        self.uploader = uploader.into();
        self
    }

    pub fn with_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.resolution = resolution.into();
        self
    }

    pub fn with_file(mut self, file_type: impl Into<String>, file_size: u64) -> Self {
        self.file_type = file_type.into();
        self.file_size = file_size;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// File name of the primary asset (last URL path segment).
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit('/')
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.id)
    }

    /// Extension for scratch copies of the primary asset, from the MIME type.
    pub fn file_extension(&self) -> String {
        let ext = mime_guess::get_mime_extensions_str(&self.file_type)
            .and_then(|exts| exts.iter().find(|e| **e == "jpg").or_else(|| exts.first()))
            .copied()
            .unwrap_or("jpg");
        format!(".{}", ext)
    }
}

impl From<wallhaven_client::Wallpaper> for DiscoveredItem {
    fn from(wp: wallhaven_client::Wallpaper) -> Self {
        Self {
            id: wp.id,
            url: wp.url,
            uploader: wp.uploader.map(|u| u.username).unwrap_or_default(),
            resolution: wp.resolution,
            file_size: wp.file_size,
            file_type: wp.file_type,
            path: wp.path,
            thumbnail: wp.thumbs.original,
            tags: wp.tags.into_iter().map(|t| t.name).collect(),
        }
    }
}

/// Pipeline stage names, used when reporting where an item stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Artifacts,
    Description,
    Publish,
    Commit,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Artifacts => "artifacts",
            PipelineStage::Description => "description",
            PipelineStage::Publish => "publish",
            PipelineStage::Commit => "commit",
        };
        f.write_str(s)
    }
}

/// Result of one sink's publish attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkOutcome {
    pub sink: String,
    pub error: Option<String>,
}

impl SinkOutcome {
    pub fn succeeded(sink: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            error: None,
        }
    }

    pub fn failed(sink: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            sink: sink.into(),
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Terminal state of one item pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// All sinks were attempted and the id is in the ledger
    Committed,

    /// Stopped before publishing; the ledger was not touched
    Aborted { stage: PipelineStage, reason: String },

    /// Sinks were attempted but the ledger write failed
    CommitFailed { reason: String },
}

/// Everything worth logging about one item pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    pub item_id: String,
    pub described: bool,
    pub sinks: Vec<SinkOutcome>,
    pub outcome: PipelineOutcome,
}

impl PipelineResult {
    pub fn aborted(item_id: impl Into<String>, stage: PipelineStage, reason: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            described: false,
            sinks: Vec::new(),
            outcome: PipelineOutcome::Aborted {
                stage,
                reason: reason.into(),
            },
        }
    }

    pub fn is_committed(&self) -> bool {
        self.outcome == PipelineOutcome::Committed
    }

    pub fn failed_sinks(&self) -> usize {
        self.sinks.iter().filter(|s| !s.is_success()).count()
    }
}

/// Tally for one scheduler cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub discovered: usize,
    pub committed: usize,
    pub aborted: usize,
    pub commit_failures: usize,
    pub sink_failures: usize,
}

impl CycleReport {
    pub fn record(&mut self, result: &PipelineResult) {
        match result.outcome {
            PipelineOutcome::Committed => self.committed += 1,
            PipelineOutcome::Aborted { .. } => self.aborted += 1,
            PipelineOutcome::CommitFailed { .. } => self.commit_failures += 1,
        }
        self.sink_failures += result.failed_sinks();
    }

    /// Items that finished this cycle, whatever their outcome.
    pub fn finished(&self) -> usize {
        self.committed + self.aborted + self.commit_failures
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_name_from_path() {
        let item = DiscoveredItem::new(
            "94x38z",
            "https://w.wallhaven.cc/full/94/wallhaven-94x38z.jpg",
            "https://th.wallhaven.cc/orig/94/94x38z.jpg",
        );
        assert_eq!(item.file_name(), "wallhaven-94x38z.jpg");
        assert_eq!(item.url, "https://wallhaven.cc/w/94x38z");
    }

    #[test]
    fn test_file_extension_from_mime() {
        let png = DiscoveredItem::new("a", "p", "t").with_file("image/png", 10);
        assert_eq!(png.file_extension(), ".png");

        let jpeg = DiscoveredItem::new("a", "p", "t").with_file("image/jpeg", 10);
        assert_eq!(jpeg.file_extension(), ".jpg");

        let webp = DiscoveredItem::new("a", "p", "t").with_file("image/webp", 10);
        assert_eq!(webp.file_extension(), ".webp");

        let unknown = DiscoveredItem::new("a", "p", "t").with_file("application/x-foo", 10);
        assert_eq!(unknown.file_extension(), ".jpg");
    }

    #[test]
    fn test_cycle_report_tally() {
        let mut report = CycleReport::default();

        report.record(&PipelineResult {
            item_id: "a1".into(),
            described: true,
            sinks: vec![
                SinkOutcome::succeeded("matrix"),
                SinkOutcome::failed("mastodon", "422"),
            ],
            outcome: PipelineOutcome::Committed,
        });
        report.record(&PipelineResult::aborted(
            "a2",
            PipelineStage::Artifacts,
            "download failed",
        ));

        assert_eq!(report.committed, 1);
        assert_eq!(report.aborted, 1);
        assert_eq!(report.sink_failures, 1);
        assert_eq!(report.finished(), 2);
    }
}
