//! Wallhaven Relay
//!
//! Polls the Wallhaven toplist and republishes every wallpaper it has not
//! seen before to a set of sinks (a Matrix room, a Mastodon account and an
//! ntfy topic), optionally with a short AI-generated description.
//!
//! # Flow
//!
//! ```text
//! Scheduler ──► Poller ──► Catalog.search / Ledger.is_sent / Catalog.fetch_item
//!     │
//!     └─► ItemPipeline (≤ K at once)
//!             ├─► ArtifactFetcher (thumbnail, image)
//!             ├─► Describer (optional)
//!             ├─► FanOut ──► every PublishSink concurrently
//!             └─► Ledger.mark_sent
//! ```
//!
//! An id is committed to the ledger only after every sink has been attempted,
//! and never when the assets could not be downloaded.
//!
//! # Usage
//!
//! ```rust,ignore
//! use relay_core::{testing::*, FanOut, ItemPipeline, MemoryLedger, Poller, Scheduler};
//!
//! let ledger = Arc::new(MemoryLedger::new());
//! let poller = Poller::new(Arc::new(MockCatalog::new()), ledger.clone(), vec!["1d".into()]);
//! let fanout = FanOut::new(vec![Arc::new(MockSink::new("ntfy"))]);
//! let pipeline = ItemPipeline::new(Arc::new(MockFetcher::new()), fanout, ledger);
//!
//! Scheduler::new(poller, Arc::new(pipeline), Default::default())
//!     .run(CancellationToken::new())
//!     .await;
//! ```
//!
//! # Modules
//!
//! - [`traits`] - Collaborator seams (Catalog, Ledger, PublishSink, ...)
//! - [`scheduler`] - Cycle loop with bounded concurrency
//! - [`pipeline`] - Per-item state machine
//! - [`sinks`] - Matrix, Mastodon and ntfy
//! - [`ledger`] - SQLite and in-memory ledgers
//! - [`testing`] - Mock implementations for testing

pub mod artifacts;
pub mod caption;
pub mod catalog;
pub mod config;
pub mod describer;
pub mod error;
pub mod fanout;
pub mod ledger;
pub mod media;
pub mod pipeline;
pub mod poller;
pub mod scheduler;
pub mod sinks;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use artifacts::{HttpArtifactFetcher, ScratchFile};
pub use catalog::WallhavenCatalog;
pub use config::{Config, SinkKind};
pub use describer::OpenAIDescriber;
pub use error::{RelayError, Result, SinkError, SinkResult};
pub use fanout::FanOut;
pub use ledger::{MemoryLedger, SqliteLedger};
pub use pipeline::ItemPipeline;
pub use poller::Poller;
pub use scheduler::{Scheduler, SchedulerConfig};
pub use traits::{ArtifactFetcher, Catalog, Describer, Ledger, ProcessItem, PublishSink};
pub use types::{
    CycleReport, DiscoveredItem, PipelineOutcome, PipelineResult, PipelineStage, SinkOutcome,
};
