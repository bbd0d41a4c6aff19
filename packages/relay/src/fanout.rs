//! Concurrent publish to every sink, joined before returning.

use std::path::Path;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{error, info};

use crate::traits::PublishSink;
use crate::types::{DiscoveredItem, SinkOutcome};

/// Publishes one item to all configured sinks at once.
///
/// A failing sink never short-circuits the others; every outcome is returned
/// in sink order.
#[derive(Clone)]
pub struct FanOut {
    sinks: Vec<Arc<dyn PublishSink>>,
}

impl FanOut {
    pub fn new(sinks: Vec<Arc<dyn PublishSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    pub fn sink_names(&self) -> Vec<&str> {
        self.sinks.iter().map(|s| s.name()).collect()
    }

    pub async fn publish(
        &self,
        item: &DiscoveredItem,
        description: &str,
        asset: &Path,
    ) -> Vec<SinkOutcome> {
        let attempts = self.sinks.iter().map(|sink| async move {
            match sink.publish(item, description, asset).await {
                Ok(()) => {
                    info!(item_id = %item.id, sink = sink.name(), "Published");
                    SinkOutcome::succeeded(sink.name())
                }
                Err(e) => {
                    error!(item_id = %item.id, sink = sink.name(), error = %e, "Publish failed");
                    SinkOutcome::failed(sink.name(), e.to_string())
                }
            }
        });

        join_all(attempts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{sample_item, ConcurrencyGauge, MockSink};
    use std::time::{Duration, Instant};

    #[tokio::test]
    async fn test_sinks_run_concurrently() {
        let gauge = ConcurrencyGauge::new();
        let sinks: Vec<Arc<MockSink>> = ["matrix", "mastodon", "ntfy"]
            .into_iter()
            .map(|name| {
                Arc::new(
                    MockSink::new(name)
                        .with_delay(Duration::from_millis(100))
                        .with_gauge(gauge.clone()),
                )
            })
            .collect();
        let fanout = FanOut::new(sinks.iter().map(|s| s.clone() as Arc<dyn PublishSink>).collect());

        let started = Instant::now();
        let outcomes = fanout
            .publish(&sample_item("a1"), "a lake", Path::new("/tmp/a1.jpg"))
            .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.is_success()));
        assert_eq!(gauge.max(), 3);
        assert!(started.elapsed() < Duration::from_millis(290));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_stop_others() {
        let matrix = Arc::new(MockSink::new("matrix"));
        let mastodon = Arc::new(MockSink::new("mastodon").failing());
        let ntfy = Arc::new(MockSink::new("ntfy").with_delay(Duration::from_millis(20)));
        let sinks: Vec<Arc<dyn PublishSink>> = vec![matrix.clone(), mastodon.clone(), ntfy.clone()];
        let fanout = FanOut::new(sinks);

        let outcomes = fanout
            .publish(&sample_item("a1"), "", Path::new("/tmp/a1.jpg"))
            .await;

        assert_eq!(
            outcomes.iter().map(|o| o.sink.as_str()).collect::<Vec<_>>(),
            vec!["matrix", "mastodon", "ntfy"]
        );
        assert!(outcomes[0].is_success());
        assert!(!outcomes[1].is_success());
        assert!(outcomes[2].is_success());
        assert_eq!(matrix.published_ids(), vec!["a1"]);
        assert_eq!(ntfy.published_ids(), vec!["a1"]);
    }

    #[tokio::test]
    async fn test_no_sinks_is_empty_outcome() {
        let fanout = FanOut::new(Vec::new());
        assert!(fanout.is_empty());
        let outcomes = fanout
            .publish(&sample_item("a1"), "", Path::new("/tmp/a1.jpg"))
            .await;
        assert!(outcomes.is_empty());
    }
}
