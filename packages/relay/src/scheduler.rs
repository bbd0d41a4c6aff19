//! Batch scheduler.
//!
//! Each cycle polls the catalog, runs the batch with at most
//! `max_concurrent` pipelines in flight, waits for every one of them, then
//! sleeps until the next cycle. The sleep and the poll both give way to the
//! cancellation token.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::poller::Poller;
use crate::traits::ProcessItem;
use crate::types::{CycleReport, PipelineOutcome};

/// Configuration for the scheduler.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Pipelines allowed in flight at once
    pub max_concurrent: usize,

    /// Sleep between cycles
    pub interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            interval: Duration::from_secs(3600),
        }
    }
}

pub struct Scheduler {
    poller: Poller,
    processor: Arc<dyn ProcessItem>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(poller: Poller, processor: Arc<dyn ProcessItem>, config: SchedulerConfig) -> Self {
        Self {
            poller,
            processor,
            config,
        }
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            max_concurrent = self.config.max_concurrent,
            interval_secs = self.config.interval.as_secs(),
            ranges = ?self.poller.ranges(),
            "Scheduler started"
        );

        while !cancel.is_cancelled() {
            self.run_once(&cancel).await;

            if cancel.is_cancelled() {
                break;
            }

            info!("Waiting {} seconds before next run", self.config.interval.as_secs());
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.interval) => {}
            }
        }

        info!("Scheduler stopped");
    }

    /// One poll and a fully joined batch.
    pub async fn run_once(&self, cancel: &CancellationToken) -> CycleReport {
        let batch = self.poller.poll(cancel).await;
        let mut report = CycleReport {
            discovered: batch.len(),
            ..Default::default()
        };

        if batch.is_empty() {
            info!("No new items this cycle");
            return report;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let mut tasks = JoinSet::new();

        for item in batch {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(error = %e, "Concurrency limiter closed");
                    break;
                }
            };

            let processor = self.processor.clone();
            let cancel = cancel.clone();
            debug!(item_id = %item.id, "Starting pipeline");
            tasks.spawn(async move {
                let _permit = permit;
                processor.process(item, &cancel).await
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => {
                    match &result.outcome {
                        PipelineOutcome::Committed => {}
                        PipelineOutcome::Aborted { stage, reason } => {
                            warn!(item_id = %result.item_id, stage = %stage, reason = %reason, "Item aborted");
                        }
                        PipelineOutcome::CommitFailed { reason } => {
                            warn!(item_id = %result.item_id, reason = %reason, "Item not committed");
                        }
                    }
                    report.record(&result);
                }
                Err(e) => {
                    error!(error = %e, "Pipeline task failed");
                    report.aborted += 1;
                }
            }
        }

        info!(
            discovered = report.discovered,
            committed = report.committed,
            aborted = report.aborted,
            commit_failures = report.commit_failures,
            sink_failures = report.sink_failures,
            "Cycle complete"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;
    use crate::testing::{ConcurrencyGauge, MockCatalog, MockProcessor};
    use crate::traits::Catalog;

    fn scheduler(
        catalog: Arc<dyn Catalog>,
        processor: Arc<dyn ProcessItem>,
        max_concurrent: usize,
        interval: Duration,
    ) -> Scheduler {
        let poller = Poller::new(catalog, Arc::new(MemoryLedger::new()), vec!["1d".into()]);
        Scheduler::new(
            poller,
            processor,
            SchedulerConfig {
                max_concurrent,
                interval,
            },
        )
    }

    fn ten_ids() -> Vec<String> {
        (0..10).map(|i| format!("item{}", i)).collect()
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let gauge = ConcurrencyGauge::new();
        let catalog = Arc::new(MockCatalog::new().with_range("1d", ten_ids()));
        let processor = Arc::new(
            MockProcessor::new()
                .with_delay(Duration::from_millis(30))
                .with_gauge(gauge.clone()),
        );
        let scheduler = scheduler(catalog, processor.clone(), 3, Duration::from_secs(60));

        let report = scheduler.run_once(&CancellationToken::new()).await;

        assert_eq!(report.discovered, 10);
        assert_eq!(report.committed, 10);
        assert_eq!(gauge.max(), 3);
        assert_eq!(processor.processed().len(), 10);
    }

    #[tokio::test]
    async fn test_batch_fully_joined_before_next_poll() {
        let gauge = ConcurrencyGauge::new();
        let catalog = Arc::new(
            MockCatalog::new()
                .with_range("1d", ten_ids())
                .with_gauge(gauge.clone()),
        );
        let processor = Arc::new(
            MockProcessor::new()
                .with_delay(Duration::from_millis(10))
                .with_gauge(gauge.clone()),
        );
        let scheduler = Arc::new(scheduler(
            catalog.clone(),
            processor,
            3,
            Duration::from_millis(20),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        cancel.cancel();
        handle.await.unwrap();

        let samples = catalog.in_flight_at_search();
        assert!(samples.len() >= 2);
        assert!(samples.iter().all(|&n| n == 0));
    }

    #[tokio::test]
    async fn test_aborted_and_panicked_items_are_counted() {
        let catalog = Arc::new(MockCatalog::new().with_range("1d", ["a1", "a2", "a3"]));
        let processor = Arc::new(MockProcessor::new().aborting("a2").panicking("a3"));
        let scheduler = scheduler(catalog, processor, 3, Duration::from_secs(60));

        let report = scheduler.run_once(&CancellationToken::new()).await;

        assert_eq!(report.committed, 1);
        assert_eq!(report.aborted, 2);
        assert_eq!(report.finished(), 3);
    }

    #[tokio::test]
    async fn test_cancel_during_sleep_stops_loop() {
        let catalog = Arc::new(MockCatalog::new().with_range("1d", ["a1"]));
        let processor = Arc::new(MockProcessor::new());
        let scheduler = Arc::new(scheduler(
            catalog.clone(),
            processor,
            3,
            Duration::from_secs(3600),
        ));

        let cancel = CancellationToken::new();
        let handle = {
            let scheduler = scheduler.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { scheduler.run(cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert_eq!(catalog.search_count(), 1);
    }

    #[tokio::test]
    async fn test_empty_poll_reports_nothing() {
        let catalog = Arc::new(MockCatalog::new());
        let scheduler = scheduler(catalog, Arc::new(MockProcessor::new()), 3, Duration::from_secs(60));

        let report = scheduler.run_once(&CancellationToken::new()).await;
        assert_eq!(report, CycleReport::default());
    }
}
