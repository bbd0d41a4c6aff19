//! Catalog discovery.
//!
//! One poll searches every configured range and resolves the ids that are
//! neither in the ledger nor already seen this cycle. Failures are contained:
//! a failed search skips its range, a failed lookup skips its id, and both are
//! retried on the next cycle.

use std::collections::HashSet;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::traits::{Catalog, Ledger};
use crate::types::DiscoveredItem;

pub struct Poller {
    catalog: Arc<dyn Catalog>,
    ledger: Arc<dyn Ledger>,
    ranges: Vec<String>,
}

impl Poller {
    pub fn new(catalog: Arc<dyn Catalog>, ledger: Arc<dyn Ledger>, ranges: Vec<String>) -> Self {
        Self {
            catalog,
            ledger,
            ranges,
        }
    }

    pub fn ranges(&self) -> &[String] {
        &self.ranges
    }

    /// Items to process this cycle. Empty when cancelled mid-poll.
    pub async fn poll(&self, cancel: &CancellationToken) -> Vec<DiscoveredItem> {
        let mut seen: HashSet<String> = HashSet::new();
        let mut batch = Vec::new();

        for range in &self.ranges {
            let searched = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Poll cancelled");
                    return Vec::new();
                }
                r = self.catalog.search(range) => r,
            };

            let ids = match searched {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(range = %range, error = %e, "Search failed, skipping range");
                    continue;
                }
            };
            debug!(range = %range, candidates = ids.len(), "Search returned candidates");

            for id in ids {
                if seen.contains(&id) {
                    continue;
                }

                match self.ledger.is_sent(&id).await {
                    Ok(true) => {
                        debug!(item_id = %id, "Already sent, skipping");
                        seen.insert(id);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!(item_id = %id, error = %e, "Ledger lookup failed, skipping item");
                        continue;
                    }
                }

                let fetched = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        info!("Poll cancelled");
                        return Vec::new();
                    }
                    r = self.catalog.fetch_item(&id) => r,
                };

                match fetched {
                    Ok(item) => {
                        seen.insert(id);
                        batch.push(item);
                    }
                    Err(e) => {
                        warn!(item_id = %id, error = %e, "Failed to fetch item details");
                    }
                }
            }
        }

        info!(ranges = self.ranges.len(), items = batch.len(), "Poll complete");
        batch
    }
}
