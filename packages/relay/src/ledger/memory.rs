//! In-memory ledger for testing and dry runs.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{PoisonError, RwLock};

use crate::error::{RelayError, Result};
use crate::traits::Ledger;

/// In-memory set of published ids. Lost on restart.
#[derive(Default)]
pub struct MemoryLedger {
    sent: RwLock<HashSet<String>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger that already contains `ids`.
    pub fn with_sent<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            sent: RwLock::new(ids.into_iter().map(Into::into).collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.sent.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted snapshot of committed ids.
    pub fn ids(&self) -> Vec<String> {
        let sent = self.sent.read().unwrap_or_else(PoisonError::into_inner);
        let mut ids: Vec<String> = sent.iter().cloned().collect();
        ids.sort();
        ids
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn is_sent(&self, id: &str) -> Result<bool> {
        let sent = self.sent.read().map_err(poisoned)?;
        Ok(sent.contains(id))
    }

    async fn mark_sent(&self, id: &str) -> Result<()> {
        let mut sent = self.sent.write().map_err(poisoned)?;
        sent.insert(id.to_string());
        Ok(())
    }
}

fn poisoned<T>(err: PoisonError<T>) -> RelayError {
    RelayError::Storage(err.to_string().into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_absent_id_is_not_sent() {
        let ledger = MemoryLedger::new();
        assert!(!ledger.is_sent("a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_sent_is_idempotent() {
        let ledger = MemoryLedger::new();
        ledger.mark_sent("a1").await.unwrap();
        ledger.mark_sent("a1").await.unwrap();

        assert!(ledger.is_sent("a1").await.unwrap());
        assert_eq!(ledger.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_marks() {
        let ledger = Arc::new(MemoryLedger::new());

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let ledger = ledger.clone();
                tokio::spawn(async move { ledger.mark_sent(&format!("id-{}", i % 4)).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(ledger.ids(), vec!["id-0", "id-1", "id-2", "id-3"]);
    }

    #[test]
    fn test_snapshots_survive_poisoned_lock() {
        let ledger = Arc::new(MemoryLedger::with_sent(["a1", "b2"]));

        let poisoner = ledger.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.sent.write().unwrap();
            panic!("writer died holding the lock");
        })
        .join();
        assert!(ledger.sent.is_poisoned());

        assert_eq!(ledger.len(), 2);
        assert_eq!(ledger.ids(), vec!["a1", "b2"]);
    }
}
