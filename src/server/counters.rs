//! Server-wide statement counters.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Execute/close counts and the set of currently executing statement ids.
#[derive(Debug, Default)]
pub struct StatementCounters {
    execute_count: AtomicU64,
    close_count: AtomicU64,
    executing: Mutex<BTreeSet<u64>>,
}

/// Point-in-time copy of [`StatementCounters`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CounterSnapshot {
    pub execute_count: u64,
    pub close_count: u64,
    pub executing: Vec<u64>,
}

impl StatementCounters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that statement `id` started executing.
    pub fn record_execute(&self, id: u64) {
        self.execute_count.fetch_add(1, Ordering::Relaxed);
        self.executing.lock().insert(id);
    }

    /// Record that statement `id` closed. Returns whether it was executing.
    pub fn record_close(&self, id: u64) -> bool {
        self.close_count.fetch_add(1, Ordering::Relaxed);
        let removed = self.executing.lock().remove(&id);
        if !removed {
            warn!(statement_id = id, "closed statement was not in the executing set");
        }
        removed
    }

    pub fn execute_count(&self) -> u64 {
        self.execute_count.load(Ordering::Relaxed)
    }

    pub fn close_count(&self) -> u64 {
        self.close_count.load(Ordering::Relaxed)
    }

    pub fn is_executing(&self, id: u64) -> bool {
        self.executing.lock().contains(&id)
    }

    pub fn executing_count(&self) -> usize {
        self.executing.lock().len()
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        CounterSnapshot {
            execute_count: self.execute_count(),
            close_count: self.close_count(),
            executing: self.executing.lock().iter().copied().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execute_then_close() {
        let counters = StatementCounters::new();
        counters.record_execute(3);
        counters.record_execute(5);
        assert!(counters.is_executing(3));
        assert_eq!(counters.executing_count(), 2);

        assert!(counters.record_close(3));
        assert!(!counters.is_executing(3));

        let snapshot = counters.snapshot();
        assert_eq!(snapshot.execute_count, 2);
        assert_eq!(snapshot.close_count, 1);
        assert_eq!(snapshot.executing, vec![5]);
    }

    #[test]
    fn test_close_of_unknown_statement() {
        let counters = StatementCounters::new();
        assert!(!counters.record_close(42));
        assert_eq!(counters.close_count(), 1);
    }

    #[test]
    fn test_snapshot_serializes() {
        let counters = StatementCounters::new();
        counters.record_execute(1);
        let json = serde_json::to_string(&counters.snapshot()).unwrap();
        assert_eq!(json, r#"{"execute_count":1,"close_count":0,"executing":[1]}"#);
    }
}
