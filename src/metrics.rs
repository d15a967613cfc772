//! Minimal counter-sink interface backed by an in-memory registry.

use std::collections::HashMap;
use std::sync::Mutex;

/// Sink for monotonic counters. Implementations must be cheap to call
/// from hot paths; callers pass static names only.
pub trait CounterSink: Send + Sync {
    fn incr(&self, name: &'static str);
}

/// In-memory counter registry. The snapshot accessor exists for tests
/// and for periodic logging from the binary.
#[derive(Default)]
pub struct Counters {
    counts: Mutex<HashMap<&'static str, u64>>,
}

impl Counters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.lock().get(name).copied().unwrap_or(0)
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        self.lock().clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<&'static str, u64>> {
        match self.counts.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl CounterSink for Counters {
    fn incr(&self, name: &'static str) {
        let mut counts = self.lock();
        let entry = counts.entry(name).or_insert(0);
        *entry = entry.saturating_add(1);
    }
}
