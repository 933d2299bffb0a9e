/// Deduplicated warning log.
///
/// Detector failures tend to repeat on every call (missing binary, dead
/// endpoint, undecodable input). Each distinct `(source, message)` pair is
/// logged at `warn` once; repeats drop to `trace`. Past `MAX_TRACKED` keys
/// the oldest is forgotten first.
use std::collections::{HashSet, VecDeque};
use std::sync::Mutex;

const MAX_TRACKED: usize = 512;

#[derive(Debug, Default)]
struct Seen {
    keys: HashSet<String>,
    order: VecDeque<String>,
}

impl Seen {
    /// `true` when `key` was not tracked yet.
    fn insert(&mut self, key: String) -> bool {
        if self.keys.contains(&key) {
            return false;
        }
        if self.order.len() >= MAX_TRACKED {
            if let Some(oldest) = self.order.pop_front() {
                self.keys.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.keys.insert(key);
        true
    }
}

#[derive(Debug, Default)]
pub struct WarningLog {
    seen: Mutex<Seen>,
}

impl WarningLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` when the warning was emitted, `false` when suppressed.
    pub fn warn(&self, source: &str, message: &str) -> bool {
        let key = format!("{source}: {message}");
        let first = match self.seen.lock() {
            Ok(mut seen) => seen.insert(key),
            Err(poisoned) => poisoned.into_inner().insert(key),
        };

        if first {
            tracing::warn!(source = %source, "{message}");
        } else {
            tracing::trace!(source = %source, "suppressed repeat warning: {message}");
        }
        first
    }

    pub fn distinct(&self) -> usize {
        self.seen.lock().map(|s| s.keys.len()).unwrap_or(0)
    }
}
