//! Rolling per-symbol observation windows
//!
//! Each symbol gets a window created lazily on its first observation. The
//! window is pruned on every append, using the newest observation's
//! timestamp as "now" (never the wall clock), so a replayed stream always
//! produces the same windows.

use super::types::Observation;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, VecDeque};

/// Bounded, timestamp-ordered history for one symbol
#[derive(Debug, Clone)]
pub struct WindowRecord {
    observations: VecDeque<Observation>,
    window_duration: Duration,
}

impl WindowRecord {
    pub fn new(window_duration: Duration) -> Self {
        Self {
            observations: VecDeque::with_capacity(512),
            window_duration,
        }
    }

    /// Insert in timestamp order, then evict everything older than
    /// `newest - window_duration`
    pub fn add(&mut self, observation: Observation) {
        // Streams arrive in order; only a late sample needs the search
        let position = match self.observations.back() {
            Some(last) if observation.timestamp < last.timestamp => self
                .observations
                .partition_point(|o| o.timestamp <= observation.timestamp),
            _ => self.observations.len(),
        };
        self.observations.insert(position, observation);

        if let Some(newest) = self.newest_timestamp() {
            self.evict_before(newest - self.window_duration);
        }
    }

    /// Remove observations strictly older than the cutoff
    fn evict_before(&mut self, cutoff: DateTime<Utc>) {
        while let Some(front) = self.observations.front() {
            if front.timestamp >= cutoff {
                break;
            }
            self.observations.pop_front();
        }
    }

    pub fn newest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.observations.back().map(|o| o.timestamp)
    }

    pub fn latest(&self) -> Option<&Observation> {
        self.observations.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Observation> {
        self.observations.iter()
    }

}

/// Per-symbol window map, owned by the ingestion loop
#[derive(Debug, Clone)]
pub struct RollingWindowTracker {
    windows: HashMap<String, WindowRecord>,
    window_duration: Duration,
}

impl RollingWindowTracker {
    pub fn new(window_duration: Duration) -> Self {
        Self {
            windows: HashMap::new(),
            window_duration,
        }
    }

    /// Append an observation to the symbol's window and prune it
    pub fn record(&mut self, symbol: &str, observation: Observation) {
        let window_duration = self.window_duration;
        self.windows
            .entry(symbol.to_string())
            .or_insert_with(|| WindowRecord::new(window_duration))
            .add(observation);
    }

    /// Current pruned window, oldest first. Empty for an unknown symbol.
    pub fn snapshot(&self, symbol: &str) -> Vec<Observation> {
        self.windows
            .get(symbol)
            .map(|w| w.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn window(&self, symbol: &str) -> Option<&WindowRecord> {
        self.windows.get(symbol)
    }

    /// Symbols that have received at least one observation, sorted
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.windows.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn window_duration(&self) -> Duration {
        self.window_duration
    }
}
