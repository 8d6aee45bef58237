//! Named-signal registry.
//!
//! Every component publishes to this registry as events occur rather than
//! owning its own metrics state; the analyzer (`uet-sim`) only ever reads
//! it. This mirrors the "signals are the error channel" design: a drop, a
//! retransmission, an RTT sample are all just named values pushed here.

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::time::Tick;

/// Running summary of a sampled (non-monotonic) signal, e.g. RTT or cwnd.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SignalSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

impl SignalSummary {
    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }

    fn observe(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            if value < self.min {
                self.min = value;
            }
            if value > self.max {
                self.max = value;
            }
        }
        self.sum += value;
        self.count += 1;
    }
}

/// A point-in-time snapshot of every registered signal, taken by the
/// analyzer once per `measurementInterval`. Ordered maps so two runs with
/// identical signals serialise to byte-identical JSON regardless of
/// `HashMap`'s per-process random iteration order.
#[derive(Debug, Clone, Serialize)]
pub struct SignalSnapshot {
    pub at: Tick,
    pub counters: BTreeMap<String, u64>,
    pub summaries: BTreeMap<String, SignalSummary>,
}

/// The registry itself. Held by the simulation network and handed to every
/// component as a mutable borrow scoped to the current event.
#[derive(Debug, Default)]
pub struct SignalRegistry {
    counters: BTreeMap<String, u64>,
    summaries: BTreeMap<String, SignalSummary>,
    history: HashMap<String, Vec<(Tick, f64)>>,
    detailed: bool,
}

impl SignalRegistry {
    pub fn new(detailed: bool) -> Self {
        Self {
            detailed,
            ..Default::default()
        }
    }

    /// Bumps a monotonic counter (messages sent, drops, retransmissions, ...).
    pub fn incr(&mut self, name: &str, by: u64) {
        *self.counters.entry(name.to_string()).or_insert(0) += by;
    }

    pub fn counter(&self, name: &str) -> u64 {
        *self.counters.get(name).unwrap_or(&0)
    }

    /// Records a sampled value (RTT, cwnd, compression ratio, utilisation, ...).
    pub fn observe(&mut self, name: &str, value: f64, at: Tick) {
        self.summaries.entry(name.to_string()).or_default().observe(value);
        if self.detailed {
            self.history.entry(name.to_string()).or_default().push((at, value));
        }
    }

    pub fn summary(&self, name: &str) -> Option<&SignalSummary> {
        self.summaries.get(name)
    }

    /// Full per-sample history for a signal; only populated when
    /// `enableDetailedStats` is set, otherwise always empty.
    pub fn history(&self, name: &str) -> &[(Tick, f64)] {
        self.history.get(name).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn snapshot(&self, at: Tick) -> SignalSnapshot {
        SignalSnapshot {
            at,
            counters: self.counters.clone(),
            summaries: self.summaries.clone(),
        }
    }
}
