use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// The implicit tag carrying every observation of a metric.
pub const DEFAULT_TAG: &str = "_";

/// VU-local metric store. Handles are cheap clones over a shared inner, so a
/// running batch can record while the worker answers a state or metrics RPC.
#[derive(Clone, Default)]
pub struct Registry {
    inner: Arc<Mutex<RegistrySnapshot>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle to the trend `name`, creating it (with its `"_"` tag) on first
    /// use. Handles for the same name share the same sequences.
    pub fn trend(&self, name: &str) -> TrendHandle {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .trends
                .entry(name.to_string())
                .or_default()
                .entry(DEFAULT_TAG.to_string())
                .or_default();
        }
        TrendHandle {
            inner: self.inner.clone(),
            name: name.to_string(),
        }
    }

    /// Handle to the counter `name`, creating it on first use.
    pub fn counter(&self, name: &str) -> CounterHandle {
        {
            let mut inner = self.inner.lock().unwrap();
            inner
                .counters
                .entry(name.to_string())
                .or_default()
                .entry(DEFAULT_TAG.to_string())
                .or_insert(0.0);
        }
        CounterHandle {
            inner: self.inner.clone(),
            name: name.to_string(),
        }
    }

    /// Structural copy safe to serialise or merge.
    pub fn snapshot(&self) -> RegistrySnapshot {
        self.inner.lock().unwrap().clone()
    }
}

pub struct TrendHandle {
    inner: Arc<Mutex<RegistrySnapshot>>,
    name: String,
}

impl TrendHandle {
    /// Append `value` to the `"_"` sequence and to each tag's sequence.
    pub fn add(&self, value: f64, tags: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        let trend = inner.trends.entry(self.name.clone()).or_default();
        trend.entry(DEFAULT_TAG.to_string()).or_default().push(value);
        for tag in tags {
            trend.entry((*tag).to_string()).or_default().push(value);
        }
    }
}

pub struct CounterHandle {
    inner: Arc<Mutex<RegistrySnapshot>>,
    name: String,
}

impl CounterHandle {
    /// Add `delta` to the `"_"` total and to each tag's total.
    pub fn add(&self, delta: f64, tags: &[&str]) {
        let mut inner = self.inner.lock().unwrap();
        let counter = inner.counters.entry(self.name.clone()).or_default();
        *counter.entry(DEFAULT_TAG.to_string()).or_insert(0.0) += delta;
        for tag in tags {
            *counter.entry((*tag).to_string()).or_insert(0.0) += delta;
        }
    }
}

/// Serialisable registry contents: trend observation sequences and counter
/// totals, both keyed name → tag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub trends: BTreeMap<String, BTreeMap<String, Vec<f64>>>,
    pub counters: BTreeMap<String, BTreeMap<String, f64>>,
}

impl RegistrySnapshot {
    /// Lossless merge: trend sequences concatenate (stable per input),
    /// counters sum. Associative and commutative up to sequence order, which
    /// the report pipeline does not observe.
    pub fn merge(parts: impl IntoIterator<Item = RegistrySnapshot>) -> RegistrySnapshot {
        let mut merged = RegistrySnapshot::default();
        for part in parts {
            for (name, tags) in part.trends {
                let trend = merged.trends.entry(name).or_default();
                for (tag, mut values) in tags {
                    trend.entry(tag).or_default().append(&mut values);
                }
            }
            for (name, tags) in part.counters {
                let counter = merged.counters.entry(name).or_default();
                for (tag, value) in tags {
                    *counter.entry(tag).or_insert(0.0) += value;
                }
            }
        }
        merged
    }
}
