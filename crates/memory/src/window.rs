use crate::error::MemoryError;
use crate::store::MemoryStore;
use core_types::{LoopRecord, MemoryTier, Ranked};
use serde_json::Value;
use std::collections::VecDeque;

/// What the tuning loop remembers, split the way the prompt uses it.
///
/// - `short_term`: the last `capacity` iteration summaries, oldest first.
/// - `long_term`: summaries of every successful backtest.
/// - `history`: one structured record per iteration.
/// - `best`: the record with the highest parsed profit so far.
#[derive(Debug, Clone)]
pub struct MemoryWindow {
    capacity: usize,
    short_term: VecDeque<String>,
    long_term: Vec<String>,
    history: Vec<LoopRecord>,
    best: Option<LoopRecord>,
}

impl MemoryWindow {
    /// An empty window. A zero capacity is raised to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            short_term: VecDeque::new(),
            long_term: Vec::new(),
            history: Vec::new(),
            best: None,
        }
    }

    /// Restores the window from `store`, tolerating missing or malformed entries.
    pub async fn load(store: &dyn MemoryStore, capacity: usize) -> Result<Self, MemoryError> {
        let mut window = Self::new(capacity);

        for summary in strings(store.get(MemoryTier::ShortTerm.key()).await?) {
            window.push_short_term(summary);
        }
        window.long_term = strings(store.get(MemoryTier::LongTerm.key()).await?);

        if let Some(Value::Array(items)) = store.get(MemoryTier::History.key()).await? {
            window.history = items
                .into_iter()
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect();
        }
        window.best = store
            .get(MemoryTier::Best.key())
            .await?
            .and_then(|v| serde_json::from_value(v).ok());

        tracing::info!(
            short_term = window.short_term.len(),
            long_term = window.long_term.len(),
            history = window.history.len(),
            "Loaded memory"
        );
        Ok(window)
    }

    /// Adds one iteration. Failed backtests reach short-term memory and history
    /// but not long-term memory.
    pub fn record(&mut self, record: &LoopRecord) {
        let summary = record.summary();
        self.push_short_term(summary.clone());
        if record.backtest_success {
            self.long_term.push(summary);
        }
        if record.beats(self.best.as_ref()) {
            self.best = Some(record.clone());
        }
        self.history.push(record.clone());
    }

    /// Writes every tier back to `store`.
    pub async fn persist(&self, store: &dyn MemoryStore) -> Result<(), MemoryError> {
        store
            .put(MemoryTier::ShortTerm.key(), serde_json::to_value(&self.short_term)?)
            .await?;
        store
            .put(MemoryTier::LongTerm.key(), serde_json::to_value(&self.long_term)?)
            .await?;
        store
            .put(MemoryTier::History.key(), serde_json::to_value(&self.history)?)
            .await?;
        if let Some(best) = &self.best {
            store
                .put(MemoryTier::Best.key(), serde_json::to_value(best)?)
                .await?;
        }
        Ok(())
    }

    fn push_short_term(&mut self, summary: String) {
        self.short_term.push_back(summary);
        while self.short_term.len() > self.capacity {
            self.short_term.pop_front();
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn short_term(&self) -> impl Iterator<Item = &str> {
        self.short_term.iter().map(String::as_str)
    }

    pub fn long_term(&self) -> &[String] {
        &self.long_term
    }

    pub fn history(&self) -> &[LoopRecord] {
        &self.history
    }

    pub fn best(&self) -> Option<&LoopRecord> {
        self.best.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.short_term.is_empty() && self.long_term.is_empty()
    }
}

/// Entries of a stored list as strings; anything else reads as empty.
fn strings(value: Option<Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
