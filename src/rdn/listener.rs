//! Observers fired after each inference iteration.

use std::collections::BTreeMap;

use crate::error::InferResult;
use crate::graph::{ItemId, RelationalStore};

use super::LabelAttr;

/// What a listener sees at the end of an iteration.
#[derive(Debug)]
pub struct IterationReport<'a> {
    pub iteration: usize,
    /// Store writes performed this iteration.
    pub writes: usize,
    /// Current labels per model name.
    pub labels: &'a BTreeMap<String, BTreeMap<ItemId, String>>,
    /// Label attribute and its working copy per model name.
    pub attrs: &'a BTreeMap<String, LabelAttr>,
}

pub trait Listener: Send {
    fn name(&self) -> &'static str;

    fn on_startup(&mut self, _store: &dyn RelationalStore) -> InferResult<()> {
        Ok(())
    }

    fn on_iteration(
        &mut self,
        store: &dyn RelationalStore,
        report: &IterationReport<'_>,
    ) -> InferResult<()>;

    /// Called once after the last iteration, also when the cycle failed.
    fn on_cleanup(&mut self, _store: &dyn RelationalStore) {}
}

/// Logs progress every `every` iterations.
#[derive(Debug, Clone, Copy)]
pub struct LoggingListener {
    pub every: usize,
}

impl Listener for LoggingListener {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn on_iteration(
        &mut self,
        _store: &dyn RelationalStore,
        report: &IterationReport<'_>,
    ) -> InferResult<()> {
        if self.every > 0 && report.iteration % self.every == 0 {
            tracing::info!(
                iteration = report.iteration,
                writes = report.writes,
                models = report.labels.len(),
                "inference iteration"
            );
        }
        Ok(())
    }

    fn on_cleanup(&mut self, _store: &dyn RelationalStore) {
        tracing::debug!("inference finished");
    }
}

/// Copies every model's current labels to `{prefix}_{iteration}_{attr}`
/// every `every` iterations. Snapshots outlive the run.
#[derive(Debug, Clone)]
pub struct SnapshotListener {
    pub every: usize,
    pub prefix: String,
    taken: Vec<String>,
}

impl SnapshotListener {
    pub fn new(every: usize, prefix: impl Into<String>) -> Self {
        Self {
            every,
            prefix: prefix.into(),
            taken: Vec::new(),
        }
    }

    /// Attribute names written so far.
    pub fn snapshots(&self) -> &[String] {
        &self.taken
    }

    pub fn snapshot_attr(&self, iteration: usize, attr: &str) -> String {
        format!("{}_{iteration}_{attr}", self.prefix)
    }
}

impl Default for SnapshotListener {
    fn default() -> Self {
        Self::new(5, "rdn_iter")
    }
}

impl Listener for SnapshotListener {
    fn name(&self) -> &'static str {
        "snapshot"
    }

    fn on_iteration(
        &mut self,
        store: &dyn RelationalStore,
        report: &IterationReport<'_>,
    ) -> InferResult<()> {
        if self.every == 0 || report.iteration % self.every != 0 {
            return Ok(());
        }
        for label in report.attrs.values() {
            let target = self.snapshot_attr(report.iteration, &label.attr);
            let copied = store.copy_attribute(&label.working, &target)?;
            tracing::debug!(attr = %label.attr, target = %target, copied, "snapshot labels");
            self.taken.push(target);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::index::GraphStore;

    #[test]
    fn snapshot_copies_on_schedule() {
        let store = GraphStore::new();
        let id = ItemId::new(1).unwrap();
        store.add_item(id, "movie").unwrap();
        store
            .set_attribute(id, "rdn_temp_genre", "drama".into())
            .unwrap();
        let labels = BTreeMap::new();
        let label = LabelAttr {
            attr: "genre".to_string(),
            working: "rdn_temp_genre".to_string(),
        };
        let attrs = BTreeMap::from([("genre".to_string(), label)]);
        let mut listener = SnapshotListener::new(2, "snap");
        for iteration in 0..5 {
            let report = IterationReport {
                iteration,
                writes: 0,
                labels: &labels,
                attrs: &attrs,
            };
            listener.on_iteration(&store, &report).unwrap();
        }
        assert_eq!(
            listener.snapshots(),
            &["snap_0_genre", "snap_2_genre", "snap_4_genre"]
        );
        assert_eq!(store.attribute(id, "snap_2_genre").unwrap(), Some("drama".into()));
    }
}
