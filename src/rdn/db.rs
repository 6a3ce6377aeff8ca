//! Writing sampled labels back to the store.

use std::collections::{BTreeMap, HashMap};

use crate::error::InferResult;
use crate::graph::{ItemId, RelationalStore, Value};

pub trait DbModule: Send {
    fn name(&self) -> &'static str;

    /// Persist `labels` as values of `attr`. Returns the number of writes.
    fn write(
        &mut self,
        store: &dyn RelationalStore,
        attr: &str,
        labels: &BTreeMap<ItemId, String>,
    ) -> InferResult<usize>;

    /// Forget any state kept between writes. Called before each run.
    fn reset(&mut self) {}
}

/// Writes only labels that differ from the last value written (or, the
/// first time an entity is seen, from the value already in the store).
#[derive(Debug, Default)]
pub struct DeltaDbModule {
    written: HashMap<String, HashMap<ItemId, String>>,
}

impl DeltaDbModule {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DbModule for DeltaDbModule {
    fn name(&self) -> &'static str {
        "delta"
    }

    /// Forget what was written, forcing the next write to consult the store.
    fn reset(&mut self) {
        self.written.clear();
    }

    fn write(
        &mut self,
        store: &dyn RelationalStore,
        attr: &str,
        labels: &BTreeMap<ItemId, String>,
    ) -> InferResult<usize> {
        let known = self.written.entry(attr.to_string()).or_default();
        let mut changed = Vec::new();
        let mut unchanged = Vec::new();
        for (id, label) in labels {
            let current = match known.get(id) {
                Some(previous) => Some(previous.clone()),
                None => store.attribute(*id, attr)?.map(|v| v.to_string()),
            };
            if current.as_deref() == Some(label.as_str()) {
                unchanged.push((*id, label));
            } else {
                changed.push((*id, Value::Str(label.clone())));
            }
        }
        let writes = if changed.is_empty() {
            0
        } else {
            store.update_attribute(attr, &changed)?
        };
        // Only remember labels the store is known to hold.
        for (id, label) in unchanged {
            known.insert(id, label.clone());
        }
        for (id, value) in changed {
            known.insert(id, value.to_string());
        }
        tracing::trace!(attr, writes, "wrote changed labels");
        Ok(writes)
    }
}
