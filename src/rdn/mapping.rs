//! Working copies of the label attributes for the length of a run.
//!
//! Inference samples into `rdn_temp_<attr>` instead of the label attribute
//! itself, so the labels already in the store survive the run. At startup
//! every label attribute is copied to its working attribute and the models
//! are remapped to read and write the copy; at cleanup the copies are
//! deleted.

use std::collections::BTreeMap;

use crate::error::InferResult;
use crate::graph::RelationalStore;

use super::RdnModel;

pub const WORKING_PREFIX: &str = "rdn_temp_";

/// A model's label attribute and the working copy it samples into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelAttr {
    pub attr: String,
    pub working: String,
}

#[derive(Debug)]
pub struct AttrMapper {
    prefix: String,
    created: Vec<String>,
}

impl AttrMapper {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            created: Vec::new(),
        }
    }

    pub fn working_attr(&self, attr: &str) -> String {
        format!("{}{attr}", self.prefix)
    }

    /// Working attributes currently in the store.
    pub fn created(&self) -> &[String] {
        &self.created
    }

    /// Copy every label attribute to its working attribute and return the
    /// models remapped onto the copies. Splits of one model that read
    /// another model's label follow that label to its copy.
    pub fn startup(
        &mut self,
        store: &dyn RelationalStore,
        models: &[RdnModel],
    ) -> InferResult<Vec<RdnModel>> {
        let renames: BTreeMap<String, String> = models
            .iter()
            .map(|m| (m.attr().to_string(), self.working_attr(m.attr())))
            .collect();
        for (attr, working) in &renames {
            // A copy left behind by an interrupted run must not leak values.
            store.delete_attribute(working)?;
            self.created.push(working.clone());
            let copied = store.copy_attribute(attr, working)?;
            tracing::debug!(attr = %attr, working = %working, copied, "created working labels");
        }
        Ok(models
            .iter()
            .map(|m| RdnModel {
                name: m.name.clone(),
                rpt: m.rpt.with_renamed_attrs(&renames),
                population: m.population.clone(),
            })
            .collect())
    }

    /// Delete every working attribute created by [`AttrMapper::startup`].
    pub fn cleanup(&mut self, store: &dyn RelationalStore) -> InferResult<()> {
        for working in self.created.drain(..) {
            let removed = store.delete_attribute(&working)?;
            tracing::debug!(working = %working, removed, "deleted working labels");
        }
        Ok(())
    }
}

impl Default for AttrMapper {
    fn default() -> Self {
        Self::new(WORKING_PREFIX)
    }
}
