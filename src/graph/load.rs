//! JSON graph documents.
//!
//! ```json
//! {
//!   "items": [{"id": 1, "kind": "movie", "attrs": {"genre": "drama", "budget": 12.5}}],
//!   "links": [{"from": 10, "to": 1, "link": "acted_in"}]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};

use super::index::GraphStore;
use super::{RelationalStore, Value, item_id};

/// Attribute value as written in a document: a bare JSON number or string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DocValue {
    Num(f64),
    Str(String),
}

impl From<DocValue> for Value {
    fn from(v: DocValue) -> Self {
        match v {
            DocValue::Num(n) => Value::Num(n),
            DocValue::Str(s) => Value::Str(s),
        }
    }
}

impl From<Value> for DocValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Num(n) => DocValue::Num(n),
            Value::Str(s) => DocValue::Str(s),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: u64,
    pub kind: String,
    #[serde(default)]
    pub attrs: BTreeMap<String, DocValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkRecord {
    pub from: u64,
    pub to: u64,
    pub link: String,
}

/// Serializable form of a [`GraphStore`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub items: Vec<ItemRecord>,
    #[serde(default)]
    pub links: Vec<LinkRecord>,
}

impl GraphDocument {
    /// Build a store from this document.
    pub fn into_store(self) -> DataResult<GraphStore> {
        let store = GraphStore::new();
        for item in &self.items {
            store.add_item(item_id(item.id)?, &item.kind)?;
        }
        for item in self.items {
            let id = item_id(item.id)?;
            for (attr, value) in item.attrs {
                store.set_attribute(id, &attr, value.into())?;
            }
        }
        for link in self.links {
            store.add_link(item_id(link.from)?, item_id(link.to)?, &link.link)?;
        }
        Ok(store)
    }

    /// Snapshot a store into a document.
    pub fn from_store(store: &GraphStore) -> DataResult<Self> {
        let mut items = Vec::with_capacity(store.item_count());
        for id in store.all_items() {
            items.push(ItemRecord {
                id: id.get(),
                kind: store.kind_of(id)?,
                attrs: store
                    .attributes_of(id)
                    .into_iter()
                    .map(|(k, v)| (k, v.into()))
                    .collect(),
            });
        }
        let links = store
            .links()?
            .into_iter()
            .map(|(from, to, link)| LinkRecord {
                from: from.get(),
                to: to.get(),
                link,
            })
            .collect();
        Ok(Self { items, links })
    }

    pub fn load(path: &Path) -> DataResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| DataError::DocumentRead {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&content).map_err(|e| DataError::DocumentParse {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn save(&self, path: &Path) -> DataResult<()> {
        let content =
            serde_json::to_string_pretty(self).map_err(|e| DataError::DocumentParse {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        std::fs::write(path, content).map_err(|e| DataError::DocumentWrite {
            path: path.display().to_string(),
            source: e,
        })
    }
}
