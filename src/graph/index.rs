//! In-memory relational store.
//!
//! Uses `petgraph` for the link structure and `DashMap` for the kind index
//! and the attribute columns, so reads from concurrent samplers never
//! contend with each other.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use dashmap::{DashMap, DashSet};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;

use crate::error::{DataError, DataResult};

use super::{Hop, ItemId, LinkDirection, RelationalStore, ScopeId, Value};

/// In-memory typed multigraph with column-oriented attributes.
pub struct GraphStore {
    /// Nodes are items, edges carry the link type.
    graph: RwLock<DiGraph<ItemId, String>>,
    /// ItemId → NodeIndex mapping for O(1) node lookups.
    node_index: DashMap<ItemId, NodeIndex>,
    /// ItemId → item kind.
    kinds: DashMap<ItemId, String>,
    /// Item kind → items of that kind.
    kind_index: DashMap<String, Vec<ItemId>>,
    /// Attribute name → column of values.
    attributes: DashMap<String, DashMap<ItemId, Value>>,
    open_scopes: DashSet<u64>,
    next_scope: AtomicU64,
    scopes_opened: AtomicU64,
    /// Attribute values written through the store API.
    writes: AtomicUsize,
}

impl GraphStore {
    pub fn new() -> Self {
        Self {
            graph: RwLock::new(DiGraph::new()),
            node_index: DashMap::new(),
            kinds: DashMap::new(),
            kind_index: DashMap::new(),
            attributes: DashMap::new(),
            open_scopes: DashSet::new(),
            next_scope: AtomicU64::new(1),
            scopes_opened: AtomicU64::new(0),
            writes: AtomicUsize::new(0),
        }
    }

    /// Add an item of the given kind.
    pub fn add_item(&self, id: ItemId, kind: &str) -> DataResult<()> {
        if self.node_index.contains_key(&id) {
            return Err(DataError::DuplicateItem { id: id.get() });
        }
        let idx = {
            let mut graph = self.graph.write().map_err(|_| DataError::LockPoisoned)?;
            graph.add_node(id)
        };
        self.node_index.insert(id, idx);
        self.kinds.insert(id, kind.to_string());
        let mut items = self.kind_index.entry(kind.to_string()).or_default();
        // Keep the per-kind list sorted even if ids arrive out of order.
        match items.binary_search(&id) {
            Ok(_) => {}
            Err(pos) => items.insert(pos, id),
        }
        Ok(())
    }

    /// Add a typed link from `from` to `to`.
    pub fn add_link(&self, from: ItemId, to: ItemId, link: &str) -> DataResult<()> {
        let from_idx = self.node(from)?;
        let to_idx = self.node(to)?;
        let mut graph = self.graph.write().map_err(|_| DataError::LockPoisoned)?;
        graph.add_edge(from_idx, to_idx, link.to_string());
        Ok(())
    }

    fn node(&self, id: ItemId) -> DataResult<NodeIndex> {
        self.node_index
            .get(&id)
            .map(|idx| *idx.value())
            .ok_or(DataError::UnknownItem { id: id.get() })
    }

    pub fn has_item(&self, id: ItemId) -> bool {
        self.node_index.contains_key(&id)
    }

    pub fn item_count(&self) -> usize {
        self.node_index.len()
    }

    pub fn link_count(&self) -> usize {
        self.graph.read().map(|g| g.edge_count()).unwrap_or(0)
    }

    /// Kinds present in the store, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.kind_index.iter().map(|e| e.key().clone()).collect();
        kinds.sort();
        kinds
    }

    /// Attribute names present in the store, sorted.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.attributes.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// All attributes of one item, by name.
    pub fn attributes_of(&self, id: ItemId) -> BTreeMap<String, Value> {
        self.attributes
            .iter()
            .filter_map(|column| {
                column
                    .value()
                    .get(&id)
                    .map(|v| (column.key().clone(), v.value().clone()))
            })
            .collect()
    }

    /// All links as (from, to, link type), in insertion order.
    pub fn links(&self) -> DataResult<Vec<(ItemId, ItemId, String)>> {
        let graph = self.graph.read().map_err(|_| DataError::LockPoisoned)?;
        Ok(graph
            .edge_references()
            .filter_map(|e| {
                let from = *graph.node_weight(e.source())?;
                let to = *graph.node_weight(e.target())?;
                Some((from, to, e.weight().clone()))
            })
            .collect())
    }

    /// All items, ascending.
    pub fn all_items(&self) -> Vec<ItemId> {
        let mut items: Vec<ItemId> = self.node_index.iter().map(|e| *e.key()).collect();
        items.sort();
        items
    }

    /// Number of attribute values written through the store API.
    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn open_scope_count(&self) -> usize {
        self.open_scopes.len()
    }

    pub fn scopes_opened(&self) -> u64 {
        self.scopes_opened.load(Ordering::Relaxed)
    }

    fn write(&self, id: ItemId, attr: &str, value: Value) -> DataResult<()> {
        if !self.node_index.contains_key(&id) {
            return Err(DataError::UnknownItem { id: id.get() });
        }
        self.attributes
            .entry(attr.to_string())
            .or_default()
            .insert(id, value);
        self.writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RelationalStore for GraphStore {
    fn items_of_kind(&self, kind: &str) -> DataResult<Vec<ItemId>> {
        Ok(self
            .kind_index
            .get(kind)
            .map(|v| v.value().clone())
            .unwrap_or_default())
    }

    fn kind_of(&self, item: ItemId) -> DataResult<String> {
        self.kinds
            .get(&item)
            .map(|k| k.value().clone())
            .ok_or(DataError::UnknownItem { id: item.get() })
    }

    fn neighbors(&self, item: ItemId, hop: &Hop) -> DataResult<Vec<ItemId>> {
        let idx = self.node(item)?;
        let graph = self.graph.read().map_err(|_| DataError::LockPoisoned)?;
        let direction = match hop.direction {
            LinkDirection::Outgoing => Direction::Outgoing,
            LinkDirection::Incoming => Direction::Incoming,
        };
        let mut reached: Vec<ItemId> = graph
            .edges_directed(idx, direction)
            .filter(|e| *e.weight() == hop.link)
            .filter_map(|e| {
                let other = match hop.direction {
                    LinkDirection::Outgoing => e.target(),
                    LinkDirection::Incoming => e.source(),
                };
                graph.node_weight(other).copied()
            })
            .filter(|id| match &hop.item_kind {
                Some(kind) => self.kinds.get(id).is_some_and(|k| k.value() == kind),
                None => true,
            })
            .collect();
        reached.sort();
        Ok(reached)
    }

    fn attribute(&self, item: ItemId, attr: &str) -> DataResult<Option<Value>> {
        Ok(self
            .attributes
            .get(attr)
            .and_then(|column| column.get(&item).map(|v| v.value().clone())))
    }

    fn set_attribute(&self, item: ItemId, attr: &str, value: Value) -> DataResult<()> {
        self.write(item, attr, value)
    }

    fn update_attribute(&self, attr: &str, values: &[(ItemId, Value)]) -> DataResult<usize> {
        for (id, value) in values {
            self.write(*id, attr, value.clone())?;
        }
        Ok(values.len())
    }

    fn copy_attribute(&self, from: &str, to: &str) -> DataResult<usize> {
        let snapshot: Vec<(ItemId, Value)> = match self.attributes.get(from) {
            Some(column) => column
                .iter()
                .map(|e| (*e.key(), e.value().clone()))
                .collect(),
            None => return Ok(0),
        };
        self.update_attribute(to, &snapshot)
    }

    fn delete_attribute(&self, attr: &str) -> DataResult<usize> {
        Ok(self
            .attributes
            .remove(attr)
            .map_or(0, |(_, column)| column.len()))
    }

    fn begin_scope(&self) -> DataResult<ScopeId> {
        let id = self.next_scope.fetch_add(1, Ordering::Relaxed);
        self.open_scopes.insert(id);
        self.scopes_opened.fetch_add(1, Ordering::Relaxed);
        Ok(ScopeId(id))
    }

    fn end_scope(&self, scope: ScopeId) -> DataResult<()> {
        self.open_scopes
            .remove(&scope.0)
            .map(|_| ())
            .ok_or(DataError::ScopeNotOpen { scope: scope.0 })
    }
}
