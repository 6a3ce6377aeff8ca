//! Relational data access: typed items, typed links, attribute columns.
//!
//! The learner and the inference cycle only talk to storage through the
//! [`RelationalStore`] trait. [`GraphStore`](index::GraphStore) is the
//! in-memory implementation backed by `petgraph`; other engines can be
//! plugged in by implementing the trait.
//!
//! Every table-producing stage of induction runs inside a [`Scope`], which
//! ends itself when dropped so intermediate state is released on every exit
//! path, including errors.

pub mod index;
pub mod load;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use crate::table::{Row, Table};

/// Unique, niche-optimized identifier for an item (object or link) in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct ItemId(NonZeroU64);

impl ItemId {
    /// Create an `ItemId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(ItemId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// An attribute value.
///
/// Numbers order before strings; numbers compare with `f64::total_cmp` so
/// `Value` can key ordered maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    Num(f64),
    Str(String),
}

impl Value {
    pub fn as_num(&self) -> Option<f64> {
        match self {
            Value::Num(n) => Some(*n),
            Value::Str(_) => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            Value::Num(_) => None,
        }
    }

    pub fn is_num(&self) -> bool {
        matches!(self, Value::Num(_))
    }

    /// Compare two values of the same variant. Mixed variants are incomparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.partial_cmp(b),
            (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Num(a), Value::Num(b)) => a.total_cmp(b),
            (Value::Str(a), Value::Str(b)) => a.cmp(b),
            (Value::Num(_), Value::Str(_)) => Ordering::Less,
            (Value::Str(_), Value::Num(_)) => Ordering::Greater,
        }
    }
}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Value::Num(n) => {
                0u8.hash(state);
                n.to_bits().hash(state);
            }
            Value::Str(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Num(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s}"),
        }
    }
}

/// Direction in which a hop traverses a link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LinkDirection {
    /// From the link's source to its target.
    Outgoing,
    /// From the link's target back to its source.
    Incoming,
}

/// One step along a relational path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Hop {
    /// The link type to follow.
    pub link: String,
    pub direction: LinkDirection,
    /// If set, only items of this kind are kept after the hop.
    pub item_kind: Option<String>,
}

impl Hop {
    pub fn outgoing(link: &str, item_kind: Option<&str>) -> Self {
        Self {
            link: link.to_string(),
            direction: LinkDirection::Outgoing,
            item_kind: item_kind.map(str::to_string),
        }
    }

    pub fn incoming(link: &str, item_kind: Option<&str>) -> Self {
        Self {
            link: link.to_string(),
            direction: LinkDirection::Incoming,
            item_kind: item_kind.map(str::to_string),
        }
    }
}

impl fmt::Display for Hop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.direction {
            LinkDirection::Outgoing => '>',
            LinkDirection::Incoming => '<',
        };
        write!(f, "{arrow}{}", self.link)?;
        if let Some(kind) = &self.item_kind {
            write!(f, ":{kind}")?;
        }
        Ok(())
    }
}

/// Ordered list of hops from a core item to related items.
///
/// The empty path denotes the core item itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelPath(pub Vec<Hop>);

impl RelPath {
    /// The path that stays on the core item.
    pub fn core() -> Self {
        Self(Vec::new())
    }

    pub fn is_core(&self) -> bool {
        self.0.is_empty()
    }

    pub fn hops(&self) -> &[Hop] {
        &self.0
    }

    pub fn then(mut self, hop: Hop) -> Self {
        self.0.push(hop);
        self
    }
}

impl fmt::Display for RelPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "[self]");
        }
        write!(f, "[")?;
        for (i, hop) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ".")?;
            }
            write!(f, "{hop}")?;
        }
        write!(f, "]")
    }
}

/// Identifier of an open storage scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(pub u64);

/// Data-access contract used by induction and collective inference.
///
/// All operations are fallible; failures propagate unchanged to the caller
/// of the learning or inference API. Implementations must be `Send + Sync`
/// so per-model sampling can fan out across threads.
pub trait RelationalStore: Send + Sync {
    /// All items of the given kind, in ascending id order.
    fn items_of_kind(&self, kind: &str) -> DataResult<Vec<ItemId>>;

    /// The kind of an item.
    fn kind_of(&self, item: ItemId) -> DataResult<String>;

    /// Items reached from `item` by following one hop, in ascending id order.
    /// Parallel links yield repeated entries.
    fn neighbors(&self, item: ItemId, hop: &Hop) -> DataResult<Vec<ItemId>>;

    /// Read one attribute value.
    fn attribute(&self, item: ItemId, attr: &str) -> DataResult<Option<Value>>;

    /// Write one attribute value.
    fn set_attribute(&self, item: ItemId, attr: &str, value: Value) -> DataResult<()>;

    /// Bulk write of an attribute. Returns the number of values written.
    fn update_attribute(&self, attr: &str, values: &[(ItemId, Value)]) -> DataResult<usize>;

    /// Copy every value of `from` into a (possibly new) attribute `to`.
    /// Returns the number of values copied.
    fn copy_attribute(&self, from: &str, to: &str) -> DataResult<usize>;

    /// Remove an attribute from every item. Returns the number of values
    /// removed; deleting an absent attribute removes nothing.
    fn delete_attribute(&self, attr: &str) -> DataResult<usize>;

    fn begin_scope(&self) -> DataResult<ScopeId>;

    fn end_scope(&self, scope: ScopeId) -> DataResult<()>;

    /// Rows of (core item, value) for every item reached along `path` from
    /// each core item in `population`.
    ///
    /// With `attr` set, each reached item carrying the attribute yields a
    /// row with its value; without it, each reached item yields a row whose
    /// value is the item's kind. The core item itself is never part of a
    /// non-empty path's result.
    fn path_table(
        &self,
        population: &[ItemId],
        path: &RelPath,
        attr: Option<&str>,
    ) -> DataResult<Table> {
        let mut rows = Vec::new();
        for &core in population {
            let mut frontier = vec![core];
            for hop in path.hops() {
                let mut next = Vec::new();
                for item in frontier {
                    next.extend(self.neighbors(item, hop)?);
                }
                frontier = next;
            }
            if !path.is_core() {
                frontier.retain(|item| *item != core);
            }
            for item in frontier {
                let value = match attr {
                    Some(attr) => self.attribute(item, attr)?,
                    None => Some(Value::Str(self.kind_of(item)?)),
                };
                if let Some(value) = value {
                    rows.push(Row { id: core, value });
                }
            }
        }
        Ok(Table::from_rows(rows))
    }

    /// Read an attribute for a set of items, skipping items without a value.
    fn attribute_table(&self, items: &[ItemId], attr: &str) -> DataResult<Table> {
        let mut rows = Vec::with_capacity(items.len());
        for &id in items {
            if let Some(value) = self.attribute(id, attr)? {
                rows.push(Row { id, value });
            }
        }
        Ok(Table::from_rows(rows))
    }
}

/// RAII guard for a storage scope.
///
/// Ends the scope when dropped. Use [`Scope::close`] to observe the
/// end-of-scope result; a failure during drop is logged.
pub struct Scope<'a> {
    store: &'a dyn RelationalStore,
    id: ScopeId,
    open: bool,
}

impl<'a> Scope<'a> {
    pub fn open(store: &'a dyn RelationalStore) -> DataResult<Self> {
        let id = store.begin_scope()?;
        Ok(Self {
            store,
            id,
            open: true,
        })
    }

    pub fn id(&self) -> ScopeId {
        self.id
    }

    /// End the scope, reporting failure to the caller.
    pub fn close(mut self) -> DataResult<()> {
        self.open = false;
        self.store.end_scope(self.id)
    }
}

impl Drop for Scope<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.store.end_scope(self.id) {
                tracing::warn!(scope = self.id.0, error = %e, "failed to end scope");
            }
        }
    }
}

pub(crate) fn item_id(raw: u64) -> DataResult<ItemId> {
    ItemId::new(raw).ok_or(DataError::ZeroId)
}
