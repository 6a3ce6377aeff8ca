//! Typed (entity, value) row tables produced by the data-access layer.

use std::collections::{BTreeMap, BTreeSet};

use rand::Rng;
use rand::seq::SliceRandom;

use crate::graph::{ItemId, Value};

/// One (core entity, value) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Row {
    pub id: ItemId,
    pub value: Value,
}

/// An ordered list of rows. Entities may repeat.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Table {
    rows: Vec<Row>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn push(&mut self, id: ItemId, value: Value) {
        self.rows.push(Row { id, value });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows satisfying the predicate.
    pub fn filter(&self, predicate: impl Fn(&Row) -> bool) -> Table {
        Table {
            rows: self.rows.iter().filter(|r| predicate(r)).cloned().collect(),
        }
    }

    /// The entity column, distinct and ascending.
    pub fn ids(&self) -> Vec<ItemId> {
        let ids: BTreeSet<ItemId> = self.rows.iter().map(|r| r.id).collect();
        ids.into_iter().collect()
    }

    /// The value column, in row order.
    pub fn values(&self) -> Vec<&Value> {
        self.rows.iter().map(|r| &r.value).collect()
    }

    /// Distinct values, ascending.
    pub fn distinct_values(&self) -> Vec<Value> {
        let values: BTreeSet<&Value> = self.rows.iter().map(|r| &r.value).collect();
        values.into_iter().cloned().collect()
    }

    /// Values grouped by entity. Entities without rows are absent.
    pub fn group_by_entity(&self) -> BTreeMap<ItemId, Vec<&Value>> {
        let mut groups: BTreeMap<ItemId, Vec<&Value>> = BTreeMap::new();
        for row in &self.rows {
            groups.entry(row.id).or_default().push(&row.value);
        }
        groups
    }

    /// First value per entity.
    pub fn first_by_entity(&self) -> BTreeMap<ItemId, &Value> {
        let mut firsts = BTreeMap::new();
        for row in &self.rows {
            firsts.entry(row.id).or_insert(&row.value);
        }
        firsts
    }

    /// A copy with the value column randomly permuted and the entity column kept.
    pub fn permute_values<R: Rng + ?Sized>(&self, rng: &mut R) -> Table {
        let mut values: Vec<Value> = self.rows.iter().map(|r| r.value.clone()).collect();
        values.shuffle(rng);
        Table {
            rows: self
                .rows
                .iter()
                .zip(values)
                .map(|(r, value)| Row { id: r.id, value })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn id(raw: u64) -> ItemId {
        ItemId::new(raw).unwrap()
    }

    fn table() -> Table {
        let mut t = Table::new();
        t.push(id(2), "m".into());
        t.push(id(1), "f".into());
        t.push(id(2), "f".into());
        t
    }

    #[test]
    fn ids_and_distinct_values_sorted() {
        let t = table();
        assert_eq!(t.ids(), vec![id(1), id(2)]);
        assert_eq!(t.distinct_values(), vec![Value::from("f"), Value::from("m")]);
    }

    #[test]
    fn filter_keeps_matching_rows() {
        let t = table().filter(|r| r.value == Value::from("f"));
        assert_eq!(t.len(), 2);
        assert_eq!(t.ids(), vec![id(1), id(2)]);
    }

    #[test]
    fn grouping_preserves_multiplicity() {
        let t = table();
        let groups = t.group_by_entity();
        assert_eq!(groups[&id(2)].len(), 2);
        assert_eq!(table().first_by_entity()[&id(2)], &Value::from("m"));
    }

    #[test]
    fn permutation_keeps_entities_and_multiset() {
        let t = table();
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let p = t.permute_values(&mut rng);
        let ids: Vec<ItemId> = p.rows().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![id(2), id(1), id(2)]);
        let mut before: Vec<Value> = t.values().into_iter().cloned().collect();
        let mut after: Vec<Value> = p.values().into_iter().cloned().collect();
        before.sort();
        after.sort();
        assert_eq!(before, after);
    }
}
