//! Relational sources: what a feature aggregates over.
//!
//! A source names a relational path from the core item and either an
//! attribute read on the items reached (`[<acted_in:actor].gender`) or the
//! reached items themselves (`[<acted_in:actor]`). The canonical string form
//! is also the parse format, so sources can be written in config files.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DataResult, FeatureError, FeatureResult};
use crate::graph::{Hop, ItemId, LinkDirection, RelPath, RelationalStore, Value};
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Source {
    /// Values of `attr` on every item reached along `path`.
    Attribute { path: RelPath, attr: String },
    /// The items reached along `path`.
    Item { path: RelPath },
}

impl Source {
    pub fn attribute(path: RelPath, attr: &str) -> FeatureResult<Self> {
        let source = Source::Attribute {
            path,
            attr: attr.to_string(),
        };
        source.validate()?;
        Ok(source)
    }

    pub fn item(path: RelPath) -> FeatureResult<Self> {
        let source = Source::Item { path };
        source.validate()?;
        Ok(source)
    }

    fn validate(&self) -> FeatureResult<()> {
        if self.path().hops().iter().any(|h| h.link.is_empty()) {
            return Err(FeatureError::NullSource);
        }
        match self {
            Source::Attribute { attr, .. } if attr.is_empty() => Err(FeatureError::NullSource),
            Source::Item { path } if path.is_core() => Err(FeatureError::NullSource),
            _ => Ok(()),
        }
    }

    pub fn path(&self) -> &RelPath {
        match self {
            Source::Attribute { path, .. } | Source::Item { path } => path,
        }
    }

    pub fn attr(&self) -> Option<&str> {
        match self {
            Source::Attribute { attr, .. } => Some(attr),
            Source::Item { .. } => None,
        }
    }

    /// Whether the source reads from the core item rather than related items.
    pub fn is_core(&self) -> bool {
        self.path().is_core()
    }

    /// Whether the source reads the given attribute.
    pub fn mentions(&self, attr: &str) -> bool {
        self.attr() == Some(attr)
    }

    /// Point an attribute source at another attribute when `renames` maps
    /// its attribute. Returns whether the source changed.
    pub fn rename_attr(&mut self, renames: &BTreeMap<String, String>) -> bool {
        match self {
            Source::Attribute { attr, .. } => match renames.get(attr.as_str()) {
                Some(to) => {
                    *attr = to.clone();
                    true
                }
                None => false,
            },
            Source::Item { .. } => false,
        }
    }

    /// Rows of (core item, value) for the population.
    pub fn table(&self, store: &dyn RelationalStore, population: &[ItemId]) -> DataResult<Table> {
        store.path_table(population, self.path(), self.attr())
    }

    /// Read the source and summarize it.
    pub fn init(
        &self,
        store: &dyn RelationalStore,
        population: &[ItemId],
    ) -> DataResult<SourceData> {
        let table = self.table(store, population)?;
        let profile = SourceProfile::of(self, &table);
        Ok(SourceData { table, profile })
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Attribute { path, attr } => write!(f, "{path}.{attr}"),
            Source::Item { path } => write!(f, "{path}"),
        }
    }
}

impl From<Source> for String {
    fn from(source: Source) -> Self {
        source.to_string()
    }
}

impl TryFrom<String> for Source {
    type Error = FeatureError;

    fn try_from(s: String) -> FeatureResult<Self> {
        s.parse()
    }
}

impl FromStr for Source {
    type Err = FeatureError;

    fn from_str(input: &str) -> FeatureResult<Self> {
        let invalid = |reason: &str| FeatureError::InvalidSource {
            input: input.to_string(),
            reason: reason.to_string(),
        };
        let trimmed = input.trim();
        let rest = trimmed
            .strip_prefix('[')
            .ok_or_else(|| invalid("expected `[`"))?;
        let close = rest.find(']').ok_or_else(|| invalid("expected `]`"))?;
        let (inner, tail) = (&rest[..close], &rest[close + 1..]);

        let path = if inner == "self" {
            RelPath::core()
        } else {
            let mut hops = Vec::new();
            for step in inner.split('.') {
                let (direction, body) = if let Some(body) = step.strip_prefix('>') {
                    (LinkDirection::Outgoing, body)
                } else if let Some(body) = step.strip_prefix('<') {
                    (LinkDirection::Incoming, body)
                } else {
                    return Err(invalid("each hop starts with `>` or `<`"));
                };
                let (link, item_kind) = match body.split_once(':') {
                    Some((link, kind)) if !kind.is_empty() => (link, Some(kind.to_string())),
                    Some(_) => return Err(invalid("empty item kind after `:`")),
                    None => (body, None),
                };
                if link.is_empty() {
                    return Err(invalid("empty link type"));
                }
                hops.push(Hop {
                    link: link.to_string(),
                    direction,
                    item_kind,
                });
            }
            RelPath(hops)
        };

        if tail.is_empty() {
            if path.is_core() {
                return Err(invalid("item source needs at least one hop"));
            }
            return Ok(Source::Item { path });
        }
        let attr = tail
            .strip_prefix('.')
            .ok_or_else(|| invalid("expected `.attribute` after `]`"))?;
        if attr.is_empty() {
            return Err(invalid("empty attribute name"));
        }
        Ok(Source::Attribute {
            path,
            attr: attr.to_string(),
        })
    }
}

/// What feature enumeration needs to know about a source's rows.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceProfile {
    pub is_item_source: bool,
    pub is_core: bool,
    /// Every value is numeric (and there is at least one).
    pub continuous: bool,
    /// No entity has more than one row.
    pub single_value: bool,
    pub distinct_values: Vec<Value>,
    pub row_count: usize,
}

impl SourceProfile {
    pub fn of(source: &Source, table: &Table) -> Self {
        let continuous = !table.is_empty() && table.rows().iter().all(|r| r.value.is_num());
        let single_value = table.ids().len() == table.len();
        Self {
            is_item_source: matches!(source, Source::Item { .. }),
            is_core: source.is_core(),
            continuous,
            single_value,
            distinct_values: table.distinct_values(),
            row_count: table.len(),
        }
    }
}

/// A source's rows over a population together with their profile.
#[derive(Debug, Clone)]
pub struct SourceData {
    pub table: Table,
    pub profile: SourceProfile,
}

/// Which item kind and attribute a tree predicts.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClassLabel {
    pub item_kind: String,
    pub attr: String,
}

impl ClassLabel {
    pub fn new(item_kind: &str, attr: &str) -> Self {
        Self {
            item_kind: item_kind.to_string(),
            attr: attr.to_string(),
        }
    }

    /// The source that would read the label off the core item itself.
    pub fn core_source(&self) -> Source {
        Source::Attribute {
            path: RelPath::core(),
            attr: self.attr.clone(),
        }
    }
}

impl fmt::Display for ClassLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.item_kind, self.attr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_round_trips_canonical_form() {
        for s in [
            "[self].budget",
            "[<acted_in:actor].gender",
            "[>made_by:studio.<made_by:movie].genre",
            "[<acted_in]",
        ] {
            let source: Source = s.parse().unwrap();
            assert_eq!(source.to_string(), s);
        }
    }

    #[test]
    fn parse_structure() {
        let source: Source = "[<acted_in:actor].gender".parse().unwrap();
        assert_eq!(source.attr(), Some("gender"));
        assert!(!source.is_core());
        assert_eq!(
            source.path().hops(),
            &[Hop::incoming("acted_in", Some("actor"))]
        );
        let core: Source = "[self].budget".parse().unwrap();
        assert!(core.is_core());
    }

    #[test]
    fn rename_touches_only_mapped_attributes() {
        let renames = BTreeMap::from([("genre".to_string(), "rdn_temp_genre".to_string())]);
        let mut linked: Source = "[>sequel:movie].genre".parse().unwrap();
        assert!(linked.rename_attr(&renames));
        assert_eq!(linked.to_string(), "[>sequel:movie].rdn_temp_genre");

        let mut other: Source = "[self].budget".parse().unwrap();
        assert!(!other.rename_attr(&renames));
        let mut items: Source = "[<acted_in]".parse().unwrap();
        assert!(!items.rename_attr(&renames));
    }

    #[test]
    fn parse_rejects_malformed() {
        for s in ["self.budget", "[self]", "[acted_in].x", "[<acted_in:].x", "[<a]x", "[<a]."] {
            assert!(
                matches!(s.parse::<Source>(), Err(FeatureError::InvalidSource { .. })),
                "{s} should not parse"
            );
        }
    }

    #[test]
    fn null_source_rejected() {
        assert!(matches!(
            Source::attribute(RelPath::core(), ""),
            Err(FeatureError::NullSource)
        ));
        assert!(matches!(
            Source::item(RelPath::core()),
            Err(FeatureError::NullSource)
        ));
    }

    #[test]
    fn serde_uses_canonical_string() {
        let source: Source = "[<acted_in:actor].gender".parse().unwrap();
        let json = serde_json::to_string(&source).unwrap();
        assert_eq!(json, "\"[<acted_in:actor].gender\"");
        let back: Source = serde_json::from_str(&json).unwrap();
        assert_eq!(back, source);
    }

    #[test]
    fn profile_detects_shape() {
        let id = |raw| ItemId::new(raw).unwrap();
        let mut table = Table::new();
        table.push(id(1), Value::Num(1.0));
        table.push(id(1), Value::Num(2.0));
        table.push(id(2), Value::Num(2.0));
        let source: Source = "[<acted_in].age".parse().unwrap();
        let profile = SourceProfile::of(&source, &table);
        assert!(profile.continuous);
        assert!(!profile.single_value);
        assert_eq!(profile.distinct_values.len(), 2);
        assert!(!profile.is_core);
    }
}
