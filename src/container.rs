//! Resource containers: inventories, changesets and capability links.
//!
//! An [`Inventory`] is a full snapshot of a source's resources, keyed by URI
//! with duplicates rejected. A [`ChangeSet`] is an ordered record of
//! create/update/delete events where the same URI may legitimately appear
//! several times. A [`SitemapIndex`] reuses the inventory semantics, with
//! each entry describing one part document of a multi-document set.
//!
//! All three feed the sitemap codec through the [`ResourceContainer`] trait,
//! which is the single insertion point the parser uses while merging
//! documents into a caller-supplied container.

use crate::datetime::Timestamp;
use crate::resource::ResourceChange;
use std::collections::BTreeMap;
use thiserror::Error;

// ============================================================================
// Capabilities
// ============================================================================

/// Attribute value on a capability link: a single string or a set of
/// strings, the latter space-joined on serialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrValue {
    One(String),
    Many(Vec<String>),
}

impl AttrValue {
    /// Wire form of the value (space-joined for sets).
    pub fn join(&self) -> String {
        match self {
            Self::One(v) => v.clone(),
            Self::Many(vs) => vs.join(" "),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(v: &str) -> Self {
        Self::One(v.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(v: String) -> Self {
        Self::One(v)
    }
}

/// Attribute set of one capability link.
pub type CapabilityAttrs = BTreeMap<String, AttrValue>;

/// Advertised related functions of a container, keyed by capability URI.
///
/// Keys iterate in lexicographic order so serialization is reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    links: BTreeMap<String, CapabilityAttrs>,
}

impl Capabilities {
    /// Add or replace a capability link.
    pub fn insert(&mut self, uri: impl Into<String>, attrs: CapabilityAttrs) {
        self.links.insert(uri.into(), attrs);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &CapabilityAttrs)> {
        self.links.iter()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        self.links.clear();
    }
}

// ============================================================================
// ResourceContainer
// ============================================================================

/// Duplicate insertion into a URI-unique container.
///
/// Recoverable: the container keeps the first-seen record; the caller
/// decides whether to log and continue or to treat the conflict as fatal.
#[derive(Debug, Clone, Error)]
#[error("duplicate resource {uri} ({existing:?} =? {incoming:?})")]
pub struct DupeError {
    pub uri: String,
    /// Lastmod of the record already in the container.
    pub existing: Option<Timestamp>,
    /// Lastmod of the rejected record.
    pub incoming: Option<Timestamp>,
}

/// Common insertion surface for the sitemap codec.
///
/// The parser merges every document of a read into one container through
/// this trait; whether repeated URIs are conflicts (inventory) or history
/// (changeset) is the implementor's call.
pub trait ResourceContainer {
    /// Add one record. An `Err` reports a duplicate that was *not* stored;
    /// the container is unchanged by the failed insert.
    fn add(&mut self, record: ResourceChange) -> Result<(), DupeError>;

    fn capabilities(&self) -> &Capabilities;

    fn capabilities_mut(&mut self) -> &mut Capabilities;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// Full snapshot of a source's resources, URI-unique.
///
/// Iteration is in lexicographic URI order, which keeps serialized output
/// and index part processing deterministic.
#[derive(Debug, Clone, Default)]
pub struct Inventory {
    resources: BTreeMap<String, ResourceChange>,
    capabilities: Capabilities,
}

/// Index of part documents forming one logical sitemap.
///
/// An index entry has the same shape as a resource record (location plus
/// timestamp), so the inventory semantics are reused as-is.
pub type SitemapIndex = Inventory;

impl Inventory {
    pub fn get(&self, uri: &str) -> Option<&ResourceChange> {
        self.resources.get(uri)
    }

    pub fn contains(&self, uri: &str) -> bool {
        self.resources.contains_key(uri)
    }

    /// Records in lexicographic URI order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceChange> {
        self.resources.values()
    }

    /// URIs in lexicographic order.
    pub fn uris(&self) -> impl Iterator<Item = &String> {
        self.resources.keys()
    }

    pub fn clear(&mut self) {
        self.resources.clear();
        self.capabilities.clear();
    }
}

impl ResourceContainer for Inventory {
    fn add(&mut self, record: ResourceChange) -> Result<(), DupeError> {
        if let Some(existing) = self.resources.get(record.uri()) {
            return Err(DupeError {
                uri: record.uri().to_string(),
                existing: existing.lastmod(),
                incoming: record.lastmod(),
            });
        }
        self.resources.insert(record.uri().to_string(), record);
        Ok(())
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.capabilities
    }

    fn len(&self) -> usize {
        self.resources.len()
    }
}

// ============================================================================
// ChangeSet
// ============================================================================

/// Ordered record of state transitions since some prior state.
///
/// Append-only; a URI appearing several times represents successive
/// transitions (created, then updated, then deleted), so insertion order is
/// preserved on iteration.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    records: Vec<ResourceChange>,
    capabilities: Capabilities,
}

impl ChangeSet {
    /// Records in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceChange> {
        self.records.iter()
    }
}

impl ResourceContainer for ChangeSet {
    fn add(&mut self, record: ResourceChange) -> Result<(), DupeError> {
        self.records.push(record);
        Ok(())
    }

    fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    fn capabilities_mut(&mut self) -> &mut Capabilities {
        &mut self.capabilities
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ChangeKind, Resource};

    fn record(uri: &str, lastmod: i64) -> ResourceChange {
        Resource::new(uri)
            .with_lastmod(Timestamp::from_unix(lastmod))
            .into()
    }

    #[test]
    fn test_inventory_add_and_get() {
        let mut inv = Inventory::default();
        inv.add(record("http://example.com/a", 1)).unwrap();
        inv.add(record("http://example.com/b", 2)).unwrap();

        assert_eq!(inv.len(), 2);
        assert!(inv.contains("http://example.com/a"));
        assert_eq!(
            inv.get("http://example.com/b").unwrap().lastmod(),
            Some(Timestamp::from_unix(2))
        );
    }

    #[test]
    fn test_inventory_dedup_keeps_first() {
        let mut inv = Inventory::default();
        inv.add(record("http://example.com/a", 1)).unwrap();

        let err = inv.add(record("http://example.com/a", 2)).unwrap_err();
        assert_eq!(err.uri, "http://example.com/a");
        assert_eq!(err.existing, Some(Timestamp::from_unix(1)));
        assert_eq!(err.incoming, Some(Timestamp::from_unix(2)));

        // First record survives, exactly one entry
        assert_eq!(inv.len(), 1);
        assert_eq!(
            inv.get("http://example.com/a").unwrap().lastmod(),
            Some(Timestamp::from_unix(1))
        );
    }

    #[test]
    fn test_inventory_iterates_sorted_by_uri() {
        let mut inv = Inventory::default();
        inv.add(record("http://example.com/c", 3)).unwrap();
        inv.add(record("http://example.com/a", 1)).unwrap();
        inv.add(record("http://example.com/b", 2)).unwrap();

        let uris: Vec<&str> = inv.iter().map(|r| r.uri()).collect();
        assert_eq!(
            uris,
            [
                "http://example.com/a",
                "http://example.com/b",
                "http://example.com/c"
            ]
        );
    }

    #[test]
    fn test_changeset_permits_duplicates_in_order() {
        let mut changes = ChangeSet::default();
        changes
            .add(ResourceChange::new(
                Resource::new("http://example.com/a"),
                ChangeKind::Created,
            ))
            .unwrap();
        changes
            .add(ResourceChange::new(
                Resource::new("http://example.com/b"),
                ChangeKind::Created,
            ))
            .unwrap();
        changes
            .add(ResourceChange::new(
                Resource::new("http://example.com/a"),
                ChangeKind::Deleted,
            ))
            .unwrap();

        assert_eq!(changes.len(), 3);
        let kinds: Vec<_> = changes.iter().map(|r| (r.uri(), r.kind)).collect();
        assert_eq!(
            kinds,
            [
                ("http://example.com/a", Some(ChangeKind::Created)),
                ("http://example.com/b", Some(ChangeKind::Created)),
                ("http://example.com/a", Some(ChangeKind::Deleted)),
            ]
        );
    }

    #[test]
    fn test_capabilities_sorted_and_joined() {
        let mut caps = Capabilities::default();
        let mut attrs = CapabilityAttrs::new();
        attrs.insert(
            "attributes".to_string(),
            AttrValue::Many(vec!["resourcesync".into(), "changeset".into()]),
        );
        caps.insert("http://example.com/z/changeset.xml", attrs);
        caps.insert("http://example.com/a/sitemap.xml", CapabilityAttrs::new());

        let uris: Vec<&str> = caps.iter().map(|(uri, _)| uri.as_str()).collect();
        assert_eq!(
            uris,
            [
                "http://example.com/a/sitemap.xml",
                "http://example.com/z/changeset.xml"
            ]
        );

        let (_, attrs) = caps
            .iter()
            .find(|(uri, _)| uri.ends_with("changeset.xml"))
            .unwrap();
        assert_eq!(attrs["attributes"].join(), "resourcesync changeset");
    }
}
