//! Metadata and access-control value types.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Attribute/value metadata tag with an optional unit.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Avu {
    pub attribute: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub units: Option<String>,
}

impl Avu {
    pub fn new(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            attribute: attribute.into(),
            value: value.into(),
            units: None,
        }
    }

    pub fn with_units(mut self, units: impl Into<String>) -> Self {
        self.units = Some(units.into());
        self
    }
}

impl fmt::Display for Avu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.units {
            Some(units) => write!(f, "{}={} [{}]", self.attribute, self.value, units),
            None => write!(f, "{}={}", self.attribute, self.value),
        }
    }
}

/// Metadata on one target: a set of values per attribute.
///
/// Values for the same attribute accumulate while a set is being built;
/// applying one set onto another replaces whole attributes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataSet {
    attributes: BTreeMap<String, BTreeSet<Avu>>,
}

impl MetadataSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag to its attribute's value set.
    pub fn add(&mut self, avu: Avu) {
        self.attributes
            .entry(avu.attribute.clone())
            .or_default()
            .insert(avu);
    }

    /// Copy in every attribute of `other` that this set does not have yet.
    pub fn merge_absent(&mut self, other: &MetadataSet) {
        for (attribute, values) in &other.attributes {
            if !self.attributes.contains_key(attribute) {
                self.attributes.insert(attribute.clone(), values.clone());
            }
        }
    }

    /// Replace every attribute present in `other` with `other`'s values.
    pub fn replace_from(&mut self, other: &MetadataSet) {
        for (attribute, values) in &other.attributes {
            self.attributes.insert(attribute.clone(), values.clone());
        }
    }

    pub fn contains_attribute(&self, attribute: &str) -> bool {
        self.attributes.contains_key(attribute)
    }

    /// Values of one attribute, sorted.
    pub fn values(&self, attribute: &str) -> Vec<&str> {
        self.attributes
            .get(attribute)
            .map(|set| set.iter().map(|a| a.value.as_str()).collect())
            .unwrap_or_default()
    }

    /// The single value of an attribute, if it has exactly one.
    pub fn value(&self, attribute: &str) -> Option<&str> {
        match self.values(attribute).as_slice() {
            [only] => Some(*only),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Avu> {
        self.attributes.values().flat_map(|set| set.iter())
    }

    pub fn attributes(&self) -> impl Iterator<Item = &str> {
        self.attributes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.attributes.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

impl FromIterator<Avu> for MetadataSet {
    fn from_iter<I: IntoIterator<Item = Avu>>(iter: I) -> Self {
        let mut set = MetadataSet::new();
        for avu in iter {
            set.add(avu);
        }
        set
    }
}

impl Extend<Avu> for MetadataSet {
    fn extend<I: IntoIterator<Item = Avu>>(&mut self, iter: I) {
        for avu in iter {
            self.add(avu);
        }
    }
}

/// Access level granted to an owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Null,
    Read,
    Write,
    Own,
}

impl fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AccessLevel::Null => "null",
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
            AccessLevel::Own => "own",
        };
        f.write_str(s)
    }
}

/// A single access-control entry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub owner: String,
    pub level: AccessLevel,
}

impl Permission {
    pub fn read(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            level: AccessLevel::Read,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.owner, self.level)
    }
}

/// Owners whose grants the publisher controls.
///
/// A managed grant missing from the desired list is revoked. Grants for any
/// other owner are never touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ManagedOwners {
    prefixes: Vec<String>,
    owners: BTreeSet<String>,
}

impl ManagedOwners {
    pub fn new() -> Self {
        Self::default()
    }

    /// Manage every owner starting with `prefix`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefixes.push(prefix.into());
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owners.insert(owner.into());
        self
    }

    pub fn contains(&self, owner: &str) -> bool {
        self.owners.contains(owner) || self.prefixes.iter().any(|p| owner.starts_with(p.as_str()))
    }
}

/// Converge an access list to `desired`: apply every desired grant and drop
/// managed owners that are no longer wanted.
pub fn reconcile_acl(
    current: &mut BTreeMap<String, AccessLevel>,
    desired: &[Permission],
    managed: &ManagedOwners,
) {
    current.retain(|owner, _| {
        !managed.contains(owner) || desired.iter().any(|p| &p.owner == owner)
    });
    for permission in desired {
        current.insert(permission.owner.clone(), permission.level);
    }
}
