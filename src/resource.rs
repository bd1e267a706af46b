//! Resource and change records.
//!
//! A [`Resource`] is one listed item of a source's state: a URI plus
//! whatever the source knows about it (last modification, byte size, MD5
//! fixity digest). A [`ResourceChange`] is the change-augmented form used in
//! changesets: the same record plus the kind of state transition it
//! represents. A change without a kind is a plain timestamped resource,
//! which is what reading an ordinary inventory produces.

use crate::datetime::Timestamp;
use std::fmt;

/// Kind of state transition a change record represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

impl ChangeKind {
    /// Wire value of the `rs:type` attribute for this kind.
    ///
    /// `Deleted` has no attribute value: deletions are encoded as an
    /// `<expires>` element instead of `<lastmod>`.
    pub const fn type_attr(self) -> Option<&'static str> {
        match self {
            Self::Created => Some("created"),
            Self::Updated => Some("updated"),
            Self::Deleted => None,
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        })
    }
}

/// One listed resource. Container identity is the URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Published URI, never empty.
    pub uri: String,
    /// Last modification instant, if known.
    pub lastmod: Option<Timestamp>,
    /// Payload size in bytes, if known.
    pub size: Option<u64>,
    /// Hex MD5 digest of the payload, if known. Already computed by the
    /// caller; this crate never hashes resource content itself.
    pub md5: Option<String>,
}

impl Resource {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            lastmod: None,
            size: None,
            md5: None,
        }
    }

    pub fn with_lastmod(mut self, lastmod: Timestamp) -> Self {
        self.lastmod = Some(lastmod);
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_md5(mut self, md5: impl Into<String>) -> Self {
        self.md5 = Some(md5.into());
        self
    }
}

/// A resource together with the kind of change that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceChange {
    pub resource: Resource,
    /// Absent for plain inventory records.
    pub kind: Option<ChangeKind>,
}

impl ResourceChange {
    pub fn new(resource: Resource, kind: ChangeKind) -> Self {
        Self {
            resource,
            kind: Some(kind),
        }
    }

    pub fn uri(&self) -> &str {
        &self.resource.uri
    }

    pub fn lastmod(&self) -> Option<Timestamp> {
        self.resource.lastmod
    }
}

impl From<Resource> for ResourceChange {
    fn from(resource: Resource) -> Self {
        Self {
            resource,
            kind: None,
        }
    }
}
