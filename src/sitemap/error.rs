//! Sitemap codec error taxonomy.

use super::parse::ParsedDocument;
use crate::fetch::FetchError;
use crate::mapper::MapperError;
use thiserror::Error;

/// Fatal conditions of a sitemap read or write.
///
/// Everything here aborts the operation in progress with no partial
/// container returned. Recoverable conditions (inventory duplicates,
/// unsupported fixity types, a lastmod/expires conflict on one record,
/// mapper fallback on write) are logged and never surface as errors.
#[derive(Debug, Error)]
pub enum SitemapError {
    /// Could not open a location. Never retried by the codec.
    #[error("failed to load sitemap/sitemapindex from {location}")]
    Transport {
        location: String,
        #[source]
        source: FetchError,
    },

    /// The root element belongs to neither recognized vocabulary.
    #[error("root element <{0}> is not a sitemap or sitemapindex")]
    UnknownRoot(String),

    /// Got a sitemapindex where a sitemap was expected.
    ///
    /// Carries the already-parsed document so a caller that anticipated the
    /// ambiguity can dispatch to the index path without re-fetching or
    /// re-parsing.
    #[error("got a sitemapindex when expecting a sitemap")]
    IndexWhereDocumentExpected(Box<ParsedDocument>),

    /// Got a sitemap where a sitemapindex was expected. Carries the parsed
    /// document, as [`SitemapError::IndexWhereDocumentExpected`] does.
    #[error("got a sitemap when expecting a sitemapindex")]
    DocumentWhereIndexExpected(Box<ParsedDocument>),

    /// A sitemapindex was read while multifile support is disabled.
    #[error("got a sitemapindex from {location} but multifile support is disabled")]
    IndexNotAllowed { location: String },

    /// A record without a location element is meaningless.
    #[error("missing <loc> element while parsing <{element}>")]
    MissingLoc { element: String },

    #[error("invalid <rs:size> value {value:?} for {uri}")]
    InvalidSize { uri: String, value: String },

    /// Collection exceeds the per-document capacity while multifile output
    /// is disabled. Raised before anything is written.
    #[error("too many entries for a single sitemap but multifile is disabled (limit {limit})")]
    TooManyEntries { limit: usize },

    /// A part location could not be resolved to something openable.
    #[error("cannot resolve sitemap location")]
    Mapper(#[from] MapperError),

    #[error("malformed XML")]
    Xml(#[from] quick_xml::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
