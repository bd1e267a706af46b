//! Sitemap codec: resource containers to XML documents and back.
//!
//! One [`Sitemap`] instance carries the codec configuration (entry limit,
//! multifile policy, pretty printing, mapper) plus the statistics of the
//! last operation. Containers are consumed through forward iterators only,
//! so arbitrarily large or lazily computed collections serialize in bounded
//! memory: at most one batch of `max_entries + 1` records is resident at a
//! time.
//!
//! # Document Format
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
//!         xmlns:rs="http://www.openarchives.org/rs/terms/">
//!   <url>
//!     <loc>http://example.com/res/1</loc>
//!     <lastmod rs:type="created">2012-03-08T01:02:03Z</lastmod>
//!     <rs:size>12</rs:size>
//!     <rs:fixity type="md5">6f5902ac237024bdd0c176cb93063dc4</rs:fixity>
//!   </url>
//! </urlset>
//! ```
//!
//! A collection that outgrows `max_entries` becomes a set of part documents
//! named `<stem>00000.xml`, `<stem>00001.xml`, ... plus a `<sitemapindex>`
//! at the requested basename referencing every part.

pub mod error;
mod parse;

pub use error::SitemapError;
pub use parse::{ParsedDocument, RootKind, parse_document};

use crate::container::{Capabilities, ChangeSet, Inventory, ResourceContainer, SitemapIndex};
use crate::datetime::Timestamp;
use crate::fetch::{Fetch, FileFetcher};
use crate::mapper::{Mapper, MapperError};
use crate::resource::{ChangeKind, Resource, ResourceChange};
use crate::{debug, log};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use std::collections::BTreeMap;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::{Path, PathBuf};

pub const SITEMAP_NS: &str = "http://www.sitemaps.org/schemas/sitemap/0.9";
pub const RS_NS: &str = "http://www.openarchives.org/rs/terms/";
pub const XHTML_NS: &str = "http://www.w3.org/1999/xhtml";

/// Capability attribute key that is renamed to `rel` on output.
const RESERVED_ATTR: &str = "attributes";

/// True when a location refers to local storage rather than a remote server.
pub fn is_file_uri(uri: &str) -> bool {
    uri.starts_with("file:") || uri.starts_with('/')
}

// ============================================================================
// Codec
// ============================================================================

/// Sitemap reader/writer for inventories and changesets.
///
/// Holds explicit per-instance configuration so concurrent synchronization
/// runs with different policies stay independent.
pub struct Sitemap {
    /// Indent output documents for human eyes.
    pub pretty_xml: bool,
    /// Permit multi-document output and sitemapindex input.
    pub allow_multifile: bool,
    /// Maximum records per document.
    pub max_entries: usize,
    /// URI⇄path translator for index parts; optional, `file://` fallback
    /// applies on write without one.
    pub mapper: Option<Mapper>,
    fetcher: Box<dyn Fetch + Send>,

    // Statistics of the last read
    /// Records created by the last read (duplicates included).
    pub resources_created: usize,
    /// Documents parsed by the last read (index parts counted singly).
    pub documents_read: usize,
    /// Content length of the most recently fetched document, when exposed.
    pub content_length: Option<u64>,
    /// Total bytes reported across all documents of all reads.
    pub bytes_read: u64,
}

impl Default for Sitemap {
    fn default() -> Self {
        Self::new()
    }
}

impl Sitemap {
    pub const DEFAULT_MAX_ENTRIES: usize = 50_000;

    pub fn new() -> Self {
        Self {
            pretty_xml: false,
            allow_multifile: true,
            max_entries: Self::DEFAULT_MAX_ENTRIES,
            mapper: None,
            fetcher: Box::new(FileFetcher),
            resources_created: 0,
            documents_read: 0,
            content_length: None,
            bytes_read: 0,
        }
    }

    pub fn with_mapper(mut self, mapper: Mapper) -> Self {
        self.mapper = Some(mapper);
        self
    }

    /// Replace the retrieval collaborator (local files by default).
    pub fn with_fetcher(mut self, fetcher: impl Fetch + Send + 'static) -> Self {
        self.fetcher = Box::new(fetcher);
        self
    }

    // ------------------------------------------------------------------------
    // Write path
    // ------------------------------------------------------------------------

    /// Write a container as one sitemap, or as a set of part documents plus
    /// a sitemapindex when it exceeds [`Sitemap::max_entries`].
    ///
    /// `resources` is consumed through its iterator only, so a lazy
    /// collection never materializes as a whole. Parts are named
    /// `<stem>00000.xml` onward, where the stem is `basename` minus a
    /// trailing `.xml`; parts never carry capability links, the index (or
    /// the single document) does. Returns every written location with its
    /// filesystem mtime.
    ///
    /// Fails with [`SitemapError::TooManyEntries`], before anything is
    /// written, when a second batch is needed but multifile output is
    /// disabled. An empty collection writes nothing.
    pub fn write<I>(
        &mut self,
        resources: I,
        capabilities: &Capabilities,
        basename: &Path,
    ) -> Result<BTreeMap<PathBuf, Timestamp>, SitemapError>
    where
        I: IntoIterator<Item = ResourceChange>,
    {
        let mut iter = resources.into_iter();
        let (mut chunk, mut overflow) = self.next_chunk(&mut iter, None);
        let mut written = BTreeMap::new();

        if overflow.is_none() {
            if !chunk.is_empty() {
                let xml = self.container_as_xml(RootKind::UrlSet, &chunk, Some(capabilities))?;
                fs::write(basename, &xml)?;
                written.insert(basename.to_path_buf(), file_mtime(basename)?);
                log!("sitemap"; "wrote sitemap {}", basename.display());
            }
            return Ok(written);
        }

        // More than max_entries: a set of parts plus a sitemapindex
        if !self.allow_multifile {
            return Err(SitemapError::TooManyEntries {
                limit: self.max_entries,
            });
        }

        let stem = part_stem(basename);
        while !chunk.is_empty() {
            let path = PathBuf::from(format!("{stem}{:05}.xml", written.len()));
            debug!("sitemap"; "writing sitemap {}", path.display());
            let xml = self.container_as_xml(RootKind::UrlSet, &chunk, None)?;
            fs::write(&path, &xml)?;
            written.insert(path.clone(), file_mtime(&path)?);
            (chunk, overflow) = self.next_chunk(&mut iter, overflow);
        }
        log!("sitemap"; "wrote {} sitemaps", written.len());

        let index_records: Vec<ResourceChange> = written
            .iter()
            .map(|(path, mtime)| Resource::new(self.part_uri(path)).with_lastmod(*mtime).into())
            .collect();
        let xml = self.container_as_xml(RootKind::Index, &index_records, Some(capabilities))?;
        fs::write(basename, &xml)?;
        written.insert(basename.to_path_buf(), file_mtime(basename)?);
        log!("sitemap"; "wrote sitemapindex {}", basename.display());

        Ok(written)
    }

    /// Write an inventory at `basename`.
    pub fn write_inventory(
        &mut self,
        inventory: &Inventory,
        basename: &Path,
    ) -> Result<BTreeMap<PathBuf, Timestamp>, SitemapError> {
        self.write(inventory.iter().cloned(), inventory.capabilities(), basename)
    }

    /// Write a changeset at `basename`.
    pub fn write_changeset(
        &mut self,
        changes: &ChangeSet,
        basename: &Path,
    ) -> Result<BTreeMap<PathBuf, Timestamp>, SitemapError> {
        self.write(changes.iter().cloned(), changes.capabilities(), basename)
    }

    /// Pull the next batch of up to `max_entries` records.
    ///
    /// A carry-over from the previous call is prepended first. When the
    /// iterator holds more than a full batch, the surplus record is handed
    /// back separately: it signals that another document is needed and
    /// seeds the next batch.
    fn next_chunk<I>(
        &self,
        iter: &mut I,
        carry: Option<ResourceChange>,
    ) -> (Vec<ResourceChange>, Option<ResourceChange>)
    where
        I: Iterator<Item = ResourceChange>,
    {
        let mut chunk = Vec::new();
        if let Some(first) = carry {
            chunk.push(first);
        }
        for record in iter.by_ref() {
            chunk.push(record);
            if chunk.len() > self.max_entries {
                break;
            }
        }
        let overflow = if chunk.len() > self.max_entries {
            chunk.pop()
        } else {
            None
        };
        (chunk, overflow)
    }

    /// Published URI for a written part file: mapper translation when one
    /// is configured, synthetic `file://` URI otherwise.
    fn part_uri(&self, path: &Path) -> String {
        if let Some(mapper) = &self.mapper {
            match mapper.dst_to_src(path) {
                Ok(uri) => return uri,
                Err(err) => {
                    log!("error"; "sitemapindex: {err}, writing file URI instead");
                }
            }
        }
        format!("file://{}", path.display())
    }

    // ------------------------------------------------------------------------
    // Read path
    // ------------------------------------------------------------------------

    /// Read a sitemap or sitemapindex from `location`, merging every record
    /// into `into`.
    ///
    /// For a sitemapindex, parts are read in lexicographic URI order (an
    /// explicit tie-break: the zero-padded part naming makes it match write
    /// order, but nothing infers publication order beyond that) and merged
    /// one by one into the same container. When the index itself came from
    /// local storage, non-local part locations are translated through the
    /// mapper first; parts of a remote index are used as-is, with
    /// same-origin validation deferred.
    ///
    /// Afterwards [`Sitemap::resources_created`] holds the number of
    /// records merged (inventory duplicates logged and skipped, first entry
    /// kept) and [`Sitemap::documents_read`] the number of documents
    /// parsed.
    pub fn read<C>(&mut self, location: &str, into: &mut C) -> Result<(), SitemapError>
    where
        C: ResourceContainer,
    {
        self.resources_created = 0;
        self.documents_read = 0;

        let bytes = self.fetch(location)?;
        debug!("sitemap"; "read sitemap/sitemapindex from {location}");
        let parsed = parse_document(&bytes)?;

        match parsed.kind {
            RootKind::UrlSet => {
                self.merge_parsed(parsed, into);
                self.documents_read += 1;
            }
            RootKind::Index => {
                if !self.allow_multifile {
                    return Err(SitemapError::IndexNotAllowed {
                        location: location.to_string(),
                    });
                }
                let mut index = SitemapIndex::default();
                for record in parsed.records {
                    if let Err(dupe) = index.add(record) {
                        log!("sitemap"; "dupe: {dupe}");
                    }
                }
                let index_is_local = is_file_uri(location);
                log!("sitemap"; "reading {} sitemaps listed in {location}", index.len());

                let part_uris: Vec<String> = index.uris().cloned().collect();
                for part_uri in part_uris {
                    let part_location = self.part_location(&part_uri, index_is_local)?;
                    let bytes = self.fetch(&part_location)?;
                    let parsed = parse_document(&bytes)?;
                    if parsed.kind != RootKind::UrlSet {
                        return Err(SitemapError::IndexWhereDocumentExpected(Box::new(parsed)));
                    }
                    debug!("sitemap"; "read sitemap from {part_location}");
                    self.merge_parsed(parsed, into);
                    self.documents_read += 1;
                }
            }
        }
        Ok(())
    }

    /// Read into a fresh [`Inventory`].
    pub fn read_inventory(&mut self, location: &str) -> Result<Inventory, SitemapError> {
        let mut inventory = Inventory::default();
        self.read(location, &mut inventory)?;
        Ok(inventory)
    }

    /// Resolve one part location of an index read from `index_is_local`
    /// storage.
    fn part_location(
        &self,
        part_uri: &str,
        index_is_local: bool,
    ) -> Result<String, SitemapError> {
        if !index_is_local || is_file_uri(part_uri) {
            return Ok(part_uri.to_string());
        }
        match &self.mapper {
            Some(mapper) => Ok(mapper.src_to_dst(part_uri)?.to_string_lossy().into_owned()),
            None => Err(SitemapError::Mapper(MapperError::UnmappedUri(
                part_uri.to_string(),
            ))),
        }
    }

    /// Parse `bytes` as a document of resources, merging into `into`.
    ///
    /// A sitemapindex root fails with
    /// [`SitemapError::IndexWhereDocumentExpected`] carrying the parsed
    /// document, so a caller anticipating the ambiguity recovers via
    /// [`Sitemap::merge_parsed`] without a second parse.
    pub fn document_parse<C>(&mut self, bytes: &[u8], into: &mut C) -> Result<(), SitemapError>
    where
        C: ResourceContainer,
    {
        self.resources_created = 0;
        let parsed = parse_document(bytes)?;
        match parsed.kind {
            RootKind::UrlSet => {
                self.merge_parsed(parsed, into);
                Ok(())
            }
            RootKind::Index => Err(SitemapError::IndexWhereDocumentExpected(Box::new(parsed))),
        }
    }

    /// Parse `bytes` as a sitemapindex, merging part descriptors into
    /// `index`. The symmetric counterpart of [`Sitemap::document_parse`]:
    /// a document of resources fails with
    /// [`SitemapError::DocumentWhereIndexExpected`].
    pub fn index_parse(
        &mut self,
        bytes: &[u8],
        index: &mut SitemapIndex,
    ) -> Result<(), SitemapError> {
        self.resources_created = 0;
        let parsed = parse_document(bytes)?;
        match parsed.kind {
            RootKind::Index => {
                self.merge_parsed(parsed, index);
                Ok(())
            }
            RootKind::UrlSet => Err(SitemapError::DocumentWhereIndexExpected(Box::new(parsed))),
        }
    }

    /// Merge an already-parsed document into a container, logging inventory
    /// duplicates and keeping the first-seen record.
    pub fn merge_parsed<C>(&mut self, parsed: ParsedDocument, into: &mut C)
    where
        C: ResourceContainer,
    {
        for record in parsed.records {
            self.resources_created += 1;
            if let Err(dupe) = into.add(record) {
                log!("sitemap"; "dupe: {dupe}");
            }
        }
    }

    /// Open a location and buffer it, recording transport statistics.
    fn fetch(&mut self, location: &str) -> Result<Vec<u8>, SitemapError> {
        let fetched = self
            .fetcher
            .open(location)
            .map_err(|source| SitemapError::Transport {
                location: location.to_string(),
                source,
            })?;
        self.content_length = fetched.content_length;
        if let Some(len) = fetched.content_length {
            self.bytes_read += len;
        }
        let mut reader = fetched.reader;
        let mut buf = Vec::new();
        reader.read_to_end(&mut buf)?;
        Ok(buf)
    }

    // ------------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------------

    /// Serialize records under the given root. Capability links are only
    /// rendered when supplied *and* non-empty; part documents pass `None`.
    pub fn container_as_xml<'a, I>(
        &self,
        kind: RootKind,
        records: I,
        capabilities: Option<&Capabilities>,
    ) -> Result<Vec<u8>, SitemapError>
    where
        I: IntoIterator<Item = &'a ResourceChange>,
    {
        let mut buf = Cursor::new(Vec::new());
        if self.pretty_xml {
            let mut writer = Writer::new_with_indent(&mut buf, b' ', 2);
            write_document(&mut writer, kind, records, capabilities)?;
        } else {
            let mut writer = Writer::new(&mut buf);
            write_document(&mut writer, kind, records, capabilities)?;
        }
        Ok(buf.into_inner())
    }
}

/// Basename with a trailing `.xml` stripped, ready for part numbering.
fn part_stem(basename: &Path) -> String {
    let name = basename.to_string_lossy();
    name.strip_suffix(".xml").unwrap_or(&name).to_string()
}

fn file_mtime(path: &Path) -> Result<Timestamp, SitemapError> {
    Ok(Timestamp::from_system_time(fs::metadata(path)?.modified()?))
}

// ============================================================================
// XML emission
// ============================================================================

fn write_document<'a, W, I>(
    writer: &mut Writer<W>,
    kind: RootKind,
    records: I,
    capabilities: Option<&Capabilities>,
) -> Result<(), SitemapError>
where
    W: Write,
    I: IntoIterator<Item = &'a ResourceChange>,
{
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let root_name = kind.root_element();
    let mut root = BytesStart::new(root_name);
    root.push_attribute(("xmlns", SITEMAP_NS));
    if kind == RootKind::UrlSet {
        root.push_attribute(("xmlns:rs", RS_NS));
    }
    let capabilities = capabilities.filter(|caps| !caps.is_empty());
    if capabilities.is_some() {
        root.push_attribute(("xmlns:xhtml", XHTML_NS));
    }
    writer.write_event(Event::Start(root))?;

    if let Some(caps) = capabilities {
        write_capabilities(writer, caps)?;
    }

    let element = match kind {
        RootKind::UrlSet => "url",
        RootKind::Index => "sitemap",
    };
    for record in records {
        write_record(writer, element, record)?;
    }

    writer.write_event(Event::End(BytesEnd::new(root_name)))?;
    Ok(())
}

/// One `<url>` (or `<sitemap>`) element.
///
/// The timestamp element depends on the change kind: no kind gives a bare
/// `<lastmod>`, created/updated a `<lastmod rs:type="...">`, deleted an
/// `<expires>` with no attribute. No timestamp, no element.
fn write_record<W: Write>(
    writer: &mut Writer<W>,
    element: &str,
    record: &ResourceChange,
) -> Result<(), SitemapError> {
    writer.write_event(Event::Start(BytesStart::new(element)))?;

    write_text_element(writer, "loc", None, &record.resource.uri)?;

    if let Some(lastmod) = record.resource.lastmod {
        match record.kind {
            None => write_text_element(writer, "lastmod", None, &lastmod.to_w3c())?,
            Some(ChangeKind::Deleted) => {
                write_text_element(writer, "expires", None, &lastmod.to_w3c())?;
            }
            Some(kind) => {
                // type_attr is always present for created/updated
                let attr = kind.type_attr().map(|value| ("rs:type", value));
                write_text_element(writer, "lastmod", attr, &lastmod.to_w3c())?;
            }
        }
    }

    if let Some(size) = record.resource.size {
        write_text_element(writer, "rs:size", None, &size.to_string())?;
    }

    if let Some(md5) = &record.resource.md5 {
        write_text_element(writer, "rs:fixity", Some(("type", "md5")), md5)?;
    }

    writer.write_event(Event::End(BytesEnd::new(element)))?;
    Ok(())
}

fn write_text_element<W: Write>(
    writer: &mut Writer<W>,
    name: &str,
    attr: Option<(&str, &str)>,
    text: &str,
) -> Result<(), SitemapError> {
    let mut start = BytesStart::new(name);
    if let Some(attr) = attr {
        start.push_attribute(attr);
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Capability links at the document/index root: one `xhtml:link` per
/// capability URI in sorted order, `href` first, remaining attributes
/// sorted, the reserved `attributes` key renamed to `rel`, multi-valued
/// attributes space-joined.
fn write_capabilities<W: Write>(
    writer: &mut Writer<W>,
    capabilities: &Capabilities,
) -> Result<(), SitemapError> {
    for (uri, attrs) in capabilities.iter() {
        let mut link = BytesStart::new("xhtml:link");
        link.push_attribute(("href", uri.as_str()));

        let renamed: BTreeMap<&str, String> = attrs
            .iter()
            .map(|(name, value)| {
                let name = if name == RESERVED_ATTR {
                    "rel"
                } else {
                    name.as_str()
                };
                (name, value.join())
            })
            .collect();
        for (name, value) in &renamed {
            link.push_attribute((*name, value.as_str()));
        }

        writer.write_event(Event::Empty(link))?;
    }
    Ok(())
}
