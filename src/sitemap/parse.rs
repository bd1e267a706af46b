//! Lax, namespace-aware document parsing.
//!
//! The parser extracts only the elements it recognizes and leaves
//! everything else alone: unknown elements and attributes are skipped,
//! never rejected, which keeps the format forward compatible without a
//! schema validator. The one hard requirement per record is a `<loc>`
//! element; provided that is present, everything else is best effort.

use super::error::SitemapError;
use super::{RS_NS, SITEMAP_NS};
use crate::datetime::Timestamp;
use crate::log;
use crate::resource::{ChangeKind, Resource, ResourceChange};
use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use std::borrow::Cow;
use std::mem;

/// Which vocabulary a document's root belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootKind {
    /// `<urlset>`: a document of resources.
    UrlSet,
    /// `<sitemapindex>`: a document referencing part documents.
    Index,
}

impl RootKind {
    /// Name of the per-record element under this root.
    pub(crate) const fn record_element(self) -> &'static [u8] {
        match self {
            Self::UrlSet => b"url",
            Self::Index => b"sitemap",
        }
    }

    pub(crate) const fn root_element(self) -> &'static str {
        match self {
            Self::UrlSet => "urlset",
            Self::Index => "sitemapindex",
        }
    }
}

/// Outcome of parsing one document, whichever vocabulary it turned out to
/// carry. Attached to mismatch errors so the caller can dispatch to the
/// other path without re-reading.
#[derive(Debug)]
pub struct ParsedDocument {
    pub kind: RootKind,
    /// Records in document order.
    pub records: Vec<ResourceChange>,
}

// ============================================================================
// Event loop
// ============================================================================

/// Namespace of the current element, reduced to the two we care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Ns {
    Sitemap,
    Rs,
    Other,
}

impl Ns {
    fn of(resolve: &ResolveResult<'_>) -> Self {
        match resolve {
            ResolveResult::Bound(Namespace(n)) if *n == SITEMAP_NS.as_bytes() => Self::Sitemap,
            ResolveResult::Bound(Namespace(n)) if *n == RS_NS.as_bytes() => Self::Rs,
            _ => Self::Other,
        }
    }
}

/// Recognized children of a record element.
enum Field {
    Loc,
    Lastmod,
    Expires,
    Size,
    Fixity,
}

/// Raw extracted fields of one record, resolved in [`RecordBuilder::build`].
#[derive(Default)]
struct RecordBuilder {
    loc: Option<String>,
    lastmod: Option<String>,
    lastmod_type: Option<String>,
    expires: Option<String>,
    size: Option<String>,
    fixity_type: Option<String>,
    fixity: Option<String>,
}

/// Parse a complete document, detecting which vocabulary it carries.
pub fn parse_document(bytes: &[u8]) -> Result<ParsedDocument, SitemapError> {
    let mut reader = NsReader::from_reader(bytes);
    reader.config_mut().trim_text(true);

    let mut kind: Option<RootKind> = None;
    let mut records = Vec::new();
    let mut record: Option<RecordBuilder> = None;
    let mut field: Option<Field> = None;
    let mut text = String::new();

    loop {
        let (resolve, event) = reader.read_resolved_event()?;
        // Reduce the namespace to a value so the reader is free again
        let ns = Ns::of(&resolve);

        match event {
            Event::Start(e) => {
                let Some(k) = kind else {
                    kind = Some(root_kind(ns, &e)?);
                    continue;
                };
                match record.as_mut() {
                    None => {
                        if ns == Ns::Sitemap && e.local_name().as_ref() == k.record_element() {
                            record = Some(RecordBuilder::default());
                        } else {
                            // Unknown subtree at container level
                            reader.read_to_end(e.name())?;
                        }
                    }
                    Some(builder) if field.is_none() => {
                        match start_field(&reader, ns, &e, builder) {
                            Some(f) => field = Some(f),
                            // Unknown element inside a record
                            None => {
                                reader.read_to_end(e.name())?;
                            }
                        }
                    }
                    // Element nested inside a captured field
                    Some(_) => {
                        reader.read_to_end(e.name())?;
                    }
                }
            }
            Event::Empty(e) => {
                if kind.is_none() {
                    // Self-closing root: an empty document
                    kind = Some(root_kind(ns, &e)?);
                } else if field.is_none()
                    && let Some(builder) = record.as_mut()
                    && let Some(f) = start_field(&reader, ns, &e, builder)
                {
                    end_field(builder, f, String::new());
                }
                // Anything else (capability links and the like) is skipped
            }
            Event::Text(t) => {
                if field.is_some() {
                    text.push_str(&unescape_entities(&String::from_utf8_lossy(t.as_ref())));
                }
            }
            Event::CData(c) => {
                if field.is_some() {
                    text.push_str(&String::from_utf8_lossy(c.as_ref()));
                }
            }
            Event::GeneralRef(r) => {
                if field.is_some() {
                    let entity = String::from_utf8_lossy(r.as_ref());
                    match decode_entity(&entity) {
                        Some(ch) => text.push(ch),
                        None => log!("sitemap"; "skipping unresolvable entity &{entity};"),
                    }
                }
            }
            Event::End(_) => {
                if record.is_some() {
                    match field.take() {
                        Some(f) => {
                            if let Some(builder) = record.as_mut() {
                                end_field(builder, f, mem::take(&mut text));
                            }
                        }
                        None => {
                            // End of the record element itself
                            if let Some(builder) = record.take() {
                                let element =
                                    kind.map_or(&b"url"[..], RootKind::record_element);
                                records.push(builder.build(element)?);
                            }
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    match kind {
        Some(kind) => Ok(ParsedDocument { kind, records }),
        None => Err(SitemapError::UnknownRoot(String::new())),
    }
}

/// Classify the root element.
fn root_kind(ns: Ns, e: &BytesStart<'_>) -> Result<RootKind, SitemapError> {
    if ns == Ns::Sitemap {
        match e.local_name().as_ref() {
            b"urlset" => return Ok(RootKind::UrlSet),
            b"sitemapindex" => return Ok(RootKind::Index),
            _ => {}
        }
    }
    Err(SitemapError::UnknownRoot(
        String::from_utf8_lossy(e.name().as_ref()).into_owned(),
    ))
}

/// Classify a child element of a record and capture its attributes.
/// Returns `None` for elements the parser does not recognize.
fn start_field(
    reader: &NsReader<&[u8]>,
    ns: Ns,
    e: &BytesStart<'_>,
    builder: &mut RecordBuilder,
) -> Option<Field> {
    match ns {
        Ns::Sitemap => match e.local_name().as_ref() {
            b"loc" => Some(Field::Loc),
            b"lastmod" => {
                builder.lastmod_type = rs_type_attr(reader, e);
                Some(Field::Lastmod)
            }
            b"expires" => Some(Field::Expires),
            _ => None,
        },
        Ns::Rs => match e.local_name().as_ref() {
            b"size" => Some(Field::Size),
            b"fixity" => {
                builder.fixity_type = plain_type_attr(e);
                Some(Field::Fixity)
            }
            _ => None,
        },
        Ns::Other => None,
    }
}

/// Store the accumulated text of a finished field.
fn end_field(builder: &mut RecordBuilder, field: Field, text: String) {
    match field {
        Field::Loc => builder.loc = Some(text),
        Field::Lastmod => builder.lastmod = Some(text),
        Field::Expires => builder.expires = Some(text),
        Field::Size => builder.size = Some(text),
        Field::Fixity => builder.fixity = Some(text),
    }
}

impl RecordBuilder {
    /// Resolve raw fields into a record, applying the lax rules: the
    /// location is mandatory, an expiry beats a plain lastmod (with a
    /// warning when both appear), malformed sizes are fatal, unsupported
    /// fixity algorithms are dropped with a warning.
    fn build(self, element: &[u8]) -> Result<ResourceChange, SitemapError> {
        let loc = match self.loc {
            Some(loc) if !loc.is_empty() => loc,
            _ => {
                return Err(SitemapError::MissingLoc {
                    element: String::from_utf8_lossy(element).into_owned(),
                });
            }
        };

        let mut resource = Resource::new(loc);
        let mut kind = None;

        if let Some(raw) = &self.lastmod {
            match Timestamp::parse_w3c(raw) {
                Some(ts) => resource.lastmod = Some(ts),
                None => log!("sitemap"; "bad <lastmod> {:?} for {}", raw, resource.uri),
            }
        }
        match self.lastmod_type.as_deref() {
            Some("created") => kind = Some(ChangeKind::Created),
            Some("updated") => kind = Some(ChangeKind::Updated),
            Some(other) => {
                log!("sitemap"; "bad rs:type {:?} for <lastmod> for {}", other, resource.uri);
            }
            None => {}
        }

        if let Some(raw) = &self.expires {
            if self.lastmod.is_some() {
                log!("sitemap"; "got <lastmod> and <expires> for {}", resource.uri);
            }
            kind = Some(ChangeKind::Deleted);
            match Timestamp::parse_w3c(raw) {
                Some(ts) => resource.lastmod = Some(ts),
                None => log!("sitemap"; "bad <expires> {:?} for {}", raw, resource.uri),
            }
        }

        if let Some(raw) = &self.size {
            resource.size = Some(raw.trim().parse().map_err(|_| SitemapError::InvalidSize {
                uri: resource.uri.clone(),
                value: raw.clone(),
            })?);
        }

        // ResourceSync lists md5, sha-1 and sha-256 fixity digest types.
        // Currently only md5 is supported, anything else is dropped.
        match self.fixity_type.as_deref() {
            Some("md5") => resource.md5 = self.fixity,
            Some(ty @ ("sha-1" | "sha-256")) => {
                log!("sitemap"; "unsupported type ({}) in <rs:fixity> for {}", ty, resource.uri);
            }
            Some(ty) => {
                log!("sitemap"; "unknown type ({}) in <rs:fixity> for {}", ty, resource.uri);
            }
            None => {}
        }

        Ok(ResourceChange { resource, kind })
    }
}

// ============================================================================
// Low-level helpers
// ============================================================================

/// Namespaced `rs:type` attribute, as carried by `<lastmod>`.
fn rs_type_attr(reader: &NsReader<&[u8]>, e: &BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        let (resolve, local) = reader.resolve_attribute(attr.key);
        if local.as_ref() == b"type" && Ns::of(&resolve) == Ns::Rs {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Unqualified `type` attribute, as carried by `<rs:fixity>`.
fn plain_type_attr(e: &BytesStart<'_>) -> Option<String> {
    for attr in e.attributes().flatten() {
        if attr.key.as_ref() == b"type" {
            return Some(String::from_utf8_lossy(&attr.value).into_owned());
        }
    }
    None
}

/// Resolve one entity reference: the predefined XML entities plus numeric
/// character references (`#38`, `#x26`).
fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "lt" => Some('<'),
        "gt" => Some('>'),
        "amp" => Some('&'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        s if s.starts_with('#') => {
            let code = if s.starts_with("#x") || s.starts_with("#X") {
                u32::from_str_radix(&s[2..], 16).ok()
            } else {
                s[1..].parse().ok()
            };
            code.and_then(char::from_u32)
        }
        _ => None,
    }
}

/// Unescape entity references left inline in text content; anything
/// unresolvable stays verbatim.
fn unescape_entities(s: &str) -> Cow<'_, str> {
    if !s.contains('&') {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars();

    while let Some(c) = chars.next() {
        if c != '&' {
            result.push(c);
            continue;
        }

        let mut entity = String::new();
        let mut terminated = false;
        for c in chars.by_ref() {
            if c == ';' {
                terminated = true;
                break;
            }
            entity.push(c);
            if entity.len() > 10 {
                // Too long, not a valid entity
                break;
            }
        }

        match decode_entity(&entity) {
            Some(c) if terminated => result.push(c),
            _ => {
                result.push('&');
                result.push_str(&entity);
                if terminated {
                    result.push(';');
                }
            }
        }
    }
    Cow::Owned(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
        xmlns:rs="http://www.openarchives.org/rs/terms/">
<url>
  <loc>http://example.com/res/1</loc>
  <lastmod>2012-03-08T01:02:03Z</lastmod>
  <rs:size>12</rs:size>
  <rs:fixity type="md5">6f5902ac237024bdd0c176cb93063dc4</rs:fixity>
</url>
</urlset>"#;

    #[test]
    fn test_parse_plain_document() {
        let parsed = parse_document(DOC.as_bytes()).unwrap();
        assert_eq!(parsed.kind, RootKind::UrlSet);
        assert_eq!(parsed.records.len(), 1);

        let r = &parsed.records[0].resource;
        assert_eq!(r.uri, "http://example.com/res/1");
        assert_eq!(r.lastmod, Timestamp::parse_w3c("2012-03-08T01:02:03Z"));
        assert_eq!(r.size, Some(12));
        assert_eq!(r.md5.as_deref(), Some("6f5902ac237024bdd0c176cb93063dc4"));
        assert_eq!(parsed.records[0].kind, None);
    }

    #[test]
    fn test_parse_sitemapindex() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<sitemap><loc>http://example.com/sitemap00000.xml</loc>
<lastmod>2004-10-01T18:23:17+00:00</lastmod></sitemap>
<sitemap><loc>http://example.com/sitemap00001.xml</loc></sitemap>
</sitemapindex>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.kind, RootKind::Index);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(
            parsed.records[0].uri(),
            "http://example.com/sitemap00000.xml"
        );
        assert_eq!(
            parsed.records[0].lastmod(),
            Timestamp::parse_w3c("2004-10-01T18:23:17Z")
        );
    }

    #[test]
    fn test_change_type_attribute() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
 xmlns:rs="http://www.openarchives.org/rs/terms/">
<url><loc>http://example.com/a</loc>
  <lastmod rs:type="created">2012-03-08T01:02:03Z</lastmod></url>
<url><loc>http://example.com/b</loc>
  <lastmod rs:type="updated">2012-03-08T01:02:03Z</lastmod></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].kind, Some(ChangeKind::Created));
        assert_eq!(parsed.records[1].kind, Some(ChangeKind::Updated));
    }

    #[test]
    fn test_unknown_change_type_is_dropped() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
 xmlns:rs="http://www.openarchives.org/rs/terms/">
<url><loc>http://example.com/a</loc>
  <lastmod rs:type="destroyed">2012-03-08T01:02:03Z</lastmod></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].kind, None);
        assert!(parsed.records[0].lastmod().is_some());
    }

    #[test]
    fn test_expires_means_deleted() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<url><loc>http://example.com/gone</loc>
  <expires>2012-03-08T01:02:03Z</expires></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].kind, Some(ChangeKind::Deleted));
        assert_eq!(
            parsed.records[0].lastmod(),
            Timestamp::parse_w3c("2012-03-08T01:02:03Z")
        );
    }

    #[test]
    fn test_expires_beats_lastmod_on_conflict() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<url><loc>http://example.com/gone</loc>
  <lastmod>2012-01-01T00:00:00Z</lastmod>
  <expires>2012-03-08T01:02:03Z</expires></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].kind, Some(ChangeKind::Deleted));
        // The expiry timestamp wins
        assert_eq!(
            parsed.records[0].lastmod(),
            Timestamp::parse_w3c("2012-03-08T01:02:03Z")
        );
    }

    #[test]
    fn test_missing_loc_is_fatal() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<url><lastmod>2012-03-08T01:02:03Z</lastmod></url>
</urlset>"#;
        let err = parse_document(doc.as_bytes()).unwrap_err();
        assert!(matches!(err, SitemapError::MissingLoc { element } if element == "url"));
    }

    #[test]
    fn test_invalid_size_is_fatal() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
 xmlns:rs="http://www.openarchives.org/rs/terms/">
<url><loc>http://example.com/a</loc><rs:size>many</rs:size></url>
</urlset>"#;
        let err = parse_document(doc.as_bytes()).unwrap_err();
        match err {
            SitemapError::InvalidSize { uri, value } => {
                assert_eq!(uri, "http://example.com/a");
                assert_eq!(value, "many");
            }
            other => panic!("expected InvalidSize, got {other:?}"),
        }
    }

    #[test]
    fn test_unsupported_fixity_dropped() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
 xmlns:rs="http://www.openarchives.org/rs/terms/">
<url><loc>http://example.com/a</loc>
  <rs:fixity type="sha-256">deadbeef</rs:fixity></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].resource.md5, None);
    }

    #[test]
    fn test_unknown_root_is_format_error() {
        let err = parse_document(b"<feed xmlns=\"http://www.w3.org/2005/Atom\"/>").unwrap_err();
        assert!(matches!(err, SitemapError::UnknownRoot(name) if name == "feed"));
    }

    #[test]
    fn test_wrong_namespace_root_is_format_error() {
        let err = parse_document(b"<urlset xmlns=\"http://example.com/other\"/>").unwrap_err();
        assert!(matches!(err, SitemapError::UnknownRoot(_)));
    }

    #[test]
    fn test_unknown_elements_ignored() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9"
 xmlns:x="http://example.com/ext">
<x:meta><x:inner>noise</x:inner></x:meta>
<url><loc>http://example.com/a</loc>
  <x:note>ignored<x:deep/></x:note>
  <priority>0.5</priority></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records.len(), 1);
        assert_eq!(parsed.records[0].uri(), "http://example.com/a");
    }

    #[test]
    fn test_entity_references_in_loc() {
        let doc = r#"<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
<url><loc>http://example.com/search?q=a&amp;b=c</loc></url>
</urlset>"#;
        let parsed = parse_document(doc.as_bytes()).unwrap();
        assert_eq!(parsed.records[0].uri(), "http://example.com/search?q=a&b=c");
    }

    #[test]
    fn test_unescape_entities() {
        assert_eq!(unescape_entities("plain"), "plain");
        assert_eq!(unescape_entities("a &amp; b"), "a & b");
        assert_eq!(unescape_entities("&#65;&#x42;"), "AB");
        assert_eq!(unescape_entities("&unknown; stays"), "&unknown; stays");
        assert_eq!(unescape_entities("dangling &amp"), "dangling &amp");
    }

    #[test]
    fn test_empty_document() {
        let parsed =
            parse_document(b"<urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\"/>")
                .unwrap();
        assert_eq!(parsed.kind, RootKind::UrlSet);
        assert!(parsed.records.is_empty());
    }
}
