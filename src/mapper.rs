//! Translation between published URI space and local storage paths.
//!
//! A [`Mapper`] holds an ordered list of `(uri_prefix, path_prefix)` rules.
//! Translating rewrites the first matching prefix; the remainder of the
//! location is carried over untouched. No matching rule is a recoverable,
//! typed condition: the codec's write path falls back to a synthetic
//! `file://` URI, the read path fails because the part cannot be opened.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// No mapping rule matched the given location.
#[derive(Debug, Clone, Error)]
pub enum MapperError {
    #[error("no mapping rule matches URI {0}")]
    UnmappedUri(String),
    #[error("no mapping rule matches path {0}")]
    UnmappedPath(PathBuf),
}

/// One translation rule. Prefixes are stored without trailing separators.
#[derive(Debug, Clone)]
struct Map {
    uri_prefix: String,
    path_prefix: String,
}

impl Map {
    fn new(uri_prefix: &str, path_prefix: &str) -> Self {
        Self {
            uri_prefix: uri_prefix.trim_end_matches('/').to_string(),
            path_prefix: path_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Remainder of `location` after `prefix`, if `location` is `prefix`
    /// itself or a child of it.
    fn tail<'a>(location: &'a str, prefix: &str) -> Option<&'a str> {
        let rest = location.strip_prefix(prefix)?;
        if rest.is_empty() || rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

/// Bidirectional URI⇄path translator.
#[derive(Debug, Clone)]
pub struct Mapper {
    maps: Vec<Map>,
}

impl Mapper {
    /// Build from `(uri_prefix, path_prefix)` pairs, first match wins.
    pub fn new<'a, I>(rules: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        Self {
            maps: rules
                .into_iter()
                .map(|(uri, path)| Map::new(uri, path))
                .collect(),
        }
    }

    /// Translate a published URI into a local path.
    pub fn src_to_dst(&self, uri: &str) -> Result<PathBuf, MapperError> {
        for map in &self.maps {
            if let Some(rest) = Map::tail(uri, &map.uri_prefix) {
                return Ok(PathBuf::from(format!("{}{}", map.path_prefix, rest)));
            }
        }
        Err(MapperError::UnmappedUri(uri.to_string()))
    }

    /// Translate a local path into its published URI.
    pub fn dst_to_src(&self, path: &Path) -> Result<String, MapperError> {
        let path_str = path.to_string_lossy();
        for map in &self.maps {
            if let Some(rest) = Map::tail(&path_str, &map.path_prefix) {
                return Ok(format!("{}{}", map.uri_prefix, rest));
            }
        }
        Err(MapperError::UnmappedPath(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapper() -> Mapper {
        Mapper::new([("http://example.com", "/var/sync/example")])
    }

    #[test]
    fn test_src_to_dst() {
        assert_eq!(
            mapper().src_to_dst("http://example.com/res/1").unwrap(),
            PathBuf::from("/var/sync/example/res/1")
        );
    }

    #[test]
    fn test_dst_to_src() {
        assert_eq!(
            mapper()
                .dst_to_src(Path::new("/var/sync/example/res/1"))
                .unwrap(),
            "http://example.com/res/1"
        );
    }

    #[test]
    fn test_round_trip() {
        let m = mapper();
        let uri = "http://example.com/a/b/c.xml";
        let path = m.src_to_dst(uri).unwrap();
        assert_eq!(m.dst_to_src(&path).unwrap(), uri);
    }

    #[test]
    fn test_trailing_slashes_normalized() {
        let m = Mapper::new([("http://example.com/", "/var/sync/example/")]);
        assert_eq!(
            m.src_to_dst("http://example.com/res/1").unwrap(),
            PathBuf::from("/var/sync/example/res/1")
        );
    }

    #[test]
    fn test_first_match_wins() {
        let m = Mapper::new([
            ("http://example.com/sub", "/var/sub"),
            ("http://example.com", "/var/all"),
        ]);
        assert_eq!(
            m.src_to_dst("http://example.com/sub/x").unwrap(),
            PathBuf::from("/var/sub/x")
        );
        assert_eq!(
            m.src_to_dst("http://example.com/other/x").unwrap(),
            PathBuf::from("/var/all/other/x")
        );
    }

    #[test]
    fn test_prefix_must_end_on_segment_boundary() {
        // "http://example.common/x" must not match the "example.com" rule
        assert!(matches!(
            mapper().src_to_dst("http://example.common/x"),
            Err(MapperError::UnmappedUri(_))
        ));
    }

    #[test]
    fn test_unmapped_is_distinct_error() {
        assert!(matches!(
            mapper().src_to_dst("http://other.org/res/1"),
            Err(MapperError::UnmappedUri(_))
        ));
        assert!(matches!(
            mapper().dst_to_src(Path::new("/elsewhere/res/1")),
            Err(MapperError::UnmappedPath(_))
        ));
    }
}
