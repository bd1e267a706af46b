//! Retrieval seam behind the codec's read path.
//!
//! The codec only needs a byte stream and, when the transport knows it, a
//! content length. [`FileFetcher`] covers local storage (plain paths and
//! `file:` URIs); remote transports plug in through the same [`Fetch`]
//! trait without touching the codec.

use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use thiserror::Error;
use url::Url;

/// Retrieval failure. `Open` is the "could not open" case the codec's
/// error taxonomy distinguishes from everything else.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("could not open {location}")]
    Open {
        location: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid file URI {0}")]
    InvalidFileUri(String),

    #[error("unsupported scheme {scheme:?} for {location}")]
    UnsupportedScheme { scheme: String, location: String },
}

/// An opened location.
pub struct Fetched {
    pub reader: Box<dyn Read>,
    /// Reported length in bytes, when the transport exposes one.
    pub content_length: Option<u64>,
}

impl fmt::Debug for Fetched {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fetched")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Retrieval collaborator: opens a location as a byte stream.
pub trait Fetch {
    fn open(&self, location: &str) -> Result<Fetched, FetchError>;
}

/// Local-storage fetcher for plain paths and `file:` URIs.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    /// Resolve a location to a filesystem path without opening it.
    fn resolve(location: &str) -> Result<PathBuf, FetchError> {
        if let Ok(url) = Url::parse(location) {
            return match url.scheme() {
                "file" => url
                    .to_file_path()
                    .map_err(|()| FetchError::InvalidFileUri(location.to_string())),
                scheme => Err(FetchError::UnsupportedScheme {
                    scheme: scheme.to_string(),
                    location: location.to_string(),
                }),
            };
        }
        // Not URI syntax: treat as a filesystem path
        Ok(PathBuf::from(location))
    }
}

impl Fetch for FileFetcher {
    fn open(&self, location: &str) -> Result<Fetched, FetchError> {
        let path = Self::resolve(location)?;
        let file = File::open(&path).map_err(|source| FetchError::Open {
            location: location.to_string(),
            source,
        })?;
        let content_length = file.metadata().ok().map(|m| m.len());
        Ok(Fetched {
            reader: Box::new(file),
            content_length,
        })
    }
}
