//! `write` command: publish a directory of files as a sitemap.
//!
//! Scans a directory tree, maps each file path to its published URI, and
//! hands the resulting inventory to the codec. With `--md5` each file is
//! read once to attach a fixity digest.

use crate::config::Config;
use crate::container::{Inventory, ResourceContainer};
use crate::datetime::Timestamp;
use crate::log;
use crate::mapper::Mapper;
use crate::resource::Resource;
use crate::sitemap::Sitemap;
use anyhow::{Context, Result};
use md5::{Digest, Md5};
use std::fs;
use std::path::{Path, PathBuf};

pub fn run(
    dir: &Path,
    output: Option<&Path>,
    base_uri: Option<&str>,
    md5: bool,
    config: &Config,
) -> Result<()> {
    let dir = dir
        .canonicalize()
        .with_context(|| format!("cannot scan {}", dir.display()))?;
    let base_uri = base_uri.unwrap_or(&config.publish.base_uri);
    let mapper = Mapper::new([(base_uri, dir.to_string_lossy().as_ref())]);

    let mut inventory = Inventory::default();
    for path in collect_files(&dir)? {
        let record = file_resource(&path, &mapper, md5)?;
        if let Err(dupe) = inventory.add(record.into()) {
            log!("write"; "dupe: {dupe}");
        }
    }
    log!("write"; "scanned {} files under {}", inventory.len(), dir.display());

    let mut codec = Sitemap::new().with_mapper(mapper);
    codec.max_entries = config.codec.max_entries;
    codec.allow_multifile = config.codec.allow_multifile;
    codec.pretty_xml = config.codec.pretty_xml;

    let basename = output.unwrap_or(Path::new("sitemap.xml"));
    let written = codec.write_inventory(&inventory, basename)?;
    log!("write"; "wrote {} documents", written.len());
    Ok(())
}

/// Files under `dir`, recursively, in sorted order.
fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut entries: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("cannot read {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .collect();
    entries.sort();

    for path in entries {
        if path.is_dir() {
            files.extend(collect_files(&path)?);
        } else if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Build the record for one scanned file.
fn file_resource(path: &Path, mapper: &Mapper, md5: bool) -> Result<Resource> {
    let uri = mapper.dst_to_src(path)?;
    let metadata = fs::metadata(path)?;
    let mut resource = Resource::new(uri).with_size(metadata.len());
    if let Ok(modified) = metadata.modified() {
        resource = resource.with_lastmod(Timestamp::from_system_time(modified));
    }
    if md5 {
        let content = fs::read(path)?;
        resource = resource.with_md5(hex::encode(Md5::digest(&content)));
    }
    Ok(resource)
}
