//! `read` command: consume a sitemap or sitemapindex and report on it.

use crate::config::Config;
use crate::container::{ChangeSet, Inventory, ResourceContainer};
use crate::mapper::Mapper;
use crate::resource::ResourceChange;
use crate::sitemap::Sitemap;
use crate::{debug, log};
use anyhow::{Result, bail};

pub fn run(location: &str, changeset: bool, maps: &[String], config: &Config) -> Result<()> {
    let mut codec = Sitemap::new();
    codec.max_entries = config.codec.max_entries;
    codec.allow_multifile = config.codec.allow_multifile;
    if let Some(mapper) = parse_maps(maps)? {
        codec.mapper = Some(mapper);
    }

    if changeset {
        let mut changes = ChangeSet::default();
        codec.read(location, &mut changes)?;
        report(&codec, changes.len(), "changes");
        list_records(changes.iter());
    } else {
        let mut inventory = Inventory::default();
        codec.read(location, &mut inventory)?;
        report(&codec, inventory.len(), "resources");
        list_records(inventory.iter());
    }
    Ok(())
}

/// Parse repeated `uri=path` rules into a mapper.
fn parse_maps(maps: &[String]) -> Result<Option<Mapper>> {
    if maps.is_empty() {
        return Ok(None);
    }
    let mut rules = Vec::with_capacity(maps.len());
    for rule in maps {
        match rule.split_once('=') {
            Some((uri, path)) if !uri.is_empty() && !path.is_empty() => rules.push((uri, path)),
            _ => bail!("invalid mapping rule {rule:?}, expected URI=PATH"),
        }
    }
    Ok(Some(Mapper::new(rules)))
}

fn report(codec: &Sitemap, count: usize, what: &str) {
    log!(
        "read";
        "{} {} from {} documents ({} bytes)",
        count,
        what,
        codec.documents_read,
        codec.bytes_read
    );
}

/// Per-record detail, shown with --verbose only.
fn list_records<'a>(records: impl Iterator<Item = &'a ResourceChange>) {
    for record in records {
        let kind = record
            .kind
            .map(|kind| format!(" [{kind}]"))
            .unwrap_or_default();
        let lastmod = record
            .lastmod()
            .map(|ts| ts.to_w3c())
            .unwrap_or_else(|| "-".into());
        debug!("read"; "{}{} {}", record.uri(), kind, lastmod);
    }
}
