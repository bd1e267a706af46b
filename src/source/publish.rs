//! Periodic publication of the demonstration source.
//!
//! A publisher thread wakes on a timer, drains the change events
//! accumulated since the last cycle into a changeset document, then
//! regenerates the inventory snapshot and writes it (cleaning up sitemap
//! files from the previous cycle first). The inventory advertises the
//! upcoming changeset as a capability link, so a destination reading the
//! inventory knows where the next increment will appear.

use super::{ChangeEvent, Source, simulate_changes};
use crate::config::Config;
use crate::container::{
    AttrValue, Capabilities, CapabilityAttrs, ChangeSet, ResourceContainer,
};
use crate::mapper::Mapper;
use crate::resource::ResourceChange;
use crate::sitemap::Sitemap;
use crate::{debug, log};
use anyhow::Result;
use crossbeam::channel::{self, Receiver, tick};
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use std::thread;
use std::time::Duration;

/// Sitemap documents and parts from previous cycles.
static SITEMAP_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^sitemap\d*\.xml$").unwrap());

/// Delete sitemap files (from previous runs). Changesets are history and
/// stay untouched.
pub fn delete_sitemap_files(dir: &Path) -> Result<usize> {
    let mut removed = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if SITEMAP_FILE.is_match(&entry.file_name().to_string_lossy()) {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    if removed > 0 {
        debug!("publish"; "cleaned up {removed} sitemap files");
    }
    Ok(removed)
}

// ============================================================================
// Publisher
// ============================================================================

struct Publisher {
    codec: Sitemap,
    events: Receiver<ChangeEvent>,
    source: Arc<Mutex<Source>>,
    config: Config,
    /// Sequence number of the next changeset document.
    changeset_seq: u64,
}

impl Publisher {
    fn changeset_name(&self) -> String {
        format!("changeset{:05}.xml", self.changeset_seq)
    }

    fn changeset_uri(&self) -> String {
        format!(
            "{}/{}",
            self.config.publish.base_uri.trim_end_matches('/'),
            self.changeset_name()
        )
    }

    /// One publication cycle: drain changes, then republish the snapshot.
    fn cycle(&mut self) -> Result<()> {
        let dir = self.config.publish.directory.clone();

        let mut changes = ChangeSet::default();
        for event in self.events.try_iter() {
            changes.add(event.into_record()).ok();
        }
        if !changes.is_empty() {
            let path = dir.join(self.changeset_name());
            self.codec.write_changeset(&changes, &path)?;
            log!("publish"; "wrote {} changes to {}", changes.len(), path.display());
            self.changeset_seq += 1;
        }

        // Snapshot while holding the lock, write after releasing it
        let resources: Vec<ResourceChange> = {
            let source = self.source.lock().unwrap();
            source.resources().map(Into::into).collect()
        };
        let count = resources.len();

        let mut capabilities = Capabilities::default();
        let mut attrs = CapabilityAttrs::new();
        attrs.insert("type".to_string(), AttrValue::One("changeset".into()));
        capabilities.insert(self.changeset_uri(), attrs);

        delete_sitemap_files(&dir)?;
        let basename = dir.join(&self.config.publish.document);
        self.codec.write(resources, &capabilities, &basename)?;
        log!("publish"; "published inventory of {count} resources");
        Ok(())
    }

    /// Publish on every tick until the stop channel disconnects, then
    /// flush once more so no event is lost.
    fn run(mut self, stop: Receiver<()>) {
        let ticker = tick(Duration::from_secs(self.config.publish.interval.max(1)));
        loop {
            crossbeam::select! {
                recv(ticker) -> _ => {
                    if let Err(err) = self.cycle() {
                        log!("error"; "publication failed: {err:#}");
                    }
                }
                recv(stop) -> _ => break,
            }
        }
        if let Err(err) = self.cycle() {
            log!("error"; "final publication failed: {err:#}");
        }
    }
}

/// Run the demonstration source: bootstrap, publish periodically, simulate
/// changes until the configured event count is reached.
pub fn run(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.publish.directory)?;

    let (events_tx, events_rx) = channel::unbounded();
    let source = Arc::new(Mutex::new(Source::new(
        &config.publish.base_uri,
        &config.simulate,
        events_tx,
    )));
    log!(
        "source";
        "bootstrapped source with {} resources",
        source.lock().unwrap().resource_count()
    );

    let publisher = Publisher {
        codec: publishing_codec(config),
        events: events_rx,
        source: Arc::clone(&source),
        config: config.clone(),
        changeset_seq: 0,
    };
    let (stop_tx, stop_rx) = channel::bounded::<()>(0);
    let handle = thread::spawn(move || publisher.run(stop_rx));

    simulate_changes(&source, &config.simulate);

    // Disconnecting stops the publisher after a final flush
    drop(stop_tx);
    handle
        .join()
        .map_err(|_| anyhow::anyhow!("publisher thread panicked"))?;
    Ok(())
}

/// Codec configured for publication: the mapper turns written part paths
/// back into URIs under the published base.
fn publishing_codec(config: &Config) -> Sitemap {
    let directory: PathBuf = config.publish.directory.clone();
    let mapper = Mapper::new([(
        config.publish.base_uri.as_str(),
        directory.to_string_lossy().as_ref(),
    )]);
    let mut codec = Sitemap::new().with_mapper(mapper);
    codec.max_entries = config.codec.max_entries;
    codec.allow_multifile = config.codec.allow_multifile;
    codec.pretty_xml = config.codec.pretty_xml;
    codec
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PublishConfig, SimulateConfig};
    use crate::container::Inventory;

    #[test]
    fn test_delete_sitemap_files_matches_pattern() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "sitemap.xml",
            "sitemap00000.xml",
            "sitemap00001.xml",
            "changeset00000.xml",
            "notes.txt",
        ] {
            fs::write(dir.path().join(name), "x").unwrap();
        }

        let removed = delete_sitemap_files(dir.path()).unwrap();
        assert_eq!(removed, 3);
        assert!(dir.path().join("changeset00000.xml").exists());
        assert!(dir.path().join("notes.txt").exists());
        assert!(!dir.path().join("sitemap.xml").exists());
    }

    fn test_config(dir: &Path, resources: usize) -> Config {
        Config {
            publish: PublishConfig {
                directory: dir.to_path_buf(),
                ..PublishConfig::default()
            },
            simulate: SimulateConfig {
                resources,
                ..SimulateConfig::default()
            },
            ..Config::default()
        }
    }

    #[test]
    fn test_publication_cycle_writes_inventory_and_changeset() {
        let dir = tempfile::tempdir().unwrap();
        let config = test_config(dir.path(), 3);

        let (events_tx, events_rx) = channel::unbounded();
        let source = Arc::new(Mutex::new(Source::new(
            &config.publish.base_uri,
            &config.simulate,
            events_tx,
        )));
        let mut publisher = Publisher {
            codec: publishing_codec(&config),
            events: events_rx,
            source: Arc::clone(&source),
            config: config.clone(),
            changeset_seq: 0,
        };

        // A cycle with no pending changes publishes the inventory only
        publisher.cycle().unwrap();
        let sitemap = dir.path().join("sitemap.xml");
        assert!(sitemap.exists());
        assert!(!dir.path().join("changeset00000.xml").exists());

        let xml = fs::read_to_string(&sitemap).unwrap();
        assert!(xml.contains(r#"href="http://localhost:8888/changeset00000.xml""#));
        assert!(xml.contains(r#"type="changeset""#));

        // Mutations between cycles end up in the next changeset
        {
            let mut source = source.lock().unwrap();
            source.create_resource(None, true);
            source.delete_resource("1", true);
        }
        publisher.cycle().unwrap();

        let mut codec = Sitemap::new();
        let changeset = dir.path().join("changeset00000.xml");
        let mut merged = crate::container::ChangeSet::default();
        codec
            .read(changeset.to_str().unwrap(), &mut merged)
            .unwrap();
        assert_eq!(merged.len(), 2);

        // The refreshed inventory advertises the following changeset
        let xml = fs::read_to_string(&sitemap).unwrap();
        assert!(xml.contains(r#"href="http://localhost:8888/changeset00001.xml""#));

        // And the published snapshot reflects the mutations
        let inventory: Inventory = codec.read_inventory(sitemap.to_str().unwrap()).unwrap();
        assert_eq!(inventory.len(), 3);
    }
}
