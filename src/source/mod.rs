//! Demonstration source: a repository of synthetic resources that changes
//! over time.
//!
//! Resources are stored by basename (e.g. `1`) for memory efficiency; full
//! records (URI, timestamp, size, MD5 of the synthetic payload) are
//! materialized on demand. Every mutation pushes a [`ChangeEvent`] onto a
//! channel, decoupling the simulation cadence from whoever publishes the
//! state (see [`publish`]).

pub mod publish;

use crate::config::{EventType, SimulateConfig};
use crate::datetime::Timestamp;
use crate::log;
use crate::resource::{ChangeKind, Resource, ResourceChange};
use crossbeam::channel::Sender;
use md5::{Digest, Md5};
use rand::Rng;
use rand::seq::{IndexedRandom, IteratorRandom};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

/// Path segment under which simulated resources are published.
const RESOURCE_PATH: &str = "/resources";

/// One observed mutation of the source.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    /// Resource state at the time of the event (for deletions: the state
    /// just removed, stamped with the deletion time).
    pub resource: Resource,
}

impl ChangeEvent {
    pub fn into_record(self) -> ResourceChange {
        ResourceChange::new(self.resource, self.kind)
    }
}

/// Stored state of one resource.
#[derive(Debug, Clone, Copy)]
struct Entry {
    timestamp: Timestamp,
    size: usize,
}

/// A source holds a set of resources and changes over time.
#[derive(Debug)]
pub struct Source {
    /// basename -> {timestamp, size}
    repository: BTreeMap<String, Entry>,
    next_id: u64,
    base_uri: String,
    average_payload: usize,
    events: Sender<ChangeEvent>,
}

impl Source {
    /// Bootstrap a source with the configured number of seed resources.
    /// Bootstrapping does not notify.
    pub fn new(base_uri: &str, config: &SimulateConfig, events: Sender<ChangeEvent>) -> Self {
        let mut source = Self {
            repository: BTreeMap::new(),
            next_id: 1,
            base_uri: base_uri.trim_end_matches('/').to_string(),
            average_payload: config.average_payload,
            events,
        };
        for _ in 0..config.resources {
            source.create_resource(None, false);
        }
        source
    }

    pub fn resource_count(&self) -> usize {
        self.repository.len()
    }

    /// Materialize every current resource, in basename order.
    pub fn resources(&self) -> impl Iterator<Item = Resource> + '_ {
        self.repository
            .iter()
            .map(|(basename, entry)| self.build_resource(basename, entry))
    }

    /// Materialize one resource from the repository.
    pub fn resource(&self, basename: &str) -> Option<Resource> {
        self.repository
            .get(basename)
            .map(|entry| self.build_resource(basename, entry))
    }

    fn build_resource(&self, basename: &str, entry: &Entry) -> Resource {
        let payload = payload(basename, entry.size);
        Resource::new(format!("{}{}/{}", self.base_uri, RESOURCE_PATH, basename))
            .with_lastmod(entry.timestamp)
            .with_size(entry.size as u64)
            .with_md5(hex::encode(Md5::digest(payload.as_bytes())))
    }

    /// Random basename of an existing resource.
    pub fn random_basename(&self, rng: &mut impl Rng) -> Option<String> {
        self.repository.keys().choose(rng).cloned()
    }

    /// Create a new resource; with `notify` an event is emitted.
    pub fn create_resource(&mut self, basename: Option<String>, notify: bool) -> String {
        let basename = basename.unwrap_or_else(|| {
            let basename = self.next_id.to_string();
            self.next_id += 1;
            basename
        });
        let size = rand::rng().random_range(0..=self.average_payload);
        self.repository.insert(
            basename.clone(),
            Entry {
                timestamp: Timestamp::now(),
                size,
            },
        );
        if notify {
            self.notify(ChangeKind::Created, &basename);
        }
        basename
    }

    /// Re-stamp an existing resource with fresh content.
    pub fn update_resource(&mut self, basename: &str) {
        if !self.repository.contains_key(basename) {
            return;
        }
        let size = rand::rng().random_range(0..=self.average_payload);
        self.repository.insert(
            basename.to_string(),
            Entry {
                timestamp: Timestamp::now(),
                size,
            },
        );
        self.notify(ChangeKind::Updated, basename);
    }

    /// Remove a resource; the event carries the removed state stamped with
    /// the deletion time.
    pub fn delete_resource(&mut self, basename: &str, notify: bool) {
        let Some(entry) = self.repository.remove(basename) else {
            return;
        };
        if notify {
            let mut resource = self.build_resource(basename, &entry);
            resource.lastmod = Some(Timestamp::now());
            self.events
                .send(ChangeEvent {
                    kind: ChangeKind::Deleted,
                    resource,
                })
                .ok();
        }
    }

    fn notify(&self, kind: ChangeKind, basename: &str) {
        if let Some(resource) = self.resource(basename) {
            self.events.send(ChangeEvent { kind, resource }).ok();
        }
    }
}

/// Synthetic payload: the basename repeated up to `size` bytes, `x`-padded.
fn payload(basename: &str, size: usize) -> String {
    let mut payload = basename.repeat(size / basename.len());
    payload.push_str(&"x".repeat(size % basename.len()));
    payload
}

/// Apply randomized events to the source at the configured frequency.
///
/// Locks the source only for the duration of each single event, so a
/// publisher thread can snapshot it between events.
pub fn simulate_changes(source: &Mutex<Source>, config: &SimulateConfig) {
    log!(
        "simulate";
        "starting change simulation with frequency {:.2} and event types {:?}",
        config.frequency,
        config.event_types
    );
    let pause = Duration::from_secs_f64(1.0 / config.frequency);
    let mut rng = rand::rng();
    let mut events: u64 = 0;

    while config.max_events.is_none_or(|max| events < max) {
        thread::sleep(pause);
        let event = config
            .event_types
            .choose(&mut rng)
            .copied()
            .unwrap_or(EventType::Create);

        let mut source = source.lock().unwrap();
        match event {
            EventType::Create => {
                source.create_resource(None, true);
            }
            EventType::Update => match source.random_basename(&mut rng) {
                Some(basename) => source.update_resource(&basename),
                None => log!("simulate"; "the repository is empty"),
            },
            EventType::Delete => match source.random_basename(&mut rng) {
                Some(basename) => source.delete_resource(&basename, true),
                None => log!("simulate"; "the repository is empty"),
            },
        }
        events += 1;
    }
    log!("simulate"; "finished change simulation after {events} events");
}
