//! In-process catalog server and replica.

use std::collections::{BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;

use crate::cache::client::{CatalogUpdate, RemoteCatalog};
use crate::cache::replica::SchemaReplica;
use crate::common::{Error, Result};

/// A [`RemoteCatalog`] that serves prepared responses in order.
#[derive(Debug, Default)]
pub struct MemoryCatalog {
    responses: Mutex<VecDeque<CatalogUpdate>>,
    requests: Mutex<Vec<String>>,
    stale_notifications: AtomicUsize,
    reject_stale: AtomicBool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the response for the next `get_catalog`.
    pub fn push(&self, update: CatalogUpdate) {
        self.responses.lock().push_back(update);
    }

    /// Names requested so far, oldest first.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().clone()
    }

    pub fn stale_notifications(&self) -> usize {
        self.stale_notifications.load(Ordering::Relaxed)
    }

    /// Make `mark_replica_stale` fail (after counting the notification).
    pub fn set_reject_stale(&self, reject: bool) {
        self.reject_stale.store(reject, Ordering::Relaxed);
    }
}

impl RemoteCatalog for MemoryCatalog {
    fn get_catalog(&self, name: &str) -> Result<CatalogUpdate> {
        self.requests.lock().push(name.to_string());
        self.responses
            .lock()
            .pop_front()
            .ok_or_else(|| Error::Remote(format!("no catalog prepared for {}", name)))
    }

    fn mark_replica_stale(&self) -> Result<()> {
        self.stale_notifications.fetch_add(1, Ordering::Relaxed);
        if self.reject_stale.load(Ordering::Relaxed) {
            return Err(Error::Remote("connection lost".into()));
        }
        Ok(())
    }
}

/// A replica holding the set of catalog object names.
///
/// Understands `create <name>` and `drop <name>` statements separated by `;`.
#[derive(Debug, Default)]
pub struct ScriptedReplica {
    objects: BTreeSet<String>,
    applied: Vec<String>,
    clears: usize,
}

impl ScriptedReplica {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.objects.contains(name)
    }

    pub fn objects(&self) -> impl Iterator<Item = &str> + '_ {
        self.objects.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Every statement applied since creation, across rebuilds.
    pub fn applied(&self) -> &[String] {
        &self.applied
    }

    /// Number of times the replica was cleared.
    pub fn clears(&self) -> usize {
        self.clears
    }

    fn execute(&mut self, statement: &str) -> Result<()> {
        let mut words = statement.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("create"), Some(name), None) => {
                if !self.objects.insert(name.to_string()) {
                    return Err(Error::Remote(format!("{} already exists", name)));
                }
            }
            (Some("drop"), Some(name), None) => {
                if !self.objects.remove(name) {
                    return Err(Error::Remote(format!("{} does not exist", name)));
                }
            }
            _ => return Err(Error::Remote(format!("unrecognized statement: {}", statement))),
        }
        self.applied.push(statement.to_string());
        Ok(())
    }
}

impl SchemaReplica for ScriptedReplica {
    fn clear(&mut self) {
        self.objects.clear();
        self.clears += 1;
    }

    fn apply_script(&mut self, script: &str) -> Result<()> {
        script
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .try_for_each(|statement| self.execute(statement))
    }
}
