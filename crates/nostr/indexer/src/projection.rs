//! In-memory projection: the latest version of every addressable event plus
//! an append-only log of regular events.
//!
//! The projection is plain data. The [`Indexer`](crate::Indexer) owns the only
//! writer; everything here is synchronous and never blocks.

use crate::change::{Change, ChangeKey};
use nostr::{
    Admissible, Admission, AdmissionKey, Event, Filter, resolve, sort_events, version_order,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Counts describing the projection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectionStats {
    /// Regular events in the log
    pub regular: usize,
    /// Current addressable versions, one per `(kind, pubkey, d)`
    pub addressable: usize,
    /// Distinct kinds seen across both
    pub kinds: usize,
}

#[derive(Debug, Default)]
pub struct Projection {
    /// `(kind, d)` → author → current version
    addresses: HashMap<(u16, String), HashMap<String, Event>>,
    log: Vec<Event>,
    log_ids: HashSet<String>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the replace-on-write rule. Returns the outcome and, if anything
    /// changed, the notification to broadcast.
    pub fn admit(&mut self, admissible: Admissible) -> (Admission, Option<Change>) {
        let (event, key) = admissible.into_parts();

        match key {
            AdmissionKey::Event { ref id } => {
                if self.log_ids.contains(id) {
                    return (Admission::Duplicate, None);
                }
                self.log_ids.insert(id.clone());
                let change = Change {
                    kind: event.kind,
                    key: ChangeKey::from(&key),
                    event: event.clone(),
                    replaced: None,
                };
                self.log.push(event);
                (Admission::Admitted, Some(change))
            }
            AdmissionKey::Address {
                kind,
                ref pubkey,
                ref d,
            } => {
                let slot = self.addresses.entry((kind, d.clone())).or_default();
                let admission = resolve(slot.get(pubkey), &event);
                if !admission.is_stored() {
                    return (admission, None);
                }

                let replaced = match &admission {
                    Admission::Replaced { previous } => Some(previous.clone()),
                    _ => None,
                };
                let change = Change {
                    kind,
                    key: ChangeKey::from(&key),
                    event: event.clone(),
                    replaced,
                };
                slot.insert(pubkey.clone(), event);
                (admission, Some(change))
            }
        }
    }

    /// Latest version of `(kind, d)` across all authors, by `(created_at, id)`.
    pub fn get(&self, kind: u16, d: &str) -> Option<&Event> {
        self.addresses
            .get(&(kind, d.to_string()))?
            .values()
            .max_by(|a, b| {
                version_order((a.created_at, a.id.as_str()), (b.created_at, b.id.as_str()))
            })
    }

    pub fn get_authored(&self, kind: u16, pubkey: &str, d: &str) -> Option<&Event> {
        self.addresses.get(&(kind, d.to_string()))?.get(pubkey)
    }

    /// Every current event of `kind`, newest first.
    pub fn list(&self, kind: u16) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .addresses
            .iter()
            .filter(|((k, _), _)| *k == kind)
            .flat_map(|(_, authors)| authors.values().cloned())
            .chain(self.log.iter().filter(|e| e.kind == kind).cloned())
            .collect();
        sort_events(&mut events);
        events
    }

    /// Regular events matching `predicate`, in admission order.
    pub fn log<F>(&self, predicate: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        self.log.iter().filter(|e| predicate(e)).cloned().collect()
    }

    /// Current events matching `filter`, newest first, capped by its limit.
    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        let mut events: Vec<Event> = self
            .current()
            .filter(|event| filter.matches(event))
            .cloned()
            .collect();
        sort_events(&mut events);
        if let Some(limit) = filter.limit {
            events.truncate(limit);
        }
        events
    }

    pub fn contains(&self, id: &str) -> bool {
        self.log_ids.contains(id) || self.current().any(|event| event.id == id)
    }

    pub fn len(&self) -> usize {
        self.log.len() + self.addresses.values().map(HashMap::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> ProjectionStats {
        let kinds: BTreeSet<u16> = self.current().map(|event| event.kind).collect();
        ProjectionStats {
            regular: self.log.len(),
            addressable: self.addresses.values().map(HashMap::len).sum(),
            kinds: kinds.len(),
        }
    }

    fn current(&self) -> impl Iterator<Item = &Event> {
        self.addresses
            .values()
            .flat_map(HashMap::values)
            .chain(self.log.iter())
    }
}
