//! The indexer actor.
//!
//! One tokio task owns admission. Callers verify and validate on their own
//! task, then hand the [`Admissible`] event to the writer over a bounded queue
//! and wait on a oneshot for the outcome. Reads go straight to the shared
//! projection; the writer holds the write lock only for the in-memory update.

use crate::change::Change;
use crate::config::IndexerConfig;
use crate::error::{IndexerError, Result};
use crate::projection::{Projection, ProjectionStats};
use nostr::{Admissible, Admission, Event, Filter, SchemaRegistry, prepare};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info};

enum Request {
    Admit {
        event: Admissible,
        reply: oneshot::Sender<Admission>,
    },
}

/// Handle to a running indexer. Cheap to clone; the writer task stops once
/// every handle is dropped.
#[derive(Clone)]
pub struct Indexer {
    requests: mpsc::Sender<Request>,
    state: Arc<RwLock<Projection>>,
    changes: broadcast::Sender<Change>,
    registry: Arc<SchemaRegistry>,
    config: IndexerConfig,
}

impl Indexer {
    /// Start the writer task on the current tokio runtime.
    pub fn spawn(registry: Arc<SchemaRegistry>, config: IndexerConfig) -> Self {
        let (requests, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (changes, _) = broadcast::channel(config.notify_capacity.max(1));
        let state = Arc::new(RwLock::new(Projection::new()));

        tokio::spawn(run_writer(rx, Arc::clone(&state), changes.clone()));
        info!(
            queue_capacity = config.queue_capacity,
            notify_capacity = config.notify_capacity,
            "Indexer started"
        );

        Self {
            requests,
            state,
            changes,
            registry,
            config,
        }
    }

    /// Verify, validate and admit an event.
    ///
    /// Resubmitting an event is always safe: the second attempt reports
    /// [`Admission::Duplicate`] (or `Superseded` if a newer version arrived).
    pub async fn submit(&self, event: Event) -> Result<Admission> {
        let event = prepare(event, &self.registry)?;
        let (reply, outcome) = oneshot::channel();
        let deadline = self.config.submit_timeout;

        let exchange = async {
            self.requests
                .send(Request::Admit { event, reply })
                .await
                .map_err(|_| IndexerError::Closed)?;
            outcome.await.map_err(|_| IndexerError::Closed)
        };

        timeout(deadline, exchange)
            .await
            .map_err(|_| IndexerError::Timeout(deadline))?
    }

    /// Receive a [`Change`] for every event that becomes current from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Latest version of the addressable `(kind, d)` across authors.
    pub fn get(&self, kind: u16, d: &str) -> Option<Event> {
        self.state.read().get(kind, d).cloned()
    }

    pub fn get_authored(&self, kind: u16, pubkey: &str, d: &str) -> Option<Event> {
        self.state.read().get_authored(kind, pubkey, d).cloned()
    }

    /// Every current event of `kind`, newest first.
    pub fn list(&self, kind: u16) -> Vec<Event> {
        self.state.read().list(kind)
    }

    /// Regular events matching `predicate`, in admission order.
    pub fn log<F>(&self, predicate: F) -> Vec<Event>
    where
        F: Fn(&Event) -> bool,
    {
        self.state.read().log(predicate)
    }

    pub fn query(&self, filter: &Filter) -> Vec<Event> {
        self.state.read().query(filter)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().contains(id)
    }

    pub fn stats(&self) -> ProjectionStats {
        self.state.read().stats()
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }
}

async fn run_writer(
    mut rx: mpsc::Receiver<Request>,
    state: Arc<RwLock<Projection>>,
    changes: broadcast::Sender<Change>,
) {
    while let Some(request) = rx.recv().await {
        match request {
            Request::Admit { event, reply } => {
                let id = event.event().id.clone();
                let (admission, change) = state.write().admit(event);
                debug!(%id, ?admission, "indexer admission");

                if let Some(change) = change {
                    // No subscribers is fine.
                    let _ = changes.send(change);
                }
                // The caller may have timed out and dropped its receiver.
                let _ = reply.send(admission);
            }
        }
    }

    info!("Indexer writer stopped");
}
