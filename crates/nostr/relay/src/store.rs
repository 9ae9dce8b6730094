//! Durable event store handle.

use crate::config::StoreConfig;
use crate::db::{self, ReaderConnection, ReaderPool, StoreStats};
use crate::error::{RelayError, Result};
use crate::writer::{self, WriteRequest};
use nostr::{Admission, Event, Filter, SchemaRegistry, prepare};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::info;

/// Handle to an open relay store.
///
/// Writes go through the writer thread; reads use the pooled connections
/// directly. Cloning is cheap. The writer thread exits once every handle
/// has been dropped.
#[derive(Clone)]
pub struct RelayStore {
    requests: mpsc::Sender<WriteRequest>,
    readers: ReaderPool,
    registry: Arc<SchemaRegistry>,
    config: StoreConfig,
}

impl RelayStore {
    /// Open (or create) the database and start the writer thread.
    pub fn open(config: StoreConfig, registry: Arc<SchemaRegistry>) -> Result<Self> {
        let conn = db::open_writer(&config.database.path)?;
        let readers = db::reader_pool(&config.database)?;
        let (requests, rx) = mpsc::channel(config.queue_capacity.max(1));
        writer::spawn(conn, rx)?;

        info!(
            path = ?config.database.path,
            readers = config.database.max_reader_connections,
            queue_capacity = config.queue_capacity,
            "Relay store opened"
        );

        Ok(Self {
            requests,
            readers,
            registry,
            config,
        })
    }

    /// Verify, validate and persist an event.
    pub async fn submit(&self, event: Event) -> Result<Admission> {
        let event = prepare(event, &self.registry)?;
        let (reply, outcome) = oneshot::channel();
        let deadline = self.config.submit_timeout;

        let exchange = async {
            self.requests
                .send(WriteRequest::Admit { event, reply })
                .await
                .map_err(|_| RelayError::Closed)?;
            outcome.await.map_err(|_| RelayError::Closed)?
        };

        timeout(deadline, exchange)
            .await
            .map_err(|_| RelayError::Timeout(deadline))?
    }

    /// Events matching any filter, newest first.
    pub fn query(&self, filters: &[Filter]) -> Result<Vec<Event>> {
        self.check_filters(filters)?;
        let conn = self.reader()?;
        db::query_events(&conn, filters, self.config.default_limit)
    }

    /// Number of events matching any filter. `limit` is ignored.
    pub fn count(&self, filters: &[Filter]) -> Result<u64> {
        self.check_filters(filters)?;
        let conn = self.reader()?;
        db::count_events(&conn, filters)
    }

    pub fn get_event(&self, id: &str) -> Result<Option<Event>> {
        let conn = self.reader()?;
        db::get_event(&conn, id)
    }

    /// Number of stored events.
    pub fn len(&self) -> Result<u64> {
        let conn = self.reader()?;
        db::count_all(&conn)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> Result<StoreStats> {
        let conn = self.reader()?;
        db::stats(&conn)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    fn check_filters(&self, filters: &[Filter]) -> Result<()> {
        for filter in filters {
            filter.validate(self.config.max_limit)?;
        }
        Ok(())
    }

    fn reader(&self) -> Result<ReaderConnection> {
        self.readers.get().map_err(RelayError::Pool)
    }
}
