//! Real-time in-memory projection of an event stream.
//!
//! The indexer keeps the latest version of every parameterized-replaceable
//! event (per `(kind, pubkey, d)`) and an append-only log of regular events,
//! and broadcasts a [`Change`] whenever an event becomes current.
//!
//! ```no_run
//! use nostr::SchemaRegistry;
//! use nostr_indexer::{Indexer, IndexerConfig};
//! use std::sync::Arc;
//!
//! # async fn demo(event: nostr::Event) -> nostr_indexer::Result<()> {
//! let indexer = Indexer::spawn(Arc::new(SchemaRegistry::standard()), IndexerConfig::from_env());
//! let mut changes = indexer.subscribe();
//! indexer.submit(event).await?;
//! let _change = changes.recv().await;
//! # Ok(())
//! # }
//! ```

mod change;
mod config;
mod error;
mod indexer;
mod projection;

pub use change::{Change, ChangeKey};
pub use config::IndexerConfig;
pub use error::{IndexerError, Result};
pub use indexer::Indexer;
pub use projection::{Projection, ProjectionStats};
