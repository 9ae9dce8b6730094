//! Durable event store for the signed event log.
//!
//! This crate provides:
//! - SQLite storage with a tag index table and an r2d2 reader pool
//! - A single writer thread applying the replace-on-write rule in one
//!   transaction per event
//! - Filter queries and counts (OR across filters, AND within one)
//! - The JSON client/relay message envelope
//!
//! # Architecture
//!
//! ```text
//!   submit(event)                        query / count / get_event
//!        │                                        │
//!  prepare (verify, validate)                     │
//!        │ bounded mpsc + oneshot reply           │
//!        ▼                                        ▼
//! ┌──────────────────┐                   ┌──────────────────┐
//! │  relay-writer    │                   │   reader pool    │
//! │  (one thread,    │                   │   (query_only)   │
//! │  one connection) │                   │                  │
//! └────────┬─────────┘                   └────────┬─────────┘
//!          └───────────────► SQLite (WAL) ◄───────┘
//! ```
//!
//! ```no_run
//! use nostr::{Filter, SchemaRegistry, KIND_PRICE_QUOTE};
//! use nostr_relay::{RelayStore, StoreConfig};
//! use std::sync::Arc;
//!
//! # async fn demo(event: nostr::Event) -> nostr_relay::Result<()> {
//! let registry = Arc::new(SchemaRegistry::standard());
//! let store = RelayStore::open(StoreConfig::at("relay.db"), registry)?;
//! store.submit(event).await?;
//! let quotes = store.query(&[Filter::new().kind(KIND_PRICE_QUOTE).limit(10)])?;
//! # let _ = quotes;
//! # Ok(())
//! # }
//! ```

mod config;
mod db;
mod error;
mod message;
mod store;
mod writer;


pub use config::{DatabaseConfig, StoreConfig};
pub use db::StoreStats;
pub use error::{RelayError, Result};
pub use message::{
    ClientMessage, MAX_SUBSCRIPTION_ID_LENGTH, MessageError, RelayMessage, handle_message,
};
pub use store::RelayStore;
