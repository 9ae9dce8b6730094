//! The relay writer thread.
//!
//! A dedicated OS thread owns the only writable SQLite connection and admits
//! events one at a time, each in its own transaction.

use crate::db;
use crate::error::{RelayError, Result};
use nostr::{Admissible, Admission, AdmissionKey, Event, supersedes};
use rusqlite::Connection;
use std::thread;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

pub(crate) enum WriteRequest {
    Admit {
        event: Admissible,
        reply: oneshot::Sender<Result<Admission>>,
    },
}

pub(crate) fn spawn(conn: Connection, rx: mpsc::Receiver<WriteRequest>) -> Result<()> {
    thread::Builder::new()
        .name("relay-writer".to_string())
        .spawn(move || run(conn, rx))
        .map_err(RelayError::Io)?;
    Ok(())
}

fn run(mut conn: Connection, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some(request) = rx.blocking_recv() {
        match request {
            WriteRequest::Admit { event, reply } => {
                let id = event.event().id.clone();
                let result = admit(&mut conn, event);
                match &result {
                    Ok(admission) => debug!(%id, ?admission, "relay admission"),
                    Err(err) => error!(%id, "Failed to store event: {}", err),
                }
                let _ = reply.send(result);
            }
        }
    }

    info!("Relay writer stopped");
}

/// Apply the replace-on-write rule and persist the event atomically.
///
/// Nothing is written unless the transaction commits, so a failure part way
/// through leaves neither the event row nor any of its tag rows behind.
fn admit(conn: &mut Connection, event: Admissible) -> Result<Admission> {
    let tx = conn.transaction()?;
    let (event, key) = event.into_parts();

    let admission = match key {
        AdmissionKey::Event { .. } => {
            if db::insert_event(&tx, &event)? {
                Admission::Admitted
            } else {
                Admission::Duplicate
            }
        }
        AdmissionKey::Address { kind, pubkey, d } => {
            admit_addressable(&tx, &event, kind, &pubkey, &d)?
        }
    };

    tx.commit()?;
    Ok(admission)
}

fn admit_addressable(
    conn: &Connection,
    event: &Event,
    kind: u16,
    pubkey: &str,
    d: &str,
) -> Result<Admission> {
    let Some((current_id, current_at)) = db::current_version(conn, kind, pubkey, d)? else {
        db::insert_event(conn, event)?;
        return Ok(Admission::Admitted);
    };

    if current_id == event.id {
        return Ok(Admission::Duplicate);
    }

    if !supersedes(
        (event.created_at, event.id.as_str()),
        (current_at, current_id.as_str()),
    ) {
        debug!(
            id = %event.id,
            current = %current_id,
            kind,
            "stale event superseded by stored version"
        );
        return Ok(Admission::Superseded {
            current: current_id,
        });
    }

    let deleted =
        db::delete_older_versions(conn, kind, pubkey, d, event.created_at, &event.id)?;
    db::insert_event(conn, event)?;
    debug!(id = %event.id, previous = %current_id, deleted, "replaced addressable event");

    Ok(Admission::Replaced {
        previous: current_id,
    })
}
