//! JSON message envelope.
//!
//! Client to relay: `EVENT`, `REQ`, `COUNT`, `CLOSE`.
//! Relay to client: `EVENT`, `OK`, `EOSE`, `COUNT`, `CLOSED`, `NOTICE`.
//!
//! [`handle_message`] answers one client message against a [`RelayStore`].
//! There are no live subscriptions: a `REQ` returns stored events followed
//! by `EOSE`.

use crate::error::RelayError;
use crate::store::RelayStore;
use nostr::{Admission, Event, Filter};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::debug;

/// NIP-01 caps subscription ids at 64 characters.
pub const MAX_SUBSCRIPTION_ID_LENGTH: usize = 64;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message format: {0}")]
    InvalidFormat(String),

    #[error("unknown message type: {0}")]
    UnknownType(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing field: {0}")]
    MissingField(String),
}

/// Messages sent from client to relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    /// `["EVENT", <event>]`
    Event(Event),
    /// `["REQ", <subscription_id>, <filter>...]`
    Req {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// `["COUNT", <subscription_id>, <filter>...]`
    Count {
        subscription_id: String,
        filters: Vec<Filter>,
    },
    /// `["CLOSE", <subscription_id>]`
    Close { subscription_id: String },
}

impl ClientMessage {
    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let arr = parse_array(json)?;

        match message_type(&arr)? {
            "EVENT" => {
                let value = arr
                    .get(1)
                    .ok_or_else(|| MessageError::MissingField("event".to_string()))?;
                Ok(ClientMessage::Event(serde_json::from_value(value.clone())?))
            }
            "REQ" => {
                let (subscription_id, filters) = subscription_with_filters(&arr)?;
                Ok(ClientMessage::Req {
                    subscription_id,
                    filters,
                })
            }
            "COUNT" => {
                let (subscription_id, filters) = subscription_with_filters(&arr)?;
                Ok(ClientMessage::Count {
                    subscription_id,
                    filters,
                })
            }
            "CLOSE" => Ok(ClientMessage::Close {
                subscription_id: subscription_id(&arr)?,
            }),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }

    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            ClientMessage::Event(event) => json!(["EVENT", event]),
            ClientMessage::Req {
                subscription_id,
                filters,
            } => with_filters("REQ", subscription_id, filters)?,
            ClientMessage::Count {
                subscription_id,
                filters,
            } => with_filters("COUNT", subscription_id, filters)?,
            ClientMessage::Close { subscription_id } => json!(["CLOSE", subscription_id]),
        };
        Ok(value.to_string())
    }
}

/// Messages sent from relay to client.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayMessage {
    /// `["EVENT", <subscription_id>, <event>]`
    Event {
        subscription_id: String,
        event: Event,
    },
    /// `["OK", <event_id>, <true|false>, <message>]`
    Ok {
        event_id: String,
        success: bool,
        message: String,
    },
    /// `["EOSE", <subscription_id>]`
    Eose { subscription_id: String },
    /// `["COUNT", <subscription_id>, {"count": <n>}]`
    Count { subscription_id: String, count: u64 },
    /// `["CLOSED", <subscription_id>, <message>]`
    Closed {
        subscription_id: String,
        message: String,
    },
    /// `["NOTICE", <message>]`
    Notice { message: String },
}

impl RelayMessage {
    pub fn to_json(&self) -> Result<String, MessageError> {
        let value = match self {
            RelayMessage::Event {
                subscription_id,
                event,
            } => json!(["EVENT", subscription_id, event]),
            RelayMessage::Ok {
                event_id,
                success,
                message,
            } => json!(["OK", event_id, success, message]),
            RelayMessage::Eose { subscription_id } => json!(["EOSE", subscription_id]),
            RelayMessage::Count {
                subscription_id,
                count,
            } => json!(["COUNT", subscription_id, { "count": count }]),
            RelayMessage::Closed {
                subscription_id,
                message,
            } => json!(["CLOSED", subscription_id, message]),
            RelayMessage::Notice { message } => json!(["NOTICE", message]),
        };
        Ok(value.to_string())
    }

    pub fn from_json(json: &str) -> Result<Self, MessageError> {
        let arr = parse_array(json)?;

        match message_type(&arr)? {
            "EVENT" => {
                let subscription_id = subscription_id(&arr)?;
                let value = arr
                    .get(2)
                    .ok_or_else(|| MessageError::MissingField("event".to_string()))?;
                Ok(RelayMessage::Event {
                    subscription_id,
                    event: serde_json::from_value(value.clone())?,
                })
            }
            "OK" => {
                let event_id = string_at(&arr, 1, "event_id")?;
                let success = arr
                    .get(2)
                    .and_then(Value::as_bool)
                    .ok_or_else(|| {
                        MessageError::InvalidFormat("success not a boolean".to_string())
                    })?;
                let message = arr.get(3).and_then(Value::as_str).unwrap_or("").to_string();
                Ok(RelayMessage::Ok {
                    event_id,
                    success,
                    message,
                })
            }
            "EOSE" => Ok(RelayMessage::Eose {
                subscription_id: subscription_id(&arr)?,
            }),
            "COUNT" => {
                let subscription_id = subscription_id(&arr)?;
                let count = arr
                    .get(2)
                    .and_then(|body| body.get("count"))
                    .and_then(Value::as_u64)
                    .ok_or_else(|| MessageError::MissingField("count".to_string()))?;
                Ok(RelayMessage::Count {
                    subscription_id,
                    count,
                })
            }
            "CLOSED" => Ok(RelayMessage::Closed {
                subscription_id: subscription_id(&arr)?,
                message: arr.get(2).and_then(Value::as_str).unwrap_or("").to_string(),
            }),
            "NOTICE" => Ok(RelayMessage::Notice {
                message: string_at(&arr, 1, "message")?,
            }),
            other => Err(MessageError::UnknownType(other.to_string())),
        }
    }

    fn ok(event_id: &str, success: bool, message: impl Into<String>) -> Self {
        RelayMessage::Ok {
            event_id: event_id.to_string(),
            success,
            message: message.into(),
        }
    }

    fn closed(subscription_id: &str, err: &RelayError) -> Self {
        RelayMessage::Closed {
            subscription_id: subscription_id.to_string(),
            message: reason(err),
        }
    }
}

/// Answer one client message.
///
/// `CLOSE` produces no reply. Unparseable input produces a single `NOTICE`,
/// or an `OK false` when the event id can still be recovered.
pub async fn handle_message(store: &RelayStore, text: &str) -> Vec<RelayMessage> {
    let message = match ClientMessage::from_json(text) {
        Ok(message) => message,
        Err(err) => {
            debug!("Unparseable client message: {}", err);
            return vec![unparseable_reply(text, &err)];
        }
    };

    match message {
        ClientMessage::Event(event) => {
            let id = event.id.clone();
            let reply = match store.submit(event).await {
                Ok(Admission::Admitted | Admission::Replaced { .. }) => {
                    RelayMessage::ok(&id, true, "")
                }
                Ok(Admission::Duplicate) => {
                    RelayMessage::ok(&id, true, "duplicate: already have this event")
                }
                Ok(Admission::Superseded { current }) => RelayMessage::ok(
                    &id,
                    true,
                    format!("duplicate: superseded by {}", current),
                ),
                Err(err) => RelayMessage::ok(&id, false, reason(&err)),
            };
            vec![reply]
        }
        ClientMessage::Req {
            subscription_id,
            filters,
        } => match store.query(&filters) {
            Ok(events) => {
                let mut replies: Vec<RelayMessage> = events
                    .into_iter()
                    .map(|event| RelayMessage::Event {
                        subscription_id: subscription_id.clone(),
                        event,
                    })
                    .collect();
                replies.push(RelayMessage::Eose { subscription_id });
                replies
            }
            Err(err) => vec![RelayMessage::closed(&subscription_id, &err)],
        },
        ClientMessage::Count {
            subscription_id,
            filters,
        } => match store.count(&filters) {
            Ok(count) => vec![RelayMessage::Count {
                subscription_id,
                count,
            }],
            Err(err) => vec![RelayMessage::closed(&subscription_id, &err)],
        },
        ClientMessage::Close { .. } => Vec::new(),
    }
}

/// Machine-readable reason with its NIP-01 prefix.
fn reason(err: &RelayError) -> String {
    match err {
        RelayError::Rejected(inner) => format!("invalid: {}", inner),
        RelayError::InvalidFilter(inner) => format!("invalid: {}", inner),
        other => format!("error: {}", other),
    }
}

fn unparseable_reply(text: &str, err: &MessageError) -> RelayMessage {
    let event_id = serde_json::from_str::<Vec<Value>>(text).ok().and_then(|arr| {
        match (arr.first().and_then(Value::as_str), arr.get(1)) {
            (Some("EVENT"), Some(event)) => {
                event.get("id").and_then(Value::as_str).map(str::to_string)
            }
            _ => None,
        }
    });

    match event_id {
        Some(id) => RelayMessage::ok(&id, false, format!("invalid: {}", err)),
        None => RelayMessage::Notice {
            message: format!("invalid: {}", err),
        },
    }
}

fn parse_array(json: &str) -> Result<Vec<Value>, MessageError> {
    let arr: Vec<Value> =
        serde_json::from_str(json).map_err(|e| MessageError::InvalidFormat(e.to_string()))?;
    if arr.is_empty() {
        return Err(MessageError::InvalidFormat("empty array".to_string()));
    }
    Ok(arr)
}

fn message_type(arr: &[Value]) -> Result<&str, MessageError> {
    arr[0]
        .as_str()
        .ok_or_else(|| MessageError::InvalidFormat("first element not a string".to_string()))
}

fn string_at(arr: &[Value], index: usize, field: &str) -> Result<String, MessageError> {
    arr.get(index)
        .ok_or_else(|| MessageError::MissingField(field.to_string()))?
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MessageError::InvalidFormat(format!("{} not a string", field)))
}

fn subscription_id(arr: &[Value]) -> Result<String, MessageError> {
    let id = string_at(arr, 1, "subscription_id")?;
    if id.is_empty() || id.chars().count() > MAX_SUBSCRIPTION_ID_LENGTH {
        return Err(MessageError::InvalidFormat(format!(
            "subscription_id must be 1 to {} characters",
            MAX_SUBSCRIPTION_ID_LENGTH
        )));
    }
    Ok(id)
}

fn subscription_with_filters(arr: &[Value]) -> Result<(String, Vec<Filter>), MessageError> {
    let subscription_id = subscription_id(arr)?;
    let filters = arr[2..]
        .iter()
        .map(|value| serde_json::from_value(value.clone()))
        .collect::<Result<Vec<Filter>, _>>()?;
    Ok((subscription_id, filters))
}

fn with_filters(
    label: &str,
    subscription_id: &str,
    filters: &[Filter],
) -> Result<Value, MessageError> {
    let mut arr = vec![
        Value::String(label.to_string()),
        Value::String(subscription_id.to_string()),
    ];
    for filter in filters {
        arr.push(serde_json::to_value(filter)?);
    }
    Ok(Value::Array(arr))
}
