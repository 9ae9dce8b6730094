//! Query filters.
//!
//! A filter selects events by exact id, author and kind, by `#<name>` tag
//! values, and by an inclusive `since`/`until` time window. Conditions within a
//! filter are ANDed; a list of filters is ORed by whoever evaluates it.

use crate::event::Event;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("invalid tag filter key {0:?}: expected '#' followed by a tag name")]
    InvalidTagKey(String),

    #[error("limit {limit} exceeds maximum {max}")]
    LimitTooLarge { limit: usize, max: usize },

    #[error("since {since} is after until {until}")]
    EmptyWindow { since: u64, until: u64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub kinds: Option<Vec<u16>>,

    /// `#<name>` → accepted first values
    #[serde(flatten, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<String>>,

    /// Inclusive lower bound on `created_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<u64>,

    /// Inclusive upper bound on `created_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub until: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.ids.get_or_insert_with(Vec::new).push(id.into());
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.get_or_insert_with(Vec::new).push(pubkey.into());
        self
    }

    pub fn kind(mut self, kind: u16) -> Self {
        self.kinds.get_or_insert_with(Vec::new).push(kind);
        self
    }

    /// Require a tag named `name` whose first value is `value`.
    pub fn tag(mut self, name: &str, value: impl Into<String>) -> Self {
        self.tags
            .entry(format!("#{}", name))
            .or_default()
            .push(value.into());
        self
    }

    pub fn since(mut self, since: u64) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: u64) -> Self {
        self.until = Some(until);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Tag conditions as `(name, values)` with the `#` stripped.
    pub fn tag_filters(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tags.iter().map(|(key, values)| {
            (
                key.strip_prefix('#').unwrap_or(key.as_str()),
                values.as_slice(),
            )
        })
    }

    /// Check an event against every condition of this filter. `limit` is not
    /// a matching condition.
    pub fn matches(&self, event: &Event) -> bool {
        if let Some(ref ids) = self.ids
            && !ids.contains(&event.id)
        {
            return false;
        }

        if let Some(ref authors) = self.authors
            && !authors.contains(&event.pubkey)
        {
            return false;
        }

        if let Some(ref kinds) = self.kinds
            && !kinds.contains(&event.kind)
        {
            return false;
        }

        if let Some(since) = self.since
            && event.created_at < since
        {
            return false;
        }

        if let Some(until) = self.until
            && event.created_at > until
        {
            return false;
        }

        self.tag_filters().all(|(name, values)| {
            event
                .tag_values(name)
                .any(|value| values.iter().any(|wanted| wanted == value))
        })
    }

    /// Reject filters a store cannot evaluate.
    pub fn validate(&self, max_limit: usize) -> Result<(), FilterError> {
        for key in self.tags.keys() {
            match key.strip_prefix('#') {
                Some(name) if !name.is_empty() => {}
                _ => return Err(FilterError::InvalidTagKey(key.clone())),
            }
        }

        if let Some(limit) = self.limit
            && limit > max_limit
        {
            return Err(FilterError::LimitTooLarge {
                limit,
                max: max_limit,
            });
        }

        Ok(())
    }

    /// True if a filter can match nothing, e.g. `ids: []` or `since > until`.
    pub fn is_unsatisfiable(&self) -> bool {
        let empty = |list: &Option<Vec<String>>| list.as_ref().is_some_and(Vec::is_empty);
        empty(&self.ids)
            || empty(&self.authors)
            || self.kinds.as_ref().is_some_and(Vec::is_empty)
            || self.tags.values().any(Vec::is_empty)
            || matches!((self.since, self.until), (Some(s), Some(u)) if s > u)
    }

    /// Reported when a filter's window is inverted; stores treat it as
    /// matching nothing.
    pub fn window_error(&self) -> Option<FilterError> {
        match (self.since, self.until) {
            (Some(since), Some(until)) if since > until => {
                Some(FilterError::EmptyWindow { since, until })
            }
            _ => None,
        }
    }
}

/// True if `event` matches any filter in `filters`.
pub fn matches_any(filters: &[Filter], event: &Event) -> bool {
    filters.iter().any(|filter| filter.matches(event))
}
