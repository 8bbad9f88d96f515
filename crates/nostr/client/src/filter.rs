//! Subscription filters.

use nostr::Event;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A NIP-01 style filter: kinds, authors, single-letter tag constraints and a
/// stored-event `limit`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filter {
    pub kinds: Vec<u16>,
    pub authors: Vec<String>,
    /// Tag name (without `#`) to accepted values.
    pub tags: BTreeMap<String, Vec<String>>,
    /// Maximum number of stored events replayed when the subscription opens.
    pub limit: Option<usize>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kinds(mut self, kinds: impl IntoIterator<Item = u16>) -> Self {
        self.kinds.extend(kinds);
        self
    }

    pub fn author(mut self, pubkey: impl Into<String>) -> Self {
        self.authors.push(pubkey.into());
        self
    }

    /// Require a tag `name` whose first value is one of the given values.
    pub fn tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.entry(name.into()).or_default().push(value.into());
        self
    }

    /// Require an `e` tag referencing `event_id`.
    pub fn event_ref(self, event_id: impl Into<String>) -> Self {
        self.tag("e", event_id)
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Whether `event` satisfies every constraint of this filter.
    pub fn matches(&self, event: &Event) -> bool {
        if !self.kinds.is_empty() && !self.kinds.contains(&event.kind) {
            return false;
        }
        if !self.authors.is_empty() && !self.authors.iter().any(|author| *author == event.pubkey)
        {
            return false;
        }

        self.tags.iter().all(|(name, values)| {
            event.tags.iter().any(|tag| {
                tag.first().is_some_and(|tag_name| tag_name == name)
                    && tag.get(1).is_some_and(|value| values.contains(value))
            })
        })
    }

    /// Relay wire encoding (`{"kinds":[..],"#e":[..],"limit":n}`).
    pub fn to_json(&self) -> Value {
        let mut object = Map::new();
        if !self.kinds.is_empty() {
            object.insert("kinds".to_string(), Value::from(self.kinds.clone()));
        }
        if !self.authors.is_empty() {
            object.insert("authors".to_string(), Value::from(self.authors.clone()));
        }
        for (name, values) in &self.tags {
            object.insert(format!("#{name}"), Value::from(values.clone()));
        }
        if let Some(limit) = self.limit {
            object.insert("limit".to_string(), Value::from(limit));
        }
        Value::Object(object)
    }
}
