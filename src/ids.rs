use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PersistError;

const ID_DELIMITER: char = ',';

/// Opaque store identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid_token(raw: &str) -> bool {
        !raw.is_empty()
            && raw
                .chars()
                .all(|c| !c.is_whitespace() && !c.is_control() && c != ID_DELIMITER)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Insertion-ordered set of ids, persisted as a comma-delimited string.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdSet {
    ids: Vec<NodeId>,
}

impl IdSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &NodeId) -> bool {
        self.ids.contains(id)
    }

    /// Returns `false` if the id was already present.
    pub fn insert(&mut self, id: NodeId) -> bool {
        if self.contains(&id) {
            return false;
        }
        self.ids.push(id);
        true
    }

    pub fn remove(&mut self, id: &NodeId) -> bool {
        let before = self.ids.len();
        self.ids.retain(|existing| existing != id);
        self.ids.len() != before
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeId> {
        self.ids.iter()
    }

    pub fn serialize(&self) -> String {
        self.ids
            .iter()
            .map(NodeId::as_str)
            .collect::<Vec<_>>()
            .join(&ID_DELIMITER.to_string())
    }

    pub fn parse(raw: &str) -> Result<Self, PersistError> {
        let mut set = Self::new();
        for token in raw.split(ID_DELIMITER) {
            let token = token.trim();
            // Trailing delimiters were written by older builds.
            if token.is_empty() {
                continue;
            }
            if !NodeId::is_valid_token(token) {
                return Err(PersistError::MalformedIdList(raw.to_string()));
            }
            set.insert(NodeId::new(token));
        }
        Ok(set)
    }

    /// Never fails: malformed input yields an empty set.
    pub fn parse_or_empty(raw: &str, what: &str) -> Self {
        match Self::parse(raw) {
            Ok(set) => set,
            Err(err) => {
                tracing::warn!(%err, list = what, "discarding persisted id list");
                Self::new()
            }
        }
    }

    /// Accepts the JSON-array layout used before the delimited format.
    pub fn parse_legacy(raw: &str) -> Result<Self, PersistError> {
        let trimmed = raw.trim();
        if !trimmed.starts_with('[') {
            return Self::parse(trimmed);
        }
        let values: Vec<serde_json::Value> = serde_json::from_str(trimmed)?;
        let mut set = Self::new();
        for value in values {
            let token = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                _ => return Err(PersistError::MalformedIdList(raw.to_string())),
            };
            if !NodeId::is_valid_token(&token) {
                return Err(PersistError::MalformedIdList(raw.to_string()));
            }
            set.insert(NodeId::new(token));
        }
        Ok(set)
    }
}

impl FromIterator<NodeId> for IdSet {
    fn from_iter<T: IntoIterator<Item = NodeId>>(iter: T) -> Self {
        let mut set = Self::new();
        for id in iter {
            set.insert(id);
        }
        set
    }
}
