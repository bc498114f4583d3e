// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Records as delivered by the remote source and items as held by the replica.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Stable identifier of a record within its collection.
pub type ItemKey = String;

/// One record as reported by the remote source (stable key + value payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Key of the record, unique within the collection.
    pub key: ItemKey,
    /// Raw value stored under the key.
    pub value: Value,
}

impl RemoteRecord {
    /// Build a record from a key and value.
    pub fn new(key: impl Into<ItemKey>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Projected local representation of one remote record.
///
/// Serializes flat: `{"_key": "...", ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalItem {
    /// Stable identifier minted by the projection.
    #[serde(rename = "_key")]
    pub key: ItemKey,
    /// Payload fields copied or derived from the remote record.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl LocalItem {
    /// Item with the given key and no payload fields.
    pub fn new(key: impl Into<ItemKey>) -> Self {
        Self {
            key: key.into(),
            fields: Map::new(),
        }
    }

    /// Builder-style field insertion.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Look up a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }
}
