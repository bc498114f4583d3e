// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Remote record → local item conversion.

use crate::item::{LocalItem, RemoteRecord};
use crate::state::ReplicaState;
use serde_json::Value;

/// Field holding a non-object record value after default projection.
pub const SCALAR_FIELD: &str = "value";

/// Converts a remote record into a local item.
///
/// Implementations must be pure: same record and state, same item. The state
/// is passed read-only so projections can cross-reference existing items.
pub trait Projection: Send + Sync {
    /// Project `record` against the current `state`.
    fn project(&self, record: &RemoteRecord, state: &ReplicaState) -> LocalItem;
}

impl<F> Projection for F
where
    F: Fn(&RemoteRecord, &ReplicaState) -> LocalItem + Send + Sync,
{
    fn project(&self, record: &RemoteRecord, state: &ReplicaState) -> LocalItem {
        self(record, state)
    }
}

/// Attaches the record key as `_key` and copies the value's fields.
///
/// Object values contribute their fields (an embedded `_key` is dropped so
/// the stable identifier always comes from the record key). Any other value
/// lands under [`SCALAR_FIELD`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultProjection;

impl Projection for DefaultProjection {
    fn project(&self, record: &RemoteRecord, _state: &ReplicaState) -> LocalItem {
        let mut item = LocalItem::new(record.key.clone());
        match &record.value {
            Value::Object(fields) => {
                item.fields.extend(
                    fields
                        .iter()
                        .filter(|(name, _)| name.as_str() != "_key")
                        .map(|(name, value)| (name.clone(), value.clone())),
                );
            }
            Value::Null => {}
            other => {
                item.fields.insert(SCALAR_FIELD.to_owned(), other.clone());
            }
        }
        item
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn default_projection_merges_object_fields() {
        let record = RemoteRecord::new("k1", json!({"timestamp": 4, "text": "hi"}));
        let item = DefaultProjection.project(&record, &ReplicaState::initial());
        assert_eq!(item.key, "k1");
        assert_eq!(item.field("timestamp"), Some(&json!(4)));
        assert_eq!(item.field("text"), Some(&json!("hi")));
    }

    #[test]
    fn default_projection_ignores_embedded_key() {
        let record = RemoteRecord::new("real", json!({"_key": "spoofed"}));
        let item = DefaultProjection.project(&record, &ReplicaState::initial());
        assert_eq!(item.key, "real");
        assert!(item.fields.is_empty());
    }

    #[test]
    fn scalars_land_under_value_field() {
        let record = RemoteRecord::new("n", json!(12));
        let item = DefaultProjection.project(&record, &ReplicaState::initial());
        assert_eq!(item.field(SCALAR_FIELD), Some(&json!(12)));
    }

    #[test]
    fn closures_can_derive_fields_from_state() {
        let rank = |record: &RemoteRecord, state: &ReplicaState| {
            LocalItem::new(record.key.clone()).with_field("rank", json!(state.items.len()))
        };
        let state = ReplicaState {
            items: vec![LocalItem::new("x"), LocalItem::new("y")],
            ..ReplicaState::initial()
        };
        let item = rank.project(&RemoteRecord::new("z", json!(null)), &state);
        assert_eq!(item.field("rank"), Some(&json!(2)));
    }
}
