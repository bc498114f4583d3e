// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Record and item helpers for tests.

use echo_replica::{LocalItem, RemoteRecord, ReplicaState};
use serde_json::json;

/// Record whose value is `{"timestamp": ts}`.
///
/// ```
/// use echo_replica_mem::stamped;
///
/// let rec = stamped("a", 3);
/// assert_eq!(rec.value["timestamp"], 3);
/// ```
pub fn stamped(key: &str, ts: i64) -> RemoteRecord {
    RemoteRecord::new(key, json!({ "timestamp": ts }))
}

/// Item as the default projection would produce it for [`stamped`].
pub fn stamped_item(key: &str, ts: i64) -> LocalItem {
    LocalItem::new(key).with_field("timestamp", json!(ts))
}

/// Keys of the state's items, in order.
pub fn item_keys(state: &ReplicaState) -> Vec<String> {
    state.items.iter().map(|item| item.key.clone()).collect()
}
