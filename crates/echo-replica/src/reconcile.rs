// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Applies incremental remote events to the sorted item list.
//!
//! Reconciliation is pure: it reads the current state and returns a fresh
//! item list, leaving the input untouched. Items are matched by `_key`, the
//! identifier minted by the projection, for every event kind.

use crate::action::ActionKind;
use crate::item::{ItemKey, LocalItem, RemoteRecord};
use crate::ordering::{total_cmp, Ordering};
use crate::projection::Projection;
use crate::state::ReplicaState;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote child event kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// `child_added`
    #[serde(rename = "child_added")]
    Added,
    /// `child_removed`
    #[serde(rename = "child_removed")]
    Removed,
    /// `child_changed`
    #[serde(rename = "child_changed")]
    Changed,
}

impl EventKind {
    /// The three kinds a replica subscribes to.
    pub const ALL: [Self; 3] = [Self::Added, Self::Removed, Self::Changed];

    /// Wire name of the event.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Added => "child_added",
            Self::Removed => "child_removed",
            Self::Changed => "child_changed",
        }
    }

    /// Action kind dispatched after reconciling this event.
    pub const fn action(self) -> ActionKind {
        match self {
            Self::Added => ActionKind::Added,
            Self::Removed => ActionKind::Removed,
            Self::Changed => ActionKind::Changed,
        }
    }
}

/// One incremental event from the remote source.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaEvent {
    /// Which child event fired.
    pub kind: EventKind,
    /// Record carried by the event (for removals, the last known value).
    pub record: RemoteRecord,
}

impl ReplicaEvent {
    /// `child_added` for `record`.
    pub fn added(record: RemoteRecord) -> Self {
        Self {
            kind: EventKind::Added,
            record,
        }
    }

    /// `child_removed` for `record`.
    pub fn removed(record: RemoteRecord) -> Self {
        Self {
            kind: EventKind::Removed,
            record,
        }
    }

    /// `child_changed` for `record`.
    pub fn changed(record: RemoteRecord) -> Self {
        Self {
            kind: EventKind::Changed,
            record,
        }
    }
}

/// Event referenced a key the replica does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    /// Removed/changed event for an absent key.
    #[error("{kind:?} event for unknown key {key:?}")]
    MissingKey {
        /// Event kind that failed.
        kind: EventKind,
        /// Key that was not found.
        key: ItemKey,
    },
}

/// Applies events using a projection and an ordering.
#[derive(Clone, Copy)]
pub struct Reconciler<'a> {
    projection: &'a dyn Projection,
    ordering: &'a dyn Ordering,
}

impl<'a> Reconciler<'a> {
    /// Bind a projection and ordering.
    pub fn new(projection: &'a dyn Projection, ordering: &'a dyn Ordering) -> Self {
        Self {
            projection,
            ordering,
        }
    }

    /// Apply `event` to `state.items`, returning the new sorted list.
    pub fn apply(
        &self,
        state: &ReplicaState,
        event: &ReplicaEvent,
    ) -> Result<Vec<LocalItem>, ConsistencyError> {
        let item = self.projection.project(&event.record, state);
        let mut items = state.items.clone();
        match (event.kind, state.position(&item.key)) {
            // duplicate adds upsert
            (EventKind::Added | EventKind::Changed, Some(idx)) => items[idx] = item,
            (EventKind::Added, None) => items.push(item),
            (EventKind::Removed, Some(idx)) => {
                items.remove(idx);
            }
            (kind, None) => {
                return Err(ConsistencyError::MissingKey {
                    kind,
                    key: item.key,
                })
            }
        }
        if event.kind != EventKind::Removed {
            self.sort(&mut items);
        }
        Ok(items)
    }

    /// Project and sort a full snapshot of the collection.
    pub fn snapshot(&self, state: &ReplicaState, records: &[RemoteRecord]) -> Vec<LocalItem> {
        let mut items: Vec<LocalItem> = Vec::with_capacity(records.len());
        for record in records {
            let item = self.projection.project(record, state);
            match items.iter().position(|existing| existing.key == item.key) {
                Some(idx) => items[idx] = item,
                None => items.push(item),
            }
        }
        self.sort(&mut items);
        items
    }

    fn sort(&self, items: &mut [LocalItem]) {
        items.sort_by(|a, b| total_cmp(self.ordering, a, b));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::ordering::{is_sorted, FieldOrder};
    use crate::projection::DefaultProjection;
    use serde_json::{json, Value};

    fn rec(key: &str, ts: i64) -> RemoteRecord {
        RemoteRecord::new(key, json!({ "timestamp": ts }))
    }

    fn keys(items: &[LocalItem]) -> Vec<&str> {
        items.iter().map(|i| i.key.as_str()).collect()
    }

    fn with_items(items: Vec<LocalItem>) -> ReplicaState {
        ReplicaState {
            items,
            ..ReplicaState::initial()
        }
    }

    #[test]
    fn added_item_is_sorted_by_timestamp() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let state = with_items(vec![LocalItem::new("a").with_field("timestamp", json!(1))]);

        let items = r.apply(&state, &ReplicaEvent::added(rec("b", 0))).unwrap();
        assert_eq!(keys(&items), ["b", "a"]);
        assert_eq!(state.items.len(), 1, "input state untouched");
    }

    #[test]
    fn removed_drops_exactly_one_item() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let state = with_items(vec![LocalItem::new("a"), LocalItem::new("b")]);

        let items = r
            .apply(&state, &ReplicaEvent::removed(RemoteRecord::new("a", Value::Null)))
            .unwrap();
        assert_eq!(keys(&items), ["b"]);
    }

    #[test]
    fn removed_unknown_key_is_a_consistency_error() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let err = r
            .apply(
                &ReplicaState::initial(),
                &ReplicaEvent::removed(RemoteRecord::new("ghost", Value::Null)),
            )
            .unwrap_err();
        assert_eq!(
            err,
            ConsistencyError::MissingKey {
                kind: EventKind::Removed,
                key: "ghost".into()
            }
        );
    }

    #[test]
    fn changed_unknown_key_is_a_consistency_error() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let err = r
            .apply(&ReplicaState::initial(), &ReplicaEvent::changed(rec("ghost", 1)))
            .unwrap_err();
        assert!(matches!(
            err,
            ConsistencyError::MissingKey {
                kind: EventKind::Changed,
                ..
            }
        ));
    }

    #[test]
    fn changed_replaces_and_resorts() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let mut state = ReplicaState::initial();
        for (k, ts) in [("a", 1), ("b", 2), ("c", 3)] {
            state.items = r.apply(&state, &ReplicaEvent::added(rec(k, ts))).unwrap();
        }

        let items = r.apply(&state, &ReplicaEvent::changed(rec("a", 9))).unwrap();
        assert_eq!(keys(&items), ["b", "c", "a"]);
        assert_eq!(items[2].field("timestamp"), Some(&json!(9)));
    }

    #[test]
    fn changed_matches_on_record_key_not_payload() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let state = with_items(vec![
            LocalItem::new("a").with_field("id", json!("b")),
            LocalItem::new("b").with_field("id", json!("a")),
        ]);
        let items = r
            .apply(
                &state,
                &ReplicaEvent::changed(RemoteRecord::new("a", json!({"id": "b", "n": 1}))),
            )
            .unwrap();
        let a = items.iter().find(|i| i.key == "a").unwrap();
        assert_eq!(a.field("n"), Some(&json!(1)));
        let b = items.iter().find(|i| i.key == "b").unwrap();
        assert_eq!(b.field("n"), None);
    }

    #[test]
    fn duplicate_add_upserts() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let mut state = ReplicaState::initial();
        state.items = r.apply(&state, &ReplicaEvent::added(rec("a", 1))).unwrap();
        let once = state.items.clone();
        state.items = r.apply(&state, &ReplicaEvent::added(rec("a", 1))).unwrap();
        assert_eq!(state.items, once);

        state.items = r.apply(&state, &ReplicaEvent::added(rec("a", 5))).unwrap();
        assert_eq!(state.items.len(), 1);
        assert_eq!(state.items[0].field("timestamp"), Some(&json!(5)));
    }

    #[test]
    fn snapshot_projects_and_sorts() {
        let order = FieldOrder::default();
        let r = Reconciler::new(&DefaultProjection, &order);
        let items = r.snapshot(
            &ReplicaState::initial(),
            &[rec("x", 3), rec("y", 1), rec("z", 2)],
        );
        assert_eq!(keys(&items), ["y", "z", "x"]);
        assert!(is_sorted(&order, &items));
    }
}
