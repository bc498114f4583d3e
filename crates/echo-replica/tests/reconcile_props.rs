// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>

#![allow(missing_docs)]
#![allow(clippy::unwrap_used, clippy::expect_used)]
use echo_replica::ordering::is_sorted;
use echo_replica::{
    ActionKind, ActionTypes, DefaultProjection, FieldOrder, LocalItem, Namespace,
    NamespaceAction, Reconciler, Reducer, ReplicaEvent, ReplicaState, StatePatch,
};
use echo_replica_mem::stamped;
use proptest::prelude::*;
use serde_json::Value;
use std::collections::BTreeMap;

const KEYS: [&str; 8] = ["a", "b", "c", "d", "e", "f", "g", "h"];

#[derive(Debug, Clone, Copy)]
enum Op {
    Add(usize, i64),
    Change(usize, i64),
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (0..KEYS.len(), 0i64..20).prop_map(|(k, ts)| Op::Add(k, ts)),
        (0..KEYS.len(), 0i64..20).prop_map(|(k, ts)| Op::Change(k, ts)),
        (0..KEYS.len()).prop_map(Op::Remove),
    ]
}

// Turn arbitrary ops into a delivery sequence a consistent remote could
// produce: changes and removals only for keys that currently exist.
fn events(ops: &[Op]) -> (Vec<ReplicaEvent>, BTreeMap<&'static str, i64>) {
    let mut model = BTreeMap::new();
    let mut out = Vec::new();
    for op in ops {
        match *op {
            Op::Add(k, ts) if !model.contains_key(KEYS[k]) => {
                model.insert(KEYS[k], ts);
                out.push(ReplicaEvent::added(stamped(KEYS[k], ts)));
            }
            Op::Add(k, ts) | Op::Change(k, ts) if model.contains_key(KEYS[k]) => {
                model.insert(KEYS[k], ts);
                out.push(ReplicaEvent::changed(stamped(KEYS[k], ts)));
            }
            Op::Change(k, ts) => {
                model.insert(KEYS[k], ts);
                out.push(ReplicaEvent::added(stamped(KEYS[k], ts)));
            }
            Op::Remove(k) if model.remove(KEYS[k]).is_some() => {
                out.push(ReplicaEvent::removed(stamped(KEYS[k], 0)));
            }
            Op::Add(..) | Op::Remove(_) => {}
        }
    }
    (out, model)
}

fn run(events: &[ReplicaEvent]) -> ReplicaState {
    let order = FieldOrder::default();
    let reconciler = Reconciler::new(&DefaultProjection, &order);
    let mut state = ReplicaState::initial();
    for event in events {
        let items = reconciler
            .apply(&state, event)
            .expect("consistent sequence never misses a key");
        state = state.merged(&StatePatch::items(items));
    }
    state
}

fn timestamps(items: &[LocalItem]) -> BTreeMap<String, i64> {
    items
        .iter()
        .map(|i| {
            let ts = i.field("timestamp").and_then(Value::as_i64).unwrap_or(-1);
            (i.key.clone(), ts)
        })
        .collect()
}

proptest! {
    #[test]
    fn items_stay_sorted_and_match_remote(ops in prop::collection::vec(op(), 0..64)) {
        let (events, model) = events(&ops);
        let state = run(&events);

        prop_assert!(is_sorted(&FieldOrder::default(), &state.items));
        let expected: BTreeMap<String, i64> =
            model.iter().map(|(k, ts)| ((*k).to_owned(), *ts)).collect();
        prop_assert_eq!(timestamps(&state.items), expected);
    }

    #[test]
    fn repeated_add_is_idempotent(
        ops in prop::collection::vec(op(), 0..32),
        key in 0..KEYS.len(),
        ts in 0i64..20,
    ) {
        let (events, _) = events(&ops);
        let state = run(&events);
        let order = FieldOrder::default();
        let reconciler = Reconciler::new(&DefaultProjection, &order);
        let add = ReplicaEvent::added(stamped(KEYS[key], ts));

        let once = state.merged(&StatePatch::items(reconciler.apply(&state, &add).unwrap()));
        let twice = reconciler.apply(&once, &add).unwrap();
        prop_assert_eq!(once.items, twice);
    }

    #[test]
    fn distinct_adds_commute(stamps in prop::collection::vec(0i64..5, 1..KEYS.len())) {
        let adds: Vec<ReplicaEvent> = stamps
            .iter()
            .enumerate()
            .map(|(i, ts)| ReplicaEvent::added(stamped(KEYS[i], *ts)))
            .collect();
        let mut reversed = adds.clone();
        reversed.reverse();

        prop_assert_eq!(run(&adds).items, run(&reversed).items);
    }

    #[test]
    fn reducer_is_pure(ops in prop::collection::vec(op(), 0..16), listening in any::<bool>()) {
        let (events, _) = events(&ops);
        let mut state = run(&events);
        state.listening = listening;
        let snapshot = state.clone();

        let types = ActionTypes::new(Namespace::new("todos").unwrap());
        let reducer = Reducer::new(types.namespace().clone());
        for kind in ActionKind::ALL {
            let action = NamespaceAction::new(&types, kind, Some(StatePatch::items(Vec::new())));
            let first = reducer.reduce(Some(&state), &action);
            let second = reducer.reduce(Some(&state), &action);
            prop_assert_eq!(&first, &second);
            prop_assert_eq!(&state, &snapshot);
        }

        let foreign = ActionTypes::new(Namespace::new("other").unwrap());
        let patch = Some(StatePatch::items(Vec::new()));
        let action = NamespaceAction::new(&foreign, ActionKind::Value, patch);
        prop_assert_eq!(reducer.reduce(Some(&state), &action), snapshot);
    }
}
