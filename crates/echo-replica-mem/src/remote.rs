// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory JSON tree implementing [`RemoteSource`].

use echo_replica::{
    EventCallback, EventKind, ReadDone, RemoteError, RemoteOp, RemotePath, RemoteRecord,
    RemoteSource, WriteDone,
};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

type Task = Box<dyn FnOnce() + Send>;

/// In-memory remote source for testing without a backend.
///
/// Writes update a JSON tree and fan out `child_added` / `child_removed` /
/// `child_changed` events to subscribers of the affected parent paths.
/// Subscribing to `child_added` replays existing children, like a live
/// backend would. Callbacks and continuations run after the internal lock is
/// released, so they may call back into the remote.
///
/// Clones share state.
///
/// ```
/// use echo_replica_mem::MemoryRemote;
/// use serde_json::json;
///
/// let remote = MemoryRemote::new();
/// remote.insert("todos/a", json!({"timestamp": 1}));
/// assert_eq!(remote.get("todos/a/timestamp"), Some(json!(1)));
/// assert_eq!(remote.write_count(), 0);
/// ```
#[derive(Clone, Default)]
pub struct MemoryRemote {
    inner: Arc<Mutex<MemoryRemoteInner>>,
}

struct Subscription {
    path: RemotePath,
    kind: EventKind,
    callback: EventCallback,
}

#[derive(Default)]
struct MemoryRemoteInner {
    root: Map<String, Value>,
    subscriptions: Vec<Subscription>,
    read_count: usize,
    write_count: usize,
    fail_on_read: bool,
    fail_on_write: bool,
    fail_on_subscribe: bool,
    deferred: bool,
    pending: Vec<Task>,
}

fn lookup<'a>(root: &'a Map<String, Value>, path: &RemotePath) -> Option<&'a Value> {
    let mut segments = path.segments();
    let first = segments.next()?;
    let mut node = root.get(first)?;
    for seg in segments {
        node = node.as_object()?.get(seg)?;
    }
    Some(node)
}

fn children(root: &Map<String, Value>, path: &RemotePath) -> BTreeMap<String, Value> {
    let map = if path.is_root() {
        Some(root)
    } else {
        lookup(root, path).and_then(Value::as_object)
    };
    map.map(|m| {
        m.iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<BTreeMap<_, _>>()
    })
    .unwrap_or_default()
}

// Null deletes.
fn assign(root: &mut Map<String, Value>, path: &RemotePath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    let Some((last, parents)) = segments.split_last() else {
        *root = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        return;
    };
    let mut node = root;
    for seg in parents {
        if value.is_null() && !node.contains_key(*seg) {
            return;
        }
        let entry = node
            .entry((*seg).to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        let Value::Object(next) = entry else {
            return;
        };
        node = next;
    }
    if value.is_null() {
        node.remove(*last);
    } else {
        node.insert((*last).to_owned(), value);
    }
}

fn diff_events(
    before: &BTreeMap<String, Value>,
    after: &BTreeMap<String, Value>,
) -> Vec<(EventKind, RemoteRecord)> {
    let mut events = Vec::new();
    for (key, old) in before {
        if !after.contains_key(key) {
            events.push((EventKind::Removed, RemoteRecord::new(key.clone(), old.clone())));
        }
    }
    for (key, new) in after {
        match before.get(key) {
            None => events.push((EventKind::Added, RemoteRecord::new(key.clone(), new.clone()))),
            Some(old) if old != new => {
                events.push((EventKind::Changed, RemoteRecord::new(key.clone(), new.clone())));
            }
            Some(_) => {}
        }
    }
    events
}

impl MemoryRemoteInner {
    // Apply a mutation and return the callbacks to fire.
    fn mutate(&mut self, f: impl FnOnce(&mut Map<String, Value>)) -> Vec<Task> {
        let watched: Vec<RemotePath> = {
            let mut paths: Vec<RemotePath> =
                self.subscriptions.iter().map(|s| s.path.clone()).collect();
            paths.sort();
            paths.dedup();
            paths
        };
        let before: Vec<_> = watched.iter().map(|p| children(&self.root, p)).collect();
        f(&mut self.root);
        let mut tasks: Vec<Task> = Vec::new();
        for (path, before) in watched.iter().zip(before) {
            let after = children(&self.root, path);
            for (kind, record) in diff_events(&before, &after) {
                for sub in self
                    .subscriptions
                    .iter()
                    .filter(|s| &s.path == path && s.kind == kind)
                {
                    let callback = Arc::clone(&sub.callback);
                    let record = record.clone();
                    tasks.push(Box::new(move || callback(record)));
                }
            }
        }
        tasks
    }

    fn complete(&mut self, task: Task) -> Option<Task> {
        if self.deferred {
            self.pending.push(task);
            None
        } else {
            Some(task)
        }
    }
}

impl MemoryRemote {
    /// Create an empty remote.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryRemoteInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn run(tasks: Vec<Task>) {
        for task in tasks {
            task();
        }
    }

    /// Write `value` at `path` directly (no continuation, no counters).
    /// Subscribers are notified as for a normal write.
    pub fn insert(&self, path: &str, value: Value) {
        let path = RemotePath::new(path);
        let tasks = self.lock().mutate(|root| assign(root, &path, value));
        Self::run(tasks);
    }

    /// Current value at `path`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let inner = self.lock();
        let path = RemotePath::new(path);
        if path.is_root() {
            return Some(Value::Object(inner.root.clone()));
        }
        lookup(&inner.root, &path).cloned()
    }

    /// Deliver a raw event to subscribers of `path`, bypassing the tree.
    ///
    /// Useful for out-of-order or inconsistent delivery scenarios.
    pub fn emit(&self, path: &str, kind: EventKind, record: RemoteRecord) {
        let path = RemotePath::new(path);
        let callbacks: Vec<EventCallback> = self
            .lock()
            .subscriptions
            .iter()
            .filter(|s| s.path == path && s.kind == kind)
            .map(|s| Arc::clone(&s.callback))
            .collect();
        for callback in callbacks {
            callback(record.clone());
        }
    }

    /// Number of subscriptions registered at `path`.
    pub fn subscriber_count(&self, path: &str) -> usize {
        let path = RemotePath::new(path);
        self.lock()
            .subscriptions
            .iter()
            .filter(|s| s.path == path)
            .count()
    }

    /// Configure reads (`once`) to fail.
    pub fn set_fail_on_read(&self, fail: bool) {
        self.lock().fail_on_read = fail;
    }

    /// Configure writes (`write`, `merge`, `delete`) to fail.
    pub fn set_fail_on_write(&self, fail: bool) {
        self.lock().fail_on_write = fail;
    }

    /// Configure `subscribe` to fail.
    pub fn set_fail_on_subscribe(&self, fail: bool) {
        self.lock().fail_on_subscribe = fail;
    }

    /// Hold continuations until [`flush`](Self::flush) instead of running
    /// them inside the call.
    pub fn set_deferred(&self, deferred: bool) {
        self.lock().deferred = deferred;
    }

    /// Run held continuations; returns how many ran.
    pub fn flush(&self) -> usize {
        let tasks = std::mem::take(&mut self.lock().pending);
        let n = tasks.len();
        Self::run(tasks);
        n
    }

    /// Number of `once` calls (attempted, not successful).
    pub fn read_count(&self) -> usize {
        self.lock().read_count
    }

    /// Number of `write`/`merge`/`delete` calls (attempted, not successful).
    pub fn write_count(&self) -> usize {
        self.lock().write_count
    }

    fn point_write(
        &self,
        op: RemoteOp,
        path: &RemotePath,
        done: WriteDone,
        apply: impl FnOnce(&mut Map<String, Value>) -> Result<(), String>,
    ) {
        let mut inner = self.lock();
        inner.write_count += 1;
        let (mut tasks, result) = if inner.fail_on_write {
            (
                Vec::new(),
                Err(RemoteError::new(op, path.clone(), "write rejected")),
            )
        } else {
            let mut outcome = Ok(());
            let tasks = inner.mutate(|root| {
                outcome = apply(root);
            });
            (tasks, outcome.map_err(|msg| RemoteError::new(op, path.clone(), msg)))
        };
        let finish: Task = Box::new(move || done(result));
        if let Some(task) = inner.complete(finish) {
            tasks.push(task);
        }
        drop(inner);
        Self::run(tasks);
    }
}

impl RemoteSource for MemoryRemote {
    fn subscribe(
        &self,
        path: &RemotePath,
        kind: EventKind,
        callback: EventCallback,
    ) -> Result<(), RemoteError> {
        let mut inner = self.lock();
        if inner.fail_on_subscribe {
            return Err(RemoteError::new(
                RemoteOp::Subscribe,
                path.clone(),
                "subscribe rejected",
            ));
        }
        let replay: Vec<RemoteRecord> = if kind == EventKind::Added {
            children(&inner.root, path)
                .into_iter()
                .map(|(k, v)| RemoteRecord::new(k, v))
                .collect()
        } else {
            Vec::new()
        };
        inner.subscriptions.push(Subscription {
            path: path.clone(),
            kind,
            callback: Arc::clone(&callback),
        });
        drop(inner);
        for record in replay {
            callback(record);
        }
        Ok(())
    }

    fn unsubscribe(&self, path: &RemotePath) {
        self.lock().subscriptions.retain(|s| &s.path != path);
    }

    fn once(&self, path: &RemotePath, done: ReadDone) {
        let mut inner = self.lock();
        inner.read_count += 1;
        let result = if inner.fail_on_read {
            Err(RemoteError::new(RemoteOp::Read, path.clone(), "read rejected"))
        } else if path.is_root() {
            Ok(Some(Value::Object(inner.root.clone())))
        } else {
            Ok(lookup(&inner.root, path).cloned())
        };
        let task = inner.complete(Box::new(move || done(result)));
        drop(inner);
        if let Some(task) = task {
            task();
        }
    }

    fn write(&self, path: &RemotePath, value: Value, done: WriteDone) {
        let target = path.clone();
        self.point_write(RemoteOp::Write, path, done, move |root| {
            assign(root, &target, value);
            Ok(())
        });
    }

    fn merge(&self, path: &RemotePath, value: Value, done: WriteDone) {
        let target = path.clone();
        self.point_write(RemoteOp::Merge, path, done, move |root| {
            let Value::Object(fields) = value else {
                return Err("merge requires an object".to_owned());
            };
            for (key, v) in fields {
                assign(root, &target.child(&key), v);
            }
            Ok(())
        });
    }

    fn delete(&self, path: &RemotePath, done: WriteDone) {
        let target = path.clone();
        self.point_write(RemoteOp::Delete, path, done, move |root| {
            assign(root, &target, Value::Null);
            Ok(())
        });
    }
}
