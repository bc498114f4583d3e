// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Port for the remote data source: push-based child events plus point
//! reads and writes with completion continuations.

use crate::item::RemoteRecord;
use crate::reconcile::EventKind;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Normalized slash-separated reference path (no leading/trailing slashes,
/// no empty segments). The empty path is the root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct RemotePath(String);

impl RemotePath {
    /// Normalize `raw` into a path.
    pub fn new(raw: &str) -> Self {
        let joined = raw
            .split('/')
            .filter(|seg| !seg.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        Self(joined)
    }

    /// Root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Whether this is the root.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Append a relative path.
    #[must_use]
    pub fn child(&self, rel: &str) -> Self {
        let rel = Self::new(rel);
        match (self.is_root(), rel.is_root()) {
            (_, true) => self.clone(),
            (true, false) => rel,
            (false, false) => Self(format!("{}/{}", self.0, rel.0)),
        }
    }

    /// Path with the last segment removed (`None` at the root).
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(match self.0.rsplit_once('/') {
            Some((head, _)) => Self(head.to_owned()),
            None => Self::root(),
        })
    }

    /// Last segment (`None` at the root).
    pub fn key(&self) -> Option<&str> {
        if self.is_root() {
            return None;
        }
        Some(self.0.rsplit('/').next().unwrap_or(&self.0))
    }

    /// Path segments from the root.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Borrow the normalized string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}", self.0)
    }
}

impl From<String> for RemotePath {
    fn from(raw: String) -> Self {
        Self::new(&raw)
    }
}

impl From<&str> for RemotePath {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<RemotePath> for String {
    fn from(path: RemotePath) -> Self {
        path.0
    }
}

/// Point operations against the remote source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    /// Event subscription.
    Subscribe,
    /// One-shot read.
    Read,
    /// Overwrite.
    Write,
    /// Shallow merge.
    Merge,
    /// Delete.
    Delete,
}

/// Failure reported by the remote source.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote {op:?} at {path} failed: {message}")]
pub struct RemoteError {
    /// Operation that failed.
    pub op: RemoteOp,
    /// Path the operation targeted.
    pub path: RemotePath,
    /// Source-provided description.
    pub message: String,
}

impl RemoteError {
    /// Construct an error for `op` at `path`.
    pub fn new(op: RemoteOp, path: RemotePath, message: impl Into<String>) -> Self {
        Self {
            op,
            path,
            message: message.into(),
        }
    }
}

/// Callback invoked for every child event at a subscribed path.
pub type EventCallback = Arc<dyn Fn(RemoteRecord) + Send + Sync>;
/// Continuation for a point read.
pub type ReadDone = Box<dyn FnOnce(Result<Option<Value>, RemoteError>) + Send>;
/// Continuation for a point write.
pub type WriteDone = Box<dyn FnOnce(Result<(), RemoteError>) + Send>;

/// Backing store with push-based change notification.
///
/// Continuations may run synchronously inside the call or later on another
/// thread; each must run at most once. Dropping a continuation without
/// calling it is reported to callers as cancellation.
pub trait RemoteSource: Send + Sync {
    /// Register `callback` for `kind` events on the children of `path`.
    fn subscribe(
        &self,
        path: &RemotePath,
        kind: EventKind,
        callback: EventCallback,
    ) -> Result<(), RemoteError>;
    /// Drop every subscription registered at `path`.
    fn unsubscribe(&self, path: &RemotePath);
    /// Read the value at `path` once (`None` when absent).
    fn once(&self, path: &RemotePath, done: ReadDone);
    /// Overwrite the value at `path`.
    fn write(&self, path: &RemotePath, value: Value, done: WriteDone);
    /// Shallow-merge an object into the value at `path`.
    fn merge(&self, path: &RemotePath, value: Value, done: WriteDone);
    /// Delete the value at `path`.
    fn delete(&self, path: &RemotePath, done: WriteDone);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn paths_normalize_slashes() {
        assert_eq!(RemotePath::new("/a//b/").as_str(), "a/b");
        assert!(RemotePath::new("///").is_root());
        assert_eq!(RemotePath::new("a").child("/x/y/").as_str(), "a/x/y");
        assert_eq!(RemotePath::root().child("x").as_str(), "x");
        assert_eq!(RemotePath::new("a").child("").as_str(), "a");
    }

    #[test]
    fn parent_and_key() {
        let p = RemotePath::new("a/b/c");
        assert_eq!(p.key(), Some("c"));
        assert_eq!(p.parent(), Some(RemotePath::new("a/b")));
        assert_eq!(RemotePath::new("a").parent(), Some(RemotePath::root()));
        assert_eq!(RemotePath::root().parent(), None);
        assert_eq!(RemotePath::root().key(), None);
        assert_eq!(p.segments().collect::<Vec<_>>(), ["a", "b", "c"]);
        assert_eq!(p.to_string(), "/a/b/c");
    }
}
