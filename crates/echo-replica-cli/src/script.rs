// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replay scripts: seed data for the remote plus an ordered list of steps.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use echo_replica::{
    Replica, ReplicaConfig, ReplicaError, ReplicaState, SharedStore, Store, StoreState,
};
use echo_replica_mem::MemoryRemote;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

/// A replay script.
///
/// ```json
/// {
///   "seed": { "todos/a": { "timestamp": 2 } },
///   "steps": [
///     { "op": "listen" },
///     { "op": "set", "path": "b", "value": { "timestamp": 1 } }
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Script {
    /// Values written to the remote before any step, keyed by absolute path.
    #[serde(default)]
    pub seed: BTreeMap<String, Value>,
    /// Steps, run in order.
    pub steps: Vec<Step>,
}

/// One replica operation. Point-operation paths are relative to the
/// collection.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Listen,
    Unlisten,
    Refresh,
    Get { path: String },
    Set { path: String, value: Value },
    Update { path: String, value: Value },
    Remove { path: String },
    /// Write straight to the remote at an absolute path, as another client would.
    Remote { path: String, value: Value },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Self::Listen => "listen",
            Self::Unlisten => "unlisten",
            Self::Refresh => "refresh",
            Self::Get { .. } => "get",
            Self::Set { .. } => "set",
            Self::Update { .. } => "update",
            Self::Remove { .. } => "remove",
            Self::Remote { .. } => "remote",
        }
    }

    async fn apply(&self, replica: &Replica, remote: &MemoryRemote) -> Result<(), ReplicaError> {
        match self {
            Self::Listen => {
                replica.listen(|state: &ReplicaState| {
                    debug!(items = state.items.len(), "replica changed");
                })?;
            }
            Self::Unlisten => {
                replica.unlisten();
            }
            Self::Refresh => {
                replica.refresh().await?;
            }
            Self::Get { path } => {
                let value = replica.get_at(path, None).await?;
                debug!(path = %path, ?value, "read");
            }
            Self::Set { path, value } => replica.set_at(path, value.clone(), None).await?,
            Self::Update { path, value } => replica.update_at(path, value.clone(), None).await?,
            Self::Remove { path } => replica.remove_at(path, None).await?,
            Self::Remote { path, value } => remote.insert(path, value.clone()),
        }
        Ok(())
    }
}

impl Script {
    /// Parse a script from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    /// Run every step against a fresh in-memory remote and shared store.
    /// Stops at the first failing step.
    pub async fn run(&self, config: ReplicaConfig) -> Result<StoreState> {
        let remote = MemoryRemote::new();
        for (path, value) in &self.seed {
            remote.insert(path, value.clone());
        }
        let store = Arc::new(SharedStore::new());
        let replica = Replica::builder(config)
            .remote(Arc::new(remote.clone()))
            .store(store.clone())
            .on_error(|err: &ReplicaError| warn!(error = %err, "consistency error"))
            .build()
            .context("build replica")?;
        store.register(replica.reducer().clone())?;

        for (index, step) in self.steps.iter().enumerate() {
            debug!(index, step = step.name(), "step");
            step.apply(&replica, &remote)
                .await
                .with_context(|| format!("step {index} ({})", step.name()))?;
        }
        info!(
            namespace = %replica.namespace(),
            steps = self.steps.len(),
            dispatched = store.dispatch_count(),
            "replay finished"
        );
        Ok(store.get_state())
    }
}
