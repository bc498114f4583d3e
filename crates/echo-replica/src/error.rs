// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Umbrella error for replica operations.

use crate::config::ConfigError;
use crate::reconcile::ConsistencyError;
use crate::remote::{RemoteError, RemoteOp, RemotePath};
use crate::store::StoreError;
use thiserror::Error;

/// Error type returned by [`crate::Replica`] operations.
#[derive(Debug, Error)]
pub enum ReplicaError {
    /// Configuration problem (fatal).
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Store rejected registration.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Remote operation failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Event referenced a key the replica does not hold.
    #[error(transparent)]
    Consistency(#[from] ConsistencyError),
    /// Remote source dropped the continuation without answering.
    #[error("remote {op:?} at {path} was cancelled")]
    Cancelled {
        /// Operation that never completed.
        op: RemoteOp,
        /// Path the operation targeted.
        path: RemotePath,
    },
}
