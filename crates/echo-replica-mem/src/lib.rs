// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! In-memory remote source and fixtures for `echo-replica`.
#![forbid(unsafe_code)]
//!
//! # Modules
//!
//! - [`remote`] - JSON-tree [`RemoteSource`](echo_replica::RemoteSource) fake
//!   with child-event notification, failure toggles, and call counters
//! - [`fixtures`] - record and item helpers

pub mod fixtures;
pub mod remote;

pub use fixtures::{item_keys, stamped, stamped_item};
pub use remote::MemoryRemote;
