// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replica configuration and configuration errors.

use crate::ordering::DEFAULT_ORDER_FIELD;
use crate::remote::RemotePath;
use crate::state::Namespace;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration problems. Always fatal.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// No namespace identifier given.
    #[error("missing namespace")]
    MissingNamespace,
    /// Namespace contains characters outside `[A-Za-z0-9_-]`.
    #[error("invalid namespace: {0:?}")]
    InvalidNamespace(String),
    /// No collection path given.
    #[error("missing collection path")]
    MissingPath,
    /// Replica built without a shared store.
    #[error("missing store")]
    MissingStore,
    /// Replica built without a remote source.
    #[error("missing remote source")]
    MissingRemote,
    /// Serialization/deserialization failure.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

fn default_order_by() -> String {
    DEFAULT_ORDER_FIELD.to_owned()
}

/// Static configuration of one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaConfig {
    /// Namespace for actions and the store slice.
    pub namespace: String,
    /// Remote collection path the replica mirrors.
    pub path: String,
    /// Field used by the default ordering.
    #[serde(default = "default_order_by")]
    pub order_by: String,
    /// Forward consistency errors to the error hook instead of only logging.
    #[serde(default)]
    pub strict_consistency: bool,
}

impl ReplicaConfig {
    /// Config with defaults for everything but namespace and path.
    pub fn new(namespace: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            path: path.into(),
            order_by: default_order_by(),
            strict_consistency: false,
        }
    }

    /// Parse and validate a JSON config blob.
    pub fn from_json(bytes: &[u8]) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_slice(bytes)?;
        config.validate()?;
        Ok(config)
    }

    /// Pretty JSON encoding.
    pub fn to_json(&self) -> Result<Vec<u8>, ConfigError> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Check namespace and path, returning the parsed forms.
    pub fn validate(&self) -> Result<(Namespace, RemotePath), ConfigError> {
        let namespace = Namespace::new(self.namespace.trim())?;
        let path = RemotePath::new(&self.path);
        if path.is_root() {
            return Err(ConfigError::MissingPath);
        }
        Ok((namespace, path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_fields() {
        let cfg = ReplicaConfig::from_json(br#"{"namespace":"todos","path":"/users/1/todos"}"#)
            .unwrap();
        assert_eq!(cfg.order_by, "timestamp");
        assert!(!cfg.strict_consistency);
        let (ns, path) = cfg.validate().unwrap();
        assert_eq!(ns.as_str(), "todos");
        assert_eq!(path.as_str(), "users/1/todos");
    }

    #[test]
    fn empty_namespace_is_fatal() {
        let err = ReplicaConfig::new("  ", "x").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingNamespace));
    }

    #[test]
    fn root_path_is_rejected() {
        let err = ReplicaConfig::new("n", "/").validate().unwrap_err();
        assert!(matches!(err, ConfigError::MissingPath));
    }

    #[test]
    fn malformed_json_is_serde_error() {
        let err = ReplicaConfig::from_json(b"{").unwrap_err();
        assert!(matches!(err, ConfigError::Serde(_)));
    }

    #[test]
    fn json_roundtrip_keeps_values() {
        let mut cfg = ReplicaConfig::new("feed", "feeds/main");
        cfg.strict_consistency = true;
        let back = ReplicaConfig::from_json(&cfg.to_json().unwrap()).unwrap();
        assert_eq!(back, cfg);
    }
}
