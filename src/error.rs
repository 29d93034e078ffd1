//! Error types for the platform cache subsystem

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the platform cache subsystem
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Malformed or conflicting configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Node filter could not be evaluated against a node
    #[error("Filter evaluation failed on node {node}: {reason}")]
    FilterEvaluation { node: String, reason: String },

    /// YAML configuration parse error
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // =========================================================================
    // Cluster Errors
    // =========================================================================
    /// Node not found in cluster membership
    #[error("Node not found: {0}")]
    NodeNotFound(String),

    /// Instance name already taken by a running node
    #[error("Duplicate node name: {0}")]
    DuplicateNodeName(String),

    /// Operation issued against a stopped node
    #[error("Node stopped: {0}")]
    NodeStopped(String),

    // =========================================================================
    // Cache Errors
    // =========================================================================
    /// Cache is not started on this node
    #[error("Cache not found: {0}")]
    CacheNotFound(String),

    /// Cache with this name already exists in the cluster
    #[error("Cache already exists: {0}")]
    CacheAlreadyExists(String),

    /// Distributed store unreachable
    #[error("Distributed store unavailable for cache {cache}: {reason}")]
    RemoteUnavailable { cache: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns true if the failure came from the distributed store
    pub fn is_remote(&self) -> bool {
        matches!(self, Error::RemoteUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::RemoteUnavailable {
            cache: "orders".to_string(),
            reason: "store offline".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Distributed store unavailable for cache orders: store offline"
        );
        assert!(err.is_remote());
        assert!(!Error::CacheNotFound("x".to_string()).is_remote());
    }

    #[test]
    fn test_from_serde_json() {
        let parse: std::result::Result<u32, _> = serde_json::from_str("not json");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
