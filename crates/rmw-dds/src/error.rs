// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types surfaced by the rmw layer.

use crate::transport::TransportError;
use thiserror::Error;

/// Errors emitted by graph, topic and entity lifecycle operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A participant, endpoint, guard condition or thread could not be allocated.
    #[error("allocation failed: {0}")]
    BadAllocation(String),
    /// The transport refused the operation.
    #[error("transport rejected operation: {0}")]
    TransportRejection(String),
    /// The local cache was mutated but the graph update could not be broadcast.
    /// The mutation has been rolled back when this is returned.
    #[error("failed to publish graph update: {0}")]
    GossipPublishFailure(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// No participant in the graph knows a node with this name/namespace.
    #[error("node '{name}' in namespace '{namespace}' does not exist")]
    NodeNameNonExistent { name: String, namespace: String },
    /// A live topic with the same name already carries a different type.
    #[error("topic '{topic}' already exists with type '{existing}' (requested '{requested}')")]
    TopicTypeMismatch {
        topic: String,
        existing: String,
        requested: String,
    },
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("wait timed out")]
    Timeout,
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::OutOfResources(what) => Self::BadAllocation(what),
            other => Self::TransportRejection(other.to_string()),
        }
    }
}

/// Convenient alias for results using the crate [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
