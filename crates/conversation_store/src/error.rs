//! Store error types

use conversation_client::RemoteError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Operation needs an active conversation; raised before any network
    /// call.
    #[error("no active conversation")]
    NoActiveConversation,

    /// Operation needs an active node; raised before any network call.
    #[error("no active node")]
    NoActiveNode,

    /// Target node is not in the cache; raised before any network call.
    #[error("node not in cache: {0}")]
    UnknownNode(String),

    /// The local cursor moved but the new position could not be persisted.
    /// Reload the conversation to re-sync.
    #[error("branch switch to {branch_id} was not persisted remotely: {source}")]
    SwitchNotPersisted {
        branch_id: String,
        #[source]
        source: RemoteError,
    },

    #[error("remote service error: {0}")]
    Remote(#[from] RemoteError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
