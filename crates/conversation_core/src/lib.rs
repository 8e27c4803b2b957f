//! conversation_core - Record types and tree queries for branching conversations
//!
//! This crate provides the data layer shared by the store and the remote
//! service boundary:
//! - `types` - Conversation, Node, Branch and the full-tree payload
//! - `requests` - wire request/response payloads for the remote service
//! - `message` - Role and ChatMessage for AI completion history
//! - `tree` - pure derived queries (ordering, cursor index, navigation)
//!
//! Everything here is plain data plus pure functions. No I/O, no async.

pub mod message;
pub mod requests;
pub mod tree;
pub mod types;

// Re-export commonly used types
pub use message::{ChatMessage, Role};
pub use requests::{
    AddMessageRequest, AiRequest, AiResponse, ConversationUpdate, CreateBranchRequest,
    CreateConversationRequest, NodeUpdate,
};
pub use types::{Branch, Conversation, ConversationTree, Node};
