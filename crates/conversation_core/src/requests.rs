//! Wire request/response payloads for the remote service.
//!
//! Partial-update payloads omit unset fields when serializing, so the remote
//! side only touches what the client actually sent.

use serde::{Deserialize, Serialize};

use crate::message::ChatMessage;

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateConversationRequest {
    pub title: String,
}

/// Partial update of a conversation record.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ConversationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_branch_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_node_id: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateBranchRequest {
    pub name: String,

    /// The fork point. Becomes the new branch's `root_node_id`.
    pub from_node_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AddMessageRequest {
    pub user_msg: String,

    /// Parent of the new node; the caller's current node.
    pub parent_id: Option<String>,
}

/// Partial update of a node record.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct NodeUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_msg: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_msg: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotations: Option<String>,
}

impl NodeUpdate {
    /// Update that fills in the assistant reply.
    pub fn ai_reply(content: impl Into<String>) -> Self {
        Self {
            ai_msg: Some(content.into()),
            ..Self::default()
        }
    }

    /// Update that replaces the annotation text.
    pub fn annotations(text: impl Into<String>) -> Self {
        Self {
            annotations: Some(text.into()),
            ..Self::default()
        }
    }
}

/// AI completion request: the full flattened history, newest turn last.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AiRequest {
    pub messages: Vec<ChatMessage>,

    /// Model override; the backend picks its default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AiResponse {
    pub content: String,
    pub model: String,
}
