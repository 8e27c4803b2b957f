//! Core record types: conversations, nodes, and branches.
//!
//! Field names match the remote service's JSON wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Top-level dialogue container.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Conversation {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// The branch the user was last on, if any. Must belong to this
    /// conversation.
    pub current_branch_id: Option<String>,

    /// The node the user was last on, if any. Must be a member of the
    /// current branch's `node_ids`.
    pub current_node_id: Option<String>,
}

impl Conversation {
    /// Create a fresh conversation with a minted id and no current position.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: now,
            updated_at: now,
            current_branch_id: None,
            current_node_id: None,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A single turn in the dialogue: the user's message plus, once the AI
/// response has resolved, the assistant's reply.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Node {
    pub id: String,

    /// None only transiently, before the user turn is recorded.
    pub user_msg: Option<String>,

    /// None until the AI response arrives.
    pub ai_msg: Option<String>,

    /// None only for a conversation's root node. The `parent_id` graph over
    /// a conversation's nodes forms a tree.
    pub parent_id: Option<String>,

    /// Free-form user annotation text.
    #[serde(default)]
    pub annotations: String,

    /// Display timestamp shown in timelines.
    pub timestamp: DateTime<Utc>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Node {
    /// Create a fresh node with a minted id and empty annotations.
    pub fn new(
        user_msg: Option<String>,
        ai_msg: Option<String>,
        parent_id: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            user_msg,
            ai_msg,
            parent_id,
            annotations: String::new(),
            timestamp: now,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// A named, ordered path of node ids representing one line of dialogue.
///
/// `node_ids` is first-to-last chronological with no duplicates or gaps, and
/// its order is consistent with the `parent_id` chain: a node's parent, if
/// also in the branch, appears earlier.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Branch {
    pub id: String,
    pub name: String,
    pub conversation_id: String,

    /// The node this branch forked from (or the conversation root).
    pub root_node_id: String,

    /// Ordered node membership, inherited up to and including the fork
    /// point at creation time.
    pub node_ids: Vec<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Branch {
    /// Create a branch whose history starts at `root_node_id`.
    pub fn new(
        name: impl Into<String>,
        conversation_id: impl Into<String>,
        root_node_id: impl Into<String>,
    ) -> Self {
        let root_node_id = root_node_id.into();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            conversation_id: conversation_id.into(),
            node_ids: vec![root_node_id.clone()],
            root_node_id,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a branch forked from an existing line of dialogue.
    ///
    /// `ancestor_ids` is the source branch's membership up to and including
    /// the fork point; the last entry is the fork node.
    pub fn forked(
        name: impl Into<String>,
        conversation_id: impl Into<String>,
        fork_node_id: impl Into<String>,
        ancestor_ids: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            conversation_id: conversation_id.into(),
            root_node_id: fork_node_id.into(),
            node_ids: ancestor_ids,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// The full-tree fetch payload: a conversation together with all of its
/// branches and nodes, and the designated current position.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ConversationTree {
    pub conversation: Conversation,
    pub branches: Vec<Branch>,
    pub nodes: Vec<Node>,
    pub current_branch: Option<Branch>,
    pub current_node: Option<Node>,
}
