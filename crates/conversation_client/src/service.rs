//! The remote service trait the store depends on.
//!
//! All calls are request/response; streaming is not assumed at this layer.
//! Every call may fail with a transport or validation error.

use async_trait::async_trait;
use conversation_core::{
    AddMessageRequest, AiRequest, AiResponse, Branch, Conversation, ConversationTree,
    ConversationUpdate, CreateBranchRequest, CreateConversationRequest, Node, NodeUpdate,
};

use crate::error::Result;

/// CRUD for conversations, branch/node creation, and the AI completion call.
#[async_trait]
pub trait RemoteService: Send + Sync {
    /// Fetch all conversations, most recently updated first.
    async fn list_conversations(&self) -> Result<Vec<Conversation>>;

    /// Fetch a single conversation record.
    async fn get_conversation(&self, id: &str) -> Result<Conversation>;

    /// Fetch a conversation with all of its branches and nodes and the
    /// designated current position.
    async fn get_conversation_tree(&self, id: &str) -> Result<ConversationTree>;

    /// Create a conversation. The backend seeds its initial node and branch.
    async fn create_conversation(&self, request: CreateConversationRequest)
        -> Result<Conversation>;

    /// Apply a partial update to a conversation record.
    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation>;

    /// Delete a conversation. Cascades to its branches and nodes.
    async fn delete_conversation(&self, id: &str) -> Result<()>;

    /// Fork a new branch from an existing node.
    async fn create_branch(
        &self,
        conversation_id: &str,
        request: CreateBranchRequest,
    ) -> Result<Branch>;

    /// Record a user message as a new node. Created with `ai_msg` unset.
    async fn add_message(&self, conversation_id: &str, request: AddMessageRequest)
        -> Result<Node>;

    /// Apply a partial update to a node record.
    async fn update_node(
        &self,
        conversation_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<Node>;

    /// Request an AI completion over the full flattened history.
    async fn get_ai_response(&self, request: AiRequest) -> Result<AiResponse>;
}
