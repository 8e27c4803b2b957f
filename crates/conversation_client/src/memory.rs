//! In-process implementation of the remote service.
//!
//! Carries the backend's server-side semantics so the store can be exercised
//! without a network: conversation creation seeds the initial node and
//! branch, branch creation inherits ancestry up to the fork point, and
//! deletion cascades. The AI responder replays a scripted queue of replies,
//! falling back to echoing the last user turn.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use conversation_core::{
    AddMessageRequest, AiRequest, AiResponse, Branch, Conversation, ConversationTree,
    ConversationUpdate, CreateBranchRequest, CreateConversationRequest, Node, NodeUpdate, Role,
};
use log::debug;

use crate::error::{RemoteError, Result};
use crate::service::RemoteService;

const INITIAL_USER_MSG: &str = "Start your conversation...";
const INITIAL_AI_MSG: &str = "Hi! How can I help you?";
const MAIN_BRANCH: &str = "main";
const DEFAULT_MODEL: &str = "gpt-4";

/// In-memory conversation backend.
#[derive(Default)]
pub struct InMemoryRemoteService {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    conversations: Vec<Conversation>,
    branches: HashMap<String, Branch>,
    nodes: HashMap<String, StoredNode>,
    replies: VecDeque<String>,
    last_ai_request: Option<AiRequest>,
    faults: Faults,
    calls: usize,
}

/// A node together with the conversation that owns it.
struct StoredNode {
    conversation_id: String,
    node: Node,
}

/// Countdown fault injection: each counter fails that many upcoming calls.
#[derive(Default)]
struct Faults {
    list_conversations: u32,
    update_conversation: u32,
    update_node: u32,
    ai_response: u32,
}

fn injected_failure() -> RemoteError {
    RemoteError::Api {
        status: 503,
        message: "service unavailable".to_string(),
    }
}

fn take_fault(counter: &mut u32) -> Result<()> {
    if *counter > 0 {
        *counter -= 1;
        return Err(injected_failure());
    }
    Ok(())
}

impl InMemoryRemoteService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the next AI reply.
    pub fn script_reply(&self, reply: impl Into<String>) {
        self.state.lock().unwrap().replies.push_back(reply.into());
    }

    /// Fail the next `count` `list_conversations` calls.
    pub fn fail_next_list_conversations(&self, count: u32) {
        self.state.lock().unwrap().faults.list_conversations = count;
    }

    /// Fail the next `count` `update_conversation` calls.
    pub fn fail_next_update_conversation(&self, count: u32) {
        self.state.lock().unwrap().faults.update_conversation = count;
    }

    /// Fail the next `count` `update_node` calls.
    pub fn fail_next_update_node(&self, count: u32) {
        self.state.lock().unwrap().faults.update_node = count;
    }

    /// Fail the next `count` `get_ai_response` calls.
    pub fn fail_next_ai_response(&self, count: u32) {
        self.state.lock().unwrap().faults.ai_response = count;
    }

    /// Total number of remote calls received.
    pub fn call_count(&self) -> usize {
        self.state.lock().unwrap().calls
    }

    /// The most recent AI completion request, if any.
    pub fn last_ai_request(&self) -> Option<AiRequest> {
        self.state.lock().unwrap().last_ai_request.clone()
    }
}

impl MemoryState {
    fn conversation_mut(&mut self, id: &str) -> Result<&mut Conversation> {
        self.conversations
            .iter_mut()
            .find(|conversation| conversation.id == id)
            .ok_or_else(|| RemoteError::NotFound("Conversation not found".to_string()))
    }

    fn conversation(&self, id: &str) -> Result<&Conversation> {
        self.conversations
            .iter()
            .find(|conversation| conversation.id == id)
            .ok_or_else(|| RemoteError::NotFound("Conversation not found".to_string()))
    }
}

#[async_trait]
impl RemoteService for InMemoryRemoteService {
    async fn list_conversations(&self) -> Result<Vec<Conversation>> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        take_fault(&mut state.faults.list_conversations)?;

        let mut conversations = state.conversations.clone();
        conversations.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(conversations)
    }

    async fn get_conversation(&self, id: &str) -> Result<Conversation> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.conversation(id).cloned()
    }

    async fn get_conversation_tree(&self, id: &str) -> Result<ConversationTree> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        let conversation = state.conversation(id)?.clone();
        let branches: Vec<Branch> = state
            .branches
            .values()
            .filter(|branch| branch.conversation_id == id)
            .cloned()
            .collect();
        let nodes: Vec<Node> = state
            .nodes
            .values()
            .filter(|stored| stored.conversation_id == id)
            .map(|stored| stored.node.clone())
            .collect();

        let current_branch = conversation
            .current_branch_id
            .as_ref()
            .and_then(|branch_id| branches.iter().find(|b| &b.id == branch_id).cloned());
        let current_node = conversation
            .current_node_id
            .as_ref()
            .and_then(|node_id| nodes.iter().find(|n| &n.id == node_id).cloned());

        Ok(ConversationTree {
            conversation,
            branches,
            nodes,
            current_branch,
            current_node,
        })
    }

    async fn create_conversation(
        &self,
        request: CreateConversationRequest,
    ) -> Result<Conversation> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        let mut conversation = Conversation::new(request.title);

        // Seed the initial structure the way the backend does: one root node
        // and a main branch, with the conversation pointed at both.
        let root = Node::new(
            Some(INITIAL_USER_MSG.to_string()),
            Some(INITIAL_AI_MSG.to_string()),
            None,
        );
        let main = Branch::new(MAIN_BRANCH, conversation.id.clone(), root.id.clone());
        conversation.current_branch_id = Some(main.id.clone());
        conversation.current_node_id = Some(root.id.clone());

        debug!(
            "created conversation {} with root {} on branch {}",
            conversation.id, root.id, main.id
        );

        state.nodes.insert(
            root.id.clone(),
            StoredNode {
                conversation_id: conversation.id.clone(),
                node: root,
            },
        );
        state.branches.insert(main.id.clone(), main);
        state.conversations.push(conversation.clone());

        Ok(conversation)
    }

    async fn update_conversation(
        &self,
        id: &str,
        update: ConversationUpdate,
    ) -> Result<Conversation> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        take_fault(&mut state.faults.update_conversation)?;

        let conversation = state.conversation_mut(id)?;
        if let Some(title) = update.title {
            conversation.title = title;
        }
        if let Some(branch_id) = update.current_branch_id {
            conversation.current_branch_id = Some(branch_id);
        }
        if let Some(node_id) = update.current_node_id {
            conversation.current_node_id = Some(node_id);
        }
        conversation.touch();
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        let position = state
            .conversations
            .iter()
            .position(|conversation| conversation.id == id)
            .ok_or_else(|| RemoteError::NotFound("Conversation not found".to_string()))?;
        state.conversations.remove(position);
        state.branches.retain(|_, branch| branch.conversation_id != id);
        state.nodes.retain(|_, stored| stored.conversation_id != id);
        Ok(())
    }

    async fn create_branch(
        &self,
        conversation_id: &str,
        request: CreateBranchRequest,
    ) -> Result<Branch> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        state.conversation(conversation_id)?;

        // Locate the branch the fork point lives on and inherit its history
        // up to and including that node.
        let source = state
            .branches
            .values()
            .find(|branch| {
                branch.conversation_id == conversation_id
                    && branch.node_ids.iter().any(|id| id == &request.from_node_id)
            })
            .ok_or_else(|| {
                RemoteError::NotFound("Conversation or source node not found".to_string())
            })?;
        let fork_index = source
            .node_ids
            .iter()
            .position(|id| id == &request.from_node_id)
            .expect("fork point is in the source branch");
        let ancestor_ids = source.node_ids[..=fork_index].to_vec();

        let branch = Branch::forked(
            request.name,
            conversation_id.to_string(),
            request.from_node_id.clone(),
            ancestor_ids,
        );
        state.branches.insert(branch.id.clone(), branch.clone());

        let conversation = state.conversation_mut(conversation_id)?;
        conversation.current_branch_id = Some(branch.id.clone());
        conversation.current_node_id = Some(request.from_node_id);
        conversation.touch();

        Ok(branch)
    }

    async fn add_message(
        &self,
        conversation_id: &str,
        request: AddMessageRequest,
    ) -> Result<Node> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;

        let branch_id = state
            .conversation(conversation_id)?
            .current_branch_id
            .clone()
            .ok_or_else(|| {
                RemoteError::NotFound("Conversation has no current branch".to_string())
            })?;

        let node = Node::new(Some(request.user_msg), None, request.parent_id);
        state.nodes.insert(
            node.id.clone(),
            StoredNode {
                conversation_id: conversation_id.to_string(),
                node: node.clone(),
            },
        );

        let branch = state
            .branches
            .get_mut(&branch_id)
            .ok_or_else(|| RemoteError::NotFound("Branch not found".to_string()))?;
        branch.node_ids.push(node.id.clone());
        branch.touch();

        let conversation = state.conversation_mut(conversation_id)?;
        conversation.current_node_id = Some(node.id.clone());
        conversation.touch();

        Ok(node)
    }

    async fn update_node(
        &self,
        conversation_id: &str,
        node_id: &str,
        update: NodeUpdate,
    ) -> Result<Node> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        take_fault(&mut state.faults.update_node)?;

        let stored = state
            .nodes
            .get_mut(node_id)
            .filter(|stored| stored.conversation_id == conversation_id)
            .ok_or_else(|| RemoteError::NotFound("Node not found".to_string()))?;

        if let Some(user_msg) = update.user_msg {
            stored.node.user_msg = Some(user_msg);
        }
        if let Some(ai_msg) = update.ai_msg {
            stored.node.ai_msg = Some(ai_msg);
        }
        if let Some(annotations) = update.annotations {
            stored.node.annotations = annotations;
        }
        stored.node.touch();
        Ok(stored.node.clone())
    }

    async fn get_ai_response(&self, request: AiRequest) -> Result<AiResponse> {
        let mut state = self.state.lock().unwrap();
        state.calls += 1;
        take_fault(&mut state.faults.ai_response)?;
        state.last_ai_request = Some(request.clone());

        let content = match state.replies.pop_front() {
            Some(reply) => reply,
            None => request
                .messages
                .iter()
                .rev()
                .find(|message| message.role == Role::User)
                .map(|message| message.content.clone())
                .unwrap_or_default(),
        };
        let model = request.model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        Ok(AiResponse { content, model })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conversation_core::ChatMessage;

    #[tokio::test]
    async fn test_create_conversation_seeds_root_and_main_branch() {
        let remote = InMemoryRemoteService::new();
        let conversation = remote
            .create_conversation(CreateConversationRequest {
                title: "First".to_string(),
            })
            .await
            .unwrap();

        assert!(conversation.current_branch_id.is_some());
        assert!(conversation.current_node_id.is_some());

        let tree = remote.get_conversation_tree(&conversation.id).await.unwrap();
        assert_eq!(tree.branches.len(), 1);
        assert_eq!(tree.nodes.len(), 1);

        let branch = tree.current_branch.unwrap();
        assert_eq!(branch.name, MAIN_BRANCH);
        let root = tree.current_node.unwrap();
        assert_eq!(branch.node_ids, vec![root.id.clone()]);
        assert_eq!(root.user_msg.as_deref(), Some(INITIAL_USER_MSG));
        assert_eq!(root.ai_msg.as_deref(), Some(INITIAL_AI_MSG));
    }

    #[tokio::test]
    async fn test_fork_inherits_ancestry_up_to_fork_point() {
        let remote = InMemoryRemoteService::new();
        let conversation = remote
            .create_conversation(CreateConversationRequest {
                title: "Forks".to_string(),
            })
            .await
            .unwrap();
        let root_id = conversation.current_node_id.clone().unwrap();

        let first = remote
            .add_message(
                &conversation.id,
                AddMessageRequest {
                    user_msg: "one".to_string(),
                    parent_id: Some(root_id.clone()),
                },
            )
            .await
            .unwrap();
        remote
            .add_message(
                &conversation.id,
                AddMessageRequest {
                    user_msg: "two".to_string(),
                    parent_id: Some(first.id.clone()),
                },
            )
            .await
            .unwrap();

        let branch = remote
            .create_branch(
                &conversation.id,
                CreateBranchRequest {
                    name: "alt".to_string(),
                    from_node_id: first.id.clone(),
                },
            )
            .await
            .unwrap();

        assert_eq!(branch.root_node_id, first.id);
        assert_eq!(branch.node_ids, vec![root_id, first.id.clone()]);

        let updated = remote.get_conversation(&conversation.id).await.unwrap();
        assert_eq!(updated.current_branch_id.as_ref(), Some(&branch.id));
        assert_eq!(updated.current_node_id.as_ref(), Some(&first.id));
    }

    #[tokio::test]
    async fn test_fork_from_unknown_node_is_not_found() {
        let remote = InMemoryRemoteService::new();
        let conversation = remote
            .create_conversation(CreateConversationRequest {
                title: "Forks".to_string(),
            })
            .await
            .unwrap();

        let result = remote
            .create_branch(
                &conversation.id,
                CreateBranchRequest {
                    name: "alt".to_string(),
                    from_node_id: "missing".to_string(),
                },
            )
            .await;
        assert!(matches!(result, Err(RemoteError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_cascades_to_branches_and_nodes() {
        let remote = InMemoryRemoteService::new();
        let keep = remote
            .create_conversation(CreateConversationRequest {
                title: "Keep".to_string(),
            })
            .await
            .unwrap();
        let drop = remote
            .create_conversation(CreateConversationRequest {
                title: "Drop".to_string(),
            })
            .await
            .unwrap();

        remote.delete_conversation(&drop.id).await.unwrap();

        let listed = remote.list_conversations().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, keep.id);

        let state = remote.state.lock().unwrap();
        assert!(state
            .branches
            .values()
            .all(|branch| branch.conversation_id == keep.id));
        assert!(state
            .nodes
            .values()
            .all(|stored| stored.conversation_id == keep.id));
    }

    #[tokio::test]
    async fn test_scripted_replies_then_echo() {
        let remote = InMemoryRemoteService::new();
        remote.script_reply("fine");

        let request = AiRequest {
            messages: vec![ChatMessage::user("how are you")],
            model: None,
        };
        let scripted = remote.get_ai_response(request.clone()).await.unwrap();
        assert_eq!(scripted.content, "fine");
        assert_eq!(scripted.model, DEFAULT_MODEL);

        let echoed = remote.get_ai_response(request).await.unwrap();
        assert_eq!(echoed.content, "how are you");
    }

    #[tokio::test]
    async fn test_fault_injection_counts_down() {
        let remote = InMemoryRemoteService::new();
        remote.fail_next_list_conversations(1);

        assert!(remote.list_conversations().await.is_err());
        assert!(remote.list_conversations().await.is_ok());
    }
}
