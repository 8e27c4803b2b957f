//! The conversation store: sequences remote calls and applies their results
//! to the session state.

use std::sync::atomic::{AtomicBool, Ordering};

use conversation_client::{RemoteError, RemoteService};
use conversation_core::{
    tree, AddMessageRequest, AiRequest, Branch, ChatMessage, Conversation, ConversationUpdate,
    CreateBranchRequest, CreateConversationRequest, Node, NodeUpdate,
};
use tokio::sync::{Mutex, RwLock};

use crate::error::{Result, StoreError};
use crate::state::SessionState;

/// Scoped loading flag: set on entry, cleared on every exit path.
struct LoadingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> LoadingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self { flag }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// One user session over branching conversations.
///
/// Owns the cached collections and the cursor; exposes the high-level
/// operations (send message, create/switch branch, navigate) and the derived
/// views, which are recomputed from the canonical collections on demand.
pub struct ConversationStore<R: RemoteService> {
    remote: R,
    state: RwLock<SessionState>,
    loading: AtomicBool,

    /// Serializes network-path operations per instance.
    admission: Mutex<()>,

    /// Model forwarded to the AI responder; backend default when unset.
    model: std::sync::RwLock<Option<String>>,
}

impl<R: RemoteService> ConversationStore<R> {
    pub fn new(remote: R) -> Self {
        Self {
            remote,
            state: RwLock::new(SessionState::default()),
            loading: AtomicBool::new(false),
            admission: Mutex::new(()),
            model: std::sync::RwLock::new(None),
        }
    }

    /// Pick the AI model at construction time.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        *self.model.get_mut().expect("model lock") = Some(model.into());
        self
    }

    /// Change the AI model for subsequent messages. `None` restores the
    /// backend default.
    pub fn set_model(&self, model: Option<String>) {
        *self.model.write().expect("model lock") = model;
    }

    pub fn model(&self) -> Option<String> {
        self.model.read().expect("model lock").clone()
    }

    /// The remote collaborator this store talks to.
    pub fn remote(&self) -> &R {
        &self.remote
    }

    // ---- state accessors -------------------------------------------------

    pub fn is_loading(&self) -> bool {
        self.loading.load(Ordering::SeqCst)
    }

    pub async fn error(&self) -> Option<String> {
        self.state.read().await.error.clone()
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        self.state.read().await.conversations.clone()
    }

    pub async fn current_conversation(&self) -> Option<Conversation> {
        self.state.read().await.current_conversation.clone()
    }

    pub async fn current_branch(&self) -> Option<Branch> {
        self.state.read().await.current_branch.clone()
    }

    pub async fn current_node(&self) -> Option<Node> {
        self.state.read().await.current_node.clone()
    }

    pub async fn branches(&self) -> Vec<Branch> {
        self.state.read().await.branches.clone()
    }

    pub async fn nodes(&self) -> Vec<Node> {
        self.state.read().await.nodes.clone()
    }

    // ---- derived views ---------------------------------------------------

    /// The active branch's nodes in branch order.
    pub async fn current_branch_nodes(&self) -> Vec<Node> {
        let state = self.state.read().await;
        match &state.current_branch {
            Some(branch) => tree::ordered_branch_nodes(branch, &state.nodes),
            None => Vec::new(),
        }
    }

    /// Position of the cursor node within the active branch; `None` when
    /// the cursor is out of the branch.
    pub async fn current_node_index(&self) -> Option<usize> {
        let state = self.state.read().await;
        match (&state.current_branch, &state.current_node) {
            (Some(branch), Some(node)) => tree::node_index(branch, &node.id),
            _ => None,
        }
    }

    pub async fn can_go_back(&self) -> bool {
        let state = self.state.read().await;
        match (&state.current_branch, &state.current_node) {
            (Some(branch), Some(node)) => tree::can_go_back(branch, &node.id),
            _ => false,
        }
    }

    pub async fn can_go_forward(&self) -> bool {
        let state = self.state.read().await;
        match (&state.current_branch, &state.current_node) {
            (Some(branch), Some(node)) => tree::can_go_forward(branch, &node.id, &state.nodes),
            _ => false,
        }
    }

    /// Flattened chronological history of the active branch.
    pub async fn history(&self) -> Vec<ChatMessage> {
        tree::project_history(&self.current_branch_nodes().await)
    }

    // ---- operations ------------------------------------------------------

    /// Refresh the cached conversation list. On failure the list is left
    /// unchanged and the session error is set.
    pub async fn list_conversations(&self) {
        let _admission = self.admission.lock().await;
        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        match self.remote.list_conversations().await {
            Ok(conversations) => {
                tracing::debug!(count = conversations.len(), "refreshed conversation list");
                self.state.write().await.conversations = conversations;
            }
            Err(err) => self.record_remote_error(&err).await,
        }
    }

    /// Load a conversation's full tree and move the cursor into it.
    pub async fn load_conversation(&self, conversation_id: &str) {
        let _admission = self.admission.lock().await;
        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;
        self.load_tree(conversation_id).await;
    }

    /// Create a conversation, cache it at the front of the list, and load
    /// its freshly seeded tree.
    pub async fn create_conversation(&self, title: impl Into<String>) -> Result<Conversation> {
        let title = title.into();
        let _admission = self.admission.lock().await;
        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        let conversation = match self
            .remote
            .create_conversation(CreateConversationRequest { title })
            .await
        {
            Ok(conversation) => conversation,
            Err(err) => {
                self.record_remote_error(&err).await;
                return Err(err.into());
            }
        };
        tracing::info!(conversation_id = %conversation.id, "created conversation");

        self.state
            .write()
            .await
            .conversations
            .insert(0, conversation.clone());
        self.load_tree(&conversation.id).await;
        Ok(conversation)
    }

    /// Send a user message on the active branch and record the AI reply.
    ///
    /// The full history of the active branch plus the new user turn goes to
    /// the AI responder; the finalized node (user message and AI reply) is
    /// appended to the branch and becomes the cursor.
    pub async fn send_message(&self, user_msg: impl Into<String>) -> Result<Node> {
        let user_msg = user_msg.into();
        let _admission = self.admission.lock().await;

        // Invalid state fails fast: no network call, loading flag untouched.
        let (conversation_id, parent_id, mut messages) = {
            let state = self.state.read().await;
            let conversation = state
                .current_conversation
                .as_ref()
                .ok_or(StoreError::NoActiveConversation)?;
            let node = state.current_node.as_ref().ok_or(StoreError::NoActiveNode)?;
            let messages = match &state.current_branch {
                Some(branch) => {
                    tree::project_history(&tree::ordered_branch_nodes(branch, &state.nodes))
                }
                None => Vec::new(),
            };
            (conversation.id.clone(), node.id.clone(), messages)
        };
        messages.push(ChatMessage::user(user_msg.clone()));

        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        let ai = match self
            .remote
            .get_ai_response(AiRequest {
                messages,
                model: self.model(),
            })
            .await
        {
            Ok(response) => response,
            Err(err) => {
                self.record_remote_error(&err).await;
                return Err(err.into());
            }
        };

        let created = match self
            .remote
            .add_message(
                &conversation_id,
                AddMessageRequest {
                    user_msg,
                    parent_id: Some(parent_id),
                },
            )
            .await
        {
            Ok(node) => node,
            Err(err) => {
                self.record_remote_error(&err).await;
                return Err(err.into());
            }
        };

        // The node now exists remotely. If filling in the AI reply fails,
        // retry once with the already-created id before giving up; a node
        // that never gets its reply stays off the local branch.
        let update = NodeUpdate::ai_reply(ai.content.clone());
        let updated = match self
            .remote
            .update_node(&conversation_id, &created.id, update.clone())
            .await
        {
            Ok(node) => node,
            Err(first_err) => {
                tracing::warn!(
                    node_id = %created.id,
                    error = %first_err,
                    "node update failed, retrying once"
                );
                match self
                    .remote
                    .update_node(&conversation_id, &created.id, update)
                    .await
                {
                    Ok(node) => node,
                    Err(err) => {
                        self.record_remote_error(&err).await;
                        return Err(err.into());
                    }
                }
            }
        };

        let mut state = self.state.write().await;
        state.upsert_node(updated.clone());
        state.append_to_current_branch(&updated.id);
        state.current_node = Some(updated.clone());
        tracing::info!(
            conversation_id = %conversation_id,
            node_id = %updated.id,
            "message appended to active branch"
        );
        Ok(updated)
    }

    /// Fork a new branch from a node and move the cursor to the fork point.
    pub async fn create_branch(
        &self,
        name: impl Into<String>,
        from_node_id: impl Into<String>,
    ) -> Result<Branch> {
        let name = name.into();
        let from_node_id = from_node_id.into();
        let _admission = self.admission.lock().await;

        let conversation_id = {
            let state = self.state.read().await;
            state
                .current_conversation
                .as_ref()
                .ok_or(StoreError::NoActiveConversation)?
                .id
                .clone()
        };

        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        match self
            .remote
            .create_branch(
                &conversation_id,
                CreateBranchRequest {
                    name,
                    from_node_id: from_node_id.clone(),
                },
            )
            .await
        {
            Ok(branch) => {
                let mut state = self.state.write().await;
                state.branches.push(branch.clone());
                state.current_branch = Some(branch.clone());
                state.current_node = state.find_node(&from_node_id).cloned();
                tracing::info!(
                    conversation_id = %conversation_id,
                    branch_id = %branch.id,
                    fork_node_id = %from_node_id,
                    "created branch"
                );
                Ok(branch)
            }
            Err(err) => {
                self.record_remote_error(&err).await;
                Err(err.into())
            }
        }
    }

    /// Switch the cursor to another branch, landing on its most recent
    /// turn. An id that is not in the cache is silently ignored.
    ///
    /// The local move is applied first and stands even if persisting the
    /// new position fails; that failure comes back as
    /// [`StoreError::SwitchNotPersisted`] so the caller can re-sync with
    /// [`ConversationStore::load_conversation`].
    pub async fn switch_branch(&self, branch_id: &str) -> Result<()> {
        let _admission = self.admission.lock().await;

        let Some(branch) = self.state.read().await.find_branch(branch_id).cloned() else {
            tracing::debug!(branch_id, "switch target not cached, ignoring");
            return Ok(());
        };

        let _loading = LoadingGuard::acquire(&self.loading);

        let (conversation_id, node_id) = {
            let mut state = self.state.write().await;
            let node = branch
                .node_ids
                .last()
                .and_then(|id| state.find_node(id).cloned());
            let node_id = node.as_ref().map(|n| n.id.clone());
            state.current_branch = Some(branch.clone());
            state.current_node = node;
            (
                state.current_conversation.as_ref().map(|c| c.id.clone()),
                node_id,
            )
        };

        let Some(conversation_id) = conversation_id else {
            return Ok(());
        };

        let update = ConversationUpdate {
            current_branch_id: Some(branch.id.clone()),
            current_node_id: node_id,
            ..ConversationUpdate::default()
        };
        match self.remote.update_conversation(&conversation_id, update).await {
            Ok(conversation) => {
                self.state.write().await.upsert_conversation(conversation);
                Ok(())
            }
            Err(source) => {
                let err = StoreError::SwitchNotPersisted {
                    branch_id: branch.id.clone(),
                    source,
                };
                tracing::warn!(branch_id = %branch.id, error = %err, "cursor moved locally only");
                self.set_error(Some(err.to_string())).await;
                Err(err)
            }
        }
    }

    /// Move the cursor to a node on the active branch. No network call; an
    /// id that is not cached or not on the branch is silently ignored.
    pub async fn navigate_to_node(&self, node_id: &str) {
        let mut state = self.state.write().await;
        let on_branch = state
            .current_branch
            .as_ref()
            .is_some_and(|branch| branch.node_ids.iter().any(|id| id == node_id));
        if !on_branch {
            return;
        }
        if let Some(node) = state.find_node(node_id).cloned() {
            state.current_node = Some(node);
        }
    }

    /// Delete a conversation. If it was the active one, the cursor and the
    /// loaded tree are cleared.
    pub async fn delete_conversation(&self, conversation_id: &str) -> Result<()> {
        let _admission = self.admission.lock().await;
        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        match self.remote.delete_conversation(conversation_id).await {
            Ok(()) => {
                let mut state = self.state.write().await;
                state.conversations.retain(|c| c.id != conversation_id);
                if state
                    .current_conversation
                    .as_ref()
                    .is_some_and(|c| c.id == conversation_id)
                {
                    state.clear_cursor();
                }
                tracing::info!(conversation_id, "deleted conversation");
                Ok(())
            }
            Err(err) => {
                self.record_remote_error(&err).await;
                Err(err.into())
            }
        }
    }

    /// Rename a conversation; the cached record is replaced from the
    /// server's response.
    pub async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: impl Into<String>,
    ) -> Result<Conversation> {
        let title = title.into();
        let _admission = self.admission.lock().await;
        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        let update = ConversationUpdate {
            title: Some(title),
            ..ConversationUpdate::default()
        };
        match self.remote.update_conversation(conversation_id, update).await {
            Ok(conversation) => {
                self.state
                    .write()
                    .await
                    .upsert_conversation(conversation.clone());
                Ok(conversation)
            }
            Err(err) => {
                self.record_remote_error(&err).await;
                Err(err.into())
            }
        }
    }

    /// Replace the annotation text on a cached node.
    pub async fn annotate_node(
        &self,
        node_id: &str,
        annotations: impl Into<String>,
    ) -> Result<Node> {
        let annotations = annotations.into();
        let _admission = self.admission.lock().await;

        let conversation_id = {
            let state = self.state.read().await;
            let conversation = state
                .current_conversation
                .as_ref()
                .ok_or(StoreError::NoActiveConversation)?;
            if state.find_node(node_id).is_none() {
                return Err(StoreError::UnknownNode(node_id.to_string()));
            }
            conversation.id.clone()
        };

        let _loading = LoadingGuard::acquire(&self.loading);
        self.set_error(None).await;

        match self
            .remote
            .update_node(&conversation_id, node_id, NodeUpdate::annotations(annotations))
            .await
        {
            Ok(node) => {
                let mut state = self.state.write().await;
                state.upsert_node(node.clone());
                if state
                    .current_node
                    .as_ref()
                    .is_some_and(|current| current.id == node.id)
                {
                    state.current_node = Some(node.clone());
                }
                Ok(node)
            }
            Err(err) => {
                self.record_remote_error(&err).await;
                Err(err.into())
            }
        }
    }

    /// Clear the session error field.
    pub async fn clear_error(&self) {
        self.set_error(None).await;
    }

    // ---- internals -------------------------------------------------------

    /// Fetch and apply a conversation tree without touching the admission
    /// lock or loading flag; callers hold both.
    async fn load_tree(&self, conversation_id: &str) {
        match self.remote.get_conversation_tree(conversation_id).await {
            Ok(tree) => {
                tracing::info!(
                    conversation_id,
                    branches = tree.branches.len(),
                    nodes = tree.nodes.len(),
                    "loaded conversation tree"
                );
                self.state.write().await.apply_tree(tree);
            }
            Err(err) => self.record_remote_error(&err).await,
        }
    }

    async fn set_error(&self, message: Option<String>) {
        self.state.write().await.error = message;
    }

    async fn record_remote_error(&self, err: &RemoteError) {
        tracing::warn!(error = %err, "remote operation failed");
        self.set_error(Some(err.to_string())).await;
    }
}
