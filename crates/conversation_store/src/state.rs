//! Session state: cached collections plus the cursor.

use conversation_core::{Branch, Conversation, ConversationTree, Node};

/// Everything one session holds in memory.
///
/// The cursor invariants: `current_node`, if set, is a member of
/// `current_branch.node_ids`; `current_branch`, if set, belongs to
/// `current_conversation`. The store's operations preserve these.
#[derive(Debug, Default)]
pub struct SessionState {
    /// All known conversations, most recently updated first.
    pub conversations: Vec<Conversation>,

    /// Cursor: the conversation the user is in.
    pub current_conversation: Option<Conversation>,

    /// Cursor: the active branch.
    pub current_branch: Option<Branch>,

    /// Cursor: the active node on that branch.
    pub current_node: Option<Node>,

    /// Node set of the loaded conversation.
    pub nodes: Vec<Node>,

    /// Branch set of the loaded conversation.
    pub branches: Vec<Branch>,

    /// Last operation failure, for display. Last error wins.
    pub error: Option<String>,
}

impl SessionState {
    /// Replace the loaded conversation wholesale from a full-tree fetch.
    ///
    /// All five fields change together; a failed fetch never gets here, so
    /// partial application cannot occur.
    pub fn apply_tree(&mut self, tree: ConversationTree) {
        self.current_conversation = Some(tree.conversation);
        self.current_branch = tree.current_branch;
        self.current_node = tree.current_node;
        self.nodes = tree.nodes;
        self.branches = tree.branches;
    }

    /// Replace the cached node with the same id, or append.
    pub fn upsert_node(&mut self, node: Node) {
        match self.nodes.iter_mut().find(|cached| cached.id == node.id) {
            Some(cached) => *cached = node,
            None => self.nodes.push(node),
        }
    }

    /// Replace the conversation in the cached list (and the cursor, if it is
    /// the same record) from the server's authoritative copy.
    pub fn upsert_conversation(&mut self, conversation: Conversation) {
        if let Some(cached) = self
            .conversations
            .iter_mut()
            .find(|cached| cached.id == conversation.id)
        {
            *cached = conversation.clone();
        }
        if self
            .current_conversation
            .as_ref()
            .is_some_and(|current| current.id == conversation.id)
        {
            self.current_conversation = Some(conversation);
        }
    }

    /// Append a node id to the active branch, in both the cursor copy and
    /// the cached branch list. One membership, two views.
    pub fn append_to_current_branch(&mut self, node_id: &str) {
        let Some(branch) = self.current_branch.as_mut() else {
            return;
        };
        branch.node_ids.push(node_id.to_string());
        if let Some(cached) = self.branches.iter_mut().find(|b| b.id == branch.id) {
            cached.node_ids.push(node_id.to_string());
        }
    }

    /// Drop the cursor and the loaded tree. Used when the active
    /// conversation is deleted.
    pub fn clear_cursor(&mut self) {
        self.current_conversation = None;
        self.current_branch = None;
        self.current_node = None;
        self.nodes.clear();
        self.branches.clear();
    }

    pub fn find_node(&self, node_id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id == node_id)
    }

    pub fn find_branch(&self, branch_id: &str) -> Option<&Branch> {
        self.branches.iter().find(|branch| branch.id == branch_id)
    }
}
