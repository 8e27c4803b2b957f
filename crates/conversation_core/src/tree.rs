//! Pure derived queries over a branch and the node set.
//!
//! These are recomputed on demand from the canonical collections; nothing
//! here is cached and nothing does I/O.

use crate::message::ChatMessage;
use crate::types::{Branch, Node};

/// The branch's nodes in exactly the order given by `node_ids`.
///
/// A position lookup, not a re-sort. An id that resolves to no node is
/// skipped rather than treated as fatal.
pub fn ordered_branch_nodes(branch: &Branch, nodes: &[Node]) -> Vec<Node> {
    branch
        .node_ids
        .iter()
        .filter_map(|id| nodes.iter().find(|node| &node.id == id))
        .cloned()
        .collect()
}

/// Position of `node_id` within the branch's `node_ids`.
///
/// `None` is a valid, non-error state: the cursor is out of the branch.
pub fn node_index(branch: &Branch, node_id: &str) -> Option<usize> {
    branch.node_ids.iter().position(|id| id == node_id)
}

/// Whether there is an earlier node to step back to.
pub fn can_go_back(branch: &Branch, node_id: &str) -> bool {
    matches!(node_index(branch, node_id), Some(index) if index > 0)
}

/// Whether there is a later node to step forward to.
///
/// The index is a position within `node_ids`, while the bound is the count
/// of ids that actually resolve to nodes, matching `ordered_branch_nodes`.
pub fn can_go_forward(branch: &Branch, node_id: &str, nodes: &[Node]) -> bool {
    let resolved = ordered_branch_nodes(branch, nodes).len();
    match node_index(branch, node_id) {
        Some(index) => index + 1 < resolved,
        None => false,
    }
}

/// Flatten ordered nodes into the chronological {role, content} history.
///
/// Per node: a user turn if `user_msg` is set, then an assistant turn if
/// `ai_msg` is set. This is the exact input fed to the AI responder.
pub fn project_history(nodes: &[Node]) -> Vec<ChatMessage> {
    let mut history = Vec::new();
    for node in nodes {
        if let Some(user_msg) = &node.user_msg {
            history.push(ChatMessage::user(user_msg.clone()));
        }
        if let Some(ai_msg) = &node.ai_msg {
            history.push(ChatMessage::assistant(ai_msg.clone()));
        }
    }
    history
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Role;

    fn node(id: &str, user_msg: Option<&str>, ai_msg: Option<&str>) -> Node {
        let mut node = Node::new(
            user_msg.map(str::to_string),
            ai_msg.map(str::to_string),
            None,
        );
        node.id = id.to_string();
        node
    }

    fn branch(node_ids: &[&str]) -> Branch {
        let mut branch = Branch::new("main", "c1", node_ids[0]);
        branch.node_ids = node_ids.iter().map(|id| id.to_string()).collect();
        branch
    }

    #[test]
    fn test_ordered_nodes_follow_node_ids_order() {
        let nodes = vec![
            node("n2", Some("second"), None),
            node("n1", Some("first"), Some("reply")),
        ];
        let branch = branch(&["n1", "n2"]);

        let ordered = ordered_branch_nodes(&branch, &nodes);
        let ids: Vec<&str> = ordered.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n2"]);
    }

    #[test]
    fn test_dangling_id_is_skipped() {
        let nodes = vec![node("n1", Some("hi"), None)];
        let branch = branch(&["n1", "missing"]);

        let ordered = ordered_branch_nodes(&branch, &nodes);
        assert_eq!(ordered.len(), 1);
        assert_eq!(ordered[0].id, "n1");
    }

    #[test]
    fn test_node_index() {
        let branch = branch(&["n1", "n2", "n3"]);
        assert_eq!(node_index(&branch, "n1"), Some(0));
        assert_eq!(node_index(&branch, "n3"), Some(2));
        assert_eq!(node_index(&branch, "elsewhere"), None);
    }

    #[test]
    fn test_navigation_at_branch_ends() {
        let nodes = vec![
            node("n1", Some("a"), Some("b")),
            node("n2", Some("c"), Some("d")),
            node("n3", Some("e"), None),
        ];
        let branch = branch(&["n1", "n2", "n3"]);

        assert!(!can_go_back(&branch, "n1"));
        assert!(can_go_forward(&branch, "n1", &nodes));

        assert!(can_go_back(&branch, "n2"));
        assert!(can_go_forward(&branch, "n2", &nodes));

        assert!(can_go_back(&branch, "n3"));
        assert!(!can_go_forward(&branch, "n3", &nodes));
    }

    #[test]
    fn test_navigation_when_cursor_out_of_branch() {
        let nodes = vec![node("n1", Some("a"), None)];
        let branch = branch(&["n1"]);

        assert!(!can_go_back(&branch, "elsewhere"));
        assert!(!can_go_forward(&branch, "elsewhere", &nodes));
    }

    #[test]
    fn test_single_node_branch_has_no_navigation() {
        let nodes = vec![node("n1", Some("hi"), Some("hello"))];
        let branch = branch(&["n1"]);

        assert!(!can_go_back(&branch, "n1"));
        assert!(!can_go_forward(&branch, "n1", &nodes));
    }

    #[test]
    fn test_history_emits_user_then_assistant_per_node() {
        let nodes = vec![
            node("n1", Some("hi"), Some("hello")),
            node("n2", Some("how are you"), None),
        ];

        let history = project_history(&nodes);
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "hi");
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, "hello");
        assert_eq!(history[2].role, Role::User);
        assert_eq!(history[2].content, "how are you");
    }

    #[test]
    fn test_history_skips_empty_sides() {
        let nodes = vec![node("n1", None, Some("welcome"))];
        let history = project_history(&nodes);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Assistant);
    }
}
