//! Ordered message views.
//!
//! The poller never touches a concrete UI. It drives an [`OrderedView`],
//! which whatever front end is in use implements. [`MessageList`] is the
//! in-memory implementation used by the CLI and the tests.

use std::collections::VecDeque;

use crate::fragment::MessageNode;

/// An ordered container of message nodes that can grow and shrink at
/// both ends.
pub trait OrderedView {
    /// Insert before the current first node.
    fn push_front(&mut self, node: MessageNode);

    /// Insert after the current last node.
    fn push_back(&mut self, node: MessageNode);

    /// Remove and return the first node.
    fn pop_front(&mut self) -> Option<MessageNode>;

    /// Remove and return the last node.
    fn pop_back(&mut self) -> Option<MessageNode>;

    /// Number of nodes currently held.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every node.
    fn clear(&mut self) {
        while self.pop_front().is_some() {}
    }
}

/// In-memory message list.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    nodes: VecDeque<MessageNode>,
}

impl MessageList {
    /// An empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes in display order, first to last.
    pub fn iter(&self) -> impl Iterator<Item = &MessageNode> {
        self.nodes.iter()
    }

    /// Outer markup of every node in display order.
    pub fn html(&self) -> Vec<&str> {
        self.nodes.iter().map(MessageNode::html).collect()
    }
}

impl OrderedView for MessageList {
    fn push_front(&mut self, node: MessageNode) {
        self.nodes.push_front(node);
    }

    fn push_back(&mut self, node: MessageNode) {
        self.nodes.push_back(node);
    }

    fn pop_front(&mut self) -> Option<MessageNode> {
        self.nodes.pop_front()
    }

    fn pop_back(&mut self) -> Option<MessageNode> {
        self.nodes.pop_back()
    }

    fn len(&self) -> usize {
        self.nodes.len()
    }

    fn clear(&mut self) {
        self.nodes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::parse_fragment;

    fn node(html: &str) -> MessageNode {
        parse_fragment(html).unwrap().remove(0)
    }

    #[test]
    fn both_ends() {
        let mut list = MessageList::new();
        assert!(list.is_empty());

        list.push_back(node("<p>b</p>"));
        list.push_front(node("<p>a</p>"));
        list.push_back(node("<p>c</p>"));
        assert_eq!(list.html(), vec!["<p>a</p>", "<p>b</p>", "<p>c</p>"]);

        assert_eq!(list.pop_front().unwrap().html(), "<p>a</p>");
        assert_eq!(list.pop_back().unwrap().html(), "<p>c</p>");
        assert_eq!(list.len(), 1);

        list.clear();
        assert!(list.is_empty());
        assert!(list.pop_back().is_none());
    }
}
