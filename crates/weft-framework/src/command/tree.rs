//! Per-plugin command index.
//!
//! Commands live in a flat name → command map; the tree is an index over it.
//! A dotted name is linked to the longest already-registered prefix at the
//! moment it is inserted. Later arrivals never re-parent existing commands.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::CommandError;

use super::Command;

#[derive(Debug, Clone)]
struct Node {
    command: Arc<Command>,
    parent: Option<String>,
    children: Vec<String>,
}

/// A plugin's commands, keyed by full dotted name.
#[derive(Debug, Clone, Default)]
pub struct CommandTree {
    nodes: HashMap<String, Node>,
    /// Registration order.
    order: Vec<String>,
}

impl CommandTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command and links it under its longest registered prefix.
    pub fn insert(&mut self, command: Command) -> Result<Arc<Command>, CommandError> {
        self.insert_shared(Arc::new(command))
    }

    /// [`insert`](Self::insert) for a command that is already shared.
    pub fn insert_shared(&mut self, command: Arc<Command>) -> Result<Arc<Command>, CommandError> {
        let name = command.name().to_string();
        if self.nodes.contains_key(&name) {
            return Err(CommandError::Duplicate(name));
        }

        let segments: Vec<&str> = name.split('.').collect();
        let parent = (1..segments.len())
            .rev()
            .map(|len| segments[..len].join("."))
            .find(|prefix| self.find_by_name(prefix).is_some());

        if let Some(parent) = &parent
            && let Some(node) = self.nodes.get_mut(parent)
        {
            node.children.push(name.clone());
        }

        self.nodes.insert(
            name.clone(),
            Node {
                command: Arc::clone(&command),
                parent,
                children: Vec::new(),
            },
        );
        self.order.push(name);
        Ok(command)
    }

    /// Removes a command, unlinking it from its parent. Its children become roots.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Command>> {
        let node = self.nodes.remove(name)?;
        self.order.retain(|n| n != name);
        if let Some(parent) = &node.parent
            && let Some(parent) = self.nodes.get_mut(parent)
        {
            parent.children.retain(|c| c != name);
        }
        for child in &node.children {
            if let Some(child) = self.nodes.get_mut(child) {
                child.parent = None;
            }
        }
        Some(node.command)
    }

    /// Direct map lookup.
    pub fn get(&self, name: &str) -> Option<&Arc<Command>> {
        self.nodes.get(name).map(|node| &node.command)
    }

    /// Looks a command up by exact name, walking the tree from its roots.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Command>> {
        self.flatten().into_iter().find(|c| c.name() == name)
    }

    pub fn parent_of(&self, name: &str) -> Option<&str> {
        self.nodes.get(name)?.parent.as_deref()
    }

    pub fn children_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map_or(&[], |node| node.children.as_slice())
    }

    /// Every command, depth-first from the roots, each level in registration order.
    pub fn flatten(&self) -> Vec<Arc<Command>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        for name in &self.order {
            if let Some(node) = self.nodes.get(name)
                && node.parent.is_none()
            {
                self.walk(node, &mut out);
            }
        }
        out
    }

    fn walk(&self, node: &Node, out: &mut Vec<Arc<Command>>) {
        out.push(Arc::clone(&node.command));
        for child in &node.children {
            if let Some(child) = self.nodes.get(child) {
                self.walk(child, out);
            }
        }
    }

    /// [`flatten`](Self::flatten) without hidden commands.
    pub fn list_visible(&self) -> Vec<Arc<Command>> {
        self.flatten().into_iter().filter(|c| !c.is_hidden()).collect()
    }

    /// Names in registration order.
    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(names: &[&str]) -> CommandTree {
        let mut tree = CommandTree::new();
        for name in names {
            tree.insert(Command::new(name).unwrap()).unwrap();
        }
        tree
    }

    #[test]
    fn test_child_links_to_longest_prefix() {
        let tree = tree(&["a", "a.b", "a.b.c"]);
        assert_eq!(tree.parent_of("a.b.c"), Some("a.b"));
        assert_eq!(tree.parent_of("a.b"), Some("a"));
        assert_eq!(tree.children_of("a"), ["a.b".to_string()]);
    }

    #[test]
    fn test_skips_missing_intermediate_prefix() {
        let tree = tree(&["a", "a.b.c"]);
        assert_eq!(tree.parent_of("a.b.c"), Some("a"));
    }

    #[test]
    fn test_no_parent_when_registered_first() {
        let tree = tree(&["a.b.c", "a.b"]);
        assert_eq!(tree.parent_of("a.b.c"), None);
        assert!(tree.children_of("a.b").is_empty());
    }

    #[test]
    fn test_duplicate_rejected() {
        let mut tree = tree(&["a"]);
        assert!(matches!(
            tree.insert(Command::new("a").unwrap()),
            Err(CommandError::Duplicate(n)) if n == "a"
        ));
    }

    #[test]
    fn test_flatten_order_and_find() {
        let tree = tree(&["plugin", "help", "plugin.list", "plugin.enable"]);
        let names: Vec<String> = tree.flatten().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, ["plugin", "plugin.list", "plugin.enable", "help"]);
        assert!(tree.find_by_name("plugin.enable").is_some());
        assert!(tree.find_by_name("plugin.missing").is_none());
    }

    #[test]
    fn test_remove_unlinks() {
        let mut tree = tree(&["a", "a.b", "a.b.c"]);
        assert!(tree.remove("a.b").is_some());
        assert!(tree.children_of("a").is_empty());
        assert_eq!(tree.parent_of("a.b.c"), None);
        assert_eq!(tree.len(), 2);
        assert!(tree.remove("a.b").is_none());
    }

    #[test]
    fn test_list_visible_skips_hidden() {
        let mut tree = CommandTree::new();
        tree.insert(Command::new("admin").unwrap().hidden()).unwrap();
        tree.insert(Command::new("help").unwrap()).unwrap();
        let visible: Vec<_> = tree.list_visible().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(visible, ["help"]);
        assert!(tree.find_by_name("admin").is_some());
    }
}
