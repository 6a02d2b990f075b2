//! The workflow graph: a mutable linked structure of nodes.
//!
//! Nodes point at their successor through `transition`; switch paths and
//! foreach bodies hold nested chain heads inside their typed configurations.
//! Invariants (switch-at-tail, decodable control configs) are enforced at
//! mutation time. Cycles are not structurally prevented; traversals defend
//! with a step budget.

use crate::error::GraphError;
use crate::node::{Node, NodeKind};
use flywheel_core::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// A workflow's node graph.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// All nodes, keyed by ID.
    nodes: HashMap<NodeId, Node>,
    /// The start node, when one has been assigned.
    start: Option<NodeId>,
}

impl WorkflowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the start node ID, if assigned.
    #[must_use]
    pub fn start_node(&self) -> Option<NodeId> {
        self.start
    }

    /// Assigns the start node.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist.
    pub fn set_start(&mut self, node_id: NodeId) -> Result<(), GraphError> {
        if !self.nodes.contains_key(&node_id) {
            return Err(GraphError::NodeNotFound { node_id });
        }
        self.start = Some(node_id);
        Ok(())
    }

    /// Adds a node after validating its configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the node's control configuration is invalid.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, GraphError> {
        node.validate_config()?;
        let node_id = node.id;
        self.nodes.insert(node_id, node);
        Ok(node_id)
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        self.nodes.get(&node_id)
    }

    /// Returns a mutable reference to a node by its ID.
    pub fn get_node_mut(&mut self, node_id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(&node_id)
    }

    /// Returns all nodes in the graph.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Points `from`'s transition at `to`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is missing, or if `from` is a switch
    /// node (a switch must remain the tail of its incoming chain; its paths
    /// carry the outgoing pointers).
    pub fn set_transition(&mut self, from: NodeId, to: Option<NodeId>) -> Result<(), GraphError> {
        if let Some(target) = to
            && !self.nodes.contains_key(&target)
        {
            return Err(GraphError::NodeNotFound { node_id: target });
        }
        let node = self
            .nodes
            .get_mut(&from)
            .ok_or(GraphError::NodeNotFound { node_id: from })?;
        if node.kind() == NodeKind::Switch && to.is_some() {
            return Err(GraphError::SwitchMustBeTail { node_id: from });
        }
        node.transition = to;
        Ok(())
    }

    /// Removes a node, splicing every reference to it onto its successor.
    ///
    /// Predecessors' transitions, switch path heads, foreach body heads, and
    /// the start pointer are all rewired to the removed node's own
    /// transition.
    ///
    /// # Errors
    ///
    /// Returns an error if the node does not exist.
    pub fn remove_node(&mut self, node_id: NodeId) -> Result<Node, GraphError> {
        let removed = self
            .nodes
            .remove(&node_id)
            .ok_or(GraphError::NodeNotFound { node_id })?;
        let successor = removed.transition;

        if self.start == Some(node_id) {
            self.start = successor;
        }

        for node in self.nodes.values_mut() {
            if node.transition == Some(node_id) {
                node.transition = successor;
            }
            match node.kind() {
                NodeKind::Switch => {
                    if let Ok(mut config) = node.switch_config() {
                        let mut changed = false;
                        for path in &mut config.paths {
                            if path.transition == Some(node_id) {
                                path.transition = successor;
                                changed = true;
                            }
                        }
                        if changed {
                            node.overwrite_config(&config);
                        }
                    }
                }
                NodeKind::Foreach => {
                    if let Ok(mut config) = node.foreach_config()
                        && config.transition == Some(node_id)
                    {
                        config.transition = successor;
                        node.overwrite_config(&config);
                    }
                }
                NodeKind::Action | NodeKind::Confirm => {}
            }
        }

        Ok(removed)
    }

    /// Returns every node reachable from `start`, following transitions,
    /// switch paths, and foreach bodies.
    ///
    /// # Errors
    ///
    /// Returns an error if `start` is missing or the walk exceeds `budget`
    /// visited nodes (defense against pathological graphs).
    pub fn reachable_from(
        &self,
        start: NodeId,
        budget: usize,
    ) -> Result<Vec<NodeId>, GraphError> {
        if !self.nodes.contains_key(&start) {
            return Err(GraphError::NodeNotFound { node_id: start });
        }

        let mut visited = HashSet::new();
        let mut order = Vec::new();
        let mut stack = vec![start];

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id) {
                continue;
            }
            if visited.len() > budget {
                return Err(GraphError::StepBudgetExceeded { budget });
            }
            order.push(node_id);

            let Some(node) = self.nodes.get(&node_id) else {
                continue; // dangling pointer; nothing further to follow
            };

            if let Some(next) = node.transition {
                stack.push(next);
            }
            match node.kind() {
                NodeKind::Switch => {
                    if let Ok(config) = node.switch_config() {
                        for path in config.paths {
                            if let Some(head) = path.transition {
                                stack.push(head);
                            }
                        }
                    }
                }
                NodeKind::Foreach => {
                    if let Ok(config) = node.foreach_config()
                        && let Some(head) = config.transition
                    {
                        stack.push(head);
                    }
                }
                NodeKind::Action | NodeKind::Confirm => {}
            }
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeClass;
    use serde_json::json;

    fn action(name: &str) -> Node {
        Node::new(name, "http")
    }

    fn fields(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        match value {
            serde_json::Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    /// a -> b -> c
    fn chain() -> (WorkflowGraph, NodeId, NodeId, NodeId) {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_node(action("a")).unwrap();
        let b = graph.add_node(action("b")).unwrap();
        let c = graph.add_node(action("c")).unwrap();
        graph.set_transition(a, Some(b)).unwrap();
        graph.set_transition(b, Some(c)).unwrap();
        graph.set_start(a).unwrap();
        (graph, a, b, c)
    }

    #[test]
    fn add_and_get_node() {
        let mut graph = WorkflowGraph::new();
        let node = action("fetch");
        let node_id = graph.add_node(node).unwrap();

        assert!(graph.get_node(node_id).is_some());
        assert_eq!(graph.node_count(), 1);
    }

    #[test]
    fn set_start_requires_existing_node() {
        let mut graph = WorkflowGraph::new();
        let result = graph.set_start(NodeId::new());
        assert!(matches!(result, Err(GraphError::NodeNotFound { .. })));
    }

    #[test]
    fn transition_out_of_switch_is_rejected() {
        let mut graph = WorkflowGraph::new();
        let switch = graph
            .add_node(Node::new("route", "switch").with_input_fields(fields(json!({"paths": []}))))
            .unwrap();
        let next = graph.add_node(action("after")).unwrap();

        let result = graph.set_transition(switch, Some(next));
        assert!(matches!(result, Err(GraphError::SwitchMustBeTail { .. })));

        // Clearing is still allowed.
        assert!(graph.set_transition(switch, None).is_ok());
    }

    #[test]
    fn remove_middle_node_splices_chain() {
        let (mut graph, a, b, c) = chain();

        graph.remove_node(b).unwrap();

        assert_eq!(graph.get_node(a).unwrap().transition, Some(c));
        assert!(graph.get_node(b).is_none());
    }

    #[test]
    fn remove_terminal_node_clears_predecessor() {
        let (mut graph, _a, b, c) = chain();

        graph.remove_node(c).unwrap();

        assert_eq!(graph.get_node(b).unwrap().transition, None);
    }

    #[test]
    fn remove_start_node_advances_start() {
        let (mut graph, a, b, _c) = chain();

        graph.remove_node(a).unwrap();

        assert_eq!(graph.start_node(), Some(b));
    }

    #[test]
    fn remove_foreach_body_head_rewires_parent_config() {
        let mut graph = WorkflowGraph::new();
        let body_head = graph.add_node(action("first")).unwrap();
        let body_rest = graph.add_node(action("second")).unwrap();
        graph.set_transition(body_head, Some(body_rest)).unwrap();

        let foreach = graph
            .add_node(Node::new("loop", "foreach").with_input_fields(fields(json!({
                "input_collection": "{{ input.items }}",
                "transition": body_head
            }))))
            .unwrap();

        graph.remove_node(body_head).unwrap();

        let config = graph.get_node(foreach).unwrap().foreach_config().unwrap();
        // The parent's nested pointer moved, not its own transition.
        assert_eq!(config.transition, Some(body_rest));
        assert_eq!(graph.get_node(foreach).unwrap().transition, None);
    }

    #[test]
    fn remove_switch_path_head_rewires_path() {
        let mut graph = WorkflowGraph::new();
        let path_head = graph.add_node(action("first")).unwrap();
        let path_rest = graph.add_node(action("second")).unwrap();
        graph.set_transition(path_head, Some(path_rest)).unwrap();

        let switch = graph
            .add_node(Node::new("route", "switch").with_input_fields(fields(json!({
                "paths": [
                    {"name": "only", "transition": path_head}
                ]
            }))))
            .unwrap();

        graph.remove_node(path_head).unwrap();

        let config = graph.get_node(switch).unwrap().switch_config().unwrap();
        assert_eq!(config.paths[0].transition, Some(path_rest));
    }

    #[test]
    fn reachability_covers_nested_chains() {
        let mut graph = WorkflowGraph::new();
        let body = graph.add_node(action("body")).unwrap();
        let path_node = graph.add_node(action("path")).unwrap();

        let foreach = graph
            .add_node(Node::new("loop", "foreach").with_input_fields(fields(json!({
                "input_collection": "{{ input.items }}",
                "transition": body
            }))))
            .unwrap();
        let switch = graph
            .add_node(Node::new("route", "switch").with_input_fields(fields(json!({
                "paths": [{"name": "p", "transition": path_node}]
            }))))
            .unwrap();

        let start = graph.add_node(action("start")).unwrap();
        graph.set_transition(start, Some(foreach)).unwrap();
        graph.set_transition(foreach, Some(switch)).unwrap();
        graph.set_start(start).unwrap();

        let reachable = graph.reachable_from(start, 100).unwrap();
        for id in [start, foreach, body, switch, path_node] {
            assert!(reachable.contains(&id));
        }
    }

    #[test]
    fn reachability_defends_against_cycles() {
        let mut graph = WorkflowGraph::new();
        let a = graph.add_node(action("a")).unwrap();
        let b = graph.add_node(action("b")).unwrap();
        graph.set_transition(a, Some(b)).unwrap();
        graph.set_transition(b, Some(a)).unwrap();

        // The visited set terminates the walk; the budget bounds it.
        let reachable = graph.reachable_from(a, 100).unwrap();
        assert_eq!(reachable.len(), 2);

        let result = graph.reachable_from(a, 1);
        assert!(matches!(result, Err(GraphError::StepBudgetExceeded { .. })));
    }

    #[test]
    fn switch_class_is_validated_on_add() {
        let mut graph = WorkflowGraph::new();
        let mut bad = Node::new("route", NodeClass::new("switch"))
            .with_input_fields(fields(json!({"paths": []})));
        bad.transition = Some(NodeId::new());

        let result = graph.add_node(bad);
        assert!(matches!(result, Err(GraphError::SwitchMustBeTail { .. })));
    }
}
