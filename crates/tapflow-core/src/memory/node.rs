use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ui_element::UiElement;

use super::action::WorkAction;

/// A single observed screen state within an app's graph. Identity is the
/// exact `elements_info` snapshot: two observations with identical element
/// lists are the same node (§3), regardless of when they were seen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkNode {
    pub id: Uuid,
    pub elements_info: Vec<UiElement>,
    /// Every task string this node has been observed under (§3: "set of
    /// task strings associated with this state").
    pub tasks: Vec<String>,
    pub actions: Vec<WorkAction>,
    /// Optional semantic label (§3), e.g. "login_screen". Singular per
    /// `DESIGN.md`'s Open-Question decision.
    pub tag: Option<String>,
}

impl WorkNode {
    fn new(elements_info: Vec<UiElement>) -> Self {
        Self { id: Uuid::new_v4(), elements_info, tasks: Vec::new(), actions: Vec::new(), tag: None }
    }

    pub fn add_task(&mut self, task: &str) {
        if !self.tasks.iter().any(|t| t == task) {
            self.tasks.push(task.to_string());
        }
    }

    /// Record an action against this node. A second action with the same
    /// `zone_path` is treated as a re-observation of the same interaction
    /// and is not duplicated.
    pub fn add_action(&mut self, action: WorkAction) {
        if action.zone_path.is_some()
            && self.actions.iter().any(|a| a.zone_path == action.zone_path)
        {
            return;
        }
        self.actions.push(action);
    }
}

/// The set of screens observed for one app, keyed by exact element-set
/// identity (§4.2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkGraph {
    pub app: String,
    pub nodes: Vec<WorkNode>,
}

impl WorkGraph {
    pub fn new(app: impl Into<String>) -> Self {
        Self { app: app.into(), nodes: Vec::new() }
    }

    /// Idempotent: returns the id of an existing node whose `elements_info`
    /// is exactly equal, or creates a new one.
    pub fn get_or_create_node(&mut self, elements_info: Vec<UiElement>) -> Uuid {
        if let Some(existing) = self.nodes.iter().find(|n| n.elements_info == elements_info) {
            return existing.id;
        }
        let node = WorkNode::new(elements_info);
        let id = node.id;
        self.nodes.push(node);
        id
    }

    pub fn node(&self, id: Uuid) -> Option<&WorkNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    pub fn node_mut(&mut self, id: Uuid) -> Option<&mut WorkNode> {
        self.nodes.iter_mut().find(|n| n.id == id)
    }

    /// Merge `other`'s nodes into `self` by id: an incoming node with an id
    /// already present extends the existing one (union of `tasks`,
    /// appended `actions`); a new id is inserted as-is (§4.2 persist
    /// "graphs merge by node id, new overrides/extends old").
    pub fn merge_from(&mut self, other: WorkGraph) {
        for incoming in other.nodes {
            match self.nodes.iter_mut().find(|n| n.id == incoming.id) {
                Some(existing) => {
                    for task in &incoming.tasks {
                        existing.add_task(task);
                    }
                    for action in incoming.actions {
                        existing.add_action(action);
                    }
                    if existing.tag.is_none() {
                        existing.tag = incoming.tag;
                    }
                }
                None => self.nodes.push(incoming),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui_element::{Bbox, ToggleState};

    fn sample_elements(tag: &str) -> Vec<UiElement> {
        vec![UiElement {
            elem_id: tag.to_string(),
            bbox: Bbox { x1: 0, y1: 0, x2: 10, y2: 10 },
            class_path: "android.widget.Button".to_string(),
            checked: ToggleState::Enabled,
            focused: ToggleState::Disabled,
            resource_id: Some(tag.to_string()),
            content_desc: None,
            text: None,
        }]
    }

    #[test]
    fn identical_elements_info_returns_same_node() {
        let mut graph = WorkGraph::new("com.example.app");
        let id1 = graph.get_or_create_node(sample_elements("a"));
        let id2 = graph.get_or_create_node(sample_elements("a"));
        assert_eq!(id1, id2);
        assert_eq!(graph.nodes.len(), 1);
    }

    #[test]
    fn different_elements_info_creates_new_node() {
        let mut graph = WorkGraph::new("com.example.app");
        let id1 = graph.get_or_create_node(sample_elements("a"));
        let id2 = graph.get_or_create_node(sample_elements("b"));
        assert_ne!(id1, id2);
        assert_eq!(graph.nodes.len(), 2);
    }

    #[test]
    fn add_action_dedups_on_zone_path() {
        let mut node = WorkNode::new(sample_elements("a"));
        node.add_action(WorkAction::tap("a", "first tap"));
        node.add_action(WorkAction::tap("a", "second tap"));
        assert_eq!(node.actions.len(), 1);
        assert_eq!(node.actions[0].description, "first tap");
    }

    #[test]
    fn add_action_keeps_distinct_zone_paths() {
        let mut node = WorkNode::new(sample_elements("a"));
        node.add_action(WorkAction::tap("a", "tap a"));
        node.add_action(WorkAction::tap("b", "tap b"));
        assert_eq!(node.actions.len(), 2);
    }

    #[test]
    fn add_task_is_idempotent() {
        let mut node = WorkNode::new(sample_elements("a"));
        node.add_task("order pizza");
        node.add_task("order pizza");
        assert_eq!(node.tasks.len(), 1);
    }

    #[test]
    fn merge_from_extends_existing_node_tasks_and_actions() {
        let mut graph = WorkGraph::new("com.example.app");
        let id = graph.get_or_create_node(sample_elements("a"));
        graph.node_mut(id).unwrap().add_task("task one");

        let mut incoming_node = WorkNode { id, ..WorkNode::new(sample_elements("a")) };
        incoming_node.add_task("task two");
        incoming_node.add_action(WorkAction::tap("a", "tap a"));
        let mut incoming = WorkGraph::new("com.example.app");
        incoming.nodes.push(incoming_node);

        graph.merge_from(incoming);
        let merged = graph.node(id).unwrap();
        assert_eq!(merged.tasks.len(), 2);
        assert_eq!(merged.actions.len(), 1);
    }

    #[test]
    fn merge_from_inserts_unseen_node_ids() {
        let mut graph = WorkGraph::new("com.example.app");
        graph.get_or_create_node(sample_elements("a"));

        let mut incoming = WorkGraph::new("com.example.app");
        incoming.get_or_create_node(sample_elements("b"));

        graph.merge_from(incoming);
        assert_eq!(graph.nodes.len(), 2);
    }
}
