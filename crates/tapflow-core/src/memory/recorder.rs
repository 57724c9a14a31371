use uuid::Uuid;

use crate::embed::Embedder;
use crate::error::MemoryError;

use super::action::WorkAction;
use super::workflow::{WorkTransition, Workflow};

/// Drives a `Workflow`'s construction across a live agent run: exactly one
/// transition may be "open" (arrived at a node, action not yet taken) at a
/// time (§9 Open Question on pending-transition semantics).
#[derive(Debug)]
pub struct WorkflowRecorder {
    workflow: Workflow,
    pending_from: Option<Uuid>,
}

impl WorkflowRecorder {
    pub fn new(task: impl Into<String>, tag: Option<String>, embedder: &dyn Embedder) -> Self {
        Self { workflow: Workflow::new(task, tag, embedder), pending_from: None }
    }

    /// Record arrival at `node_id`. Fails if a previous arrival is still
    /// awaiting `on_action_executed`.
    pub fn on_new_node(&mut self, node_id: Uuid) -> Result<(), MemoryError> {
        if let Some(open) = self.pending_from {
            return Err(MemoryError::PendingTransitionAlreadyOpen(open.to_string()));
        }
        self.pending_from = Some(node_id);
        Ok(())
    }

    /// Close the open transition by recording the action taken, the node
    /// it led to, and whether it succeeded.
    pub fn on_action_executed(
        &mut self,
        to: Uuid,
        action: WorkAction,
        success: bool,
    ) -> Result<(), MemoryError> {
        let from = self.pending_from.take().ok_or(MemoryError::NoPendingTransition)?;
        self.workflow.add_transition(WorkTransition { from, to, action, success })
    }

    pub fn has_pending_transition(&self) -> bool {
        self.pending_from.is_some()
    }

    pub fn workflow(&self) -> &Workflow {
        &self.workflow
    }

    pub fn workflow_mut(&mut self) -> &mut Workflow {
        &mut self.workflow
    }

    pub fn into_workflow(self) -> Workflow {
        self.workflow
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;

    fn recorder(task: &str) -> WorkflowRecorder {
        WorkflowRecorder::new(task.to_string(), Some("order_pizza".to_string()), &HashingEmbedder::default())
    }

    #[test]
    fn normal_node_action_node_sequence_succeeds() {
        let mut recorder = recorder("order a pizza");
        let n1 = Uuid::new_v4();
        let n2 = Uuid::new_v4();
        recorder.on_new_node(n1).unwrap();
        recorder.on_action_executed(n2, WorkAction::tap("x", "tap x"), true).unwrap();
        assert_eq!(recorder.workflow().path.len(), 1);
        assert!(recorder.workflow().path[0].success);
        assert!(!recorder.has_pending_transition());
    }

    #[test]
    fn second_on_new_node_without_closing_errors() {
        let mut recorder = recorder("order a pizza");
        let n1 = Uuid::new_v4();
        let n2 = Uuid::new_v4();
        recorder.on_new_node(n1).unwrap();
        let result = recorder.on_new_node(n2);
        assert!(matches!(result, Err(MemoryError::PendingTransitionAlreadyOpen(_))));
    }

    #[test]
    fn action_executed_without_pending_node_errors() {
        let mut recorder = recorder("order a pizza");
        let result = recorder.on_action_executed(Uuid::new_v4(), WorkAction::tap("x", "tap x"), true);
        assert!(matches!(result, Err(MemoryError::NoPendingTransition)));
    }

    #[test]
    fn failed_transition_is_still_recorded_with_success_false() {
        let mut recorder = recorder("order a pizza");
        let n1 = Uuid::new_v4();
        let n2 = Uuid::new_v4();
        recorder.on_new_node(n1).unwrap();
        recorder.on_action_executed(n2, WorkAction::tap("x", "tap x"), false).unwrap();
        assert!(!recorder.workflow().path[0].success);
    }
}
