use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embed::Embedder;
use crate::error::MemoryError;

use super::action::WorkAction;

/// One hop in a workflow: leaving `from` via `action`, arriving at `to`,
/// with provenance on whether it succeeded (§3 WorkTransition).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkTransition {
    pub from: Uuid,
    pub to: Uuid,
    pub action: WorkAction,
    pub success: bool,
}

/// A recorded path through a `WorkGraph` (§3, §4.2). `tag` is singular: a
/// workflow records one task's traversal, not a set of tags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub task: String,
    pub task_embedding: Vec<f32>,
    pub tag: Option<String>,
    pub tag_embedding: Option<Vec<f32>>,
    pub path: Vec<WorkTransition>,
    pub step: u32,
    pub timecost: f64,
}

impl Workflow {
    /// `task_embedding` is computed at construction (§3 invariant).
    pub fn new(task: impl Into<String>, tag: Option<String>, embedder: &dyn Embedder) -> Self {
        let task = task.into();
        let task_embedding = embedder.embed(&task);
        let tag_embedding = tag.as_ref().map(|t| embedder.embed(t));
        Self {
            id: Uuid::new_v4(),
            task,
            task_embedding,
            tag,
            tag_embedding,
            path: Vec::new(),
            step: 0,
            timecost: 0.0,
        }
    }

    pub fn last_node(&self) -> Option<Uuid> {
        self.path.last().map(|t| t.to)
    }

    /// Append a transition. Rejects (rather than panics on) a transition
    /// that does not continue from where the workflow currently ends
    /// (§3: `path[i].toNodeId = path[i+1].fromNodeId`).
    pub fn add_transition(&mut self, transition: WorkTransition) -> Result<(), MemoryError> {
        if let Some(last) = self.last_node() {
            if transition.from != last {
                return Err(MemoryError::DiscontinuousTransition {
                    from: transition.from.to_string(),
                    last: Some(last.to_string()),
                });
            }
        }
        self.path.push(transition);
        self.step += 1;
        Ok(())
    }
}
