use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use uuid::Uuid;

use crate::embed::{Embedder, cosine_similarity};
use crate::error::MemoryError;
use crate::sanitize_filename;

use super::node::WorkGraph;
use super::workflow::Workflow;

fn io_err(path: &Path, source: std::io::Error) -> MemoryError {
    MemoryError::Io { path: path.display().to_string(), source }
}

/// Default cosine-similarity floor for matching a historical workflow's
/// `task_embedding` against the query task (§4.2 `loadFromStore`).
pub const DEFAULT_EMBED_THRESHOLD: f32 = 0.5;
/// Default cosine-similarity floor for matching a workflow file's tag
/// against a requested `targetTag` (§4.2 `loadFromStore`).
pub const DEFAULT_TAG_THRESHOLD: f32 = 0.8;

/// Tuning knobs for `ActionMemory::load_from_store` (§4.2).
#[derive(Debug, Clone, Copy)]
pub struct LoadOptions<'a> {
    pub target_tag: Option<&'a str>,
    pub embed_threshold: f32,
    pub tag_threshold: f32,
}

impl Default for LoadOptions<'_> {
    fn default() -> Self {
        Self { target_tag: None, embed_threshold: DEFAULT_EMBED_THRESHOLD, tag_threshold: DEFAULT_TAG_THRESHOLD }
    }
}

/// The on-disk, per-app/per-tag action memory store (§4.2, §6). Layout:
/// `memory_dir/graph/<app>.json`, `memory_dir/workflow/<tag>.json`.
///
/// Runtime and historical views are disjoint (§4.2 invariant): writes
/// during a task only ever touch the runtime maps; `load_from_store`
/// populates only the historical maps. A single `ActionMemory` therefore
/// gives both "what this run has seen/done" and "what prior runs
/// contributed", without the two being confusable.
pub struct ActionMemory {
    memory_dir: PathBuf,
    runtime_graphs: HashMap<String, WorkGraph>,
    historical_graphs: HashMap<String, WorkGraph>,
    runtime_workflows: HashMap<Uuid, Workflow>,
    historical_workflows: HashMap<Uuid, Workflow>,
}

impl ActionMemory {
    pub fn new(memory_dir: impl Into<PathBuf>) -> Self {
        Self {
            memory_dir: memory_dir.into(),
            runtime_graphs: HashMap::new(),
            historical_graphs: HashMap::new(),
            runtime_workflows: HashMap::new(),
            historical_workflows: HashMap::new(),
        }
    }

    fn graph_path(&self, app: &str) -> PathBuf {
        self.memory_dir.join("graph").join(format!("{}.json", sanitize_filename(app)))
    }

    fn workflow_path(&self, tag: &str) -> PathBuf {
        self.memory_dir.join("workflow").join(format!("{}.json", sanitize_filename(tag)))
    }

    /// Returns the runtime graph for `app`, creating an empty one if not
    /// yet present this run (§4.2 `getOrCreateGraph`, idempotent by app).
    pub fn get_or_create_graph(&mut self, app: &str) -> &mut WorkGraph {
        self.runtime_graphs.entry(app.to_string()).or_insert_with(|| WorkGraph::new(app))
    }

    pub fn runtime_graph(&self, app: &str) -> Option<&WorkGraph> {
        self.runtime_graphs.get(app)
    }

    pub fn historical_graph(&self, app: &str) -> Option<&WorkGraph> {
        self.historical_graphs.get(app)
    }

    /// Find the app and `elements_info` a node id belongs to, searching both
    /// runtime and historical graphs (§4.8: speculation resolves a
    /// transition's `fromNodeId` back to the node it names before comparing
    /// element sets). Runtime graphs are authoritative should a node id ever
    /// collide across the two views.
    pub fn node_elements(&self, node_id: Uuid) -> Option<(&str, &[crate::ui_element::UiElement])> {
        self.runtime_graphs
            .values()
            .chain(self.historical_graphs.values())
            .find_map(|g| g.node(node_id).map(|n| (g.app.as_str(), n.elements_info.as_slice())))
    }

    /// The app a workflow ran against, inferred from the graph that owns its
    /// first transition's origin node (§4.8 step 1: "filter historical
    /// workflows whose apps contain `current_app`"). `None` for an empty or
    /// not-yet-resolvable workflow.
    pub fn workflow_app(&self, workflow: &Workflow) -> Option<&str> {
        let first = workflow.path.first()?;
        self.node_elements(first.from).map(|(app, _)| app)
    }

    /// Allocate a new runtime workflow (§4.2 `createWorkflow`).
    pub fn create_workflow(&mut self, task: impl Into<String>, tag: Option<String>, embedder: &dyn Embedder) -> Uuid {
        let workflow = Workflow::new(task, tag, embedder);
        let id = workflow.id;
        self.runtime_workflows.insert(id, workflow);
        id
    }

    pub fn workflow_mut(&mut self, id: Uuid) -> Option<&mut Workflow> {
        self.runtime_workflows.get_mut(&id)
    }

    pub fn workflow(&self, id: Uuid) -> Option<&Workflow> {
        self.runtime_workflows.get(&id).or_else(|| self.historical_workflows.get(&id))
    }

    /// Insert a fully-built runtime workflow under its own id, e.g. one
    /// assembled independently by a `WorkflowRecorder` across a run and
    /// handed back via `into_workflow` (§4.2, §4.11 step 10).
    pub fn insert_workflow(&mut self, workflow: Workflow) {
        self.runtime_workflows.insert(workflow.id, workflow);
    }

    /// All runtime workflows recorded so far this run, regardless of task
    /// (used by speculative execution's app-level candidate search, §4.10).
    pub fn runtime_workflows_iter(&self) -> impl Iterator<Item = &Workflow> {
        self.runtime_workflows.values()
    }

    /// All historical workflows loaded via `load_from_store`, regardless of
    /// task (§4.10).
    pub fn historical_workflows_iter(&self) -> impl Iterator<Item = &Workflow> {
        self.historical_workflows.values()
    }

    /// Exact task-string match against workflows recorded so far this run
    /// (§4.2 `findRuntimeWorkflows`).
    pub fn find_runtime_workflows(&self, task: &str) -> Vec<&Workflow> {
        self.runtime_workflows.values().filter(|w| w.task == task).collect()
    }

    /// Exact task-string match against the historical view populated by
    /// `load_from_store` (§4.2 `findHistoricalWorkflows`).
    pub fn find_historical_workflows(&self, task: &str) -> Vec<&Workflow> {
        self.historical_workflows.values().filter(|w| w.task == task).collect()
    }

    /// Write every runtime graph and workflow to its file under
    /// `memory_dir`. Graphs merge by node id with whatever is already on
    /// disk (new overrides/extends old); workflows append to their tag
    /// file only if their id isn't present yet (§4.2 `persist`). A
    /// failure on any single file is reported but does not abort the
    /// batch (§4.2 invariant: "the store never loses data on partial
    /// failure of a single file").
    pub fn persist(&self) -> Result<(), MemoryError> {
        let graph_dir = self.memory_dir.join("graph");
        fs::create_dir_all(&graph_dir).map_err(|e| io_err(&graph_dir, e))?;
        for (app, graph) in &self.runtime_graphs {
            let path = self.graph_path(app);
            let mut on_disk = match fs::read_to_string(&path) {
                Ok(body) => match serde_json::from_str::<WorkGraph>(&body) {
                    Ok(g) => g,
                    Err(source) => {
                        warn!(path = %path.display(), error = %source, "skipping corrupt graph file on persist, overwriting");
                        WorkGraph::new(app.clone())
                    }
                },
                Err(_) => WorkGraph::new(app.clone()),
            };
            on_disk.merge_from(graph.clone());
            let body = serde_json::to_vec_pretty(&on_disk)
                .map_err(|source| MemoryError::CorruptGraphFile { path: path.display().to_string(), source })?;
            fs::write(&path, body).map_err(|e| io_err(&path, e))?;
        }

        let workflow_dir = self.memory_dir.join("workflow");
        fs::create_dir_all(&workflow_dir).map_err(|e| io_err(&workflow_dir, e))?;
        let mut by_tag: HashMap<String, Vec<&Workflow>> = HashMap::new();
        for workflow in self.runtime_workflows.values() {
            let tag = workflow.tag.clone().unwrap_or_else(|| "untagged".to_string());
            by_tag.entry(tag).or_default().push(workflow);
        }
        for (tag, workflows) in by_tag {
            let path = self.workflow_path(&tag);
            let mut on_disk: Vec<Workflow> = match fs::read_to_string(&path) {
                Ok(body) => serde_json::from_str(&body).unwrap_or_else(|source| {
                    warn!(path = %path.display(), error = %source, "skipping corrupt workflow file on persist, overwriting");
                    Vec::new()
                }),
                Err(_) => Vec::new(),
            };
            let existing_ids: HashSet<Uuid> = on_disk.iter().map(|w| w.id).collect();
            for workflow in workflows {
                if !existing_ids.contains(&workflow.id) {
                    on_disk.push(workflow.clone());
                }
            }
            let body = serde_json::to_vec_pretty(&on_disk)
                .map_err(|source| MemoryError::CorruptWorkflowFile { path: path.display().to_string(), source })?;
            fs::write(&path, body).map_err(|e| io_err(&path, e))?;
        }
        Ok(())
    }

    /// Populate the historical view for `task` (§4.2 `loadFromStore`).
    ///
    /// Two-pass: first accept workflow files/records by tag and task-
    /// embedding similarity, gather the node ids their paths reference,
    /// then scan graph files and load only those nodes. Corrupt or
    /// malformed individual files are logged and skipped, never fatal to
    /// the whole load.
    pub fn load_from_store(&mut self, task: &str, embedder: &dyn Embedder, options: LoadOptions) -> Result<(), MemoryError> {
        let task_embedding = embedder.embed(task);
        let target_embedding = options.target_tag.map(|t| embedder.embed(t));

        let mut referenced_nodes: HashSet<Uuid> = HashSet::new();

        let workflow_dir = self.memory_dir.join("workflow");
        if workflow_dir.is_dir() {
            let entries = fs::read_dir(&workflow_dir).map_err(|e| io_err(&workflow_dir, e))?;
            for entry in entries {
                let Ok(entry) = entry else { continue };
                let path = entry.path();
                let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { continue };

                if let (Some(target_tag), Some(target_embedding)) = (options.target_tag, &target_embedding) {
                    let file_tag_matches = stem == target_tag
                        || cosine_similarity(&embedder.embed(stem), target_embedding) >= options.tag_threshold;
                    if !file_tag_matches {
                        continue;
                    }
                }

                let body = match fs::read_to_string(&path) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable workflow file");
                        continue;
                    }
                };
                let workflows: Vec<Workflow> = match serde_json::from_str(&body) {
                    Ok(w) => w,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping corrupt/non-list workflow file");
                        continue;
                    }
                };

                for workflow in workflows {
                    if self.historical_workflows.contains_key(&workflow.id) {
                        continue;
                    }
                    if !workflow.task_embedding.is_empty() {
                        let sim = cosine_similarity(&workflow.task_embedding, &task_embedding);
                        if sim < options.embed_threshold {
                            continue;
                        }
                    }
                    for transition in &workflow.path {
                        referenced_nodes.insert(transition.from);
                        referenced_nodes.insert(transition.to);
                    }
                    self.historical_workflows.insert(workflow.id, workflow);
                }
            }
        }

        let graph_dir = self.memory_dir.join("graph");
        if graph_dir.is_dir() {
            let entries = fs::read_dir(&graph_dir).map_err(|e| io_err(&graph_dir, e))?;
            for entry in entries {
                let Ok(entry) = entry else { continue };
                let path = entry.path();
                let body = match fs::read_to_string(&path) {
                    Ok(b) => b,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping unreadable graph file");
                        continue;
                    }
                };
                let mut graph: WorkGraph = match serde_json::from_str(&body) {
                    Ok(g) => g,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "skipping corrupt/mismatched graph file");
                        continue;
                    }
                };

                graph.nodes.retain(|node| {
                    if !referenced_nodes.contains(&node.id) {
                        return false;
                    }
                    if let (Some(node_tag), Some(target_tag), Some(target_embedding)) =
                        (&node.tag, options.target_tag, &target_embedding)
                    {
                        return node_tag == target_tag
                            || cosine_similarity(&embedder.embed(node_tag), target_embedding) >= options.tag_threshold;
                    }
                    true
                });

                self.historical_graphs
                    .entry(graph.app.clone())
                    .and_modify(|existing| existing.merge_from(graph.clone()))
                    .or_insert(graph);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embed::HashingEmbedder;
    use super::super::action::WorkAction;
    use super::super::workflow::WorkTransition;

    #[test]
    fn persist_then_load_round_trips_a_graph_and_workflow() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::default();
        let mut memory = ActionMemory::new(dir.path());

        let graph = memory.get_or_create_graph("com.example.app");
        let n1 = graph.get_or_create_node(vec![]);
        let wf_id = memory.create_workflow("order a pizza", Some("order_pizza".to_string()), &embedder);
        let wf = memory.workflow_mut(wf_id).unwrap();
        wf.add_transition(WorkTransition { from: n1, to: n1, action: WorkAction::tap("x", "tap x"), success: true })
            .unwrap();
        memory.persist().unwrap();

        let mut reloaded = ActionMemory::new(dir.path());
        reloaded
            .load_from_store("order a large pizza", &embedder, LoadOptions { embed_threshold: 0.3, ..Default::default() })
            .unwrap();
        assert!(reloaded.historical_graph("com.example.app").is_some());
        let historical = reloaded.find_historical_workflows("order a pizza");
        assert_eq!(historical.len(), 1);
        assert_eq!(historical[0].id, wf_id);
    }

    #[test]
    fn runtime_and_historical_workflows_are_exact_task_match() {
        let mut memory = ActionMemory::new("/tmp/unused-tapflow-test");
        let embedder = HashingEmbedder::default();
        memory.create_workflow("order a pepperoni pizza", None, &embedder);
        assert_eq!(memory.find_runtime_workflows("order a pepperoni pizza").len(), 1);
        assert_eq!(memory.find_runtime_workflows("order a large pizza").len(), 0);
    }

    #[test]
    fn high_embed_threshold_excludes_non_identical_task_embeddings() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::default();
        let mut memory = ActionMemory::new(dir.path());
        memory.create_workflow("order a pepperoni pizza", None, &embedder);
        memory.persist().unwrap();

        let mut reloaded = ActionMemory::new(dir.path());
        reloaded
            .load_from_store(
                "order a totally different thing",
                &embedder,
                LoadOptions { embed_threshold: 1.0, ..Default::default() },
            )
            .unwrap();
        assert!(reloaded.find_historical_workflows("order a pepperoni pizza").is_empty());
    }

    #[test]
    fn load_skips_corrupt_workflow_file_without_aborting() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::default();
        fs::create_dir_all(dir.path().join("workflow")).unwrap();
        fs::write(dir.path().join("workflow").join("broken.json"), "not json").unwrap();

        let mut memory = ActionMemory::new(dir.path());
        let result = memory.load_from_store("anything", &embedder, LoadOptions::default());
        assert!(result.is_ok());
        assert!(memory.find_historical_workflows("anything").is_empty());
    }

    #[test]
    fn nodes_loaded_are_only_those_referenced_by_accepted_workflows() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = HashingEmbedder::default();
        let mut memory = ActionMemory::new(dir.path());

        let graph = memory.get_or_create_graph("com.example.app");
        let n1 = graph.get_or_create_node(vec![]);
        let n2 = graph.get_or_create_node(vec![]);
        let _unreferenced = graph.get_or_create_node(vec![]);

        let wf_id = memory.create_workflow("order a pizza", None, &embedder);
        let wf = memory.workflow_mut(wf_id).unwrap();
        wf.add_transition(WorkTransition { from: n1, to: n2, action: WorkAction::tap("x", "tap x"), success: true })
            .unwrap();
        memory.persist().unwrap();

        let mut reloaded = ActionMemory::new(dir.path());
        reloaded
            .load_from_store("order a pizza", &embedder, LoadOptions { embed_threshold: 0.3, ..Default::default() })
            .unwrap();
        let historical = reloaded.historical_graph("com.example.app").unwrap();
        assert_eq!(historical.nodes.len(), 2);
    }
}
