//! C11: `AgentLoop`, the controller that drives perception → (optional
//! planning) → action → reflection → persistence in a loop until the task
//! finishes, the operator cancels, or the step budget runs out (§4.11).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tapflow_core::device::{DeviceController, ScreenState};
use tapflow_core::embed::Embedder;
use tapflow_core::memory::{ActionKind, ActionMemory, WorkAction, Workflow, WorkflowRecorder};
use tapflow_core::ui_element::UiElement;
use tapflow_llm::client::{action_system_prompt, predict_system_prompt, ChatBackend, ModelClient};
use tapflow_llm::planner::{PlanDecision, Planner, RouterCache, Skill};

use super::context::{HistoryEntry, StructuredContext};
use super::error_analyzer::ErrorAnalyzer;
use super::handler::{parse_work_action, ActionHandler, HandlerOutcome};
use super::reflection::reflect;
use super::skill::{record_skill_invocation, SkillDefinition, SkillExecutor};
use super::speculative::{speculate, SpeculativeCandidate};

/// Tuning knobs for a run (§4.11, §4.6 cadence). Defaults match the spec's
/// stated defaults (`planning_interval = 5`).
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub max_steps: u32,
    pub planning_interval: u32,
    /// When true, §4.9 reflection only runs for actions the handler already
    /// reported as failed — successful actions skip the VLM/fast-path
    /// judgment entirely. Off by default: the canonical flow reflects on
    /// every non-`Finish` step.
    pub reflection_on_failure_only: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self { max_steps: 30, planning_interval: 5, reflection_on_failure_only: false }
    }
}

/// Router metadata (`Skill`) and executable bodies (`SkillDefinition`) for
/// the skill library (§6), kept separate the way the on-disk layout keeps
/// `skill_library.json`'s metadata apart from each skill's own file.
#[derive(Debug, Clone, Default)]
pub struct SkillLibrary {
    skills: Vec<Skill>,
    definitions: HashMap<String, SkillDefinition>,
}

impl SkillLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_skill(mut self, skill: Skill, definition: SkillDefinition) -> Self {
        self.definitions.insert(skill.function_name.clone(), definition);
        self.skills.push(skill);
        self
    }

    pub fn skills(&self) -> &[Skill] {
        &self.skills
    }

    pub fn definition(&self, function_name: &str) -> Option<&SkillDefinition> {
        self.definitions.get(function_name)
    }
}

/// Everything an `AgentLoop` needs injected at construction (§9 "Global
/// singletons... replace with a `RunContext`"). Tests build this from
/// `test_stubs::ScriptedLlm`/`StaticDevice` and an in-memory `ActionMemory`.
pub struct RunContext<C: ChatBackend> {
    pub task: String,
    pub tag: Option<String>,
    pub device: Arc<dyn DeviceController>,
    pub model: ModelClient<C>,
    pub handler: ActionHandler,
    pub memory: ActionMemory,
    pub embedder: Arc<dyn Embedder>,
    pub skill_library: SkillLibrary,
    pub config: AgentConfig,
    pub cancel: CancellationToken,
}

impl<C: ChatBackend> RunContext<C> {
    pub fn new(
        task: impl Into<String>,
        device: Arc<dyn DeviceController>,
        model: ModelClient<C>,
        memory: ActionMemory,
        embedder: Arc<dyn Embedder>,
    ) -> Self {
        Self {
            task: task.into(),
            tag: None,
            device,
            model,
            handler: ActionHandler::new(),
            memory,
            embedder,
            skill_library: SkillLibrary::new(),
            config: AgentConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_handler(mut self, handler: ActionHandler) -> Self {
        self.handler = handler;
        self
    }

    pub fn with_skill_library(mut self, skill_library: SkillLibrary) -> Self {
        self.skill_library = skill_library;
        self
    }

    pub fn with_config(mut self, config: AgentConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// One executed step, kept in the run's `actions` trail (§6 "exit
/// conditions... actions: [dict]").
#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub step: u32,
    pub action_kind: ActionKind,
    pub description: String,
    pub success: bool,
    pub finished: bool,
}

/// The value returned to the caller at run end (§6 "exit conditions").
#[derive(Debug, Clone)]
pub struct RunResult {
    pub finished: bool,
    pub actions: Vec<StepOutcome>,
    pub result_message: String,
    pub step_count: u32,
}

/// The per-step controller (§4.11). Owns exactly the state a single task
/// run needs; a second concurrent task gets its own `AgentLoop` and its own
/// `ActionMemory`/`StructuredContext` (§5 shared-resource policy).
pub struct AgentLoop<C: ChatBackend> {
    task: String,
    tag: Option<String>,
    device: Arc<dyn DeviceController>,
    model: ModelClient<C>,
    handler: ActionHandler,
    memory: ActionMemory,
    embedder: Arc<dyn Embedder>,
    skill_library: SkillLibrary,
    config: AgentConfig,
    cancel: CancellationToken,
}

impl<C: ChatBackend> AgentLoop<C> {
    pub fn new(ctx: RunContext<C>) -> Self {
        Self {
            task: ctx.task,
            tag: ctx.tag,
            device: ctx.device,
            model: ctx.model,
            handler: ctx.handler,
            memory: ctx.memory,
            embedder: ctx.embedder,
            skill_library: ctx.skill_library,
            config: ctx.config,
            cancel: ctx.cancel,
        }
    }

    /// Hand back the `ActionMemory` this loop was driving, once `run()` has
    /// returned it by consuming `self`. Exposed so callers can inspect or
    /// re-persist state without holding a second handle for the whole run.
    pub fn into_memory(self) -> ActionMemory {
        self.memory
    }

    async fn fresh_screenshot(&self) -> ScreenState {
        match self.device.screenshot().await {
            Ok(screen) => screen,
            Err(e) => {
                warn!(error = %e, "screenshot failed, falling back to a black placeholder frame");
                fallback_screen()
            }
        }
    }

    async fn current_app(&self) -> String {
        self.device.current_app().await.unwrap_or_else(|e| {
            warn!(error = %e, "current_app failed, proceeding with an empty app name");
            String::new()
        })
    }

    /// §4.6: consult the per-task router cache first; on a miss, issue one
    /// router call. A failed router call leaves the cache untouched and
    /// degrades to `General` rather than aborting the run.
    async fn maybe_plan(&self, context_summary: &str, cache: &mut RouterCache) -> PlanDecision {
        if let Some(decision) = cache.get(&self.task) {
            return decision.clone();
        }
        let planner = Planner::new(self.model.backend());
        match planner.plan(&self.task, context_summary, self.skill_library.skills()).await {
            Ok(decision) => {
                cache.insert(&self.task, decision.clone());
                decision
            }
            Err(e) => {
                warn!(error = %e, "router call failed, proceeding with general atomic action");
                PlanDecision::General
            }
        }
    }

    /// §4.8: gather every workflow this `ActionMemory` knows about (runtime
    /// and historical alike), keep only the ones whose app matches
    /// `current_app` (step 1), and ask `speculative::speculate` for a
    /// prediction. Read-only — never mutates `self.memory`.
    fn maybe_speculate(&self, current_app: &str, elements: &[UiElement]) -> Option<String> {
        let workflows: Vec<&Workflow> = self
            .memory
            .historical_workflows_iter()
            .chain(self.memory.runtime_workflows_iter())
            .filter(|w| self.memory.workflow_app(w).map(|app| app == current_app).unwrap_or(false))
            .collect();
        if workflows.is_empty() {
            return None;
        }
        let mut rng = rand::thread_rng();
        let candidates = speculate(
            &workflows,
            current_app,
            elements,
            |id| self.memory.node_elements(id).map(|(_, e)| e),
            &mut rng,
        );
        if candidates.is_empty() {
            return None;
        }
        Some(render_speculative_text(&candidates))
    }

    fn screen_info_json(current_app: &str, screen: &ScreenState) -> serde_json::Value {
        serde_json::json!({ "current_app": current_app, "elements": screen.elements })
    }

    fn register_node(&mut self, app: &str, elements: Vec<UiElement>) -> Uuid {
        let graph = self.memory.get_or_create_graph(app);
        let node_id = graph.get_or_create_node(elements);
        if let Some(node) = graph.node_mut(node_id) {
            node.add_task(&self.task);
        }
        node_id
    }

    /// Drive the task to completion (§4.11). Consumes `self`: an
    /// `AgentLoop` is scoped to one task run, matching `WorkflowRecorder`'s
    /// one-pending-transition invariant and `ActionMemory`'s exclusive
    /// ownership (§5).
    pub async fn run(mut self) -> RunResult {
        let mut recorder = WorkflowRecorder::new(self.task.clone(), self.tag.clone(), self.embedder.as_ref());
        let mut context = StructuredContext::new(action_system_prompt(), self.task.clone());
        let mut router_cache = RouterCache::new();
        let mut error_analyzer = ErrorAnalyzer::new();
        let mut executed_skills: HashSet<String> = HashSet::new();
        let mut planning_done = false;
        let mut last_planning_step: Option<u32> = None;
        let mut cached_screen: Option<ScreenState> = None;
        let mut actions_executed: Vec<StepOutcome> = Vec::new();
        let mut step: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                info!(step, "run cancelled externally, flushing and persisting before exit");
                self.memory.insert_workflow(recorder.into_workflow());
                if let Err(e) = self.memory.persist() {
                    warn!(error = %e, "memory persist failed on cancellation");
                }
                return RunResult {
                    finished: false,
                    actions: actions_executed,
                    result_message: "cancelled".to_string(),
                    step_count: step,
                };
            }

            let is_first = step == 0;

            // 1. Capture.
            let before_screen = match cached_screen.take() {
                Some(screen) => screen,
                None => self.fresh_screenshot().await,
            };
            let current_app = self.current_app().await;
            let before_node = self.register_node(&current_app, before_screen.elements.clone());
            if let Err(e) = recorder.on_new_node(before_node) {
                debug!(error = %e, "recorder already had a pending transition open, continuing with it");
            }

            context.set_screenshot(STANDARD.encode(&before_screen.pixels_png));
            context.set_screen_info(Self::screen_info_json(&current_app, &before_screen));

            // 2. Plan (conditionally), then possibly dispatch a skill.
            //
            // `post_skill_flag` (§4.11 step 2, §4.11 state machine) is true
            // only between a skill's dispatch and its post-skill reflection;
            // both happen inline below within this same iteration, so the
            // flag is always false by the time a *later* step reaches this
            // check. It is checked here (rather than dropped) to keep the
            // `Skill -> (post-skill reflection) -> Planned` transition
            // legible at the point the spec names it.
            let post_skill_flag = false;
            let should_plan = !post_skill_flag
                && (is_first
                    || !planning_done
                    || last_planning_step.map(|s| step.saturating_sub(s) >= self.config.planning_interval).unwrap_or(true));

            if should_plan {
                last_planning_step = Some(step);
                planning_done = true;
                let decision = self.maybe_plan(&context.history_summary(), &mut router_cache).await;

                if let PlanDecision::UseSkill { skill_name, skill_params } = decision {
                    if !executed_skills.contains(&skill_name) {
                        if let Some(definition) = self.skill_library.definition(&skill_name).cloned() {
                            let result = {
                                let executor = SkillExecutor::new(&self.handler);
                                executor.execute(&definition, self.device.as_ref()).await
                            };
                            executed_skills.insert(skill_name.clone());

                            if result.success {
                                let after_screen = self.fresh_screenshot().await;
                                let after_app = self.current_app().await;
                                let after_node = self.register_node(&after_app, after_screen.elements.clone());

                                let reflection = reflect(
                                    &self.model,
                                    &before_screen.elements,
                                    &after_screen.elements,
                                    before_screen.focused_element.as_ref(),
                                    after_screen.focused_element.as_ref(),
                                    &format!("executed skill {skill_name}"),
                                )
                                .await;
                                let step_success = !reflection.is_failure();

                                let skill_action = record_skill_invocation(
                                    &skill_name,
                                    serde_json::json!(skill_params),
                                    &format!("executed skill {skill_name}"),
                                )
                                .with_reflection(reflection.clone());

                                error_analyzer.record_action_result(ActionKind::SkillExecution, None, step_success, "");
                                if let Err(e) = recorder.on_action_executed(after_node, skill_action.clone(), step_success) {
                                    warn!(error = %e, "failed to record skill transition");
                                }

                                context.push_history(HistoryEntry {
                                    step,
                                    description: format!(
                                        "skill {skill_name}: {}",
                                        if step_success { "success" } else { "reflection flagged failure" }
                                    ),
                                });
                                context.push_reflection(reflection);
                                context.clear_step_scoped();

                                actions_executed.push(StepOutcome {
                                    step,
                                    action_kind: ActionKind::SkillExecution,
                                    description: format!("skill:{skill_name}"),
                                    success: step_success,
                                    finished: false,
                                });

                                cached_screen = Some(after_screen);
                                step += 1;
                                continue;
                            } else {
                                warn!(skill = %skill_name, error = ?result.failure, "skill execution failed, falling through to atomic action");
                                error_analyzer.record_action_result(
                                    ActionKind::SkillExecution,
                                    None,
                                    false,
                                    result.failure.as_deref().unwrap_or("skill failed"),
                                );
                            }
                        } else {
                            warn!(skill = %skill_name, "router chose a skill with no loaded definition, falling through to atomic action");
                        }
                    }
                }
            }

            // 4. Optional speculation.
            let speculative_text = self.maybe_speculate(&current_app, &before_screen.elements);
            let system_prompt_swapped = speculative_text.is_some();
            if let Some(text) = speculative_text {
                context.set_system_prompt(predict_system_prompt());
                context.set_speculative(text);
            }

            // 5. VLM action.
            let messages = context.render();
            let action_response = match self.model.request_action(messages).await {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "model request failed, ending run gracefully");
                    let work_action = WorkAction::finish(format!("model request failed: {e}"));
                    actions_executed.push(StepOutcome {
                        step,
                        action_kind: ActionKind::Finish,
                        description: work_action.description.clone(),
                        success: false,
                        finished: true,
                    });
                    self.memory.insert_workflow(recorder.into_workflow());
                    if let Err(e) = self.memory.persist() {
                        warn!(error = %e, "memory persist failed after model error");
                    }
                    return RunResult {
                        finished: false,
                        actions: actions_executed,
                        result_message: format!("model request failed: {e}"),
                        step_count: step + 1,
                    };
                }
            };

            if system_prompt_swapped {
                context.set_system_prompt(action_system_prompt());
            }

            // §7 ParseError policy: coerce any unparsable model output into a
            // graceful `Finish`, keeping the loop deterministic.
            let work_action = match action_response.action.as_ref() {
                Some(call) => match parse_work_action(call) {
                    Ok(action) => action,
                    Err(e) => {
                        warn!(error = %e, "parse error on model output, ending run gracefully");
                        WorkAction::finish(format!("parse error: {e}"))
                    }
                },
                None => {
                    warn!("model response carried no recognized action/finish call");
                    WorkAction::finish("model did not emit a recognized action or finish call")
                }
            };

            // 6. Prevention check (logged only, never fed back to the model).
            if let Some(guidance) =
                error_analyzer.prevention_guidance(work_action.kind, work_action.zone_path.as_deref())
            {
                debug!(guidance = %guidance, "prevention guidance");
            }

            // 7. Parse + dispatch.
            let outcome = if work_action.kind == ActionKind::Finish {
                HandlerOutcome { success: true, should_finish: true, requires_confirmation: false, message: None }
            } else {
                match self.handler.dispatch(self.device.as_ref(), &before_screen, &work_action).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(error = %e, "dispatch failed with a parse error, ending run gracefully");
                        HandlerOutcome {
                            success: false,
                            should_finish: true,
                            requires_confirmation: false,
                            message: Some(format!("parse error: {e}")),
                        }
                    }
                }
            };

            // 8/9. Reflection + learning, only when not already finishing.
            let mut reflection_record = None;
            let mut after_node = None;
            let mut after_screen_for_cache = None;

            if !outcome.should_finish {
                let should_reflect =
                    !self.config.reflection_on_failure_only || !outcome.success;

                let after_screen = self.fresh_screenshot().await;
                let after_app = self.current_app().await;
                let node_id = self.register_node(&after_app, after_screen.elements.clone());

                if should_reflect {
                    let record = reflect(
                        &self.model,
                        &before_screen.elements,
                        &after_screen.elements,
                        before_screen.focused_element.as_ref(),
                        after_screen.focused_element.as_ref(),
                        &work_action.description,
                    )
                    .await;
                    reflection_record = Some(record);
                }

                after_node = Some(node_id);
                after_screen_for_cache = Some(after_screen);
            }

            let reflection_says_failure = reflection_record.as_ref().map(|r| r.is_failure()).unwrap_or(false);
            let step_success = outcome.success && !reflection_says_failure;

            error_analyzer.record_action_result(
                work_action.kind,
                work_action.zone_path.clone(),
                step_success,
                outcome.message.as_deref().unwrap_or(""),
            );
            if reflection_says_failure {
                if let Some(pattern) = error_analyzer.error_pattern(
                    work_action.kind,
                    work_action.zone_path.as_deref(),
                    before_screen.elements.len(),
                    &current_app,
                ) {
                    debug!(
                        pattern = ?pattern.pattern_type,
                        context_conds = ?pattern.context_conds,
                        suggestions = ?pattern.suggestions,
                        "failure pattern detected after reflection flagged failure"
                    );
                }
            }

            // 10. Persist the transition.
            let mut recorded_action = work_action.clone();
            if let Some(record) = reflection_record.clone() {
                recorded_action = recorded_action.with_reflection(record);
            }
            if let Some(node_id) = after_node {
                if let Err(e) = recorder.on_action_executed(node_id, recorded_action.clone(), step_success) {
                    warn!(error = %e, "failed to record action transition");
                }
            }

            // 11. Context maintenance.
            let history_description = if step_success {
                recorded_action.description.clone()
            } else {
                format!(
                    "{} (failed: {})",
                    recorded_action.description,
                    outcome.message.clone().unwrap_or_default()
                )
            };
            context.push_history(HistoryEntry { step, description: history_description });
            if let Some(record) = reflection_record {
                context.push_reflection(record);
            }
            context.clear_step_scoped();

            actions_executed.push(StepOutcome {
                step,
                action_kind: recorded_action.kind,
                description: recorded_action.description.clone(),
                success: step_success,
                finished: outcome.should_finish,
            });

            // 12. Cache next screen unless finishing.
            if !outcome.should_finish {
                cached_screen = after_screen_for_cache;
            }

            // 13. Terminate.
            let budget_exhausted = step + 1 >= self.config.max_steps;
            if outcome.should_finish || budget_exhausted {
                self.memory.insert_workflow(recorder.into_workflow());
                if let Err(e) = self.memory.persist() {
                    warn!(error = %e, "memory persist failed at run end");
                }

                let cancelled = outcome.requires_confirmation && !outcome.success;
                let finished = recorded_action.kind == ActionKind::Finish && step_success && !cancelled;
                let result_message = if cancelled {
                    "user cancelled".to_string()
                } else if recorded_action.kind == ActionKind::Finish {
                    recorded_action.params["message"].as_str().unwrap_or_default().to_string()
                } else if budget_exhausted {
                    format!("step budget ({}) exhausted", self.config.max_steps)
                } else {
                    outcome.message.clone().unwrap_or_else(|| "run ended".to_string())
                };

                return RunResult { finished, actions: actions_executed, result_message, step_count: step + 1 };
            }

            step += 1;
        }
    }
}

fn render_speculative_text(candidates: &[SpeculativeCandidate]) -> String {
    candidates
        .iter()
        .map(|c| format!("{} (confidence {:.2}): {}", c.label, c.confidence, c.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// A 1x1 black PNG with `is_sensitive` set, returned in place of a failed
/// screenshot (§7 DeviceError policy) so the loop can keep running.
fn fallback_screen() -> ScreenState {
    let mut buf = Vec::new();
    let image = image::RgbImage::from_pixel(1, 1, image::Rgb([0, 0, 0]));
    let _ = image::DynamicImage::ImageRgb8(image)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png);
    ScreenState { pixels_png: buf, width: 1, height: 1, elements: Vec::new(), focused_element: None, is_sensitive: true }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_stubs::{ScriptedLlm, StaticDevice};
    use tapflow_core::embed::HashingEmbedder;
    use tapflow_core::ui_element::{Bbox, ToggleState};

    fn element(elem_id: &str) -> UiElement {
        UiElement {
            elem_id: elem_id.to_string(),
            bbox: Bbox { x1: 0, y1: 0, x2: 20, y2: 20 },
            class_path: "android.widget.Button".to_string(),
            checked: ToggleState::Enabled,
            focused: ToggleState::Disabled,
            resource_id: Some(elem_id.to_string()),
            content_desc: None,
            text: Some(elem_id.to_string()),
        }
    }

    fn screen(elements: Vec<UiElement>) -> ScreenState {
        ScreenState { pixels_png: vec![0u8; 4], width: 100, height: 100, elements, focused_element: None, is_sensitive: false }
    }

    fn context_for(device: StaticDevice, llm_responses: Vec<&str>, max_steps: u32) -> RunContext<ScriptedLlm> {
        let memory = ActionMemory::new(std::env::temp_dir().join(format!("tapflow-test-{}", Uuid::new_v4())));
        RunContext::new(
            "tap the submit button",
            Arc::new(device),
            ModelClient::new(ScriptedLlm::new(llm_responses)),
            memory,
            Arc::new(HashingEmbedder::default()),
        )
        .with_config(AgentConfig { max_steps, planning_interval: 5, reflection_on_failure_only: false })
    }

    #[tokio::test]
    async fn run_finishes_on_explicit_finish_action() {
        let device = StaticDevice::new(screen(vec![element("btn_submit")]), "com.example.app");
        let ctx = context_for(device, vec!["<decision>general</decision>", "Done: finish(message=\"all set\")"], 5);
        let result = AgentLoop::new(ctx).run().await;
        assert!(result.finished);
        assert_eq!(result.result_message, "all set");
        assert_eq!(result.step_count, 1);
    }

    #[tokio::test]
    async fn run_ends_with_unfinished_result_when_budget_exhausted() {
        let device = StaticDevice::new(screen(vec![element("btn_submit")]), "com.example.app");
        let ctx = context_for(
            device,
            vec![
                "<decision>general</decision>",
                "Tapping: do(action=\"tap\", element=\"btn_submit\")",
            ],
            1,
        );
        let result = AgentLoop::new(ctx).run().await;
        assert!(!result.finished);
        assert_eq!(result.step_count, 1);
        assert_eq!(result.actions.len(), 1);
    }

    #[tokio::test]
    async fn unresolved_element_converts_to_graceful_finish() {
        let device = StaticDevice::new(screen(vec![element("btn_submit")]), "com.example.app");
        let ctx = context_for(
            device,
            vec![
                "<decision>general</decision>",
                "Tapping: do(action=\"tap\", element=\"does_not_exist\")",
            ],
            5,
        );
        let result = AgentLoop::new(ctx).run().await;
        assert!(!result.finished);
        assert!(result.result_message.contains("parse error"));
    }

    #[tokio::test]
    async fn cancellation_before_first_step_ends_run_without_executing() {
        let device = StaticDevice::new(screen(vec![element("btn_submit")]), "com.example.app");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = context_for(device, vec!["finish(message=\"unused\")"], 5).with_cancellation(cancel);
        let result = AgentLoop::new(ctx).run().await;
        assert!(!result.finished);
        assert_eq!(result.result_message, "cancelled");
        assert!(result.actions.is_empty());
    }
}
