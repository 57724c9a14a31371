//! The Planner/Router (§4.6): decides, once per planning step, whether the
//! task at hand matches a known skill in the skill library (§6) or should
//! fall through to general step-by-step action selection. Decisions are
//! cached per normalized task string so a task seen earlier in the same run
//! doesn't pay for a second router call (mirrors the replay-cache shape of
//! `clickweave-core::decision_cache`, keyed on the thing being decided
//! rather than on a click target).

use std::collections::HashMap;
use std::future::Future;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::literal::{Literal, parse_call_json_first};
use crate::types::Message;

/// One entry in the skill library the router chooses among (§6 skill
/// library layout: `function_name`/`tag`/`description`/`parameters`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub function_name: String,
    pub tag: String,
    pub description: String,
    pub parameters: Vec<SkillParam>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillParam {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub required: bool,
}

/// The router's verdict for a given task (§4.6 `plan(task, context) ->
/// {decision, skill_name?, skill_params?}`).
#[derive(Debug, Clone, PartialEq)]
pub enum PlanDecision {
    UseSkill { skill_name: String, skill_params: HashMap<String, Value> },
    General,
}

/// Normalize a task string for cache-key and router-prompt-dedup purposes:
/// trim surrounding whitespace, lowercase. Two tasks differing only in case
/// or leading/trailing space are the same cache entry.
pub fn normalize_task(task: &str) -> String {
    task.trim().to_lowercase()
}

/// Per-run cache of router decisions, keyed by `normalize_task(task)`. The
/// `AgentLoop` consults this before issuing a router call and only pays for
/// a fresh router turn on a cache miss, matching the planning-cadence rule
/// that a task already decided this run is not replanned on its own.
#[derive(Debug, Clone, Default)]
pub struct RouterCache {
    entries: HashMap<String, PlanDecision>,
}

impl RouterCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, task: &str) -> Option<&PlanDecision> {
        self.entries.get(&normalize_task(task))
    }

    pub fn insert(&mut self, task: &str, decision: PlanDecision) {
        self.entries.insert(normalize_task(task), decision);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

const DECISION_OPEN: &str = "<decision>";
const DECISION_CLOSE: &str = "</decision>";
const EXECUTION_OPEN: &str = "<execution>";
const EXECUTION_CLOSE: &str = "</execution>";

/// Extract the text between a pair of tags, if both are present in order.
fn extract_tagged<'a>(text: &'a str, open: &str, close: &str) -> Option<&'a str> {
    let start = text.find(open)? + open.len();
    let end = text[start..].find(close)? + start;
    Some(text[start..end].trim())
}

/// Build the router system prompt enumerating the available skill library
/// (§4.6). Expects the model to answer with a `<decision>` region holding
/// either `general` or a skill's `function_name`, and, when a skill is
/// chosen, an `<execution>` region holding a call to that skill with its
/// arguments bound by name.
pub fn router_system_prompt(skills: &[Skill]) -> String {
    if skills.is_empty() {
        return "You are routing a task. No learned skills are available yet, so always answer:\n\n<decision>general</decision>"
            .to_string();
    }

    let mut library = String::new();
    for skill in skills {
        let params = skill
            .parameters
            .iter()
            .map(|p| format!("{}{}: {}", p.name, if p.required { "" } else { " (optional)" }, p.description))
            .collect::<Vec<_>>()
            .join(", ");
        library.push_str(&format!("- {} [{}] — {}\n    params: {}\n", skill.function_name, skill.tag, skill.description, params));
    }

    format!(
        r#"You are routing a task to either a known skill or general step-by-step execution.

Known skills:
{library}
Decide whether the current task is best served by one of the skills above,
or by general action-by-action execution with no skill.

Respond with:
<decision>general</decision>

or, to invoke a skill:
<decision>skill_function_name</decision>
<execution>skill_function_name(param1="value", param2="value")</execution>

Only choose a skill if its description genuinely matches the task. When
unsure, choose general."#
    )
}

/// A single decomposed subtask (§4.6 `decompose(task) -> TaskPlan`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubTask {
    pub task: String,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskPlan {
    pub subtasks: Vec<SubTask>,
}

impl TaskPlan {
    /// The single-subtask fallback used whenever the model's decomposition
    /// response fails to parse: treat the whole task as one untagged
    /// general subtask rather than failing the run.
    pub fn fallback(task: &str) -> Self {
        Self { subtasks: vec![SubTask { task: task.to_string(), tag: Some("general.task".to_string()) }] }
    }
}

#[derive(Debug, Deserialize)]
struct RawDecompose {
    subtasks: Vec<RawSubTask>,
}

#[derive(Debug, Deserialize)]
struct RawSubTask {
    task: String,
    #[serde(default)]
    tag: Option<String>,
}

pub fn decompose_system_prompt() -> String {
    r#"Break the user's task into an ordered list of independent subtasks,
each small enough to accomplish with a short sequence of UI actions.

Respond with ONLY a JSON object:
{"subtasks": [{"task": "...", "tag": "optional.tag"}]}

If the task is already a single focused action, return one subtask."#
        .to_string()
}

/// Seam over a model backend for planning calls, mirroring `ChatBackend`'s
/// shape (§4.10) without depending on `client::ChatBackend` directly so the
/// planner can be driven by any backend a caller already holds.
pub trait PlannerBackend: Send + Sync {
    fn chat(&self, messages: Vec<Message>) -> impl Future<Output = Result<String>> + Send;
}

/// Any `ChatBackend` a caller already holds (e.g. the one behind its
/// `ModelClient`) can drive the planner without a second configured
/// backend — the router/decompose calls just don't pass tool schemas.
impl<T: crate::client::ChatBackend> PlannerBackend for &T {
    fn chat(&self, messages: Vec<Message>) -> impl Future<Output = Result<String>> + Send {
        async move {
            let response = crate::client::ChatBackend::chat(*self, messages, None).await?;
            Ok(response.first_message().map(|m| m.content_text()).unwrap_or_default())
        }
    }
}

pub struct Planner<B: PlannerBackend> {
    backend: B,
}

impl<B: PlannerBackend> Planner<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    /// Route `task` against `skills`, returning the parsed decision. Does
    /// not consult or populate a `RouterCache` itself — that's the caller's
    /// job, since the cache's lifetime is the whole run, not one call.
    pub async fn plan(&self, task: &str, context_summary: &str, skills: &[Skill]) -> Result<PlanDecision> {
        let messages = vec![
            Message::system(router_system_prompt(skills)),
            Message::user(format!("Task: {task}\n\nContext so far:\n{context_summary}")),
        ];
        let raw = self.backend.chat(messages).await.context("router call failed")?;
        parse_router_response(&raw, skills)
    }

    /// Split `task` into subtasks. Falls back to a single untagged subtask
    /// (`"general.task"`) if the model's response doesn't parse as the
    /// expected JSON shape — decomposition failure must never abort a run.
    pub async fn decompose(&self, task: &str) -> TaskPlan {
        let messages =
            vec![Message::system(decompose_system_prompt()), Message::user(format!("Task: {task}"))];
        match self.backend.chat(messages).await {
            Ok(raw) => decompose_response(&raw, task),
            Err(_) => TaskPlan::fallback(task),
        }
    }
}

/// Free function mirroring `Planner::decompose`'s fallback contract, usable
/// by callers that already have a raw model response in hand (e.g. a
/// replayed/cached decomposition) without re-issuing a chat call.
pub fn decompose(raw_response: &str, original_task: &str) -> TaskPlan {
    decompose_response(raw_response, original_task)
}

fn decompose_response(raw: &str, original_task: &str) -> TaskPlan {
    let json_text = crate::client::extract_json(raw);
    match serde_json::from_str::<RawDecompose>(json_text) {
        Ok(parsed) if !parsed.subtasks.is_empty() => TaskPlan {
            subtasks: parsed.subtasks.into_iter().map(|s| SubTask { task: s.task, tag: s.tag }).collect(),
        },
        _ => TaskPlan::fallback(original_task),
    }
}

fn parse_router_response(raw: &str, skills: &[Skill]) -> Result<PlanDecision> {
    let decision_text = extract_tagged(raw, DECISION_OPEN, DECISION_CLOSE)
        .ok_or_else(|| anyhow::anyhow!("router response missing <decision> region: {raw}"))?;

    if decision_text.eq_ignore_ascii_case("general") {
        return Ok(PlanDecision::General);
    }

    let skill = skills
        .iter()
        .find(|s| s.function_name == decision_text)
        .ok_or_else(|| anyhow::anyhow!("router chose unknown skill `{decision_text}`"))?;

    let execution_text = extract_tagged(raw, EXECUTION_OPEN, EXECUTION_CLOSE)
        .ok_or_else(|| anyhow::anyhow!("router chose skill `{decision_text}` with no <execution> region"))?;

    let (called_name, args) = parse_call_json_first(execution_text)
        .with_context(|| format!("malformed execution call: {execution_text}"))?;
    if called_name != skill.function_name {
        anyhow::bail!("execution call names `{called_name}`, decision named `{decision_text}`");
    }

    let skill_params: HashMap<String, Value> =
        args.into_iter().map(|(k, v): (String, Literal)| (k, v.to_json())).collect();

    for param in &skill.parameters {
        if param.required && !skill_params.contains_key(&param.name) {
            anyhow::bail!("execution call missing required parameter `{}`", param.name);
        }
    }

    Ok(PlanDecision::UseSkill { skill_name: skill.function_name.clone(), skill_params })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_skill() -> Skill {
        Skill {
            function_name: "set_alarm".to_string(),
            tag: "clock.alarm".to_string(),
            description: "Create a recurring alarm".to_string(),
            parameters: vec![
                SkillParam { name: "hour".to_string(), description: "hour 0-23".to_string(), required: true },
                SkillParam { name: "minute".to_string(), description: "minute 0-59".to_string(), required: false },
            ],
        }
    }

    #[test]
    fn normalize_task_trims_and_lowercases() {
        assert_eq!(normalize_task("  Set An Alarm  "), "set an alarm");
    }

    #[test]
    fn router_cache_round_trips_by_normalized_key() {
        let mut cache = RouterCache::new();
        cache.insert("Set an Alarm", PlanDecision::General);
        assert_eq!(cache.get("  set an alarm  "), Some(&PlanDecision::General));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn parses_general_decision() {
        let raw = "<decision>general</decision>";
        let decision = parse_router_response(raw, &[]).unwrap();
        assert_eq!(decision, PlanDecision::General);
    }

    #[test]
    fn parses_skill_decision_with_execution_call() {
        let raw = r#"<decision>set_alarm</decision>
<execution>set_alarm(hour=7, minute=30)</execution>"#;
        let decision = parse_router_response(raw, std::slice::from_ref(&sample_skill())).unwrap();
        match decision {
            PlanDecision::UseSkill { skill_name, skill_params } => {
                assert_eq!(skill_name, "set_alarm");
                assert_eq!(skill_params.get("hour"), Some(&Value::from(7)));
            }
            PlanDecision::General => panic!("expected UseSkill"),
        }
    }

    #[test]
    fn skill_decision_missing_required_param_is_rejected() {
        let raw = r#"<decision>set_alarm</decision>
<execution>set_alarm(minute=30)</execution>"#;
        assert!(parse_router_response(raw, std::slice::from_ref(&sample_skill())).is_err());
    }

    #[test]
    fn unknown_skill_name_is_rejected() {
        let raw = "<decision>not_a_real_skill</decision>\n<execution>not_a_real_skill()</execution>";
        assert!(parse_router_response(raw, std::slice::from_ref(&sample_skill())).is_err());
    }

    #[test]
    fn decompose_falls_back_on_malformed_json() {
        let plan = decompose_response("not json at all", "order a pizza");
        assert_eq!(plan, TaskPlan::fallback("order a pizza"));
    }

    #[test]
    fn decompose_parses_subtasks_from_fenced_json() {
        let raw = "```json\n{\"subtasks\": [{\"task\": \"open app\"}, {\"task\": \"tap submit\", \"tag\": \"checkout\"}]}\n```";
        let plan = decompose_response(raw, "checkout");
        assert_eq!(plan.subtasks.len(), 2);
        assert_eq!(plan.subtasks[1].tag.as_deref(), Some("checkout"));
    }

    #[test]
    fn decompose_falls_back_on_empty_subtask_list() {
        let plan = decompose_response(r#"{"subtasks": []}"#, "noop task");
        assert_eq!(plan, TaskPlan::fallback("noop task"));
    }
}
