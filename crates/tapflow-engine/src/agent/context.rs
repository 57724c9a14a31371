//! C4: `StructuredContext` — the sectioned prompt builder the perception
//! step hands to the model (§4.3). Render order is fixed; only the
//! Reflection and Speculative sections are conditionally present.

use std::collections::VecDeque;

use serde_json::Value;
use tapflow_core::ReflectionRecord;
use tapflow_llm::Message;

pub const MAX_HISTORY: usize = 10;
pub const MAX_REFLECTION: usize = 5;

/// One completed step, folded into the History section as a single line.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub step: u32,
    pub description: String,
}

/// A bounded FIFO over `T`, evicting the oldest entry once `cap` is reached.
#[derive(Debug, Clone)]
struct Bounded<T> {
    cap: usize,
    items: VecDeque<T>,
}

impl<T> Bounded<T> {
    fn new(cap: usize) -> Self {
        Self { cap, items: VecDeque::with_capacity(cap) }
    }

    fn push(&mut self, item: T) {
        if self.items.len() == self.cap {
            self.items.pop_front();
        }
        self.items.push_back(item);
    }

    fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    fn back(&self) -> Option<&T> {
        self.items.back()
    }

    fn clear(&mut self) {
        self.items.clear();
    }
}

/// The sections an agent step's prompt is assembled from (§4.3). Screenshot
/// and ScreenInfo are step-scoped and must be cleared via
/// `clear_step_scoped` once the step that produced them is done; History
/// and Reflection persist and grow (bounded) across the whole run.
pub struct StructuredContext {
    system_prompt: String,
    task_description: String,
    history: Bounded<HistoryEntry>,
    reflection: Bounded<ReflectionRecord>,
    screenshot_base64: Option<String>,
    screen_info: Option<Value>,
    speculative: Option<String>,
}

impl StructuredContext {
    pub fn new(system_prompt: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            task_description: task.into(),
            history: Bounded::new(MAX_HISTORY),
            reflection: Bounded::new(MAX_REFLECTION),
            screenshot_base64: None,
            screen_info: None,
            speculative: None,
        }
    }

    pub fn push_history(&mut self, entry: HistoryEntry) {
        self.history.push(entry);
    }

    pub fn push_reflection(&mut self, record: ReflectionRecord) {
        self.reflection.push(record);
    }

    pub fn set_screenshot(&mut self, base64: impl Into<String>) {
        self.screenshot_base64 = Some(base64.into());
    }

    pub fn set_screen_info(&mut self, info: Value) {
        self.screen_info = Some(info);
    }

    pub fn set_speculative(&mut self, text: impl Into<String>) {
        self.speculative = Some(text.into());
    }

    /// Swap the system prompt, e.g. to the "prediction" variant while a
    /// `SpeculativeExecutor` hint is attached (§4.10). Callers are
    /// responsible for restoring the original prompt once the hint is gone.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = prompt.into();
    }

    /// One line per retained `HistoryEntry`, oldest first — used by the
    /// planner/router call's `context_summary` argument (§4.6), distinct
    /// from the full `render()` used for the action-mode prompt.
    pub fn history_summary(&self) -> String {
        self.history.iter().map(|h| format!("step {}: {}", h.step, h.description)).collect::<Vec<_>>().join("\n")
    }

    /// Drop the per-step sections (Screenshot, ScreenInfo, Speculative) so
    /// the next step starts from a clean slate. History and Reflection are
    /// untouched.
    pub fn clear_step_scoped(&mut self) {
        self.screenshot_base64 = None;
        self.screen_info = None;
        self.speculative = None;
    }

    pub fn history_len(&self) -> usize {
        self.history.items.len()
    }

    pub fn reflection_len(&self) -> usize {
        self.reflection.items.len()
    }

    /// Reflection only renders when its most recent entry flags trouble:
    /// an explicit failure, or confidence below 0.7 (§4.3). A clean run of
    /// successful, confident steps carries no reflection noise forward.
    fn should_render_reflection(&self) -> bool {
        match self.reflection.back() {
            Some(r) => r.action_successful == Some(false) || r.confidence < 0.7,
            None => false,
        }
    }

    /// Render the fixed section order into an OpenAI-style message list:
    /// SystemPrompt, TaskDescription, History, [Reflection], [Speculative],
    /// Screenshot, ScreenInfo.
    pub fn render(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        messages.push(Message::system(&self.system_prompt));
        messages.push(Message::user(format!("Task: {}", self.task_description)));

        if self.history.items.is_empty() {
            messages.push(Message::user("History: (no prior steps)"));
        } else {
            let lines: Vec<String> =
                self.history.iter().map(|h| format!("step {}: {}", h.step, h.description)).collect();
            messages.push(Message::user(format!("History:\n{}", lines.join("\n"))));
        }

        if self.should_render_reflection() {
            let lines: Vec<String> = self
                .reflection
                .iter()
                .map(|r| {
                    format!(
                        "- {:?} (confidence {:.2}){}",
                        r.execution_result,
                        r.confidence,
                        r.reasoning.as_deref().map(|s| format!(": {s}")).unwrap_or_default()
                    )
                })
                .collect();
            messages.push(Message::user(format!("Reflection:\n{}", lines.join("\n"))));
        }

        if let Some(speculative) = &self.speculative {
            messages.push(Message::user(format!("Suggested next steps (from similar past runs):\n{speculative}")));
        }

        if let Some(screenshot) = &self.screenshot_base64 {
            messages.push(Message::user_with_image("Current screen:", screenshot.clone()));
        }

        if let Some(screen_info) = &self.screen_info {
            messages.push(Message::user(format!(
                "Screen elements (JSON):\n{}",
                serde_json::to_string(screen_info).unwrap_or_default()
            )));
        }

        messages
    }
}
