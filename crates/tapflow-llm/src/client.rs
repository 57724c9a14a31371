use crate::types::*;
use anyhow::{Context, Result};
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info, trace};

/// Seam for model interaction (§4.10 ModelClient / §1 "ModelClient" external
/// capability), allowing deterministic test doubles in the engine crate.
pub trait ChatBackend: Send + Sync {
    fn chat(
        &self,
        messages: Vec<Message>,
        tools: Option<Vec<Value>>,
    ) -> impl Future<Output = Result<ChatResponse>> + Send;

    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // LM Studio default
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: None,
            model: "local-model".to_string(),
            temperature: 0.0,
            max_tokens: 3000,
        }
    }
}

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
    context_length: AtomicU64,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self { config, http: reqwest::Client::new(), context_length: AtomicU64::new(0) }
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn log_usage(&self, response: &ChatResponse) {
        let Some(usage) = &response.usage else {
            return;
        };

        let ctx = self.context_length.load(Ordering::Relaxed);
        if ctx > 0 {
            let pct = (usage.total_tokens as f64 / ctx as f64 * 100.0) as u32;
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                context_length = ctx,
                usage_pct = pct,
                "model usage ({}/{} {}%)",
                usage.total_tokens,
                ctx,
                pct
            );
        } else {
            info!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                total_tokens = usage.total_tokens,
                "model usage"
            );
        }
    }
}

impl ChatBackend for LlmClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn chat(&self, messages: Vec<Message>, tools: Option<Vec<Value>>) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));

        let request = ChatRequest {
            model: self.config.model.clone(),
            messages,
            tools,
            tool_choice: None,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        debug!(url = %url, message_count = request.messages.len(), model = %request.model, "model request");
        trace!(request_body = %serde_json::to_string(&request).unwrap_or_default(), "model request body");

        let mut req_builder = self.http.post(&url).json(&request);
        if let Some(api_key) = &self.config.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder.send().await.context("failed to send request to model")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("model request failed ({}): {}", status, error_text);
        }

        let response_text = response.text().await.context("failed to read model response body")?;
        trace!(response_body = %response_text, "model response body");

        let chat_response: ChatResponse =
            serde_json::from_str(&response_text).context("failed to parse model response")?;

        self.log_usage(&chat_response);

        if let Some(choice) = chat_response.choices.first() {
            debug!(content = %choice.message.content_text(), finish_reason = ?choice.finish_reason, "model response content");
        }

        Ok(chat_response)
    }
}

/// Strip a single fenced code block (```` ```json ... ``` ````, or a plain
/// ```` ``` ````) around a JSON payload. Tolerates unfenced input.
pub fn extract_json(text: &str) -> &str {
    let trimmed = text.trim();
    let without_lang = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```JSON"))
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_lang.strip_suffix("```").unwrap_or(without_lang).trim()
}

/// The `<answer>` marker the action-mode prompt asks the model to emit
/// before its chosen action, separating "thinking" from the final call.
const ANSWER_MARKER: &str = "<answer>";

/// Split raw model output into the thinking preamble (if any) and the
/// answer segment that follows the `<answer>` marker. Absent the marker,
/// the whole content is treated as the answer.
pub fn split_thinking_and_answer(raw: &str) -> (Option<String>, String) {
    match raw.find(ANSWER_MARKER) {
        Some(idx) => {
            let thinking = raw[..idx].trim();
            let answer = raw[idx + ANSWER_MARKER.len()..]
                .trim()
                .trim_end_matches("</answer>")
                .trim();
            (if thinking.is_empty() { None } else { Some(thinking.to_string()) }, answer.to_string())
        }
        None => (None, raw.trim().to_string()),
    }
}

/// A parsed `do(action=...)` / `finish(message=...)` call, still in its raw
/// call-string form — tokenizing the parameter list is `ActionHandler`'s job
/// (§4.4), not the model client's.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionCall {
    pub description: String,
    pub call: String,
}

const DO_MARKER: &str = "do(action=";
const FINISH_MARKER: &str = "finish(message=";

/// Split an answer segment into its leading natural-language description
/// and the `do(...)`/`finish(...)` call that follows it (§4.10).
pub fn parse_action_call(answer: &str) -> Option<ActionCall> {
    let do_idx = answer.find(DO_MARKER);
    let finish_idx = answer.find(FINISH_MARKER);

    let marker_idx = match (do_idx, finish_idx) {
        (Some(d), Some(f)) => d.min(f),
        (Some(d), None) => d,
        (None, Some(f)) => f,
        (None, None) => return None,
    };

    let description = answer[..marker_idx].trim().trim_end_matches(':').trim().to_string();
    let call = answer[marker_idx..].trim().to_string();
    Some(ActionCall { description, call })
}

/// The outcome of an action-mode model request (§4.10 ModelResponse), with
/// basic latency telemetry.
#[derive(Debug, Clone)]
pub struct ActionResponse {
    pub thinking: Option<String>,
    pub action: Option<ActionCall>,
    pub raw_content: String,
    pub total_time_ms: u64,
}

/// Thin orchestration layer over a `ChatBackend`: mode-specific parsing for
/// the agent's perception/planning call (`action`) and its reflection call
/// (`reflect`). The streaming token-by-token marker detection in the
/// original implementation collapses here to a single request followed by
/// string parsing — the same simplification the whole-response `ChatBackend`
/// trait already makes.
pub struct ModelClient<C: ChatBackend> {
    backend: C,
}

impl<C: ChatBackend> ModelClient<C> {
    pub fn new(backend: C) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub async fn request_action(&self, messages: Vec<Message>) -> Result<ActionResponse> {
        let start = Instant::now();
        let response = self.backend.chat(messages, None).await?;
        let total_time_ms = start.elapsed().as_millis() as u64;

        let raw_content = response.first_message().map(|m| m.content_text()).unwrap_or_default();
        let (thinking, answer) = split_thinking_and_answer(&raw_content);
        let action = parse_action_call(&answer);

        Ok(ActionResponse { thinking, action, raw_content, total_time_ms })
    }

    /// Returns the fence-stripped JSON text of a reflection response. The
    /// caller (`ReflectionEngine`, in the engine crate) owns the field
    /// mapping into `ReflectionRecord`.
    pub async fn request_reflection(&self, messages: Vec<Message>) -> Result<String> {
        let response = self.backend.chat(messages, None).await?;
        let raw_content = response.first_message().map(|m| m.content_text()).unwrap_or_default();
        Ok(extract_json(&raw_content).to_string())
    }
}

/// System prompt for the action-mode model call (§4.3, §4.10): expects a
/// `<answer>`-delimited `do(action=...)`/`finish(message=...)` call.
pub fn action_system_prompt() -> String {
    r#"You are controlling a mobile device to complete a task.

You will be shown the current task, a history of prior steps, and the
current screen's elements. Think step by step about what to do next, then
emit exactly one action.

Wrap your reasoning, then emit your decision after an `<answer>` marker, as
one of:
  do(action="tap", element="<elem_id>")
  do(action="long_press", element="<elem_id>")
  do(action="swipe", direction="up|down|left|right", distance="short|medium|long")
  do(action="type", element="<elem_id>", text="...")
  do(action="launch", app="...")
  do(action="back")
  do(action="home")
  finish(message="...")

Only reference elements that appear in the current screen's elements list.
Use \n for literal newlines inside a text argument; never emit a raw
line break inside an argument value."#
        .to_string()
}

/// System prompt for action-mode calls where a `SpeculativeExecutor` match
/// was found (§4.10): the same action vocabulary as `action_system_prompt`,
/// biased toward the predicted next step rather than re-deriving it from
/// scratch.
pub fn predict_system_prompt() -> String {
    r#"You are controlling a mobile device to complete a task.

A speculative-execution hint below, built from a similar prior run, names
the action most likely to come next. Treat it as a strong suggestion, not
a certainty: verify it against the actual current screen's elements before
committing, and choose something else if the hint doesn't match what you
see.

Wrap your reasoning, then emit your decision after an `<answer>` marker, as
one of:
  do(action="tap", element="<elem_id>")
  do(action="long_press", element="<elem_id>")
  do(action="swipe", direction="up|down|left|right", distance="short|medium|long")
  do(action="type", element="<elem_id>", text="...")
  do(action="launch", app="...")
  do(action="back")
  do(action="home")
  finish(message="...")

Only reference elements that appear in the current screen's elements list.
Use \n for literal newlines inside a text argument; never emit a raw
line break inside an argument value."#
        .to_string()
}

/// System prompt for the reflect-mode model call (§4.9): expects a single
/// strict JSON object judging the last action's outcome.
pub fn reflect_system_prompt() -> String {
    r#"You are judging whether the last UI action succeeded, given a
before/after screenshot pair and a description of what was attempted.

Respond with ONLY a JSON object:
{
  "execution_result": "success" | "partial_success" | "failure",
  "ui_changes": "what visibly changed between the two screenshots",
  "goal_achievement": "whether this moves the task toward completion",
  "abnormal_states": "any error dialogs, crashes, or unexpected states, or null",
  "reasoning": "brief justification",
  "improvement_suggestions": "what to try differently next time, or null",
  "confidence": 0.0-1.0
}"#
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct MockBackend {
        response_text: String,
        calls: Mutex<Vec<Vec<Message>>>,
    }

    impl MockBackend {
        fn new(response_text: &str) -> Self {
            Self { response_text: response_text.to_string(), calls: Mutex::new(Vec::new()) }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ChatBackend for MockBackend {
        fn model_name(&self) -> &str {
            "mock-model"
        }

        async fn chat(&self, messages: Vec<Message>, _tools: Option<Vec<Value>>) -> Result<ChatResponse> {
            self.calls.lock().unwrap().push(messages);
            Ok(ChatResponse {
                id: "mock".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(&self.response_text),
                    finish_reason: Some("stop".to_string()),
                }],
                usage: None,
            })
        }
    }

    #[test]
    fn extract_json_strips_fenced_block() {
        let raw = "```json\n{\"a\": 1}\n```";
        assert_eq!(extract_json(raw), "{\"a\": 1}");
    }

    #[test]
    fn extract_json_passes_through_unfenced_input() {
        assert_eq!(extract_json("{\"a\": 1}"), "{\"a\": 1}");
    }

    #[test]
    fn split_thinking_and_answer_separates_on_marker() {
        let raw = "I should tap the button.\n<answer>do(action=\"tap\", element=\"btn\")";
        let (thinking, answer) = split_thinking_and_answer(raw);
        assert_eq!(thinking.as_deref(), Some("I should tap the button."));
        assert_eq!(answer, "do(action=\"tap\", element=\"btn\")");
    }

    #[test]
    fn split_thinking_and_answer_without_marker_has_no_thinking() {
        let (thinking, answer) = split_thinking_and_answer("finish(message=\"done\")");
        assert!(thinking.is_none());
        assert_eq!(answer, "finish(message=\"done\")");
    }

    #[test]
    fn parse_action_call_splits_description_from_do_call() {
        let call = parse_action_call("Tapping the submit button: do(action=\"tap\", element=\"btn\")").unwrap();
        assert_eq!(call.description, "Tapping the submit button");
        assert_eq!(call.call, "do(action=\"tap\", element=\"btn\")");
    }

    #[test]
    fn parse_action_call_recognizes_finish() {
        let call = parse_action_call("Task complete: finish(message=\"done\")").unwrap();
        assert_eq!(call.call, "finish(message=\"done\")");
    }

    #[test]
    fn parse_action_call_returns_none_without_a_recognized_marker() {
        assert!(parse_action_call("I don't know what to do").is_none());
    }

    #[tokio::test]
    async fn model_client_request_action_parses_mock_response() {
        let mock = MockBackend::new("Thinking about it.\n<answer>do(action=\"tap\", element=\"btn\")");
        let client = ModelClient::new(mock);
        let response = client.request_action(vec![Message::user("go")]).await.unwrap();
        assert_eq!(response.thinking.as_deref(), Some("Thinking about it."));
        assert_eq!(response.action.unwrap().call, "do(action=\"tap\", element=\"btn\")");
        assert_eq!(client.backend().call_count(), 1);
    }

    #[tokio::test]
    async fn model_client_request_reflection_strips_fences() {
        let mock = MockBackend::new("```json\n{\"execution_result\": \"success\"}\n```");
        let client = ModelClient::new(mock);
        let raw = client.request_reflection(vec![Message::user("judge")]).await.unwrap();
        assert_eq!(raw, "{\"execution_result\": \"success\"}");
    }
}
