//! Wire types for the `ChatBackend` capability (§4.10 ModelClient): an
//! OpenAI-chat-compatible request/response shape, plus the image-capable
//! `Message`/`Content` model the VLM reflection and perception prompts need.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single part of a multi-part message content list, in OpenAI's
/// chat-completions vision shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// `image_base64` is raw base64 (no data-URL prefix); this wraps it in
    /// the `data:image/png;base64,...` form providers expect.
    pub fn image_png_base64(image_base64: impl Into<String>) -> Self {
        Self::ImageUrl { image_url: ImageUrl { url: format!("data:image/png;base64,{}", image_base64.into()) } }
    }
}

/// A message's content: plain text, or an ordered list of parts (used
/// whenever an image accompanies text, e.g. a screenshot in the
/// perception step). Untagged so plain strings round-trip exactly like
/// providers emit them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Content {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl Content {
    /// Concatenates all text parts (or returns the plain string), dropping
    /// image parts. Used for logging and for building follow-up prompts
    /// that strip images (§4.3's history-without-images convention).
    pub fn text(&self) -> String {
        match self {
            Content::Text(s) => s.clone(),
            Content::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, content: Some(Content::Text(text.into())), tool_calls: None, tool_call_id: None, name: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, content: Some(Content::Text(text.into())), tool_calls: None, tool_call_id: None, name: None }
    }

    /// Image-then-text ordering, matching the convention the VLM prompts
    /// rely on when a screenshot accompanies an instruction.
    pub fn user_with_image(text: impl Into<String>, image_base64: impl Into<String>) -> Self {
        let parts = vec![ContentPart::image_png_base64(image_base64), ContentPart::text(text)];
        Self { role: Role::User, content: Some(Content::Parts(parts)), tool_calls: None, tool_call_id: None, name: None }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: Some(Content::Text(text.into())), tool_calls: None, tool_call_id: None, name: None }
    }

    pub fn assistant_tool_calls(tool_calls: Vec<ToolCall>) -> Self {
        Self { role: Role::Assistant, content: None, tool_calls: Some(tool_calls), tool_call_id: None, name: None }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(Content::Text(content.into())),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
            name: None,
        }
    }

    /// Drop any image parts, keeping only text. Used when a historical
    /// step is folded into context without re-sending its screenshot.
    pub fn without_images(&self) -> Self {
        let mut clone = self.clone();
        if let Some(content) = &self.content {
            clone.content = Some(Content::Text(content.text()));
        }
        clone
    }

    pub fn content_text(&self) -> String {
        self.content.as_ref().map(|c| c.text()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<serde_json::Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<serde_json::Value>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub choices: Vec<Choice>,
    pub usage: Option<Usage>,
}

impl ChatResponse {
    pub fn first_message(&self) -> Option<&Message> {
        self.choices.first().map(|c| &c.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_with_image_orders_image_before_text() {
        let msg = Message::user_with_image("what do you see?", "AAAA");
        match msg.content.unwrap() {
            Content::Parts(parts) => {
                assert!(matches!(parts[0], ContentPart::ImageUrl { .. }));
                assert!(matches!(parts[1], ContentPart::Text { .. }));
            }
            _ => panic!("expected multi-part content"),
        }
    }

    #[test]
    fn without_images_keeps_only_text() {
        let msg = Message::user_with_image("describe the screen", "AAAA");
        let stripped = msg.without_images();
        assert_eq!(stripped.content_text(), "describe the screen");
    }

    #[test]
    fn plain_text_round_trips_through_serde_untagged() {
        let msg = Message::user("hello");
        let json = serde_json::to_string(&msg).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();
        assert_eq!(back.content_text(), "hello");
    }
}
