pub mod client;
pub mod error;
pub mod literal;
pub mod planner;
pub mod types;

pub use client::{
    action_system_prompt, extract_json, parse_action_call, predict_system_prompt,
    reflect_system_prompt, split_thinking_and_answer, ActionCall, ActionResponse, ChatBackend,
    LlmClient, LlmConfig, ModelClient,
};
pub use error::ModelError;
pub use literal::{parse_call, parse_call_json_first, Literal};
pub use planner::{
    decompose, normalize_task, PlanDecision, Planner, PlannerBackend, RouterCache, Skill,
    SkillParam, SubTask, TaskPlan,
};
pub use types::{
    ChatRequest, ChatResponse, Choice, Content, ContentPart, FunctionCall, ImageUrl, Message,
    Role, ToolCall, Usage,
};
