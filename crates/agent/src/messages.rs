//! Message assembly — history, system instruction and user instruction.

use flowlm_core::memory::ChatMemory;
use flowlm_core::message::Message;
use serde_json::Value;
use tracing::warn;

pub const DEFAULT_SYSTEM_MESSAGE: &str = "You are a helpful assistant.";

/// Where the user instruction comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptMode {
    /// Literal `text` and `systemMessage` parameters
    #[default]
    Define,
    /// Fields of the incoming item
    Auto,
}

impl PromptMode {
    /// `"auto"` selects [`PromptMode::Auto`]; anything else is `Define`.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("auto") { Self::Auto } else { Self::Define }
    }
}

/// The instructions for one agent turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }

    /// The prompt for "auto" mode: the user text is the item's `chatInput`,
    /// `text` or `input` field (first non-empty wins), else the whole item as
    /// JSON; the system text is the item's `systemMessage`, else `default_system`.
    pub fn from_item(item: &Value, default_system: &str) -> Self {
        let user = ["chatInput", "text", "input"]
            .iter()
            .find_map(|key| item.get(*key).and_then(present))
            .unwrap_or_else(|| item.to_string());

        let system = item
            .get("systemMessage")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(default_system)
            .to_string();

        Self { system, user }
    }
}

fn present(value: &Value) -> Option<String> {
    match value {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) if n.as_f64() == Some(0.0) => None,
        other => Some(other.to_string()),
    }
}

/// History, then the system instruction (when non-empty), then the user
/// instruction. A memory that fails to load contributes no history.
pub async fn assemble_messages(memory: Option<&dyn ChatMemory>, prompt: &Prompt) -> Vec<Message> {
    let mut messages = match memory {
        Some(memory) => memory.load_history().await.unwrap_or_else(|e| {
            warn!(
                memory = memory.name(),
                error = %e,
                "Failed to load chat history, continuing without it"
            );
            Vec::new()
        }),
        None => Vec::new(),
    };

    if !prompt.system.is_empty() {
        messages.push(Message::system(&prompt.system));
    }
    messages.push(Message::user(&prompt.user));
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{BrokenMemory, roles};
    use flowlm_core::message::Role;
    use flowlm_memory::BufferWindowMemory;
    use serde_json::json;

    #[test]
    fn auto_mode_field_precedence() {
        let item = json!({"chatInput": "2+2?", "text": "ignored", "input": "ignored"});
        assert_eq!(Prompt::from_item(&item, DEFAULT_SYSTEM_MESSAGE).user, "2+2?");

        let item = json!({"chatInput": "", "text": "from text"});
        assert_eq!(Prompt::from_item(&item, DEFAULT_SYSTEM_MESSAGE).user, "from text");

        let item = json!({"input": "from input"});
        assert_eq!(Prompt::from_item(&item, DEFAULT_SYSTEM_MESSAGE).user, "from input");

        let item = json!({"question": "what?"});
        assert_eq!(
            Prompt::from_item(&item, DEFAULT_SYSTEM_MESSAGE).user,
            r#"{"question":"what?"}"#
        );
    }

    #[test]
    fn auto_mode_system_message() {
        let prompt = Prompt::from_item(&json!({"chatInput": "hi"}), DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(prompt.system, DEFAULT_SYSTEM_MESSAGE);

        let item = json!({"chatInput": "hi", "systemMessage": "Be terse"});
        let prompt = Prompt::from_item(&item, DEFAULT_SYSTEM_MESSAGE);
        assert_eq!(prompt.system, "Be terse");
    }

    #[test]
    fn prompt_mode_parsing() {
        assert_eq!(PromptMode::parse("auto"), PromptMode::Auto);
        assert_eq!(PromptMode::parse("define"), PromptMode::Define);
        assert_eq!(PromptMode::parse(""), PromptMode::Define);
    }

    #[tokio::test]
    async fn empty_system_message_is_omitted() {
        let messages = assemble_messages(None, &Prompt::new("", "hello")).await;
        assert_eq!(roles(&messages), vec![Role::User]);
    }

    #[tokio::test]
    async fn history_comes_first() {
        let memory = BufferWindowMemory::new("s", 5);
        memory.save_context("earlier", "reply").await.unwrap();

        let messages = assemble_messages(Some(&memory), &Prompt::new("sys", "now")).await;
        assert_eq!(
            roles(&messages),
            vec![Role::User, Role::Assistant, Role::System, Role::User]
        );
        assert_eq!(messages[3].content, "now");
    }

    #[tokio::test]
    async fn failing_memory_yields_no_history() {
        let messages = assemble_messages(Some(&BrokenMemory), &Prompt::new("sys", "now")).await;
        assert_eq!(roles(&messages), vec![Role::System, Role::User]);
    }
}
