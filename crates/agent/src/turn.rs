//! One agent turn: assemble, loop, parse, remember, flush.

use std::sync::Arc;

use flowlm_core::error::ProviderError;
use flowlm_core::{ChatMemory, ChatModel, OutputParser, SpanGuard, SpanStatus, ToolRegistry, Tracer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::messages::{Prompt, assemble_messages};
use crate::result::{TurnResult, parse_output, save_exchange};
use crate::tool_loop::{DEFAULT_MAX_ITERATIONS, ToolLoop};

/// Name of the root span opened around a traced turn.
pub const ROOT_SPAN_NAME: &str = "llm_call";

/// An agent bound to its model and optional collaborators.
///
/// ```ignore
/// let result = AgentTurn::new(model)
///     .with_tools(registry)
///     .with_memory(memory)
///     .run(&Prompt::new("You are a helpful assistant.", "2+2?"))
///     .await?;
/// ```
pub struct AgentTurn {
    model: ChatModel,
    tools: ToolRegistry,
    memory: Option<Arc<dyn ChatMemory>>,
    parser: Option<Arc<dyn OutputParser>>,
    tracer: Option<Arc<dyn Tracer>>,
    root_attributes: Vec<(String, Value)>,
    max_iterations: usize,
}

impl AgentTurn {
    pub fn new(model: ChatModel) -> Self {
        Self {
            model,
            tools: ToolRegistry::new(),
            memory: None,
            parser: None,
            tracer: None,
            root_attributes: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_tools(mut self, tools: ToolRegistry) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn ChatMemory>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_output_parser(mut self, parser: Arc<dyn OutputParser>) -> Self {
        self.parser = Some(parser);
        self
    }

    /// Trace the turn under an `llm_call` root span carrying `attributes`.
    pub fn with_tracer(
        mut self,
        tracer: Arc<dyn Tracer>,
        attributes: Vec<(String, Value)>,
    ) -> Self {
        self.tracer = Some(tracer);
        self.root_attributes = attributes;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn model(&self) -> &ChatModel {
        &self.model
    }

    /// Run the turn. Every span opened is closed and the tracer and model
    /// callbacks are flushed once, whether or not the model call succeeded.
    pub async fn run(&self, prompt: &Prompt) -> Result<TurnResult, ProviderError> {
        let messages = assemble_messages(self.memory.as_deref(), prompt).await;
        debug!(
            provider = %self.model.provider_name(),
            messages = messages.len(),
            tools = self.tools.len(),
            "Starting agent turn"
        );

        let mut root = self
            .tracer
            .as_deref()
            .map(|tracer| SpanGuard::start(tracer, ROOT_SPAN_NAME, None));
        if let Some(root) = root.as_mut() {
            for (key, value) in &self.root_attributes {
                root.set(key, value.clone());
            }
        }

        let mut tool_loop =
            ToolLoop::new(&self.model, &self.tools).with_max_iterations(self.max_iterations);
        if let (Some(tracer), Some(root)) = (self.tracer.as_deref(), root.as_ref()) {
            tool_loop = tool_loop.with_tracer(tracer, root.context().clone());
        }

        let outcome = match tool_loop.run(messages).await {
            Ok(outcome) => {
                if let Some(root) = root {
                    root.end(SpanStatus::Ok);
                }
                outcome
            }
            Err(e) => {
                if let Some(root) = root {
                    root.end(SpanStatus::Error(e.to_string()));
                }
                self.flush().await;
                return Err(e);
            }
        };

        let output = parse_output(self.parser.as_deref(), outcome.response.content).await;
        let result = TurnResult {
            output,
            steps: outcome.steps,
            usage: outcome.usage,
            iterations: outcome.iterations,
        };
        save_exchange(self.memory.as_deref(), &prompt.user, &result.output_text()).await;

        self.flush().await;
        Ok(result)
    }

    async fn flush(&self) {
        if let Some(tracer) = &self.tracer {
            if let Err(e) = tracer.flush().await {
                warn!(error = %e, "Trace export failed");
            }
        }
        self.model.flush_callbacks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;
    use flowlm_core::message::Role;
    use flowlm_memory::BufferWindowMemory;
    use flowlm_tools::JsonOutputParser;
    use serde_json::json;

    #[tokio::test]
    async fn plain_turn_returns_model_text() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("4")]));
        let result = AgentTurn::new(model(&provider))
            .run(&Prompt::new("You are a helpful assistant.", "2+2?"))
            .await
            .unwrap();

        assert_eq!(result.output, json!("4"));
        assert_eq!(result.iterations, 1);
        let sent = &provider.requests()[0].messages;
        assert_eq!(roles(sent), vec![Role::System, Role::User]);
        assert_eq!(sent[1].content, "2+2?");
    }

    #[tokio::test]
    async fn memory_carries_history_between_turns() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_text_response("Hi Ada"),
            make_text_response("Your name is Ada"),
        ]));
        let memory: Arc<dyn ChatMemory> = Arc::new(BufferWindowMemory::new("session-1", 5));
        let agent = AgentTurn::new(model(&provider)).with_memory(memory.clone());

        agent.run(&Prompt::new("", "I am Ada")).await.unwrap();
        agent.run(&Prompt::new("", "Who am I?")).await.unwrap();

        let second = &provider.requests()[1].messages;
        assert_eq!(
            roles(second),
            vec![Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(second[0].content, "I am Ada");
        assert_eq!(second[1].content, "Hi Ada");
        assert_eq!(memory.load_history().await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn broken_memory_does_not_fail_the_turn() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response("fine")]));
        let result = AgentTurn::new(model(&provider))
            .with_memory(Arc::new(BrokenMemory))
            .run(&Prompt::new("sys", "hello"))
            .await
            .unwrap();
        assert_eq!(result.output, json!("fine"));
    }

    #[tokio::test]
    async fn parser_output_is_structured_and_saved_as_json() {
        let provider = Arc::new(SequentialMockProvider::new(vec![make_text_response(
            "```json\n{\"answer\": 4}\n```",
        )]));
        let memory: Arc<dyn ChatMemory> = Arc::new(BufferWindowMemory::new("s", 5));
        let result = AgentTurn::new(model(&provider))
            .with_memory(memory.clone())
            .with_output_parser(Arc::new(JsonOutputParser))
            .run(&Prompt::new("", "2+2 as json"))
            .await
            .unwrap();

        assert_eq!(result.output, json!({"answer": 4}));
        let history = memory.load_history().await.unwrap();
        assert_eq!(history[1].content, r#"{"answer":4}"#);
    }

    #[tokio::test]
    async fn traced_turn_closes_every_span_and_flushes_once() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("add", json!({"a": 2, "b": 2}))], ""),
            make_text_response("4"),
        ]));
        let tracer = Arc::new(CountingTracer::default());
        let result = AgentTurn::new(model(&provider))
            .with_tools(ToolRegistry::from_tools([add_tool()]))
            .with_tracer(
                tracer.clone(),
                vec![
                    ("llm.model".into(), json!("mock-model")),
                    ("session.id".into(), json!("s-9")),
                ],
            )
            .run(&Prompt::new("", "2+2?"))
            .await
            .unwrap();

        assert_eq!(result.output, json!("4"));
        assert_eq!(result.steps.len(), 1);
        assert_eq!(tracer.started(), tracer.ended().len());
        assert_eq!(tracer.flushes(), 1);

        let root = tracer.span(ROOT_SPAN_NAME);
        assert_eq!(root.parent, None);
        assert_eq!(root.status, SpanStatus::Ok);
        assert_eq!(root.attribute("session.id"), Some(&json!("s-9")));
        assert_eq!(tracer.span("iteration_1").parent.as_deref(), Some(ROOT_SPAN_NAME));
        assert_eq!(tracer.span("tool_add").parent.as_deref(), Some("iteration_1"));
    }

    #[tokio::test]
    async fn failed_turn_marks_root_error_and_still_flushes() {
        let provider = Arc::new(SequentialMockProvider::scripted(vec![Err(
            ProviderError::AuthenticationFailed("bad key".into()),
        )]));
        let tracer = Arc::new(CountingTracer::default());
        let err = AgentTurn::new(model(&provider))
            .with_tools(ToolRegistry::from_tools([echo_tool()]))
            .with_tracer(tracer.clone(), Vec::new())
            .run(&Prompt::new("", "hello"))
            .await
            .unwrap_err();

        assert!(matches!(err, ProviderError::AuthenticationFailed(_)));
        assert_eq!(tracer.started(), tracer.ended().len());
        assert_eq!(tracer.flushes(), 1);
        assert!(matches!(tracer.span(ROOT_SPAN_NAME).status, SpanStatus::Error(_)));
        assert!(matches!(tracer.span("iteration_1").status, SpanStatus::Error(_)));
    }

    #[tokio::test]
    async fn token_usage_is_summed_across_iterations() {
        let provider = Arc::new(SequentialMockProvider::new(vec![
            make_tool_call_response(vec![make_tool_call("echo", json!({"input": "a"}))], ""),
            make_text_response("done"),
        ]));
        let result = AgentTurn::new(model(&provider))
            .with_tools(ToolRegistry::from_tools([echo_tool()]))
            .run(&Prompt::new("", "go"))
            .await
            .unwrap();
        assert_eq!(result.usage.total_tokens, 30);
    }
}
