//! The bounded tool-calling loop shared by every agent node.
//!
//! Each iteration invokes the model with the conversation so far. When the
//! reply requests tools, each call is dispatched in order, its observation is
//! appended as a tool message, and the loop goes round again. The loop stops
//! when the model answers without tool calls or `max_iterations` is reached;
//! either way the last message in the conversation is the final response.

use flowlm_core::error::{ProviderError, ToolError};
use flowlm_core::message::{Message, MessageToolCall};
use flowlm_core::tool::{ToolCall, ToolRegistry};
use flowlm_core::usage::{Usage, usage_of};
use flowlm_core::{ChatModel, SpanContext, SpanGuard, SpanStatus, Tracer};
use flowlm_observability::phoenix::truncate_output;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// The tool the model chose and the arguments it sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentAction {
    pub tool: String,
    pub tool_input: Value,
}

/// One `(action, observation)` pair, in execution order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntermediateStep {
    pub action: AgentAction,
    pub observation: String,
}

/// Everything a finished loop produced.
#[derive(Debug, Clone)]
pub struct LoopOutcome {
    /// The last message of the conversation
    pub response: Message,
    /// The whole conversation, including the assembled input
    pub messages: Vec<Message>,
    pub steps: Vec<IntermediateStep>,
    /// Summed over every model invocation
    pub usage: Usage,
    pub iterations: usize,
}

/// Runs a conversation against a model and a tool registry.
pub struct ToolLoop<'a> {
    model: &'a ChatModel,
    tools: &'a ToolRegistry,
    max_iterations: usize,
    tracer: Option<(&'a dyn Tracer, SpanContext)>,
}

impl<'a> ToolLoop<'a> {
    pub fn new(model: &'a ChatModel, tools: &'a ToolRegistry) -> Self {
        Self {
            model,
            tools,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tracer: None,
        }
    }

    /// Values below 1 are raised to 1.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations.max(1);
        self
    }

    /// Open an `iteration_<n>` span per model call and a `tool_<name>` span
    /// per dispatched call, all beneath `parent`.
    pub fn with_tracer(mut self, tracer: &'a dyn Tracer, parent: SpanContext) -> Self {
        self.tracer = Some((tracer, parent));
        self
    }

    pub async fn run(&self, mut messages: Vec<Message>) -> Result<LoopOutcome, ProviderError> {
        let mut usage = Usage::default();

        if self.tools.is_empty() {
            let response = self.model.invoke(&messages).await?;
            if let Some(u) = usage_of(&response) {
                usage += u;
            }
            messages.push(response.message.clone());
            return Ok(LoopOutcome {
                response: response.message,
                messages,
                steps: Vec::new(),
                usage,
                iterations: 1,
            });
        }

        let model = self.model.bind_tools(self.tools.definitions());
        let mut steps = Vec::new();
        let mut iterations = 0;
        let mut answered = false;

        while iterations < self.max_iterations {
            iterations += 1;
            let mut span = self.start_span(&format!("iteration_{iterations}"));
            if let Some(span) = span.as_mut() {
                span.set("iteration", iterations as u64);
            }

            let response = match model.invoke(&messages).await {
                Ok(response) => response,
                Err(e) => {
                    if let Some(span) = span {
                        span.end(SpanStatus::Error(e.to_string()));
                    }
                    return Err(e);
                }
            };
            if let Some(u) = usage_of(&response) {
                usage += u;
            }

            let calls = response.message.tool_calls.clone();
            messages.push(response.message);
            debug!(iteration = iterations, tool_calls = calls.len(), "Model responded");

            if calls.is_empty() {
                if let Some(span) = span {
                    span.end(SpanStatus::Ok);
                }
                answered = true;
                break;
            }

            let parent = span.as_ref().map(|s| s.context().clone());
            for call in &calls {
                let (step, reply_id) = self.dispatch(call, parent.as_ref()).await;
                messages.push(Message::tool_result(reply_id, step.observation.clone()));
                steps.push(step);
            }

            if let Some(span) = span {
                span.end(SpanStatus::Ok);
            }
        }

        if !answered {
            info!(max_iterations = self.max_iterations, "Agent loop stopped at the iteration cap");
        }

        let response = messages
            .last()
            .cloned()
            .unwrap_or_else(|| Message::assistant(""));
        Ok(LoopOutcome {
            response,
            messages,
            steps,
            usage,
            iterations,
        })
    }

    fn start_span(&self, name: &str) -> Option<SpanGuard> {
        self.tracer
            .as_ref()
            .map(|(tracer, parent)| SpanGuard::start(*tracer, name, Some(parent)))
    }

    /// Run one requested call. The observation is the tool's output, or
    /// `Error: <message>` when the call failed, or a not-found notice.
    async fn dispatch(
        &self,
        call: &MessageToolCall,
        parent: Option<&SpanContext>) -> (IntermediateStep, String,
    ) {
        let reply_id = call.reply_id().to_string();
        let parsed = call.parsed_arguments();
        let tool_input = match &parsed {
            Ok(args) => args.clone(),
            Err(_) => Value::String(call.arguments.clone()),
        };

        let mut span = match (&self.tracer, parent) {
            (Some((tracer, _)), Some(parent)) => {
                Some(SpanGuard::start(*tracer, &format!("tool_{}", call.name), Some(parent)))
            }
            _ => None,
        };
        if let Some(span) = span.as_mut() {
            span.set("tool.name", call.name.as_str());
            span.set("tool.input", tool_input.to_string());
        }

        let result = if self.tools.get(&call.name).is_none() {
            Err(ToolError::NotFound(call.name.clone()))
        } else {
            match parsed {
                Ok(arguments) => {
                    let tool_call = ToolCall {
                        id: reply_id.clone(),
                        name: call.name.clone(),
                        arguments,
                    };
                    self.tools.execute(&tool_call).await.map(|r| r.output)
                }
                Err(e) => Err(ToolError::InvalidArguments(e.to_string())),
            }
        };

        let observation = match result {
            Ok(output) => {
                debug!(tool = %call.name, "Tool call succeeded");
                if let Some(mut span) = span {
                    span.set("tool.output", truncate_output(&output));
                    span.end(SpanStatus::Ok);
                }
                output
            }
            Err(ToolError::NotFound(name)) => {
                warn!(tool = %name, "Model requested an unknown tool");
                let observation = format!("Tool \"{name}\" not found");
                if let Some(span) = span {
                    span.end(SpanStatus::Error(observation.clone()));
                }
                observation
            }
            Err(e) => {
                let message = tool_error_message(&e);
                warn!(tool = %call.name, error = %message, "Tool call failed");
                if let Some(span) = span {
                    span.end(SpanStatus::Error(message.clone()));
                }
                format!("Error: {message}")
            }
        };

        let step = IntermediateStep {
            action: AgentAction {
                tool: call.name.clone(),
                tool_input,
            },
            observation,
        };
        (step, reply_id)
    }
}

fn tool_error_message(error: &ToolError) -> String {
    match error {
        ToolError::ExecutionFailed { reason, .. } => reason.clone(),
        ToolError::InvalidArguments(message) => message.clone(),
        ToolError::NotFound(name) => format!("Tool \"{name}\" not found"),
    }
}
