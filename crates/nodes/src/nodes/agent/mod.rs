//! Agent root nodes.
//!
//! All three agents run the same [`AgentTurn`] per input item. They differ
//! in how the model is obtained and which observability vendor sees the
//! calls:
//!
//! - [`LlmObsAgentNode`]: a connected model, optionally wrapped with Langfuse
//! - [`HeliconeAgentNode`]: a model built in-node and routed through the Helicone proxy
//! - [`PhoenixAgentNode`]: a model built in-node with a span tracer exporting to Phoenix

mod helicone;
mod llm_obs;
mod phoenix;

pub use helicone::HeliconeAgentNode;
pub use llm_obs::LlmObsAgentNode;
pub use phoenix::PhoenixAgentNode;

use async_trait::async_trait;
use flowlm_agent::{AgentTurn, Prompt, PromptMode};
use flowlm_config::AgentDefaults;
use flowlm_providers::ModelOptions;
use serde_json::Value;
use tracing::{info, warn};

use crate::connections;
use crate::description::{NodeParameter, Port};
use crate::error::NodeError;
use crate::host::{ConnectionType, NodeContext, NodeItem, Params};

/// One item's worth of agent work.
#[async_trait]
pub(crate) trait ItemRunner: Send + Sync {
    fn node_name(&self) -> &'static str;

    async fn run_item(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
        input: &Value,
    ) -> Result<Value, NodeError>;
}

/// Run every input item in order. A failed item becomes an `{"error": ...}`
/// record under continue-on-fail and stops the execution otherwise.
pub(crate) async fn execute_items(
    runner: &dyn ItemRunner,
    ctx: &dyn NodeContext,
) -> Result<Vec<NodeItem>, NodeError> {
    let items = ctx.input_items();
    let mut results = Vec::with_capacity(items.len());

    for (index, input) in items.iter().enumerate() {
        match runner.run_item(ctx, index, input).await {
            Ok(json) => results.push(NodeItem::new(json, index)),
            Err(e) if ctx.continue_on_fail() => {
                warn!(
                    node = runner.node_name(),
                    item = index,
                    error = %e,
                    "Item failed, continuing"
                );
                results.push(NodeItem::error(&e, index));
            }
            Err(e) => return Err(e),
        }
    }

    info!(node = runner.node_name(), items = results.len(), "Agent execution finished");
    Ok(results)
}

/// The prompt for one item.
///
/// In define mode a missing `text` falls back to the item's `chatInput`, and
/// a missing `systemMessage` to the configured default. An explicitly empty
/// system message sends none.
pub fn read_prompt(params: &Params<'_>, input: &Value, defaults: &AgentDefaults) -> Prompt {
    match PromptMode::parse(&params.string("promptType", "define")) {
        PromptMode::Auto => Prompt::from_item(input, &defaults.system_message),
        PromptMode::Define => {
            let system = match params.value("systemMessage") {
                Some(Value::String(s)) => s,
                Some(other) => other.to_string(),
                None => defaults.system_message.clone(),
            };
            let user = params
                .opt_string("text")
                .or_else(|| input.get("chatInput").and_then(Value::as_str).map(str::to_string))
                .unwrap_or_default();
            Prompt::new(system, user)
        }
    }
}

/// `maxIterations` and `returnIntermediateSteps` from a collection parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopOptions {
    pub max_iterations: usize,
    pub return_intermediate_steps: bool,
}

impl LoopOptions {
    /// A zero or missing `maxIterations` means the configured default.
    pub fn read(params: &Params<'_>, collection: &str, defaults: &AgentDefaults) -> Self {
        let options = params.collection(collection);
        Self {
            max_iterations: options
                .get("maxIterations")
                .and_then(Value::as_u64)
                .filter(|n| *n > 0)
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(defaults.max_iterations),
            return_intermediate_steps: options
                .get("returnIntermediateSteps")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

/// The `modelOptions` collection of agents that build their own model:
/// temperature defaults to 0.7 and the token limit to 4096.
pub fn agent_model_options(params: &Params<'_>) -> Result<ModelOptions, NodeError> {
    let mut options = ModelOptions::from_value(&params.collection("modelOptions"))?;
    options.temperature.get_or_insert(0.7);
    options.max_tokens.get_or_insert(4096);
    Ok(options)
}

/// Attach whatever memory, tools and output parser are connected.
pub(crate) async fn with_connections(
    mut turn: AgentTurn,
    ctx: &dyn NodeContext,
    item: usize,
) -> AgentTurn {
    turn = turn.with_tools(connections::tools(ctx, item).await);
    if let Some(memory) = connections::memory(ctx, item).await {
        turn = turn.with_memory(memory);
    }
    if let Some(parser) = connections::output_parser(ctx, item).await {
        turn = turn.with_output_parser(parser);
    }
    turn
}

// --- Shared description pieces ---

/// Memory, tool and output parser ports.
fn collaborator_ports() -> [Port; 3] {
    [
        Port::single("Memory", ConnectionType::Memory, false),
        Port::many("Tool", ConnectionType::Tool),
        Port::single("Output Parser", ConnectionType::OutputParser, false),
    ]
}

fn agent_options_parameter(name: &str) -> NodeParameter {
    NodeParameter::collection(name, "Options", crate::description::loop_option_parameters())
}

fn session_parameters() -> Vec<NodeParameter> {
    vec![
        NodeParameter::string("sessionId", "Session ID", ""),
        NodeParameter::string("userId", "User ID", ""),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ConnectionData;
    use flowlm_core::CredentialBag;
    use flowlm_core::error::CredentialError;
    use serde_json::{Map, json};

    struct ParamsOnly(Map<String, Value>);

    #[async_trait]
    impl NodeContext for ParamsOnly {
        fn input_items(&self) -> Vec<Value> {
            Vec::new()
        }
        fn get_node_parameter(&self, name: &str, _item: usize) -> Option<Value> {
            self.0.get(name).cloned()
        }
        async fn get_credentials(
            &self,
            credential_type: &str,
        ) -> Result<CredentialBag, CredentialError> {
            Err(CredentialError::Unavailable(credential_type.into()))
        }
        async fn get_input_connection_data(
            &self,
            _c: ConnectionType,
            _item: usize,
        ) -> Option<ConnectionData> {
            None
        }
    }

    fn ctx(params: Value) -> ParamsOnly {
        match params {
            Value::Object(map) => ParamsOnly(map),
            _ => ParamsOnly(Map::new()),
        }
    }

    #[test]
    fn define_mode_reads_parameters() {
        let ctx = ctx(json!({"promptType": "define", "systemMessage": "Be terse", "text": "2+2?"}));
        let prompt = read_prompt(&Params::new(&ctx, 0), &json!({}), &AgentDefaults::default());
        assert_eq!(prompt, Prompt::new("Be terse", "2+2?"));
    }

    #[test]
    fn define_mode_falls_back_to_chat_input_and_default_system() {
        let ctx = ctx(json!({}));
        let defaults = AgentDefaults::default();
        let prompt = read_prompt(&Params::new(&ctx, 0), &json!({"chatInput": "hello"}), &defaults);
        assert_eq!(prompt.user, "hello");
        assert_eq!(prompt.system, defaults.system_message);
    }

    #[test]
    fn explicit_empty_system_message_is_kept() {
        let ctx = ctx(json!({"systemMessage": "", "text": "hi"}));
        let prompt = read_prompt(&Params::new(&ctx, 0), &json!({}), &AgentDefaults::default());
        assert_eq!(prompt.system, "");
    }

    #[test]
    fn auto_mode_reads_the_item() {
        let ctx = ctx(json!({"promptType": "auto", "text": "ignored"}));
        let prompt = read_prompt(
            &Params::new(&ctx, 0),
            &json!({"text": "from item", "systemMessage": "item system"}),
            &AgentDefaults::default(),
        );
        assert_eq!(prompt, Prompt::new("item system", "from item"));
    }

    #[test]
    fn loop_options_default_and_zero() {
        let defaults = AgentDefaults::default();
        let empty = ctx(json!({}));
        let options = LoopOptions::read(&Params::new(&empty, 0), "options", &defaults);
        assert_eq!(options.max_iterations, defaults.max_iterations);
        assert!(!options.return_intermediate_steps);

        let zero =
            ctx(json!({"agentOptions": {"maxIterations": 0, "returnIntermediateSteps": true}}));
        let options = LoopOptions::read(&Params::new(&zero, 0), "agentOptions", &defaults);
        assert_eq!(options.max_iterations, defaults.max_iterations);
        assert!(options.return_intermediate_steps);

        let three = ctx(json!({"options": {"maxIterations": 3}}));
        let options = LoopOptions::read(&Params::new(&three, 0), "options", &defaults);
        assert_eq!(options.max_iterations, 3);
    }

    #[test]
    fn agent_model_options_fill_defaults() {
        let ctx = ctx(json!({"modelOptions": {"temperature": 0.2}}));
        let options = agent_model_options(&Params::new(&ctx, 0)).unwrap();
        assert_eq!(options.temperature, Some(0.2));
        assert_eq!(options.max_tokens, Some(4096));
    }
}
