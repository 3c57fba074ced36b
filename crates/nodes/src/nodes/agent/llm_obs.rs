use async_trait::async_trait;
use flowlm_agent::{AgentTurn, StepsPolicy};
use flowlm_observability::TraceOptions;
use serde_json::Value;
use tracing::debug;

use super::{
    ItemRunner, LoopOptions, agent_options_parameter, collaborator_ports, execute_items,
    read_prompt, with_connections,
};
use crate::connections;
use crate::description::{NodeDescription, NodeParameter, Port, prompt_parameters};
use crate::error::NodeError;
use crate::host::{ConnectionType, NodeContext, NodeItem, Params};
use crate::node::Node;
use crate::nodes::langfuse::attach_langfuse;

pub const NODE_NAME: &str = "aiAgentLlmObs";

const NO_MODEL: &str =
    "No language model connected. Please connect an LLM Observability model to the Model input.";

/// Agent over a connected model, with optional Langfuse tracing.
///
/// The model is read from the LLM Obs port, falling back to the plain
/// language model port so Langfuse-wrapped models can be used as well.
#[derive(Debug, Default)]
pub struct LlmObsAgentNode;

fn observability_parameter() -> NodeParameter {
    NodeParameter::collection(
        "observability",
        "Observability",
        vec![
            NodeParameter::json("customMetadata", "Custom Metadata (JSON)", "{}")
                .show_when("enableLangfuse", &["true"]),
            NodeParameter::boolean("enableLangfuse", "Enable Langfuse", false),
            NodeParameter::string("sessionId", "Session ID", "")
                .show_when("enableLangfuse", &["true"]),
            NodeParameter::string("tags", "Tags", "")
                .describe("Comma-separated")
                .show_when("enableLangfuse", &["true"]),
            NodeParameter::string("traceName", "Trace Name", "")
                .show_when("enableLangfuse", &["true"]),
            NodeParameter::string("userId", "User ID", "").show_when("enableLangfuse", &["true"]),
        ],
    )
}

#[async_trait]
impl ItemRunner for LlmObsAgentNode {
    fn node_name(&self) -> &'static str {
        NODE_NAME
    }

    async fn run_item(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
        input: &Value,
    ) -> Result<Value, NodeError> {
        let model = match connections::model(ctx, ConnectionType::LanguageModelLlmObs, item).await {
            Some(model) => Some(model),
            None => connections::model(ctx, ConnectionType::LanguageModel, item).await,
        }
        .ok_or_else(|| NodeError::MissingConnection(NO_MODEL.into()))?;

        let params = Params::new(ctx, item);
        let defaults = ctx.agent_defaults();
        let prompt = read_prompt(&params, input, &defaults);

        let observability = params.collection("observability");
        let enable_langfuse = observability
            .get("enableLangfuse")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let model = if enable_langfuse {
            let credentials = ctx.get_credentials("langfuseApi").await?;
            debug!(item, "Langfuse enabled for agent turn");
            attach_langfuse(ctx, model, &credentials, TraceOptions::from_value(&observability))?
        } else {
            model
        };

        let loop_options = LoopOptions::read(&params, "options", &defaults);
        let turn = AgentTurn::new(model).with_max_iterations(loop_options.max_iterations);
        let result = with_connections(turn, ctx, item).await.run(&prompt).await?;

        Ok(result.to_json(StepsPolicy::WhenRequested(loop_options.return_intermediate_steps)))
    }
}

#[async_trait]
impl Node for LlmObsAgentNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(
            NODE_NAME,
            "AI Agent via LLM Observability",
            "Run a tool-calling agent over a connected model with optional Langfuse tracing",
        )
        .input(Port::main())
        .input(Port::single("Model", ConnectionType::LanguageModelLlmObs, true))
        .inputs(collaborator_ports())
        .output(ConnectionType::Main)
        .credential("langfuseApi", false)
        .properties(prompt_parameters(""))
        .property(observability_parameter())
        .property(agent_options_parameter("options"))
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<NodeItem>, NodeError> {
        execute_items(self, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_port_is_required_and_single() {
        let description = LlmObsAgentNode.description();
        let model = description
            .inputs
            .iter()
            .find(|p| p.connection == ConnectionType::LanguageModelLlmObs)
            .unwrap();
        assert!(model.required);
        assert_eq!(model.max_connections, Some(1));
        assert!(!LlmObsAgentNode.is_sub_node());
        assert!(!description.credentials[0].required);
    }

    #[test]
    fn langfuse_fields_hide_until_enabled() {
        let description = LlmObsAgentNode.description();
        let observability = description.find_property("observability").unwrap();
        assert_eq!(
            observability.child("enableLangfuse").unwrap().default,
            serde_json::json!(false)
        );
        assert!(observability.child("traceName").unwrap().show_for.is_some());
    }
}
