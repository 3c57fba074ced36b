use std::sync::Arc;

use async_trait::async_trait;
use flowlm_agent::{AgentTurn, StepsPolicy};
use flowlm_core::CallbackHandler;
use flowlm_observability::LoggingHandler;
use flowlm_observability::helicone::{self, HELICONE_PROVIDERS, HeliconeOptions};
use flowlm_providers::build_chat_model;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    ItemRunner, LoopOptions, agent_model_options, agent_options_parameter, collaborator_ports,
    execute_items, read_prompt, session_parameters, with_connections,
};
use crate::description::{NodeDescription, NodeParameter, Port, prompt_parameters};
use crate::error::NodeError;
use crate::host::{ConnectionType, NodeContext, NodeItem, Params, client_options};
use crate::node::Node;

pub const NODE_NAME: &str = "aiAgentHelicone";

/// AI event reported to the host with the turn's token usage.
pub const USAGE_EVENT: &str = "ai-llm-generated-output";

/// Agent whose model calls go through the Helicone proxy.
#[derive(Debug, Default)]
pub struct HeliconeAgentNode;

fn provider_parameter() -> NodeParameter {
    NodeParameter::options(
        "provider",
        "Provider",
        "openai",
        &[
            ("OpenAI", "openai"),
            ("Anthropic", "anthropic"),
            ("Azure OpenAI", "azureOpenai"),
            ("Google Gemini", "gemini"),
            ("Groq", "groq"),
            ("Mistral", "mistral"),
            ("OpenAI Compatible", "openaiCompatible"),
        ],
    )
}

fn helicone_options_parameter() -> NodeParameter {
    let mut children = session_parameters();
    children.push(NodeParameter::fixed_collection(
        "customProperties",
        "Custom Properties",
        vec![NodeParameter::collection(
            "property",
            "Property",
            vec![
                NodeParameter::string("name", "Name", ""),
                NodeParameter::string("value", "Value", ""),
            ],
        )],
    ));
    NodeParameter::collection("heliconeOptions", "Helicone Options", children)
}

#[async_trait]
impl ItemRunner for HeliconeAgentNode {
    fn node_name(&self) -> &'static str {
        NODE_NAME
    }

    async fn run_item(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
        input: &Value,
    ) -> Result<Value, NodeError> {
        let params = Params::new(ctx, item);
        let defaults = ctx.agent_defaults();

        let provider = params.string("provider", "openai");
        let model_name = params.model_name("model", "gpt-4o");
        let credential_type = helicone::credential_type(&provider)
            .ok_or_else(|| NodeError::UnknownProvider(provider.clone()))?;
        let credentials = ctx.get_credentials(credential_type).await?;

        let options = HeliconeOptions::from_value(&params.collection("heliconeOptions"));
        let route = helicone::route(&provider, &credentials, &options)?;
        debug!(
            provider = %provider,
            base_url = ?route.base_url,
            headers = route.headers.len(),
            "Routing model through Helicone"
        );

        let mut client = client_options(ctx);
        if let Some(base_url) = route.base_url {
            client = client.with_base_url(base_url);
        }
        for (name, value) in route.headers {
            client = client.with_header(name, value);
        }

        let logging: Arc<dyn CallbackHandler> = Arc::new(LoggingHandler::new());
        let model = build_chat_model(
            route.provider_id,
            &credentials,
            &model_name,
            &agent_model_options(&params)?,
            &client,
        )?
        .with_handler(logging);

        let prompt = read_prompt(&params, input, &defaults);
        let loop_options = LoopOptions::read(&params, "agentOptions", &defaults);
        let turn = AgentTurn::new(model).with_max_iterations(loop_options.max_iterations);
        let result = with_connections(turn, ctx, item).await.run(&prompt).await?;

        if result.usage.total_tokens > 0 {
            let payload = json!({
                "model": model_name,
                "provider": provider,
                "promptTokens": result.usage.prompt_tokens,
                "completionTokens": result.usage.completion_tokens,
                "totalTokens": result.usage.total_tokens,
            });
            ctx.log_ai_event(USAGE_EVENT, &payload.to_string());
        }

        Ok(result.to_json(StepsPolicy::WhenNonEmpty))
    }
}

#[async_trait]
impl Node for HeliconeAgentNode {
    fn description(&self) -> NodeDescription {
        let mut description = NodeDescription::new(
            NODE_NAME,
            "AI Agent Helicone",
            "Run a tool-calling agent with every model call proxied through Helicone",
        )
        .input(Port::main())
        .inputs(collaborator_ports())
        .output(ConnectionType::Main);

        for (provider, credential) in HELICONE_PROVIDERS {
            description = description.credential_when(credential, "provider", &[provider]);
        }

        description
            .property(provider_parameter())
            .property(NodeParameter::string("model", "Model", "gpt-4o").describe(
                "Model name, or the deployment name for Azure OpenAI",
            ))
            .property(NodeParameter::collection(
                "modelOptions",
                "Model Options",
                vec![
                    NodeParameter::number("maxTokens", "Max Tokens", 4096),
                    NodeParameter::number("temperature", "Temperature", 0.7),
                    NodeParameter::number("topP", "Top P", 1),
                ],
            ))
            .properties(prompt_parameters(""))
            .property(helicone_options_parameter())
            .property(agent_options_parameter("agentOptions"))
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<NodeItem>, NodeError> {
        execute_items(self, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_credential_per_provider() {
        let description = HeliconeAgentNode.description();
        assert_eq!(description.credentials.len(), HELICONE_PROVIDERS.len());
        let groq = description
            .credentials
            .iter()
            .find(|c| c.name == "groqHeliconeApi")
            .unwrap();
        assert_eq!(groq.show_for.as_ref().unwrap().values, vec!["groq"]);
    }

    #[test]
    fn provider_choices_match_the_route_table() {
        let description = HeliconeAgentNode.description();
        let provider = description.find_property("provider").unwrap();
        let values: Vec<_> = provider.options.iter().map(|o| o.value.as_str().unwrap()).collect();
        for (id, _) in HELICONE_PROVIDERS {
            assert!(values.contains(&id), "{id} missing from provider choices");
        }
    }
}
