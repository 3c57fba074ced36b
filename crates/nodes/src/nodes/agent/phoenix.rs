use std::sync::Arc;

use async_trait::async_trait;
use flowlm_agent::{AgentTurn, StepsPolicy};
use flowlm_core::{CallbackHandler, CredentialBag, Tracer};
use flowlm_observability::{LoggingHandler, PhoenixConfig, PhoenixTracer, parse_tags};
use flowlm_providers::build_chat_model;
use serde_json::{Map, Value, json};
use tracing::debug;

use super::{
    ItemRunner, LoopOptions, agent_model_options, agent_options_parameter, collaborator_ports,
    execute_items, read_prompt, session_parameters, with_connections,
};
use crate::description::{NodeDescription, NodeParameter, Port, prompt_parameters};
use crate::error::NodeError;
use crate::host::{ConnectionType, NodeContext, NodeItem, Params, client_options, http_client};
use crate::node::Node;

pub const NODE_NAME: &str = "aiAgentPhoenix";
pub const SERVICE_NAME: &str = "flowlm-ai-agent-phoenix";
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434/v1";

/// `(provider, credential type, default model)`.
const PROVIDERS: [(&str, &str, &str); 5] = [
    ("openai", "openAiPhoenixApi", "gpt-4o-mini"),
    ("azureOpenai", "azureOpenAiPhoenixApi", ""),
    ("anthropic", "anthropicPhoenixApi", "claude-3-5-sonnet-latest"),
    ("ollama", "openAiPhoenixApi", "llama3.2"),
    ("openaiCompatible", "openAiPhoenixApi", ""),
];

fn provider_row(provider: &str) -> Option<(&'static str, &'static str)> {
    PROVIDERS
        .iter()
        .find(|(id, _, _)| *id == provider)
        .map(|(_, credential, model)| (*credential, *model))
}

/// Agent traced with one Phoenix span tree per item.
#[derive(Debug, Default)]
pub struct PhoenixAgentNode;

impl PhoenixAgentNode {
    /// The provider table row, credentials and base URL the model is built
    /// from. Ollama is reached through its OpenAI-compatible endpoint with a
    /// placeholder key.
    fn model_source(
        &self,
        params: &Params<'_>,
        provider: &str,
        credentials: &CredentialBag,
    ) -> (&'static str, CredentialBag, Option<String>) {
        match provider {
            "ollama" => {
                let mut fields = Map::new();
                fields.insert("apiKey".into(), json!("ollama"));
                (
                    "openaiCompatible",
                    CredentialBag::new("ollamaApi", fields),
                    Some(params.string("baseUrl", DEFAULT_OLLAMA_URL)),
                )
            }
            "openaiCompatible" => (
                "openaiCompatible",
                credentials.clone(),
                params.opt_string("baseUrl"),
            ),
            "azureOpenai" => ("azureOpenai", credentials.clone(), None),
            "anthropic" => ("anthropic", credentials.clone(), None),
            _ => ("openai", credentials.clone(), None),
        }
    }
}

#[async_trait]
impl ItemRunner for PhoenixAgentNode {
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
        let (credential_type, default_model) =
            provider_row(&provider).ok_or_else(|| NodeError::UnknownProvider(provider.clone()))?;
        let credentials = ctx.get_credentials(credential_type).await?;
        let model_name = params.model_name("model", default_model);

        let config = PhoenixConfig::from_credentials(&credentials);
        let http = http_client(ctx, &config.collector_url)?;
        let tracer = PhoenixTracer::new(config.clone(), SERVICE_NAME, http);
        debug!(
            collector = %config.collector_url,
            project = %config.project_name,
            "Phoenix tracer ready"
        );

        let (provider_id, model_credentials, base_url) =
            self.model_source(&params, &provider, &credentials);
        let mut client = client_options(ctx);
        if let Some(base_url) = base_url {
            client = client.with_base_url(base_url);
        }
        let options = agent_model_options(&params)?;
        let temperature = options.temperature.map(f64::from).unwrap_or(0.7);

        let logging: Arc<dyn CallbackHandler> = Arc::new(LoggingHandler::new());
        let model =
            build_chat_model(provider_id, &model_credentials, &model_name, &options, &client)?
                .with_handler(logging);

        let phoenix_options = params.collection("phoenixOptions");
        let option = |key: &str| {
            phoenix_options
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let mut attributes = vec![
            ("llm.provider".to_string(), json!(provider)),
            ("llm.model".to_string(), json!(model_name)),
            ("llm.temperature".to_string(), json!(temperature)),
        ];
        if let Some(session_id) = option("sessionId") {
            attributes.push(("session.id".into(), json!(session_id)));
        }
        if let Some(user_id) = option("userId") {
            attributes.push(("user.id".into(), json!(user_id)));
        }
        if let Some(tags) = parse_tags(phoenix_options.get("tags").and_then(Value::as_str)) {
            attributes.push(("tag.tags".into(), json!(tags)));
        }

        let prompt = read_prompt(&params, input, &defaults);
        let loop_options = LoopOptions::read(&params, "agentOptions", &defaults);
        let tracer: Arc<dyn Tracer> = Arc::new(tracer);
        let turn = AgentTurn::new(model)
            .with_max_iterations(loop_options.max_iterations)
            .with_tracer(tracer, attributes);
        let result = with_connections(turn, ctx, item).await.run(&prompt).await?;

        Ok(result.to_json(StepsPolicy::WhenNonEmpty))
    }
}

#[async_trait]
impl Node for PhoenixAgentNode {
    fn description(&self) -> NodeDescription {
        let mut description = NodeDescription::new(
            NODE_NAME,
            "AI Agent Phoenix",
            "Run a tool-calling agent traced in Arize Phoenix",
        )
        .input(Port::main())
        .inputs(collaborator_ports())
        .output(ConnectionType::Main)
        .credential_when("openAiPhoenixApi", "provider", &["openai", "ollama", "openaiCompatible"])
        .credential_when("azureOpenAiPhoenixApi", "provider", &["azureOpenai"])
        .credential_when("anthropicPhoenixApi", "provider", &["anthropic"])
        .property(NodeParameter::options(
            "provider",
            "Provider",
            "openai",
            &[
                ("OpenAI", "openai"),
                ("Azure OpenAI", "azureOpenai"),
                ("Anthropic", "anthropic"),
                ("Ollama", "ollama"),
                ("OpenAI Compatible", "openaiCompatible"),
            ],
        ));

        for (provider, _, default_model) in PROVIDERS {
            let label = if provider == "azureOpenai" { "Deployment Name" } else { "Model" };
            description = description.property(
                NodeParameter::string("model", label, default_model)
                    .show_when("provider", &[provider]),
            );
        }

        description
            .property(
                NodeParameter::string("baseUrl", "Base URL", DEFAULT_OLLAMA_URL)
                    .show_when("provider", &["ollama"]),
            )
            .property(
                NodeParameter::string("baseUrl", "Base URL", "")
                    .required()
                    .show_when("provider", &["openaiCompatible"]),
            )
            .property(NodeParameter::collection(
                "modelOptions",
                "Model Options",
                vec![
                    NodeParameter::number("maxTokens", "Max Tokens", 4096),
                    NodeParameter::number("temperature", "Temperature", 0.7),
                ],
            ))
            .properties(prompt_parameters(""))
            .property({
                let mut children = session_parameters();
                children
                    .push(NodeParameter::string("tags", "Tags", "").describe("Comma-separated"));
                NodeParameter::collection("phoenixOptions", "Phoenix Options", children)
            })
            .property(agent_options_parameter("agentOptions"))
    }

    async fn execute(&self, ctx: &dyn NodeContext) -> Result<Vec<NodeItem>, NodeError> {
        execute_items(self, ctx).await
    }
}
