//! Chat model sub-nodes, one table row per node.
//!
//! Each row names the provider table entry, the credential type, the output
//! port and the option set shown to the user. Langfuse rows read the
//! `langfuse*` fields of their combined credential and prepend a Langfuse
//! handler; every model also gets the logging handler.

use std::sync::Arc;

use async_trait::async_trait;
use flowlm_core::{CallbackHandler, ChatModel, CredentialBag};
use flowlm_observability::{LoggingHandler, TraceOptions};
use flowlm_providers::{ModelOptions, build_chat_model};
use tracing::debug;

use crate::description::{NodeDescription, NodeParameter};
use crate::error::NodeError;
use crate::host::{ConnectionData, ConnectionType, NodeContext, Params, SupplyData, client_options};
use crate::node::Node;
use crate::nodes::langfuse::attach_langfuse;

/// Session id used by Langfuse model nodes when none is configured.
pub const DEFAULT_LANGFUSE_SESSION: &str = "default-session-id";

/// How the node asks for the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelParam {
    /// `model` as a list/id locator
    Locator(&'static str),
    /// `model` as free text
    Name(&'static str),
    /// Azure `deploymentName`
    Deployment,
    /// Bedrock `model`, overridable with `useCustomModel` + `customModelId`
    BedrockModel(&'static str),
}

/// The option collection a node offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionSet {
    OpenAi,
    AzureOpenAi,
    Anthropic,
    Bedrock,
    Cohere,
    Gemini,
    Grok,
    Groq,
    Mistral,
    Ollama,
    Vllm,
}

#[derive(Debug, Clone, Copy)]
pub struct ModelNodeSpec {
    pub name: &'static str,
    pub display_name: &'static str,
    /// Entry of the provider table
    pub provider: &'static str,
    pub credential: &'static str,
    pub output: ConnectionType,
    pub langfuse: bool,
    pub model: ModelParam,
    pub options: OptionSet,
}

const fn plain(
    name: &'static str,
    display_name: &'static str,
    provider: &'static str,
    credential: &'static str,
    output: ConnectionType,
    model: ModelParam,
    options: OptionSet,
) -> ModelNodeSpec {
    ModelNodeSpec {
        name,
        display_name,
        provider,
        credential,
        output,
        langfuse: false,
        model,
        options,
    }
}

const fn with_langfuse(
    name: &'static str,
    display_name: &'static str,
    provider: &'static str,
    credential: &'static str,
    model: ModelParam,
    options: OptionSet,
) -> ModelNodeSpec {
    ModelNodeSpec {
        name,
        display_name,
        provider,
        credential,
        output: ConnectionType::LanguageModel,
        langfuse: true,
        model,
        options,
    }
}

use ConnectionType::{LanguageModel, LanguageModelLlmObs};

pub static MODEL_NODES: &[ModelNodeSpec] = &[
    plain(
        "lmChatOpenAi",
        "OpenAI Chat Model",
        "openai",
        "openAiApi",
        LanguageModelLlmObs,
        ModelParam::Locator("gpt-4o-mini"),
        OptionSet::OpenAi,
    ),
    plain(
        "lmChatAnthropic",
        "Anthropic Chat Model",
        "anthropic",
        "anthropicApi",
        LanguageModel,
        ModelParam::Name("claude-3-5-sonnet-latest"),
        OptionSet::Anthropic,
    ),
    plain(
        "lmChatAwsBedrock",
        "AWS Bedrock Chat Model",
        "bedrock",
        "awsBedrockApi",
        LanguageModelLlmObs,
        ModelParam::BedrockModel("anthropic.claude-3-5-sonnet-20241022-v2:0"),
        OptionSet::Bedrock,
    ),
    plain(
        "lmChatAzureOpenAi",
        "Azure OpenAI Chat Model",
        "azureOpenai",
        "azureOpenAiApi",
        LanguageModelLlmObs,
        ModelParam::Deployment,
        OptionSet::AzureOpenAi,
    ),
    plain(
        "lmChatCohere",
        "Cohere Chat Model",
        "cohere",
        "cohereApi",
        LanguageModel,
        ModelParam::Name("command-r-plus"),
        OptionSet::Cohere,
    ),
    plain(
        "lmChatGoogleGemini",
        "Google Gemini Chat Model",
        "gemini",
        "googleGeminiApi",
        LanguageModel,
        ModelParam::Name("gemini-2.0-flash"),
        OptionSet::Gemini,
    ),
    plain(
        "lmChatGrok",
        "xAI Grok Chat Model",
        "grok",
        "grokApi",
        LanguageModel,
        ModelParam::Name("grok-2-1212"),
        OptionSet::Grok,
    ),
    plain(
        "lmChatGroq",
        "Groq Chat Model",
        "groq",
        "groqApi",
        LanguageModelLlmObs,
        ModelParam::Name("llama-3.3-70b-versatile"),
        OptionSet::Groq,
    ),
    plain(
        "lmChatMistral",
        "Mistral Chat Model",
        "mistral",
        "mistralApi",
        LanguageModel,
        ModelParam::Name("mistral-small-latest"),
        OptionSet::Mistral,
    ),
    plain(
        "lmChatOllama",
        "Ollama Chat Model",
        "ollama",
        "ollamaApi",
        LanguageModelLlmObs,
        ModelParam::Name("llama3.2"),
        OptionSet::Ollama,
    ),
    plain(
        "lmChatVllm",
        "vLLM Chat Model",
        "vllm",
        "vllmApi",
        LanguageModelLlmObs,
        ModelParam::Name(""),
        OptionSet::Vllm,
    ),
    with_langfuse(
        "lmChatAnthropicLangfuse",
        "Anthropic Chat Model (Langfuse)",
        "anthropic",
        "anthropicApiWithLangfuseApi",
        ModelParam::Name("claude-3-5-sonnet-latest"),
        OptionSet::Anthropic,
    ),
    with_langfuse(
        "lmChatAwsBedrockLangfuse",
        "AWS Bedrock Chat Model (Langfuse)",
        "bedrock",
        "awsBedrockApiWithLangfuseApi",
        ModelParam::BedrockModel("anthropic.claude-3-5-sonnet-20241022-v2:0"),
        OptionSet::Bedrock,
    ),
    with_langfuse(
        "lmChatAzureOpenAiLangfuse",
        "Azure OpenAI Chat Model (Langfuse)",
        "azureOpenai",
        "azureOpenAiApiWithLangfuseApi",
        ModelParam::Deployment,
        OptionSet::AzureOpenAi,
    ),
    with_langfuse(
        "lmChatCohereLangfuse",
        "Cohere Chat Model (Langfuse)",
        "cohere",
        "cohereApiWithLangfuseApi",
        ModelParam::Name("command-r-plus"),
        OptionSet::Cohere,
    ),
    with_langfuse(
        "lmChatGoogleGeminiLangfuse",
        "Google Gemini Chat Model (Langfuse)",
        "gemini",
        "googleGeminiApiWithLangfuseApi",
        ModelParam::Name("gemini-2.0-flash"),
        OptionSet::Gemini,
    ),
    with_langfuse(
        "lmChatGroqLangfuse",
        "Groq Chat Model (Langfuse)",
        "groq",
        "groqApiWithLangfuseApi",
        ModelParam::Name("llama-3.3-70b-versatile"),
        OptionSet::Groq,
    ),
    with_langfuse(
        "lmChatMistralLangfuse",
        "Mistral Chat Model (Langfuse)",
        "mistral",
        "mistralApiWithLangfuseApi",
        ModelParam::Name("mistral-small-latest"),
        OptionSet::Mistral,
    ),
    with_langfuse(
        "lmChatOllamaLangfuse",
        "Ollama Chat Model (Langfuse)",
        "ollama",
        "ollamaApiWithLangfuseApi",
        ModelParam::Name("llama3.2"),
        OptionSet::Ollama,
    ),
];

// ── Option schemas ───────────────────────────────────────────────────────

fn temperature(default: f64) -> NodeParameter {
    NodeParameter::number("temperature", "Sampling Temperature", default)
}

fn max_tokens(default: i64) -> NodeParameter {
    NodeParameter::number("maxTokens", "Maximum Number of Tokens", default)
        .describe("-1 leaves the limit to the provider")
}

fn top_p(default: f64) -> NodeParameter {
    NodeParameter::number("topP", "Top P", default)
}

fn penalties() -> [NodeParameter; 2] {
    [
        NodeParameter::number("frequencyPenalty", "Frequency Penalty", 0),
        NodeParameter::number("presencePenalty", "Presence Penalty", 0),
    ]
}

fn stop() -> NodeParameter {
    NodeParameter::string("stop", "Stop Sequences", "").describe("Comma-separated")
}

fn response_format() -> NodeParameter {
    NodeParameter::options(
        "responseFormat",
        "Response Format",
        "text",
        &[("Text", "text"), ("JSON", "json_object")],
    )
}

impl OptionSet {
    pub fn parameters(self) -> Vec<NodeParameter> {
        let mut params = match self {
            OptionSet::OpenAi => {
                let mut p = vec![
                    NodeParameter::string("baseURL", "Base URL", ""),
                    NodeParameter::number("maxRetries", "Max Retries", 2),
                    max_tokens(-1),
                    NodeParameter::options(
                        "reasoningEffort",
                        "Reasoning Effort",
                        "medium",
                        &[("Low", "low"), ("Medium", "medium"), ("High", "high")],
                    ),
                    response_format(),
                    temperature(0.7),
                    NodeParameter::number("timeout", "Timeout", 60000),
                    top_p(1.0),
                ];
                p.extend(penalties());
                p
            }
            OptionSet::AzureOpenAi => {
                let mut p = vec![
                    max_tokens(-1),
                    response_format(),
                    temperature(0.7),
                    NodeParameter::number("timeout", "Timeout", 60000),
                    top_p(1.0),
                ];
                p.extend(penalties());
                p
            }
            OptionSet::Anthropic => vec![
                NodeParameter::string("baseURL", "Base URL", ""),
                NodeParameter::boolean("thinking", "Extended Thinking", false),
                max_tokens(4096),
                temperature(0.7),
                NodeParameter::number("thinkingBudget", "Thinking Budget", 10000)
                    .show_when("thinking", &["true"]),
                NodeParameter::number("topK", "Top K", -1),
                top_p(1.0),
            ],
            OptionSet::Bedrock => vec![max_tokens(2000), temperature(0.7), top_p(1.0)],
            OptionSet::Cohere => vec![
                temperature(0.3),
                NodeParameter::number("maxRetries", "Max Retries", 2),
            ],
            OptionSet::Gemini => vec![
                NodeParameter::number("maxOutputTokens", "Maximum Number of Tokens", 2048),
                temperature(0.7),
                NodeParameter::number("topK", "Top K", 40),
                top_p(0.95),
            ],
            OptionSet::Grok => {
                let mut p = vec![max_tokens(4096), temperature(0.7), top_p(1.0)];
                p.extend(penalties());
                p
            }
            OptionSet::Groq => vec![max_tokens(4096), temperature(0.7), top_p(1.0), stop()],
            OptionSet::Mistral => vec![
                NodeParameter::number("maxRetries", "Max Retries", 2),
                max_tokens(4096),
                NodeParameter::boolean("safeMode", "Safe Mode", false),
                temperature(0.7),
                top_p(1.0),
            ],
            OptionSet::Ollama => vec![
                NodeParameter::number("numCtx", "Context Length", 4096),
                NodeParameter::options(
                    "format",
                    "Format",
                    "default",
                    &[("Default", "default"), ("JSON", "json")],
                ),
                NodeParameter::string("keepAlive", "Keep Alive", "5m"),
                NodeParameter::number("numPredict", "Max Tokens to Generate", -1),
                NodeParameter::number("repeatPenalty", "Repeat Penalty", 1.1),
                stop(),
                temperature(0.7),
                NodeParameter::number("topK", "Top K", 40),
                top_p(0.9),
            ],
            OptionSet::Vllm => {
                let mut p = vec![
                    NodeParameter::number("maxRetries", "Max Retries", 2),
                    max_tokens(4096),
                    stop(),
                    temperature(0.7),
                    NodeParameter::number("timeout", "Timeout", 60000),
                    top_p(1.0),
                ];
                p.extend(penalties());
                p
            }
        };
        params.sort_by(|a, b| a.display_name.cmp(&b.display_name));
        params
    }
}

/// `langfuseMetadata`: custom metadata, session and user.
pub fn langfuse_metadata_parameter() -> NodeParameter {
    NodeParameter::collection(
        "langfuseMetadata",
        "Langfuse Metadata",
        vec![
            NodeParameter::json("customMetadata", "Custom Metadata (JSON)", "{}"),
            NodeParameter::string("sessionId", "Session ID", DEFAULT_LANGFUSE_SESSION),
            NodeParameter::string("userId", "User ID", ""),
        ],
    )
}

// ── Node ─────────────────────────────────────────────────────────────────

/// A model sub-node driven by one [`ModelNodeSpec`].
pub struct ModelNode {
    spec: &'static ModelNodeSpec,
}

impl ModelNode {
    pub fn new(spec: &'static ModelNodeSpec) -> Self {
        Self { spec }
    }

    pub fn all() -> impl Iterator<Item = ModelNode> {
        MODEL_NODES.iter().map(ModelNode::new)
    }

    pub fn spec(&self) -> &'static ModelNodeSpec {
        self.spec
    }

    fn model_parameters(&self) -> Vec<NodeParameter> {
        match self.spec.model {
            ModelParam::Locator(default) => {
                vec![NodeParameter::model_locator("model", "Model", default)]
            }
            ModelParam::Name(default) => {
                vec![NodeParameter::string("model", "Model", default).required()]
            }
            ModelParam::Deployment => vec![
                NodeParameter::string("deploymentName", "Deployment Name", "")
                    .describe("The name of the model deployment in Azure")
                    .required(),
            ],
            ModelParam::BedrockModel(default) => vec![
                NodeParameter::string("model", "Model", default),
                NodeParameter::boolean("useCustomModel", "Use Custom Model ID", false),
                NodeParameter::string("customModelId", "Custom Model ID", "")
                    .show_when("useCustomModel", &["true"]),
            ],
        }
    }

    fn model_name(&self, params: &Params<'_>) -> String {
        match self.spec.model {
            ModelParam::Locator(default) | ModelParam::Name(default) => {
                params.model_name("model", default)
            }
            ModelParam::Deployment => params.model_name("deploymentName", ""),
            ModelParam::BedrockModel(default) => {
                if params.bool("useCustomModel", false) {
                    params.model_name("customModelId", default)
                } else {
                    params.model_name("model", default)
                }
            }
        }
    }

    /// Build the model for `item`. No request is sent.
    pub async fn build(&self, ctx: &dyn NodeContext, item: usize) -> Result<ChatModel, NodeError> {
        let params = Params::new(ctx, item);
        let credentials = ctx.get_credentials(self.spec.credential).await?;
        let options = ModelOptions::from_value(&params.collection("options"))?;
        let model_name = self.model_name(&params);
        if matches!(self.spec.model, ModelParam::Deployment) && model_name.is_empty() {
            return Err(NodeError::Configuration("Deployment Name is required".into()));
        }

        let model = build_chat_model(
            self.spec.provider,
            &credentials,
            &model_name,
            &options,
            &client_options(ctx),
        )?;
        let logging: Arc<dyn CallbackHandler> = Arc::new(LoggingHandler::new());
        let model = model.with_handler(logging);

        if !self.spec.langfuse {
            return Ok(model);
        }
        self.langfuse(ctx, &params, &credentials, model)
    }

    fn langfuse(
        &self,
        ctx: &dyn NodeContext,
        params: &Params<'_>,
        credentials: &CredentialBag,
        model: ChatModel,
    ) -> Result<ChatModel, NodeError> {
        let mut options = TraceOptions::from_value(&params.collection("langfuseMetadata"));
        if options.session_id.is_none() {
            options.session_id = Some(DEFAULT_LANGFUSE_SESSION.into());
        }
        debug!(node = self.spec.name, "Attaching Langfuse handler");
        attach_langfuse(ctx, model, credentials, options)
    }
}

#[async_trait]
impl Node for ModelNode {
    fn description(&self) -> NodeDescription {
        let spec = self.spec;
        let mut description = NodeDescription::new(
            spec.name,
            spec.display_name,
            &format!("Chat model served by {}", spec.display_name.trim_end_matches(" (Langfuse)")),
        )
        .output(spec.output)
        .credential(spec.credential, true);

        if spec.langfuse {
            description = description.property(langfuse_metadata_parameter());
        }
        description
            .properties(self.model_parameters())
            .property(NodeParameter::collection("options", "Options", spec.options.parameters()))
    }

    async fn supply_data(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
    ) -> Result<SupplyData, NodeError> {
        let model = self.build(ctx, item).await?;
        debug!(
            node = self.spec.name,
            provider = self.spec.provider,
            model = %model.settings().model,
            "Supplying chat model"
        );
        Ok(SupplyData::new(ConnectionData::Model(model)))
    }
}

/// The row for `name`.
pub fn find_model_node(name: &str) -> Option<&'static ModelNodeSpec> {
    MODEL_NODES.iter().find(|spec| spec.name == name)
}
