//! `observabilityLangfuse`: wraps any connected chat model with a Langfuse
//! handler.

use std::sync::Arc;

use async_trait::async_trait;
use flowlm_core::{CallbackHandler, ChatModel, CredentialBag};
use flowlm_observability::{LangfuseClient, LangfuseConfig, LangfuseHandler, TraceOptions};
use serde_json::Value;
use tracing::debug;

use crate::connections;
use crate::description::{NodeDescription, NodeParameter, Port};
use crate::error::NodeError;
use crate::host::{ConnectionData, ConnectionType, NodeContext, Params, SupplyData, http_client};
use crate::node::Node;

pub const NODE_NAME: &str = "observabilityLangfuse";

/// Prepend a Langfuse handler to `model` and merge the custom metadata,
/// plus `trace_name` when set, into its invocation metadata.
pub fn attach_langfuse(
    ctx: &dyn NodeContext,
    model: ChatModel,
    credentials: &CredentialBag,
    options: TraceOptions,
) -> Result<ChatModel, NodeError> {
    let mut metadata = options.metadata.clone();
    if let Some(trace_name) = &options.trace_name {
        metadata.insert("trace_name".into(), Value::String(trace_name.clone()));
    }

    let config = LangfuseConfig::from_credentials(credentials)?;
    let http = http_client(ctx, &config.base_url)?;
    let handler: Arc<dyn CallbackHandler> = Arc::new(LangfuseHandler::new(
        Arc::new(LangfuseClient::new(config, http)),
        options,
    ));
    Ok(model.with_handler_first(handler).with_metadata(metadata))
}

#[derive(Debug, Default)]
pub struct LangfuseObservabilityNode;

#[async_trait]
impl Node for LangfuseObservabilityNode {
    fn description(&self) -> NodeDescription {
        NodeDescription::new(
            NODE_NAME,
            "Langfuse Observability",
            "Trace every call of the connected chat model in Langfuse",
        )
        .input(Port::single("Model", ConnectionType::LanguageModel, true))
        .output(ConnectionType::LanguageModel)
        .credential("langfuseApi", true)
        .property(NodeParameter::collection(
            "langfuseMetadata",
            "Langfuse Metadata",
            vec![
                NodeParameter::string("sessionId", "Session ID", ""),
                NodeParameter::string("userId", "User ID", ""),
                NodeParameter::json("customMetadata", "Custom Metadata (JSON)", "{}"),
                NodeParameter::string("traceName", "Trace Name", ""),
                NodeParameter::string("tags", "Tags", "").describe("Comma-separated"),
            ],
        ))
    }

    async fn supply_data(
        &self,
        ctx: &dyn NodeContext,
        item: usize,
    ) -> Result<SupplyData, NodeError> {
        let credentials = ctx.get_credentials("langfuseApi").await?;
        let model = connections::model(ctx, ConnectionType::LanguageModel, item)
            .await
            .ok_or_else(|| {
                NodeError::MissingConnection(
                    "No language model connected. Please connect an LLM node to the input.".into(),
                )
            })?;

        let options =
            TraceOptions::from_value(&Params::new(ctx, item).collection("langfuseMetadata"));
        debug!(
            provider = model.provider_name(),
            handlers = ?model.callback_names(),
            "Wrapping model with Langfuse"
        );
        let wrapped = attach_langfuse(ctx, model, &credentials, options)?;
        Ok(SupplyData::new(ConnectionData::Model(wrapped)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_a_sub_node_with_one_required_model_input() {
        let node = LangfuseObservabilityNode;
        assert!(node.is_sub_node());
        let description = node.description();
        assert_eq!(description.inputs.len(), 1);
        assert!(description.inputs[0].required);
        assert_eq!(description.inputs[0].max_connections, Some(1));
        assert_eq!(description.outputs, vec![ConnectionType::LanguageModel]);
        let metadata = description.find_property("langfuseMetadata").unwrap();
        assert_eq!(metadata.child("customMetadata").unwrap().default, serde_json::json!("{}"));
    }
}
