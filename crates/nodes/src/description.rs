//! Static node descriptions: what the host renders and validates against.

use flowlm_agent::DEFAULT_SYSTEM_MESSAGE;
use serde::Serialize;
use serde_json::{Value, json};

use crate::host::ConnectionType;

/// Display metadata, ports, credentials and the parameter schema of a node.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescription {
    /// Type name the host registers the node under
    pub name: String,
    pub display_name: String,
    pub description: String,
    pub version: u32,
    pub inputs: Vec<Port>,
    pub outputs: Vec<ConnectionType>,
    pub credentials: Vec<CredentialRequirement>,
    pub properties: Vec<NodeParameter>,
}

impl NodeDescription {
    pub fn new(name: &str, display_name: &str, description: &str) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            description: description.into(),
            version: 1,
            inputs: Vec::new(),
            outputs: Vec::new(),
            credentials: Vec::new(),
            properties: Vec::new(),
        }
    }

    pub fn input(mut self, port: Port) -> Self {
        self.inputs.push(port);
        self
    }

    pub fn inputs(mut self, ports: impl IntoIterator<Item = Port>) -> Self {
        self.inputs.extend(ports);
        self
    }

    pub fn output(mut self, connection: ConnectionType) -> Self {
        self.outputs.push(connection);
        self
    }

    pub fn credential(mut self, name: &str, required: bool) -> Self {
        self.credentials.push(CredentialRequirement {
            name: name.into(),
            required,
            show_for: None,
        });
        self
    }

    /// A credential only asked for when `parameter` has one of `values`.
    pub fn credential_when(mut self, name: &str, parameter: &str, values: &[&str]) -> Self {
        self.credentials.push(CredentialRequirement {
            name: name.into(),
            required: true,
            show_for: Some(DisplayCondition::new(parameter, values)),
        });
        self
    }

    pub fn property(mut self, parameter: NodeParameter) -> Self {
        self.properties.push(parameter);
        self
    }

    pub fn properties(mut self, parameters: impl IntoIterator<Item = NodeParameter>) -> Self {
        self.properties.extend(parameters);
        self
    }

    pub fn find_property(&self, name: &str) -> Option<&NodeParameter> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Credential types this node can ask the host for.
    pub fn credential_names(&self) -> Vec<&str> {
        self.credentials.iter().map(|c| c.name.as_str()).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Port {
    pub display_name: String,
    #[serde(rename = "type")]
    pub connection: ConnectionType,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

impl Port {
    pub fn main() -> Self {
        Self {
            display_name: String::new(),
            connection: ConnectionType::Main,
            required: false,
            max_connections: None,
        }
    }

    /// A port accepting exactly one sub-node.
    pub fn single(display_name: &str, connection: ConnectionType, required: bool) -> Self {
        Self {
            display_name: display_name.into(),
            connection,
            required,
            max_connections: Some(1),
        }
    }

    pub fn many(display_name: &str, connection: ConnectionType) -> Self {
        Self {
            display_name: display_name.into(),
            connection,
            required: false,
            max_connections: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRequirement {
    pub name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_for: Option<DisplayCondition>,
}

/// Show a parameter only when another parameter has one of `values`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayCondition {
    pub parameter: String,
    pub values: Vec<String>,
}

impl DisplayCondition {
    pub fn new(parameter: &str, values: &[&str]) -> Self {
        Self {
            parameter: parameter.into(),
            values: values.iter().map(|v| v.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ParameterKind {
    String,
    Number,
    Boolean,
    Options,
    Json,
    Collection,
    FixedCollection,
    ResourceLocator,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParameterOption {
    pub name: String,
    pub value: Value,
}

/// One entry of a node's parameter schema.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeParameter {
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub kind: ParameterKind,
    pub default: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub required: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<ParameterOption>,
    /// Fields of a collection parameter
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeParameter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_for: Option<DisplayCondition>,
}

impl NodeParameter {
    fn new(name: &str, display_name: &str, kind: ParameterKind, default: Value) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
            kind,
            default,
            description: None,
            required: false,
            options: Vec::new(),
            children: Vec::new(),
            show_for: None,
        }
    }

    pub fn string(name: &str, display_name: &str, default: &str) -> Self {
        Self::new(name, display_name, ParameterKind::String, json!(default))
    }

    pub fn number(name: &str, display_name: &str, default: impl Into<Value>) -> Self {
        Self::new(name, display_name, ParameterKind::Number, default.into())
    }

    pub fn boolean(name: &str, display_name: &str, default: bool) -> Self {
        Self::new(name, display_name, ParameterKind::Boolean, json!(default))
    }

    pub fn json(name: &str, display_name: &str, default: &str) -> Self {
        Self::new(name, display_name, ParameterKind::Json, json!(default))
    }

    /// A drop-down of `(display name, value)` choices.
    pub fn options(
        name: &str,
        display_name: &str,
        default: &str,
        choices: &[(&str, &str)],
    ) -> Self {
        let mut parameter = Self::new(name, display_name, ParameterKind::Options, json!(default));
        parameter.options = choices
            .iter()
            .map(|(label, value)| ParameterOption {
                name: (*label).into(),
                value: json!(value),
            })
            .collect();
        parameter
    }

    /// A model picked from a list or typed by id.
    pub fn model_locator(name: &str, display_name: &str, default: &str) -> Self {
        Self::new(
            name,
            display_name,
            ParameterKind::ResourceLocator,
            json!({ "mode": "list", "value": default }),
        )
    }

    pub fn collection(name: &str, display_name: &str, children: Vec<NodeParameter>) -> Self {
        let mut parameter = Self::new(name, display_name, ParameterKind::Collection, json!({}));
        parameter.children = children;
        parameter
    }

    /// A repeatable group, such as Helicone custom properties.
    pub fn fixed_collection(name: &str, display_name: &str, children: Vec<NodeParameter>) -> Self {
        let mut parameter =
            Self::new(name, display_name, ParameterKind::FixedCollection, json!({}));
        parameter.children = children;
        parameter
    }

    pub fn describe(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn show_when(mut self, parameter: &str, values: &[&str]) -> Self {
        self.show_for = Some(DisplayCondition::new(parameter, values));
        self
    }

    pub fn child(&self, name: &str) -> Option<&NodeParameter> {
        self.children.iter().find(|c| c.name == name)
    }
}

// --- Shared parameter sets ---

/// `promptType`, `systemMessage` and `text`, shared by every agent node.
pub fn prompt_parameters(text_default: &str) -> Vec<NodeParameter> {
    vec![
        NodeParameter::options(
            "promptType",
            "Prompt Source",
            "define",
            &[("Define Below", "define"), ("Take From Previous Node", "auto")],
        ),
        NodeParameter::string("systemMessage", "System Message", DEFAULT_SYSTEM_MESSAGE)
            .show_when("promptType", &["define"]),
        NodeParameter::string("text", "Text", text_default)
            .describe("The user message sent to the model")
            .show_when("promptType", &["define"]),
    ]
}

/// `maxIterations` and `returnIntermediateSteps`.
pub fn loop_option_parameters() -> Vec<NodeParameter> {
    vec![
        NodeParameter::number("maxIterations", "Max Iterations", 10)
            .describe("Maximum number of model round-trips when tools are connected"),
        NodeParameter::boolean("returnIntermediateSteps", "Return Intermediate Steps", false),
    ]
}
