//! Credential type catalogue.
//!
//! Every credential a node can ask for, built from shared field groups:
//! one group for the model vendor and one for the observability vendor.
//! Hosts use it to render forms; the CLI uses it to fill defaults and
//! check required fields before a run.

use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldKind {
    String,
    /// Masked in forms and in `Debug` output
    Secret,
    Boolean,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialField {
    pub name: &'static str,
    pub display_name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    /// Default as text; boolean fields use `"true"` / `"false"`
    pub default: &'static str,
}

impl CredentialField {
    pub fn default_value(&self) -> Value {
        match self.kind {
            FieldKind::Boolean => Value::Bool(self.default == "true"),
            _ => Value::String(self.default.to_string()),
        }
    }
}

const fn text(
    name: &'static str,
    display_name: &'static str,
    required: bool,
    default: &'static str,
) -> CredentialField {
    CredentialField {
        name,
        display_name,
        kind: FieldKind::String,
        required,
        default,
    }
}

const fn secret(name: &'static str, display_name: &'static str, required: bool) -> CredentialField {
    CredentialField {
        name,
        display_name,
        kind: FieldKind::Secret,
        required,
        default: "",
    }
}

const fn flag(name: &'static str, display_name: &'static str) -> CredentialField {
    CredentialField {
        name,
        display_name,
        kind: FieldKind::Boolean,
        required: false,
        default: "false",
    }
}

// ── Field groups ─────────────────────────────────────────────────────────

const API_KEY: &[CredentialField] = &[secret("apiKey", "API Key", true)];

const OPENAI: &[CredentialField] = &[
    secret("apiKey", "API Key", true),
    text("organizationId", "Organization ID (optional)", false, ""),
    text("url", "Base URL", false, "https://api.openai.com/v1"),
];
const OPENAI_OPTIONAL_URL: &[CredentialField] = &[
    secret("apiKey", "OpenAI API Key", true),
    text("url", "OpenAI Base URL (optional)", false, ""),
];
const OPENAI_COMPATIBLE: &[CredentialField] = &[
    secret("apiKey", "API Key", true),
    text("baseUrl", "Base URL", true, ""),
];

const ANTHROPIC: &[CredentialField] = &[
    secret("apiKey", "API Key", true),
    text("url", "Base URL", false, "https://api.anthropic.com"),
    flag("customHeaders", "Add Custom Headers"),
    text("headerName", "Header Name", false, ""),
    secret("headerValue", "Header Value", false),
];

const AZURE: &[CredentialField] = &[
    secret("apiKey", "API Key", true),
    text("resourceName", "Resource Name", true, ""),
    text("apiVersion", "API Version", true, "2024-02-15-preview"),
    text("endpoint", "Endpoint (optional)", false, ""),
];
const AZURE_WITH_LANGFUSE: &[CredentialField] = &[
    secret("apiKey", "Azure OpenAI API Key", true),
    text("resourceName", "Resource Name", true, ""),
    text("apiVersion", "API Version", false, "2024-08-01-preview"),
    text("endpoint", "Custom Endpoint", false, ""),
];
const AZURE_ENDPOINT: &[CredentialField] = &[
    secret("apiKey", "Azure OpenAI API Key", true),
    text("endpoint", "Azure Endpoint", true, ""),
    text("apiVersion", "API Version", false, "2024-02-15-preview"),
];
const AZURE_RESOURCE: &[CredentialField] = &[
    secret("apiKey", "Azure OpenAI API Key", true),
    text("resourceName", "Azure Resource Name", true, ""),
    text("apiVersion", "API Version", true, "2024-02-15-preview"),
];

const AWS: &[CredentialField] = &[
    text("region", "AWS Region", true, "us-east-1"),
    secret("accessKeyId", "Access Key ID", true),
    secret("secretAccessKey", "Secret Access Key", true),
    secret("sessionToken", "Session Token (optional)", false),
];
const AWS_KEYS: &[CredentialField] = &[
    text("accessKeyId", "AWS Access Key ID", true, ""),
    secret("secretAccessKey", "AWS Secret Access Key", true),
    text("region", "AWS Region", true, "us-east-1"),
];

const GEMINI_WITH_BASE_URL: &[CredentialField] = &[
    secret("apiKey", "API Key", true),
    text("baseUrl", "Base URL", false, "https://generativelanguage.googleapis.com"),
];

const OLLAMA: &[CredentialField] = &[
    text("baseUrl", "Base URL", true, "http://localhost:11434"),
    secret("apiKey", "API Key (optional)", false),
];
const OLLAMA_BASE_URL: &[CredentialField] =
    &[text("baseUrl", "Ollama Base URL", true, "http://localhost:11434")];
const OLLAMA_OPENAI_URL: &[CredentialField] =
    &[text("baseUrl", "Ollama Base URL", true, "http://localhost:11434/v1")];

const VLLM: &[CredentialField] = &[
    text("baseUrl", "vLLM Base URL", true, "http://localhost:8000/v1"),
    secret("apiKey", "API Key (optional)", false),
];

const QDRANT: &[CredentialField] = &[
    text("qdrantUrl", "Qdrant URL", true, "http://localhost:6333"),
    secret("qdrantApiKey", "Qdrant API Key", false),
];
const QDRANT_OPENAI: &[CredentialField] = &[
    text("qdrantUrl", "Qdrant URL", true, ""),
    secret("qdrantApiKey", "Qdrant API Key", true),
    secret("openaiApiKey", "OpenAI API Key", true),
];

const LANGFUSE_PREFIXED: &[CredentialField] = &[
    text("langfuseBaseUrl", "Langfuse Base URL", true, "https://cloud.langfuse.com"),
    secret("langfusePublicKey", "Langfuse Public Key", true),
    secret("langfuseSecretKey", "Langfuse Secret Key", true),
];
const LANGFUSE: &[CredentialField] = &[
    text("baseUrl", "Langfuse Base URL", true, "https://cloud.langfuse.com"),
    secret("publicKey", "Langfuse Public Key", true),
    secret("secretKey", "Langfuse Secret Key", true),
];

const PHOENIX_PREFIXED: &[CredentialField] = &[
    text("phoenixCollectorUrl", "Phoenix Collector URL", true, "http://localhost:6006/v1/traces"),
    text("phoenixProjectName", "Project Name", true, "default"),
    secret("phoenixApiKey", "Phoenix API Key (optional)", false),
];
const PHOENIX: &[CredentialField] = &[
    text("collectorUrl", "Phoenix Collector URL", true, "http://localhost:6006/v1/traces"),
    text("projectName", "Project Name", true, "default"),
    secret("apiKey", "API Key (optional)", false),
];

const HELICONE: &[CredentialField] = &[secret("heliconeApiKey", "Helicone API Key", true)];

// ── Catalogue ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
pub struct CredentialType {
    pub name: &'static str,
    pub display_name: &'static str,
    groups: &'static [&'static [CredentialField]],
}

const fn cred(
    name: &'static str,
    display_name: &'static str,
    groups: &'static [&'static [CredentialField]],
) -> CredentialType {
    CredentialType {
        name,
        display_name,
        groups,
    }
}

impl CredentialType {
    /// Fields in form order.
    pub fn fields(&self) -> impl Iterator<Item = &'static CredentialField> + '_ {
        self.groups.iter().flat_map(|group| group.iter())
    }

    pub fn field(&self, name: &str) -> Option<&'static CredentialField> {
        self.fields().find(|f| f.name == name)
    }

    /// `stored` with every absent or blank field replaced by its default.
    pub fn with_defaults(&self, stored: &Map<String, Value>) -> Map<String, Value> {
        let mut fields = stored.clone();
        for field in self.fields() {
            let blank = match fields.get(field.name) {
                None | Some(Value::Null) => true,
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(_) => false,
            };
            if blank && !field.default.is_empty() {
                fields.insert(field.name.into(), field.default_value());
            }
        }
        fields
    }

    /// Required fields that are absent or blank in `stored`.
    pub fn missing_required(&self, stored: &Map<String, Value>) -> Vec<&'static str> {
        let filled = self.with_defaults(stored);
        self.fields()
            .filter(|f| f.required)
            .filter(|f| match filled.get(f.name) {
                Some(Value::String(s)) => s.trim().is_empty(),
                Some(Value::Bool(_)) => false,
                _ => true,
            })
            .map(|f| f.name)
            .collect()
    }
}

impl Serialize for CredentialType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("CredentialType", 3)?;
        s.serialize_field("name", self.name)?;
        s.serialize_field("displayName", self.display_name)?;
        s.serialize_field("properties", &self.fields().collect::<Vec<_>>())?;
        s.end()
    }
}

pub static CREDENTIAL_TYPES: &[CredentialType] = &[
    // Model vendors
    cred("openAiApi", "OpenAI", &[OPENAI]),
    cred("anthropicApi", "Anthropic", &[ANTHROPIC]),
    cred("azureOpenAiApi", "Azure OpenAI", &[AZURE]),
    cred("awsBedrockApi", "AWS Bedrock", &[AWS]),
    cred("cohereApi", "Cohere", &[API_KEY]),
    cred("googleGeminiApi", "Google Gemini", &[API_KEY]),
    cred("grokApi", "xAI Grok", &[API_KEY]),
    cred("groqApi", "Groq", &[API_KEY]),
    cred("mistralApi", "Mistral AI", &[API_KEY]),
    cred("ollamaApi", "Ollama", &[OLLAMA]),
    cred("vllmApi", "vLLM", &[VLLM]),
    // Model vendors with Langfuse
    cred("anthropicApiWithLangfuseApi", "Anthropic + Langfuse", &[ANTHROPIC, LANGFUSE_PREFIXED]),
    cred("awsBedrockApiWithLangfuseApi", "AWS Bedrock + Langfuse", &[AWS, LANGFUSE_PREFIXED]),
    cred(
        "azureOpenAiApiWithLangfuseApi",
        "Azure OpenAI + Langfuse",
        &[AZURE_WITH_LANGFUSE, LANGFUSE_PREFIXED],
    ),
    cred("cohereApiWithLangfuseApi", "Cohere + Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred(
        "googleGeminiApiWithLangfuseApi",
        "Google Gemini + Langfuse",
        &[GEMINI_WITH_BASE_URL, LANGFUSE_PREFIXED],
    ),
    cred("groqApiWithLangfuseApi", "Groq + Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("mistralApiWithLangfuseApi", "Mistral AI + Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("ollamaApiWithLangfuseApi", "Ollama + Langfuse", &[OLLAMA, LANGFUSE_PREFIXED]),
    cred("vllmApiWithLangfuseApi", "vLLM + Langfuse", &[VLLM, LANGFUSE_PREFIXED]),
    cred("anthropicLangfuseApi", "Anthropic Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("azureOpenAiLangfuseApi", "Azure OpenAI Langfuse", &[AZURE_ENDPOINT, LANGFUSE_PREFIXED]),
    cred("bedrockLangfuseApi", "Bedrock Langfuse", &[AWS_KEYS, LANGFUSE_PREFIXED]),
    cred("geminiLangfuseApi", "Gemini Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("grokLangfuseApi", "xAI Grok Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("groqLangfuseApi", "Groq Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("mistralLangfuseApi", "Mistral Langfuse", &[API_KEY, LANGFUSE_PREFIXED]),
    cred("ollamaLangfuseApi", "Ollama Langfuse", &[OLLAMA_BASE_URL, LANGFUSE_PREFIXED]),
    cred("openAiLangfuseApi", "OpenAI Langfuse", &[OPENAI_OPTIONAL_URL, LANGFUSE_PREFIXED]),
    cred(
        "openAiCompatibleLangfuseApi",
        "OpenAI Compatible Langfuse",
        &[OPENAI_COMPATIBLE, LANGFUSE_PREFIXED],
    ),
    cred("vllmLangfuseApi", "vLLM Langfuse", &[VLLM, LANGFUSE_PREFIXED]),
    // Model vendors with Helicone
    cred("openAiHeliconeApi", "OpenAI Helicone", &[API_KEY, HELICONE]),
    cred("anthropicHeliconeApi", "Anthropic Helicone", &[API_KEY, HELICONE]),
    cred("azureOpenAiHeliconeApi", "Azure OpenAI Helicone", &[AZURE_RESOURCE, HELICONE]),
    cred("geminiHeliconeApi", "Gemini Helicone", &[API_KEY, HELICONE]),
    cred("groqHeliconeApi", "Groq Helicone", &[API_KEY, HELICONE]),
    cred("mistralHeliconeApi", "Mistral Helicone", &[API_KEY, HELICONE]),
    cred(
        "openAiCompatibleHeliconeApi",
        "OpenAI Compatible Helicone",
        &[OPENAI_COMPATIBLE, HELICONE],
    ),
    // Model vendors with Phoenix
    cred("openAiPhoenixApi", "OpenAI Phoenix", &[OPENAI_OPTIONAL_URL, PHOENIX_PREFIXED]),
    cred("anthropicPhoenixApi", "Anthropic Phoenix", &[API_KEY, PHOENIX_PREFIXED]),
    cred("azureOpenAiPhoenixApi", "Azure OpenAI Phoenix", &[AZURE_ENDPOINT, PHOENIX_PREFIXED]),
    cred("bedrockPhoenixApi", "Bedrock Phoenix", &[AWS_KEYS, PHOENIX_PREFIXED]),
    cred("groqPhoenixApi", "Groq Phoenix", &[API_KEY, PHOENIX_PREFIXED]),
    cred("ollamaPhoenixApi", "Ollama Phoenix", &[OLLAMA_OPENAI_URL, PHOENIX_PREFIXED]),
    cred(
        "openAiCompatiblePhoenixApi",
        "OpenAI Compatible Phoenix",
        &[OPENAI_COMPATIBLE, PHOENIX_PREFIXED],
    ),
    cred("vllmPhoenixApi", "vLLM Phoenix", &[VLLM, PHOENIX_PREFIXED]),
    // Observability only
    cred("langfuseApi", "Langfuse", &[LANGFUSE]),
    cred("langfuseObsApi", "Langfuse (Observability)", &[LANGFUSE]),
    cred("phoenixApi", "Arize Phoenix", &[PHOENIX]),
    // Vector search
    cred("qdrantOpenAiLangfuseApi", "Qdrant + Langfuse", &[QDRANT, LANGFUSE_PREFIXED]),
    cred("qdrantPhoenixApi", "Qdrant + Phoenix", &[QDRANT, PHOENIX_PREFIXED]),
    cred("qdrantHeliconeApi", "Qdrant + OpenAI + Helicone", &[QDRANT_OPENAI, HELICONE]),
];

pub fn find_credential_type(name: &str) -> Option<&'static CredentialType> {
    CREDENTIAL_TYPES.iter().find(|c| c.name == name)
}
