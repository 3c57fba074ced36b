//! Credential bags — the decrypted fields of one stored credential.
//!
//! A bag is fetched from the host per item and read, never mutated. Values
//! are plain JSON because hosts store booleans (`customHeaders`) next to
//! strings. `Debug` output masks every field that looks secret.

use serde_json::{Map, Value};

use crate::error::CredentialError;

#[derive(Clone, Default)]
pub struct CredentialBag {
    credential_type: String,
    fields: Map<String, Value>,
}

const SECRET_MARKERS: [&str; 5] = ["key", "secret", "token", "password", "value"];

fn is_secret(field: &str) -> bool {
    let lower = field.to_ascii_lowercase();
    SECRET_MARKERS.iter().any(|m| lower.contains(m))
}

impl std::fmt::Debug for CredentialBag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in &self.fields {
            if is_secret(k) && !v.as_str().is_some_and(str::is_empty) {
                map.entry(k, &"***");
            } else {
                map.entry(k, v);
            }
        }
        map.finish()?;
        write!(f, " ({})", self.credential_type)
    }
}

impl CredentialBag {
    pub fn new(credential_type: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            credential_type: credential_type.into(),
            fields,
        }
    }

    pub fn credential_type(&self) -> &str {
        &self.credential_type
    }

    /// A non-empty string field.
    pub fn string(&self, field: &str) -> Option<&str> {
        self.fields
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }

    /// A non-empty string field, or `default`.
    pub fn string_or(&self, field: &str, default: &str) -> String {
        self.string(field).unwrap_or(default).to_string()
    }

    /// A string field that must be present.
    pub fn require(&self, field: &str) -> Result<&str, CredentialError> {
        self.string(field).ok_or_else(|| CredentialError::MissingField {
            credential_type: self.credential_type.clone(),
            field: field.to_string(),
        })
    }

    /// A boolean flag; absent means false.
    pub fn flag(&self, field: &str) -> bool {
        match self.fields.get(field) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn bag() -> CredentialBag {
        let Value::Object(fields) = json!({
            "apiKey": "sk-live-123",
            "url": "https://api.openai.com/v1",
            "organizationId": "",
            "customHeaders": true,
        }) else {
            unreachable!()
        };
        CredentialBag::new("openAiApi", fields)
    }

    #[test]
    fn empty_strings_count_as_absent() {
        let bag = bag();
        assert_eq!(bag.string("organizationId"), None);
        assert_eq!(bag.string_or("organizationId", "org"), "org");
    }

    #[test]
    fn require_reports_type_and_field() {
        let err = bag().require("resourceName").unwrap_err();
        assert!(err.to_string().contains("openAiApi"));
        assert!(err.to_string().contains("resourceName"));
    }

    #[test]
    fn debug_masks_secrets() {
        let text = format!("{:?}", bag());
        assert!(!text.contains("sk-live-123"));
        assert!(text.contains("api.openai.com"));
    }

    #[test]
    fn flags_accept_bool_and_string() {
        assert!(bag().flag("customHeaders"));
        assert!(!bag().flag("missing"));
    }
}
