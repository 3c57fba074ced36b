//! `flowlm credentials` — List credential types and what the config holds.

use flowlm_config::AppConfig;
use flowlm_nodes::CREDENTIAL_TYPES;
use flowlm_nodes::credentials::FieldKind;

pub async fn run(config: &AppConfig, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    println!("Credential Types ({})", CREDENTIAL_TYPES.len());
    println!();

    for credential in CREDENTIAL_TYPES {
        let status = match config.credentials.get(credential.name) {
            None => "-".to_string(),
            Some(stored) => match credential.missing_required(stored).as_slice() {
                [] => "configured".to_string(),
                missing => format!("missing {}", missing.join(", ")),
            },
        };
        println!("  {:<34} {:<40} {}", credential.name, credential.display_name, status);

        if verbose {
            for field in credential.fields() {
                let mut notes = Vec::new();
                if field.required {
                    notes.push("required".to_string());
                }
                if field.kind == FieldKind::Secret {
                    notes.push("secret".to_string());
                }
                if !field.default.is_empty() {
                    notes.push(format!("default {}", field.default));
                }
                println!("      {:<30} {}", field.name, notes.join(", "));
            }
        }
    }

    let unknown: Vec<_> = config
        .credentials
        .keys()
        .filter(|name| !CREDENTIAL_TYPES.iter().any(|c| c.name == name.as_str()))
        .collect();
    if !unknown.is_empty() {
        println!();
        for name in unknown {
            println!("  warning: [credentials.{name}] is not a known credential type");
        }
    }

    Ok(())
}
