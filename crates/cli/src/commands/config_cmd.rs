//! `flowlm config` — Configuration management commands.

use std::path::Path;

use flowlm_config::AppConfig;
use serde_json::Value;

pub async fn show(config: &AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut redacted = config.clone();
    for fields in redacted.credentials.values_mut() {
        for value in fields.values_mut() {
            *value = Value::String("***".into());
        }
    }
    println!("{}", toml::to_string_pretty(&redacted)?);
    Ok(())
}

pub async fn path(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", path.display());
    Ok(())
}

/// Write a default config file unless one exists.
pub async fn init(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut content = AppConfig::default_toml();
    content.push_str(
        "\n# [credentials.openAiApi]\n# apiKey = \"sk-...\"\n\
         \n# [credentials.langfuseApi]\n# baseUrl = \"https://cloud.langfuse.com\"\n\
         # publicKey = \"pk-lf-...\"\n# secretKey = \"sk-lf-...\"\n",
    );
    std::fs::write(path, content)?;
    println!("Wrote {}", path.display());
    Ok(())
}
