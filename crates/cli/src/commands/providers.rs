//! `flowlm providers` — List supported LLM providers.

use flowlm_providers::PROVIDERS;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("Supported LLM Providers");
    println!();
    println!("  {:<18} {:<16} {:<12} {:<44} Default model", "Id", "Name", "Protocol", "Base URL");
    for spec in PROVIDERS {
        let base_url = if spec.default_base_url.is_empty() {
            "(from credential)"
        } else {
            spec.default_base_url
        };
        println!(
            "  {:<18} {:<16} {:<12} {:<44} {}",
            spec.id,
            spec.display_name,
            format!("{:?}", spec.protocol),
            base_url,
            spec.default_model
        );
    }
    println!();
    println!("  Proxy variables: HTTPS_PROXY, HTTP_PROXY, ALL_PROXY, NO_PROXY");

    Ok(())
}
