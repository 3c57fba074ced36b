//! `flowlm nodes` — List registered node types.

use flowlm_nodes::NodeRegistry;

pub async fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let registry = NodeRegistry::with_defaults();

    if json {
        println!("{}", serde_json::to_string_pretty(&registry.descriptions())?);
        return Ok(());
    }

    println!("FlowLM Nodes ({})", registry.len());
    println!();
    println!("  {:<30} {:<6} {:<26} Credentials", "Name", "Kind", "Output");
    for description in registry.descriptions() {
        let kind = match registry.get(&description.name) {
            Some(node) if !node.is_sub_node() => "root",
            _ => "sub",
        };
        let outputs: Vec<_> = description.outputs.iter().map(|o| o.as_str()).collect();
        println!(
            "  {:<30} {:<6} {:<26} {}",
            description.name,
            kind,
            outputs.join(", "),
            description.credential_names().join(", ")
        );
    }

    Ok(())
}
