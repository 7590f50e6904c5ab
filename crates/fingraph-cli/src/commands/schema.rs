use anyhow::Result;
use fingraph_config::EtlConfig;
use fingraph_core::{cypher, EdgePattern, NodeRef};
use std::process::ExitCode;

use super::load_registry;
use crate::output::schema_tables;

pub fn execute(config: &EtlConfig, show_cypher: bool) -> Result<ExitCode> {
    let registry = load_registry(config)?;

    if !show_cypher {
        let (nodes, relationships) = schema_tables(&registry);
        println!("Nodes\n{nodes}\n");
        println!("Relationships\n{relationships}");
        return Ok(ExitCode::SUCCESS);
    }

    for spec in registry.nodes() {
        println!("{};", cypher::unique_constraint(&spec.label, &spec.key_property).text);
    }
    for spec in registry.nodes() {
        println!("\n// {} <- {}", spec.label, spec.table);
        println!("{};", cypher::merge_nodes(&NodeRef::from(spec)).text);
    }
    for spec in registry.relationships() {
        if let Some((from, to)) = registry.endpoints(spec) {
            println!("\n// {} <- {}", spec.rel_type, spec.table);
            println!(
                "{};",
                cypher::merge_relationships(&EdgePattern::resolve(spec, from, to)).text
            );
        }
    }
    Ok(ExitCode::SUCCESS)
}
