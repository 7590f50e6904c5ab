//! Human-readable reports

use comfy_table::{presets::UTF8_FULL, Cell, Color, Table};
use fingraph_core::SchemaRegistry;
use fingraph_etl::{LoadCount, RunReport, SchemaDrift};

fn table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(header);
    table
}

fn count_row(kind: &str, name: &str, count: &LoadCount) -> Vec<Cell> {
    let skipped = if count.skipped == 0 {
        Cell::new(0)
    } else {
        Cell::new(count.skipped).fg(Color::Yellow)
    };
    let reasons = count
        .skipped_by_kind
        .iter()
        .map(|(kind, n)| format!("{kind}: {n}"))
        .collect::<Vec<_>>()
        .join(", ");
    vec![
        Cell::new(kind),
        Cell::new(name),
        Cell::new(count.loaded),
        skipped,
        Cell::new(reasons),
    ]
}

/// Phase, attempts, and per-label and per-type counts.
pub fn run_table(report: &RunReport) -> Table {
    let mut table = table(vec!["", "Name", "Loaded", "Skipped", "Reasons"]);
    for (label, count) in &report.nodes {
        table.add_row(count_row("node", label, count));
    }
    for (rel_type, count) in &report.relationships {
        table.add_row(count_row("relationship", rel_type, count));
    }
    let phase = if report.succeeded() {
        Cell::new(report.phase).fg(Color::Green)
    } else {
        Cell::new(report.phase).fg(Color::Red)
    };
    table.add_row(vec![
        Cell::new("phase"),
        phase,
        Cell::new(report.nodes_loaded() + report.relationships_loaded()),
        Cell::new(report.rows_skipped()),
        Cell::new(format!("{} attempt(s)", report.attempts)),
    ]);
    table
}

/// Sampled skipped rows, one line each.
pub fn sample_lines(report: &RunReport) -> Vec<String> {
    report
        .nodes
        .iter()
        .chain(&report.relationships)
        .flat_map(|(name, count)| count.samples.iter().map(move |err| format!("{name}: {err}")))
        .collect()
}

/// Every difference, or a single line saying there is none.
pub fn drift_table(drift: &SchemaDrift) -> Table {
    let mut table = table(vec!["Drift", "Detail"]);
    if drift.is_empty() {
        table.add_row(vec![
            Cell::new("none").fg(Color::Green),
            Cell::new("graph matches the schema"),
        ]);
        return table;
    }
    let mut add = |kind: &str, detail: String| {
        table.add_row(vec![Cell::new(kind).fg(Color::Yellow), Cell::new(detail)]);
    };
    for label in &drift.missing_labels {
        add("missing label", label.clone());
    }
    for label in &drift.unexpected_labels {
        add("unexpected label", label.clone());
    }
    for rel_type in &drift.missing_relationships {
        add("missing relationship", rel_type.clone());
    }
    for rel_type in &drift.unexpected_relationships {
        add("unexpected relationship", rel_type.clone());
    }
    for (label, property) in &drift.unobserved_properties {
        add("unobserved property", format!("{label}.{property}"));
    }
    for (rel_type, start, end) in &drift.misdirected {
        add("misdirected", format!("({start})-[:{rel_type}]->({end})"));
    }
    table
}

/// Node mappings, then relationship mappings.
pub fn schema_tables(registry: &SchemaRegistry) -> (Table, Table) {
    let mut nodes = table(vec!["Label", "Table", "Key", "Properties"]);
    for spec in registry.nodes() {
        let properties = spec
            .properties
            .iter()
            .map(|m| format!("{} <- {} ({})", m.property, m.column, m.coercion))
            .collect::<Vec<_>>()
            .join("\n");
        nodes.add_row(vec![
            Cell::new(&spec.label),
            Cell::new(&spec.table),
            Cell::new(format!(
                "{} <- {} ({})",
                spec.key_property, spec.key_column, spec.key_coercion
            )),
            Cell::new(properties),
        ]);
    }

    let mut relationships = table(vec!["Type", "Table", "Pattern"]);
    for spec in registry.relationships() {
        let pattern = match registry.endpoints(spec) {
            Some((from, to)) => {
                let pattern = fingraph_core::EdgePattern::resolve(spec, from, to);
                format!(
                    "({})-[:{}]->({})",
                    pattern.start.label, pattern.rel_type, pattern.end.label
                )
            }
            None => format!("{} -> {}", spec.from_label, spec.to_label),
        };
        relationships.add_row(vec![
            Cell::new(&spec.rel_type),
            Cell::new(&spec.table),
            Cell::new(pattern),
        ]);
    }
    (nodes, relationships)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fingraph_etl::{Phase, RowError};
    use std::collections::BTreeMap;

    fn report() -> RunReport {
        let mut branch = LoadCount::default();
        branch.loaded = 2;
        branch.skip(
            RowError::MissingKey {
                line: 4,
                column: "branch_id".into(),
            },
            5,
        );
        RunReport {
            attempts: 2,
            phase: Phase::RelationshipsLoaded,
            nodes: BTreeMap::from([("Branch".to_string(), branch)]),
            relationships: BTreeMap::from([(
                "EMPLOYS".to_string(),
                LoadCount {
                    loaded: 7,
                    ..Default::default()
                },
            )]),
        }
    }

    #[test]
    fn run_table_lists_every_load_and_the_phase() {
        let rendered = run_table(&report()).to_string();
        assert!(rendered.contains("Branch"));
        assert!(rendered.contains("EMPLOYS"));
        assert!(rendered.contains("missing key: 1"));
        assert!(rendered.contains("relationships loaded"));
        assert!(rendered.contains("2 attempt(s)"));
    }

    #[test]
    fn samples_are_prefixed_with_their_load() {
        assert_eq!(
            sample_lines(&report()),
            vec!["Branch: line 4: key column branch_id is empty".to_string()]
        );
    }

    #[test]
    fn drift_table_names_each_difference() {
        let drift = SchemaDrift {
            missing_labels: vec!["Review".into()],
            misdirected: vec![("EMPLOYS".into(), "Employee".into(), "Branch".into())],
            ..Default::default()
        };
        let rendered = drift_table(&drift).to_string();
        assert!(rendered.contains("missing label"));
        assert!(rendered.contains("(Employee)-[:EMPLOYS]->(Branch)"));
        assert!(drift_table(&SchemaDrift::default())
            .to_string()
            .contains("graph matches the schema"));
    }

    #[test]
    fn schema_tables_show_stored_direction() {
        let (_, relationships) = schema_tables(&SchemaRegistry::finance());
        let rendered = relationships.to_string();
        assert!(rendered.contains("(Customer)-[:LINKED_WITH]->(Account)"));
        assert!(rendered.contains("(Branch)-[:EMPLOYS]->(Employee)"));
    }
}
