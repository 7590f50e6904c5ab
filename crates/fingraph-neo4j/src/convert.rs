//! Conversions from loader rows to Bolt parameters

use fingraph_core::{EdgeRow, NodeKey, NodeRow, PropertyValue};
use neo4rs::BoltType;
use std::collections::HashMap;

pub(crate) fn property(value: &PropertyValue) -> BoltType {
    match value {
        PropertyValue::String(s) => s.clone().into(),
        PropertyValue::Integer(i) => (*i).into(),
        PropertyValue::Float(f) => (*f).into(),
        PropertyValue::Date(d) => (*d).into(),
        PropertyValue::DateTime(dt) => (*dt).into(),
    }
}

pub(crate) fn key(key: &NodeKey) -> BoltType {
    property(&PropertyValue::from(key.clone()))
}

/// `{key, props}` per row, matching `cypher::merge_nodes`.
pub(crate) fn node_rows(rows: &[NodeRow]) -> Vec<HashMap<String, BoltType>> {
    rows.iter()
        .map(|row| {
            let props: HashMap<String, BoltType> = row
                .properties
                .iter()
                .map(|(name, value)| (name.to_string(), property(value)))
                .collect();
            let mut m: HashMap<String, BoltType> = HashMap::new();
            m.insert("key".to_string(), key(&row.key));
            m.insert("props".to_string(), props.into());
            m
        })
        .collect()
}

/// `{idx, start, end}` per row, matching `cypher::merge_relationships`.
pub(crate) fn edge_rows(rows: &[EdgeRow]) -> Vec<HashMap<String, BoltType>> {
    rows.iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut m: HashMap<String, BoltType> = HashMap::new();
            m.insert("idx".to_string(), (idx as i64).into());
            m.insert("start".to_string(), key(&row.start));
            m.insert("end".to_string(), key(&row.end));
            m
        })
        .collect()
}
