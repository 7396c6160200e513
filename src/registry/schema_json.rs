//! JSON Schema fragments for tool descriptors. Tier 1 schemas are fixed;
//! Tier 2 schemas are derived from a live `TableDetail` each time a table is
//! enabled (SPEC_FULL.md §4.10).

use serde_json::{json, Map, Value as Json};

use crate::dialect::LogicalType;
use crate::schema::TableDetail;

pub fn object_schema(properties: &[(&str, Json)], required: &[&str]) -> Map<String, Json> {
    let mut props = Map::new();
    for (name, schema) in properties {
        props.insert((*name).to_string(), schema.clone());
    }
    let mut obj = Map::new();
    obj.insert("type".to_string(), json!("object"));
    obj.insert("properties".to_string(), Json::Object(props));
    if !required.is_empty() {
        obj.insert("required".to_string(), json!(required));
    }
    obj
}

pub fn string_prop(description: Option<&str>) -> Json {
    match description {
        Some(d) => json!({"type": "string", "description": d}),
        None => json!({"type": "string"}),
    }
}

pub fn string_array_prop() -> Json {
    json!({"type": "array", "items": {"type": "string"}})
}

pub fn integer_prop() -> Json {
    json!({"type": "integer"})
}

pub fn object_prop() -> Json {
    json!({"type": "object"})
}

/// The filter argument accepts either the compact string grammar or the
/// JSON operator-object grammar (`$eq`/`$gt`/... — SPEC_FULL.md §4.6).
pub fn filter_prop() -> Json {
    json!({
        "oneOf": [
            {"type": "string"},
            {"type": "object"},
        ]
    })
}

pub fn logical_type_schema(lt: &LogicalType) -> Json {
    match lt {
        LogicalType::String | LogicalType::Datetime | LogicalType::Binary => json!({"type": "string"}),
        LogicalType::Integer => json!({"type": "integer"}),
        LogicalType::Decimal => json!({"type": "number"}),
        LogicalType::Boolean => json!({"type": "boolean"}),
        LogicalType::Json => json!({"type": "object"}),
        LogicalType::Array(inner) => json!({"type": "array", "items": logical_type_schema(inner)}),
    }
}

/// `columns` property enumerating the table's concrete column names.
pub fn table_columns_enum(detail: &TableDetail) -> Json {
    let names: Vec<&str> = detail.columns.iter().map(|c| c.name.as_str()).collect();
    json!({
        "type": "array",
        "items": {"type": "string", "enum": names},
    })
}

pub fn table_pk_properties(detail: &TableDetail) -> Vec<(&str, Json)> {
    detail
        .primary_key
        .iter()
        .filter_map(|pk| {
            detail
                .columns
                .iter()
                .find(|c| &c.name == pk)
                .map(|c| (c.name.as_str(), logical_type_schema(&c.logical_type)))
        })
        .collect()
}

pub fn table_row_properties(detail: &TableDetail) -> Vec<(String, Json)> {
    detail
        .columns
        .iter()
        .map(|c| (c.name.clone(), logical_type_schema(&c.logical_type)))
        .collect()
}

/// `rows` property: an array of objects shaped by the table's columns.
pub fn row_array_prop(columns: &[(String, Json)]) -> Json {
    let mut props = Map::new();
    for (name, schema) in columns {
        props.insert(name.clone(), schema.clone());
    }
    json!({
        "type": "array",
        "items": {"type": "object", "properties": Json::Object(props)},
    })
}
