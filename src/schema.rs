//! Canonical payload shapes for the fixed logical collections.
//!
//! The registry keeps heterogeneous backends structurally consistent: the
//! embedded backend fixes its columnar shape at table creation from these
//! defaults, and partial payloads are completed against them so no backend
//! fails on a missing field. Static process-wide state, never mutated.

use serde_json::{json, Map, Value};

pub const CODE_CHUNKS: &str = "code_chunks";
pub const DOCUMENTATION: &str = "documentation";
pub const DIAGRAMS: &str = "diagrams";
pub const MERGED_DOCUMENTATION: &str = "merged_documentation";
pub const MERGED_DIAGRAMS: &str = "merged_diagrams";

/// Sentinel row id reserved in every collection to force schema
/// materialization in backends that need an up-front shape. Never surfaced
/// in search results.
pub const SCHEMA_SENTINEL_ID: &str = "schema_init";

/// Declared payload shape for one logical collection.
#[derive(Debug, Clone)]
pub struct CollectionSchema {
    pub description: &'static str,
    /// Field names with their default values, in declaration order.
    pub fields: Vec<(&'static str, Value)>,
}

impl CollectionSchema {
    pub fn field_names(&self) -> Vec<&'static str> {
        self.fields.iter().map(|(name, _)| *name).collect()
    }

    /// Complete `payload` with this schema's defaults for every missing
    /// field. Extra caller fields are kept; backends with a fixed columnar
    /// shape persist only the declared ones.
    pub fn merge_defaults(&self, payload: &Map<String, Value>) -> Map<String, Value> {
        let mut merged = Map::new();
        for (name, default) in &self.fields {
            let value = payload.get(*name).cloned().unwrap_or_else(|| default.clone());
            merged.insert((*name).to_string(), value);
        }
        for (key, value) in payload {
            if !merged.contains_key(key) {
                merged.insert(key.clone(), value.clone());
            }
        }
        merged
    }
}

/// Look up the schema for a logical collection name.
///
/// Unrecognized names fall back to the generic code-chunk shape so ad-hoc
/// collections still get a usable columnar layout.
pub fn get_schema(collection: &str) -> CollectionSchema {
    match collection {
        DOCUMENTATION => CollectionSchema {
            description: "Generated documentation sections",
            fields: vec![
                ("file_path", json!("")),
                ("title", json!("")),
                ("section", json!("")),
                ("content", json!("")),
            ],
        },
        DIAGRAMS => CollectionSchema {
            description: "Generated architecture diagrams",
            fields: vec![
                ("name", json!("")),
                ("diagram_type", json!("")),
                ("description", json!("")),
                ("content", json!("")),
            ],
        },
        MERGED_DOCUMENTATION => CollectionSchema {
            description: "Documentation merged across generation runs",
            fields: vec![
                ("file_path", json!("")),
                ("title", json!("")),
                ("section", json!("")),
                ("content", json!("")),
                ("source_count", json!(0)),
            ],
        },
        MERGED_DIAGRAMS => CollectionSchema {
            description: "Diagrams merged across generation runs",
            fields: vec![
                ("name", json!("")),
                ("diagram_type", json!("")),
                ("description", json!("")),
                ("content", json!("")),
                ("source_count", json!(0)),
            ],
        },
        _ => CollectionSchema {
            description: "Indexed source code chunks",
            fields: vec![
                ("file_path", json!("")),
                ("language", json!("")),
                ("symbol", json!("")),
                ("start_line", json!(0)),
                ("end_line", json!(0)),
                ("content", json!("")),
            ],
        },
    }
}
