//! Structured hierarchical document backend (JSON)
//!
//! The document is a top-level mapping from class name to an ordered
//! sequence of per-instance mappings from attribute name to value.
//! Relational values render as primary-key strings (to-one) or ordered
//! arrays of primary-key strings (to-many); numeric and boolean scalars
//! render natively. Blank cells are omitted from instance maps.

use std::fs;
use std::path::Path;

use serde_json::{json, Map, Value as Json};
use tracing::debug;

use super::{transpose, CellGrid, TableSet};
use crate::config::CodecConfig;
use crate::error::Result;
use crate::registry::SchemaRegistry;
use crate::schema::{AttributeKind, ClassDef, ScalarKind, TableLayout};

/// Write a grid-of-tables as a JSON document
pub fn encode(
    path: &Path,
    tables: &TableSet,
    registry: &SchemaRegistry,
    config: &CodecConfig,
) -> Result<()> {
    let mut document = Map::new();
    for grid in &tables.grids {
        let class = registry.class_by_any_name(&grid.name);
        let untransposed;
        let rows: &[Vec<String>] =
            if class.map(|c| c.layout) == Some(TableLayout::Column) {
                untransposed = transpose(&grid.rows);
                &untransposed
            } else {
                &grid.rows
            };
        if rows.is_empty() {
            document.insert(grid.name.clone(), json!([]));
            continue;
        }

        let header = &rows[0];
        let data_start = if rows.len() > 1
            && rows[1]
                .first()
                .is_some_and(|c| c.trim_start().starts_with('#'))
        {
            2
        } else {
            1
        };

        let mut instances = Vec::new();
        for row in &rows[data_start..] {
            if row.iter().all(|c| c.trim().is_empty()) {
                continue;
            }
            let mut object = Map::new();
            for (ci, name) in header.iter().enumerate() {
                let cell = row.get(ci).map(|c| c.trim()).unwrap_or("");
                if cell.is_empty() {
                    continue;
                }
                object.insert(name.clone(), typed_cell(class, name, cell, config));
            }
            instances.push(Json::Object(object));
        }
        document.insert(grid.name.clone(), Json::Array(instances));
    }

    fs::write(path, serde_json::to_string_pretty(&Json::Object(document))?)?;
    debug!(grids = tables.grids.len(), path = %path.display(), "tree document encoded");
    Ok(())
}

/// Read a JSON document into a grid-of-tables
pub fn decode(path: &Path, registry: &SchemaRegistry, config: &CodecConfig) -> Result<TableSet> {
    let text = fs::read_to_string(path)?;
    let document: Json = serde_json::from_str(&text)?;
    let Json::Object(document) = document else {
        return Ok(TableSet::default());
    };

    let mut tables = TableSet::default();
    for (name, entry) in document {
        let Json::Array(instances) = entry else {
            continue;
        };

        // header = union of keys; serde_json maps iterate sorted, so the
        // order is deterministic and the reader binds columns by name anyway
        let mut header: Vec<String> = Vec::new();
        for instance in &instances {
            if let Json::Object(object) = instance {
                for key in object.keys() {
                    if !header.contains(key) {
                        header.push(key.clone());
                    }
                }
            }
        }
        header.sort();

        let mut rows = vec![header.clone()];
        for instance in &instances {
            let Json::Object(object) = instance else {
                continue;
            };
            rows.push(
                header
                    .iter()
                    .map(|key| object.get(key).map(|v| cell_text(v, config)).unwrap_or_default())
                    .collect(),
            );
        }

        let class = registry.class_by_any_name(&name);
        let rows = if class.map(|c| c.layout) == Some(TableLayout::Column) {
            transpose(&rows)
        } else {
            rows
        };
        tables.push(CellGrid { name, rows });
    }
    debug!(grids = tables.grids.len(), path = %path.display(), "tree document decoded");
    Ok(tables)
}

/// Render a cell with its native JSON type: numbers and booleans for the
/// matching scalar kinds, arrays for lists and to-many relations, strings
/// for everything else
fn typed_cell(class: Option<&ClassDef>, column: &str, cell: &str, config: &CodecConfig) -> Json {
    let kind = class.and_then(|c| column_kind(c, column));
    match &kind {
        Some(ColumnKind::Scalar(scalar)) => scalar_json(scalar, cell),
        Some(ColumnKind::Many) | Some(ColumnKind::ListOf(_)) => {
            let items: Vec<Json> = cell
                .split(config.split_char())
                .map(|part| part.trim())
                .filter(|part| !part.is_empty())
                .map(|part| match &kind {
                    Some(ColumnKind::ListOf(scalar)) => scalar_json(scalar, part),
                    _ => Json::String(part.to_string()),
                })
                .collect();
            Json::Array(items)
        }
        _ => Json::String(cell.to_string()),
    }
}

enum ColumnKind {
    Scalar(ScalarKind),
    ListOf(ScalarKind),
    /// To-many relation: ordered array of primary-key strings
    Many,
}

fn column_kind(class: &ClassDef, column: &str) -> Option<ColumnKind> {
    if let Some(attr) = class.attribute(column) {
        return Some(match &attr.kind {
            AttributeKind::Scalar(kind) => ColumnKind::Scalar(kind.clone()),
            AttributeKind::List(kind) => ColumnKind::ListOf(kind.clone()),
            AttributeKind::Relation(rel) if rel.cardinality.is_to_many() => ColumnKind::Many,
            AttributeKind::Relation(_) => ColumnKind::Scalar(ScalarKind::String),
        });
    }
    // dotted columns of inline targets are plain scalar text
    if column.contains('.') {
        return Some(ColumnKind::Scalar(ScalarKind::String));
    }
    None
}

fn scalar_json(kind: &ScalarKind, cell: &str) -> Json {
    match kind {
        ScalarKind::Integer => cell
            .parse::<i64>()
            .map(Json::from)
            .unwrap_or_else(|_| Json::String(cell.to_string())),
        ScalarKind::Float => cell
            .parse::<f64>()
            .ok()
            .and_then(|f| serde_json::Number::from_f64(f).map(Json::Number))
            .unwrap_or_else(|| Json::String(cell.to_string())),
        ScalarKind::Boolean => match cell {
            "true" => Json::Bool(true),
            "false" => Json::Bool(false),
            _ => Json::String(cell.to_string()),
        },
        _ => Json::String(cell.to_string()),
    }
}

fn cell_text(value: &Json, config: &CodecConfig) -> String {
    match value {
        Json::Null => String::new(),
        Json::Bool(b) => b.to_string(),
        Json::Number(n) => n.to_string(),
        Json::String(s) => s.clone(),
        Json::Array(items) => items
            .iter()
            .map(|v| cell_text(v, config))
            .collect::<Vec<_>>()
            .join(&config.list_delimiter),
        Json::Object(_) => String::new(),
    }
}
