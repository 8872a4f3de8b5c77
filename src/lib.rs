//! Tablegraph
//!
//! A schema-driven object-graph engine: a declarative schema describes
//! typed classes, attributes, and relationships; instances form an
//! in-memory graph that round-trips losslessly through several tabular and
//! structured file formats.
//!
//! ## Features
//!
//! - **Typed object graph**: instances live in a flat arena with a
//!   symmetric edge index, so bidirectional relationships stay consistent
//!   after every mutation and cyclic structures involve no pointer cycles
//! - **Schema validation**: definitions are checked when the registry is
//!   built; datasets are checked by an accumulating validator that never
//!   stops at the first error
//! - **Format-agnostic codec**: one reader/writer core over a portable
//!   grid-of-tables contract, with workbook (.xlsx), delimited
//!   (csv/tsv, per-file or multi-block), and JSON document backends
//! - **Canonical ordering**: normalization gives every relationship
//!   collection a reproducible order, making serialized output and
//!   structural diffs independent of insertion order
//!
//! ## Pipeline
//!
//! ```text
//! schema -> Reader -> ObjectGraph -> Validator
//!                          |
//!                     Normalizer -> Writer / Differ
//! ```

pub mod codec;
pub mod config;
pub mod diff;
pub mod error;
pub mod graph;
pub mod kinds;
pub mod normalize;
pub mod registry;
pub mod report;
pub mod schema;
pub mod validate;
pub mod value;

pub use codec::{CellGrid, Format, Reader, TableSet, Writer};
pub use config::CodecConfig;
pub use diff::{DiffEntry, DiffReport, Differ};
pub use error::{EngineError, GraphError, Result, SchemaError};
pub use graph::{Instance, InstanceId, ObjectGraph};
pub use normalize::Normalizer;
pub use registry::SchemaRegistry;
pub use report::{LoadIssue, LoadReport, Severity};
pub use schema::{
    AttributeDef, AttributeKind, Cardinality, ClassDef, Constraints, RelationKind, ScalarKind,
    TableLayout,
};
pub use validate::{ValidationMessage, ValidationReport, Validator};
pub use value::Value;
