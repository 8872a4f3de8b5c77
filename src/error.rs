//! Error types for the object-graph engine

use thiserror::Error;

use crate::schema::Cardinality;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Schema definition errors
///
/// Raised while building a [`SchemaRegistry`](crate::registry::SchemaRegistry),
/// before any I/O. A registry that fails to build cannot be used to load or
/// write data.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("duplicate class definition: {0}")]
    DuplicateClass(String),

    #[error("class {class}: attribute '{attribute}' targets unknown class '{target}'")]
    UnknownTarget {
        class: String,
        attribute: String,
        target: String,
    },

    #[error("class {class}: attribute '{attribute}' names inverse '{target}.{inverse}', which is not defined")]
    UnknownInverse {
        class: String,
        attribute: String,
        target: String,
        inverse: String,
    },

    #[error("class {class}: inverse '{target}.{inverse}' of attribute '{attribute}' is not relational")]
    InverseNotRelational {
        class: String,
        attribute: String,
        target: String,
        inverse: String,
    },

    #[error("class {class}: attribute '{attribute}' is {cardinality:?} but inverse '{target}.{inverse}' is {found:?}")]
    InverseCardinalityMismatch {
        class: String,
        attribute: String,
        cardinality: Cardinality,
        target: String,
        inverse: String,
        found: Cardinality,
    },

    #[error("class {class}: inverse '{target}.{inverse}' of attribute '{attribute}' does not point back at {class}")]
    InverseNotReciprocal {
        class: String,
        attribute: String,
        target: String,
        inverse: String,
    },

    #[error("class {class}: primary key attribute '{attribute}' is not defined")]
    UnknownPrimaryKey { class: String, attribute: String },

    #[error("class {class}: primary key attribute '{attribute}' must be a scalar")]
    NonScalarPrimaryKey { class: String, attribute: String },

    #[error("class {class}: sort fallback attribute '{attribute}' is not defined")]
    UnknownSortFallback { class: String, attribute: String },

    #[error("class {class}: attribute '{attribute}' has an invalid pattern: {source}")]
    InvalidPattern {
        class: String,
        attribute: String,
        #[source]
        source: Box<regex::Error>,
    },

    #[error("class {class}: attribute '{attribute}' targets inline class '{target}' with a to-many cardinality")]
    InlineRelationNotToOne {
        class: String,
        attribute: String,
        target: String,
    },

    #[error("class {class}: default for attribute '{attribute}' cannot be parsed: {reason}")]
    InvalidDefault {
        class: String,
        attribute: String,
        reason: String,
    },
}

/// Object-graph operation errors
///
/// Misuse of a graph mutation or lookup at runtime. These indicate caller
/// bugs rather than bad data; bad data is reported through the aggregated
/// [`LoadReport`](crate::report::LoadReport) and
/// [`ValidationReport`](crate::validate::ValidationReport) instead.
#[derive(Error, Debug)]
pub enum GraphError {
    #[error("unknown class: {0}")]
    UnknownClass(String),

    #[error("class {class} has no attribute '{attribute}'")]
    UnknownAttribute { class: String, attribute: String },

    #[error("attribute '{attribute}' of class {class} is not relational")]
    NotRelational { class: String, attribute: String },

    #[error("attribute '{attribute}' of class {class} is relational; use set_relationship")]
    NotScalar { class: String, attribute: String },

    #[error("attribute '{attribute}' of class {class} accepts at most one target, got {got}")]
    TooManyTargets {
        class: String,
        attribute: String,
        got: usize,
    },

    #[error("attribute '{attribute}' of class {class} expects targets of class {expected}, got {found}")]
    TargetClassMismatch {
        class: String,
        attribute: String,
        expected: String,
        found: String,
    },

    #[error("instance no longer exists in this graph")]
    StaleInstance,
}

/// Umbrella error for the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("workbook error: {0}")]
    Workbook(#[from] calamine::XlsxError),

    #[error("workbook write error: {0}")]
    WorkbookWrite(#[from] rust_xlsxwriter::XlsxError),

    #[error("delimited table error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
}
