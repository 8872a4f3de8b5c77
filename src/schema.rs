//! Declarative schema model
//!
//! A schema is an ordered list of [`ClassDef`]s. Each class has an ordered
//! attribute list, a designated primary key, and a table layout mode. All
//! types here are serde-derived so a registry can also be built from a
//! declarative JSON document instead of programmatic construction.

use serde::{Deserialize, Serialize};

use crate::value::Value;

/// Kind of a scalar attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// Free-form text
    String,
    Integer,
    Float,
    Boolean,
    /// Calendar date, ISO `YYYY-MM-DD`
    Date,
    /// One of a closed set of string variants
    Enumerated { variants: Vec<String> },
    /// String constrained by a regular expression, compiled at registry build
    Pattern { regex: String },
    /// Formula or expression text, stored verbatim
    Expression,
}

/// Relationship cardinality, seen from the declaring side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl Cardinality {
    /// Cardinality of the inverse attribute on the target class
    pub fn inverse(self) -> Self {
        match self {
            Cardinality::OneToOne => Cardinality::OneToOne,
            Cardinality::ManyToOne => Cardinality::OneToMany,
            Cardinality::OneToMany => Cardinality::ManyToOne,
            Cardinality::ManyToMany => Cardinality::ManyToMany,
        }
    }

    /// Whether the declaring side holds a collection of targets
    pub fn is_to_many(self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// A relational attribute: cardinality, target class, and the name of the
/// inverse attribute on the target class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationKind {
    pub cardinality: Cardinality,
    pub target: String,
    pub inverse: String,
}

/// Kind of an attribute: scalar, list of scalars, or relational
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeKind {
    Scalar(ScalarKind),
    List(ScalarKind),
    Relation(RelationKind),
}

impl AttributeKind {
    pub fn as_relation(&self) -> Option<&RelationKind> {
        match self {
            AttributeKind::Relation(rel) => Some(rel),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, AttributeKind::Relation(_))
    }
}

/// Per-attribute constraints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub required: bool,

    /// Value must be unique within the class across the whole graph
    #[serde(default)]
    pub unique: bool,

    /// Default applied to blank cells on load; a declared default also
    /// satisfies a missing required value at validation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,

    /// Inclusive numeric lower bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,

    /// Inclusive numeric upper bound
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

/// A single attribute declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDef {
    pub name: String,

    /// Human-readable column name; the reader also matches headers on it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_name: Option<String>,

    /// Help text for the optional second header row
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub help: Option<String>,

    pub kind: AttributeKind,

    #[serde(default)]
    pub constraints: Constraints,
}

impl AttributeDef {
    pub fn new(name: impl Into<String>, kind: AttributeKind) -> Self {
        Self {
            name: name.into(),
            verbose_name: None,
            help: None,
            kind,
            constraints: Constraints::default(),
        }
    }

    /// Shorthand for a scalar attribute
    pub fn scalar(name: impl Into<String>, kind: ScalarKind) -> Self {
        Self::new(name, AttributeKind::Scalar(kind))
    }

    /// Shorthand for a relational attribute
    pub fn relation(
        name: impl Into<String>,
        cardinality: Cardinality,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            AttributeKind::Relation(RelationKind {
                cardinality,
                target: target.into(),
                inverse: inverse.into(),
            }),
        )
    }

    pub fn required(mut self) -> Self {
        self.constraints.required = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.constraints.unique = true;
        self
    }

    pub fn with_default(mut self, value: Value) -> Self {
        self.constraints.default = Some(value);
        self
    }

    pub fn with_range(mut self, min: Option<f64>, max: Option<f64>) -> Self {
        self.constraints.min = min;
        self.constraints.max = max;
        self
    }

    pub fn with_verbose_name(mut self, verbose: impl Into<String>) -> Self {
        self.verbose_name = Some(verbose.into());
        self
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }
}

/// Table layout mode of a class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// One data row per instance (the common case)
    #[default]
    Row,
    /// One data column per instance; the physical grid is transposed
    Column,
    /// No grid of its own: instances are embedded in the referring class's
    /// grid as adjacent `relation.attribute` columns
    Inline,
}

/// A class declaration: named record schema with an ordered attribute list
/// and a primary key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassDef {
    pub name: String,

    /// Human-readable table name; the reader also matches grid names on it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verbose_name: Option<String>,

    pub attributes: Vec<AttributeDef>,

    /// Name of the primary-key attribute. Always treated as required and
    /// unique; the registry normalizes the constraints accordingly.
    pub primary_key: String,

    #[serde(default)]
    pub layout: TableLayout,

    /// Secondary attribute consulted when normalization keys tie
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_fallback: Option<String>,
}

impl ClassDef {
    pub fn new(
        name: impl Into<String>,
        primary_key: impl Into<String>,
        attributes: Vec<AttributeDef>,
    ) -> Self {
        Self {
            name: name.into(),
            verbose_name: None,
            attributes,
            primary_key: primary_key.into(),
            layout: TableLayout::default(),
            sort_fallback: None,
        }
    }

    pub fn with_layout(mut self, layout: TableLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_verbose_name(mut self, verbose: impl Into<String>) -> Self {
        self.verbose_name = Some(verbose.into());
        self
    }

    pub fn with_sort_fallback(mut self, attribute: impl Into<String>) -> Self {
        self.sort_fallback = Some(attribute.into());
        self
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The primary-key attribute definition
    pub fn primary_key_attr(&self) -> Option<&AttributeDef> {
        self.attribute(&self.primary_key)
    }

    /// Relational attributes of this class, in declaration order
    pub fn relations(&self) -> impl Iterator<Item = (&AttributeDef, &RelationKind)> {
        self.attributes
            .iter()
            .filter_map(|a| a.kind.as_relation().map(|rel| (a, rel)))
    }
}
