//! Schema registry
//!
//! Holds the fixed set of class definitions for one dataset, validates the
//! definitions at build time, and dispatches per-kind parse/format/validate
//! logic. Definitions are immutable once the registry is built.

use std::collections::HashMap;

use petgraph::algo::kosaraju_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use regex::Regex;
use tracing::debug;

use crate::error::{Result, SchemaError};
use crate::kinds::codec_for;
use crate::schema::{AttributeKind, Cardinality, ClassDef, Constraints, ScalarKind, TableLayout};
use crate::value::Value;

/// The schema registry: class definitions plus derived lookup structures
#[derive(Debug)]
pub struct SchemaRegistry {
    classes: Vec<ClassDef>,
    index: HashMap<String, usize>,
    /// Verbose-name fallback for grid-name matching
    verbose_index: HashMap<String, usize>,
    /// Patterns compiled at build time, keyed by (class, attribute)
    patterns: HashMap<(String, String), Regex>,
    /// Class-relationship graph for cycle introspection
    class_graph: DiGraph<String, Cardinality>,
    node_of: HashMap<String, NodeIndex>,
}

impl SchemaRegistry {
    /// Build a registry from class definitions
    ///
    /// Validates the whole schema and fails with the first
    /// [`SchemaError`] found: duplicate class names, unknown relation
    /// targets, missing or non-reciprocal inverses, primary-key problems,
    /// invalid patterns. Primary-key attributes are normalized to
    /// required + unique, and string defaults declared for typed kinds
    /// (e.g. a date default written as `"2020-01-01"`) are coerced to the
    /// kind's value type.
    pub fn from_classes(classes: Vec<ClassDef>) -> Result<Self> {
        let mut classes = classes;

        let mut index = HashMap::new();
        for (i, class) in classes.iter().enumerate() {
            if index.insert(class.name.clone(), i).is_some() {
                return Err(SchemaError::DuplicateClass(class.name.clone()).into());
            }
        }

        let mut verbose_index = HashMap::new();
        for (i, class) in classes.iter().enumerate() {
            if let Some(verbose) = &class.verbose_name {
                verbose_index.entry(verbose.clone()).or_insert(i);
            }
        }

        Self::check_relations(&classes, &index)?;
        Self::normalize_primary_keys(&mut classes, &index)?;
        Self::check_sort_fallbacks(&classes)?;
        let patterns = Self::compile_patterns(&classes)?;
        Self::coerce_defaults(&mut classes)?;

        let (class_graph, node_of) = Self::build_class_graph(&classes);

        debug!(classes = classes.len(), "schema registry built");

        Ok(Self {
            classes,
            index,
            verbose_index,
            patterns,
            class_graph,
            node_of,
        })
    }

    /// Build a registry from a declarative JSON document: an array of class
    /// definitions in the serde layout of [`ClassDef`]
    pub fn from_json(text: &str) -> Result<Self> {
        let classes: Vec<ClassDef> = serde_json::from_str(text)?;
        Self::from_classes(classes)
    }

    fn check_relations(classes: &[ClassDef], index: &HashMap<String, usize>) -> Result<()> {
        for class in classes {
            for (attr, rel) in class.relations() {
                let Some(&target_idx) = index.get(&rel.target) else {
                    return Err(SchemaError::UnknownTarget {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        target: rel.target.clone(),
                    }
                    .into());
                };
                let target = &classes[target_idx];

                if target.layout == TableLayout::Inline && rel.cardinality.is_to_many() {
                    return Err(SchemaError::InlineRelationNotToOne {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        target: rel.target.clone(),
                    }
                    .into());
                }

                let Some(inverse_attr) = target.attribute(&rel.inverse) else {
                    return Err(SchemaError::UnknownInverse {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        target: rel.target.clone(),
                        inverse: rel.inverse.clone(),
                    }
                    .into());
                };
                let Some(inverse_rel) = inverse_attr.kind.as_relation() else {
                    return Err(SchemaError::InverseNotRelational {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        target: rel.target.clone(),
                        inverse: rel.inverse.clone(),
                    }
                    .into());
                };
                if inverse_rel.target != class.name || inverse_rel.inverse != attr.name {
                    return Err(SchemaError::InverseNotReciprocal {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        target: rel.target.clone(),
                        inverse: rel.inverse.clone(),
                    }
                    .into());
                }
                if inverse_rel.cardinality != rel.cardinality.inverse() {
                    return Err(SchemaError::InverseCardinalityMismatch {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        cardinality: rel.cardinality,
                        target: rel.target.clone(),
                        inverse: rel.inverse.clone(),
                        found: inverse_rel.cardinality,
                    }
                    .into());
                }
            }

        }
        Ok(())
    }

    fn normalize_primary_keys(
        classes: &mut [ClassDef],
        _index: &HashMap<String, usize>,
    ) -> Result<()> {
        for class in classes.iter_mut() {
            let class_name = class.name.clone();
            let pk_name = class.primary_key.clone();
            let Some(attr) = class.attributes.iter_mut().find(|a| a.name == pk_name) else {
                return Err(SchemaError::UnknownPrimaryKey {
                    class: class_name,
                    attribute: pk_name,
                }
                .into());
            };
            if !matches!(attr.kind, AttributeKind::Scalar(_)) {
                return Err(SchemaError::NonScalarPrimaryKey {
                    class: class_name,
                    attribute: pk_name,
                }
                .into());
            }
            attr.constraints.required = true;
            attr.constraints.unique = true;
        }
        Ok(())
    }

    fn check_sort_fallbacks(classes: &[ClassDef]) -> Result<()> {
        for class in classes {
            if let Some(fallback) = &class.sort_fallback {
                if class.attribute(fallback).is_none() {
                    return Err(SchemaError::UnknownSortFallback {
                        class: class.name.clone(),
                        attribute: fallback.clone(),
                    }
                    .into());
                }
            }
        }
        Ok(())
    }

    fn compile_patterns(classes: &[ClassDef]) -> Result<HashMap<(String, String), Regex>> {
        let mut patterns = HashMap::new();
        for class in classes {
            for attr in &class.attributes {
                let pattern = match &attr.kind {
                    AttributeKind::Scalar(ScalarKind::Pattern { regex }) => Some(regex),
                    AttributeKind::List(ScalarKind::Pattern { regex }) => Some(regex),
                    _ => None,
                };
                if let Some(pattern) = pattern {
                    let compiled = Regex::new(pattern).map_err(|e| SchemaError::InvalidPattern {
                        class: class.name.clone(),
                        attribute: attr.name.clone(),
                        source: Box::new(e),
                    })?;
                    patterns.insert((class.name.clone(), attr.name.clone()), compiled);
                }
            }
        }
        Ok(patterns)
    }

    /// Coerce string defaults declared for typed kinds (JSON has no date
    /// literal, so a date default arrives as a string)
    fn coerce_defaults(classes: &mut [ClassDef]) -> Result<()> {
        for class in classes.iter_mut() {
            let class_name = class.name.clone();
            for attr in class.attributes.iter_mut() {
                let scalar = match &attr.kind {
                    AttributeKind::Scalar(kind) => kind.clone(),
                    _ => continue,
                };
                if let Some(Value::Str(raw)) = &attr.constraints.default {
                    if !matches!(
                        scalar,
                        ScalarKind::String
                            | ScalarKind::Enumerated { .. }
                            | ScalarKind::Pattern { .. }
                            | ScalarKind::Expression
                    ) {
                        let coerced = codec_for(&scalar).parse(&scalar, raw).map_err(|reason| {
                            SchemaError::InvalidDefault {
                                class: class_name.clone(),
                                attribute: attr.name.clone(),
                                reason,
                            }
                        })?;
                        attr.constraints.default = Some(coerced);
                    }
                }
            }
        }
        Ok(())
    }

    fn build_class_graph(
        classes: &[ClassDef],
    ) -> (DiGraph<String, Cardinality>, HashMap<String, NodeIndex>) {
        let mut graph = DiGraph::new();
        let mut node_of = HashMap::new();
        for class in classes {
            let idx = graph.add_node(class.name.clone());
            node_of.insert(class.name.clone(), idx);
        }
        for class in classes {
            let from = node_of[&class.name];
            for (_, rel) in class.relations() {
                let to = node_of[&rel.target];
                graph.add_edge(from, to, rel.cardinality);
            }
        }
        (graph, node_of)
    }

    /// Look up a class by name
    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.index.get(name).map(|&i| &self.classes[i])
    }

    /// Look up a class by name, falling back to its verbose name
    pub fn class_by_any_name(&self, name: &str) -> Option<&ClassDef> {
        self.class(name)
            .or_else(|| self.verbose_index.get(name).map(|&i| &self.classes[i]))
    }

    /// All classes, in declaration order
    pub fn classes(&self) -> &[ClassDef] {
        &self.classes
    }

    /// Look up an attribute definition
    pub fn attribute(&self, class: &str, attribute: &str) -> Option<&crate::schema::AttributeDef> {
        self.class(class).and_then(|c| c.attribute(attribute))
    }

    /// Compiled pattern for a pattern-kind attribute
    pub fn pattern(&self, class: &str, attribute: &str) -> Option<&Regex> {
        self.patterns.get(&(class.to_string(), attribute.to_string()))
    }

    /// Parse raw cell text into a typed value
    pub fn parse_scalar(&self, kind: &ScalarKind, raw: &str) -> std::result::Result<Value, String> {
        codec_for(kind).parse(kind, raw)
    }

    /// Format a typed value as cell text. Total for values produced by
    /// [`Self::parse_scalar`] or checked by validation.
    pub fn format_scalar(&self, kind: &ScalarKind, value: &Value) -> String {
        codec_for(kind).format(kind, value)
    }

    /// Validate a typed value against its kind and constraints
    pub fn validate_scalar(
        &self,
        kind: &ScalarKind,
        value: &Value,
        constraints: &Constraints,
    ) -> Vec<String> {
        codec_for(kind).validate(kind, value, constraints)
    }

    /// Groups of classes that participate in relationship cycles: every
    /// strongly-connected component with more than one member, plus classes
    /// that relate to themselves. Groups and members are sorted.
    pub fn cyclic_classes(&self) -> Vec<Vec<String>> {
        let mut groups: Vec<Vec<String>> = Vec::new();
        for scc in kosaraju_scc(&self.class_graph) {
            let self_loop = scc.len() == 1
                && self
                    .class_graph
                    .find_edge(scc[0], scc[0])
                    .is_some();
            if scc.len() > 1 || self_loop {
                let mut names: Vec<String> = scc
                    .iter()
                    .map(|&idx| self.class_graph[idx].clone())
                    .collect();
                names.sort();
                groups.push(names);
            }
        }
        groups.sort();
        groups
    }

    /// Whether a class is part of any relationship cycle
    pub fn is_cyclic(&self, class: &str) -> bool {
        self.node_of.contains_key(class)
            && self
                .cyclic_classes()
                .iter()
                .any(|group| group.iter().any(|n| n == class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, Cardinality, ScalarKind};

    fn company_person() -> Vec<ClassDef> {
        vec![
            ClassDef::new(
                "Company",
                "name",
                vec![
                    AttributeDef::scalar("name", ScalarKind::String),
                    AttributeDef::relation(
                        "employees",
                        Cardinality::OneToMany,
                        "Person",
                        "employer",
                    ),
                ],
            ),
            ClassDef::new(
                "Person",
                "id",
                vec![
                    AttributeDef::scalar("id", ScalarKind::String),
                    AttributeDef::scalar("email", ScalarKind::String),
                    AttributeDef::relation("employer", Cardinality::ManyToOne, "Company", "employees"),
                ],
            ),
        ]
    }

    #[test]
    fn test_build_valid_schema() {
        let registry = SchemaRegistry::from_classes(company_person()).unwrap();
        assert_eq!(registry.classes().len(), 2);
        // primary keys are normalized to required + unique
        let pk = registry.attribute("Person", "id").unwrap();
        assert!(pk.constraints.required && pk.constraints.unique);
    }

    #[test]
    fn test_duplicate_class_rejected() {
        let mut classes = company_person();
        classes.push(classes[0].clone());
        let err = SchemaRegistry::from_classes(classes).unwrap_err();
        assert!(err.to_string().contains("duplicate class"));
    }

    #[test]
    fn test_unknown_target_rejected() {
        let classes = vec![ClassDef::new(
            "Person",
            "id",
            vec![
                AttributeDef::scalar("id", ScalarKind::String),
                AttributeDef::relation("employer", Cardinality::ManyToOne, "Company", "employees"),
            ],
        )];
        let err = SchemaRegistry::from_classes(classes).unwrap_err();
        assert!(err.to_string().contains("unknown class 'Company'"));
    }

    #[test]
    fn test_mismatched_inverse_cardinality_rejected() {
        let mut classes = company_person();
        // flip the inverse side to many-to-many; no longer reciprocates
        classes[0].attributes[1] =
            AttributeDef::relation("employees", Cardinality::ManyToMany, "Person", "employer");
        let err = SchemaRegistry::from_classes(classes).unwrap_err();
        assert!(err.to_string().contains("ManyToOne") || err.to_string().contains("ManyToMany"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let classes = vec![ClassDef::new(
            "Thing",
            "id",
            vec![AttributeDef::scalar(
                "id",
                ScalarKind::Pattern {
                    regex: "(unclosed".to_string(),
                },
            )],
        )];
        let err = SchemaRegistry::from_classes(classes).unwrap_err();
        assert!(err.to_string().contains("invalid pattern"));
    }

    #[test]
    fn test_cyclic_classes_reports_scc() {
        // Company -> Person -> Address -> Company
        let classes = vec![
            ClassDef::new(
                "Company",
                "name",
                vec![
                    AttributeDef::scalar("name", ScalarKind::String),
                    AttributeDef::relation("staff", Cardinality::OneToMany, "Person", "employer"),
                ],
            ),
            ClassDef::new(
                "Person",
                "id",
                vec![
                    AttributeDef::scalar("id", ScalarKind::String),
                    AttributeDef::relation("employer", Cardinality::ManyToOne, "Company", "staff"),
                    AttributeDef::relation("home", Cardinality::ManyToOne, "Address", "residents"),
                ],
            ),
            ClassDef::new(
                "Address",
                "street",
                vec![
                    AttributeDef::scalar("street", ScalarKind::String),
                    AttributeDef::relation("residents", Cardinality::OneToMany, "Person", "home"),
                    AttributeDef::relation("tenant", Cardinality::OneToOne, "Company", "address"),
                ],
            ),
        ];
        let mut classes = classes;
        classes[0].attributes.push(AttributeDef::relation(
            "address",
            Cardinality::OneToOne,
            "Address",
            "tenant",
        ));
        let registry = SchemaRegistry::from_classes(classes).unwrap();
        let groups = registry.cyclic_classes();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0], vec!["Address", "Company", "Person"]);
    }

    #[test]
    fn test_date_default_coerced_from_string() {
        let classes = vec![ClassDef::new(
            "Event",
            "id",
            vec![
                AttributeDef::scalar("id", ScalarKind::String),
                AttributeDef::scalar("when", ScalarKind::Date)
                    .with_default(Value::Str("2020-01-01".to_string())),
            ],
        )];
        let registry = SchemaRegistry::from_classes(classes).unwrap();
        let attr = registry.attribute("Event", "when").unwrap();
        assert!(matches!(attr.constraints.default, Some(Value::Date(_))));
    }
}
