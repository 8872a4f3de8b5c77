//! Graph validation
//!
//! Checks every instance of a graph against its schema and accumulates
//! every violation found; curators need the complete error list in one
//! pass, so nothing short-circuits. The result is `None` when the graph is
//! clean (the explicit no-errors sentinel) or a report mapping class names
//! to per-instance, per-attribute messages.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::graph::{InstanceId, ObjectGraph};
use crate::schema::{AttributeKind, ClassDef};
use crate::value::Value;

/// One validation failure
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMessage {
    /// Primary-key text of the offending instance, or its class plus
    /// sequence number when the key itself is missing
    pub instance: String,
    /// Offending attribute; `None` for instance-level problems
    pub attribute: Option<String>,
    pub message: String,
}

/// Validation failures grouped by class
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub by_class: BTreeMap<String, Vec<ValidationMessage>>,
}

impl ValidationReport {
    fn push(&mut self, class: &str, message: ValidationMessage) {
        self.by_class.entry(class.to_string()).or_default().push(message);
    }

    pub fn is_empty(&self) -> bool {
        self.by_class.values().all(|v| v.is_empty())
    }

    pub fn len(&self) -> usize {
        self.by_class.values().map(|v| v.len()).sum()
    }

    pub fn messages(&self) -> impl Iterator<Item = (&str, &ValidationMessage)> {
        self.by_class
            .iter()
            .flat_map(|(class, msgs)| msgs.iter().map(move |m| (class.as_str(), m)))
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (class, messages) in &self.by_class {
            writeln!(f, "{}:", class)?;
            for m in messages {
                match &m.attribute {
                    Some(attr) => writeln!(f, "  '{}'.{}: {}", m.instance, attr, m.message)?,
                    None => writeln!(f, "  '{}': {}", m.instance, m.message)?,
                }
            }
        }
        Ok(())
    }
}

/// Engine that validates a whole graph
pub struct Validator;

impl Validator {
    /// Validate every instance; `None` means no violations were found
    pub fn run(graph: &ObjectGraph) -> Option<ValidationReport> {
        let mut report = ValidationReport::default();

        for class in graph.registry().classes() {
            let ids = graph.instances_of(&class.name);
            for &id in &ids {
                Self::check_instance(graph, class, id, &mut report);
            }
            Self::check_uniqueness(graph, class, &ids, &mut report);
        }

        debug!(violations = report.len(), "validation finished");
        if report.is_empty() {
            None
        } else {
            Some(report)
        }
    }

    fn label(graph: &ObjectGraph, id: InstanceId) -> String {
        graph.primary_key_text(id).unwrap_or_else(|| {
            let seq = graph.instance(id).map(|i| i.seq()).unwrap_or_default();
            format!("<instance #{}>", seq)
        })
    }

    fn check_instance(
        graph: &ObjectGraph,
        class: &ClassDef,
        id: InstanceId,
        report: &mut ValidationReport,
    ) {
        let label = Self::label(graph, id);
        for attr in &class.attributes {
            match &attr.kind {
                AttributeKind::Scalar(kind) => {
                    match graph.value(id, &attr.name) {
                        None | Some(Value::Null) => {
                            if attr.constraints.required && attr.constraints.default.is_none() {
                                report.push(
                                    &class.name,
                                    ValidationMessage {
                                        instance: label.clone(),
                                        attribute: Some(attr.name.clone()),
                                        message: "required value is missing".to_string(),
                                    },
                                );
                            }
                        }
                        Some(value) => {
                            for message in
                                graph.registry().validate_scalar(kind, value, &attr.constraints)
                            {
                                report.push(
                                    &class.name,
                                    ValidationMessage {
                                        instance: label.clone(),
                                        attribute: Some(attr.name.clone()),
                                        message,
                                    },
                                );
                            }
                        }
                    }
                }
                AttributeKind::List(kind) => {
                    match graph.value(id, &attr.name) {
                        None | Some(Value::Null) => {
                            if attr.constraints.required && attr.constraints.default.is_none() {
                                report.push(
                                    &class.name,
                                    ValidationMessage {
                                        instance: label.clone(),
                                        attribute: Some(attr.name.clone()),
                                        message: "required value is missing".to_string(),
                                    },
                                );
                            }
                        }
                        Some(Value::List(items)) => {
                            for (i, item) in items.iter().enumerate() {
                                for message in
                                    graph.registry().validate_scalar(kind, item, &attr.constraints)
                                {
                                    report.push(
                                        &class.name,
                                        ValidationMessage {
                                            instance: label.clone(),
                                            attribute: Some(attr.name.clone()),
                                            message: format!("element {}: {}", i, message),
                                        },
                                    );
                                }
                            }
                        }
                        Some(other) => {
                            report.push(
                                &class.name,
                                ValidationMessage {
                                    instance: label.clone(),
                                    attribute: Some(attr.name.clone()),
                                    message: format!(
                                        "expected a list value, found {}",
                                        other.type_name()
                                    ),
                                },
                            );
                        }
                    }
                }
                AttributeKind::Relation(rel) => {
                    let targets = graph.related(id, &attr.name);
                    if !rel.cardinality.is_to_many() && targets.len() > 1 {
                        report.push(
                            &class.name,
                            ValidationMessage {
                                instance: label.clone(),
                                attribute: Some(attr.name.clone()),
                                message: format!(
                                    "at most one target allowed, found {}",
                                    targets.len()
                                ),
                            },
                        );
                    }
                    if attr.constraints.required && targets.is_empty() {
                        report.push(
                            &class.name,
                            ValidationMessage {
                                instance: label.clone(),
                                attribute: Some(attr.name.clone()),
                                message: "required relationship has no target".to_string(),
                            },
                        );
                    }
                    // the inverse collection must contain this instance
                    for &target in targets {
                        if !graph.related(target, &rel.inverse).contains(&id) {
                            report.push(
                                &class.name,
                                ValidationMessage {
                                    instance: label.clone(),
                                    attribute: Some(attr.name.clone()),
                                    message: format!(
                                        "inverse '{}.{}' does not contain this instance",
                                        rel.target, rel.inverse
                                    ),
                                },
                            );
                        }
                    }
                }
            }
        }
    }

    /// Primary-key and `unique` attribute uniqueness within a class across
    /// the whole graph; each conflicting pair yields one aggregated error
    /// naming both instances
    fn check_uniqueness(
        graph: &ObjectGraph,
        class: &ClassDef,
        ids: &[InstanceId],
        report: &mut ValidationReport,
    ) {
        for attr in &class.attributes {
            if !attr.constraints.unique {
                continue;
            }
            let mut seen: Vec<(&Value, InstanceId)> = Vec::new();
            for &id in ids {
                let Some(value) = graph.value(id, &attr.name) else {
                    continue;
                };
                if value.is_null() {
                    continue;
                }
                if let Some(&(_, first)) = seen.iter().find(|(v, _)| v.value_equal(value)) {
                    report.push(
                        &class.name,
                        ValidationMessage {
                            instance: Self::label(graph, id),
                            attribute: Some(attr.name.clone()),
                            message: format!(
                                "duplicate value '{}' also held by instance '{}'",
                                value,
                                Self::label(graph, first)
                            ),
                        },
                    );
                } else {
                    seen.push((value, id));
                }
            }
        }
    }
}
