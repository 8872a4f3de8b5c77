//! Structural comparison of object graphs
//!
//! Two graphs of the same schema are compared instance by instance:
//! counterparts pair up by (class, primary key), scalar attributes compare
//! by value, and relationship attributes compare by the primary keys of
//! their targets after both graphs have been normalized. The walk carries a
//! visited-pair set so cyclic relationship structures terminate, and it
//! accumulates one entry per differing attribute per instance pair instead
//! of stopping at the first mismatch.

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use tracing::debug;

use crate::graph::{InstanceId, ObjectGraph};
use crate::normalize::Normalizer;
use crate::schema::AttributeKind;

/// One difference between two graphs
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiffEntry {
    /// Instance present in the left graph only
    OnlyInLeft { class: String, key: String },
    /// Instance present in the right graph only
    OnlyInRight { class: String, key: String },
    /// Attribute differs between two paired instances; values are the
    /// serialized cell text on each side
    Attribute {
        class: String,
        key: String,
        attribute: String,
        left: String,
        right: String,
    },
}

/// All differences between two graphs; empty iff the graphs are equal
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiffReport {
    pub entries: Vec<DiffEntry>,
}

impl DiffReport {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.entries.is_empty() {
            return write!(f, "graphs are equal");
        }
        for entry in &self.entries {
            match entry {
                DiffEntry::OnlyInLeft { class, key } => {
                    writeln!(f, "- {} '{}' only in left", class, key)?;
                }
                DiffEntry::OnlyInRight { class, key } => {
                    writeln!(f, "+ {} '{}' only in right", class, key)?;
                }
                DiffEntry::Attribute {
                    class,
                    key,
                    attribute,
                    left,
                    right,
                } => {
                    if left.contains('\n') || right.contains('\n') {
                        writeln!(f, "~ {} '{}' {}:", class, key, attribute)?;
                        let diff = TextDiff::from_lines(left.as_str(), right.as_str());
                        for change in diff.iter_all_changes() {
                            let sign = match change.tag() {
                                ChangeTag::Delete => '-',
                                ChangeTag::Insert => '+',
                                ChangeTag::Equal => ' ',
                            };
                            write!(f, "    {}{}", sign, change)?;
                        }
                    } else {
                        writeln!(
                            f,
                            "~ {} '{}' {}: '{}' != '{}'",
                            class, key, attribute, left, right
                        )?;
                    }
                }
            }
        }
        Ok(())
    }
}

/// Engine that compares two graphs of the same schema
pub struct Differ;

impl Differ {
    /// Compare two graphs; the report is empty iff they are equal
    ///
    /// Both inputs are normalized on working copies first, so collection
    /// order never shows up as a difference.
    pub fn run(left: &ObjectGraph, right: &ObjectGraph) -> DiffReport {
        let mut left = left.clone();
        let mut right = right.clone();
        Normalizer::run(&mut left);
        Normalizer::run(&mut right);

        let mut report = DiffReport::default();
        let mut pairs: Vec<(InstanceId, InstanceId)> = Vec::new();

        for class in left.registry().classes() {
            let left_ids = left.instances_of(&class.name);
            let right_ids = right.instances_of(&class.name);

            let mut right_unmatched: Vec<InstanceId> = right_ids.clone();
            for &lid in &left_ids {
                let lkey = left.primary_key_text(lid).unwrap_or_default();
                let matched = right_unmatched.iter().position(|&rid| {
                    right.primary_key_text(rid).unwrap_or_default() == lkey
                });
                match matched {
                    Some(pos) => {
                        let rid = right_unmatched.remove(pos);
                        pairs.push((lid, rid));
                    }
                    None => report.entries.push(DiffEntry::OnlyInLeft {
                        class: class.name.clone(),
                        key: lkey,
                    }),
                }
            }
            for rid in right_unmatched {
                report.entries.push(DiffEntry::OnlyInRight {
                    class: class.name.clone(),
                    key: right.primary_key_text(rid).unwrap_or_default(),
                });
            }
        }

        let mut visited: HashSet<(InstanceId, InstanceId)> = HashSet::new();
        let mut worklist = pairs;
        while let Some((lid, rid)) = worklist.pop() {
            if !visited.insert((lid, rid)) {
                continue;
            }
            Self::compare_pair(&left, &right, lid, rid, &mut report, &mut worklist);
        }

        debug!(entries = report.len(), "diff finished");
        report
    }

    /// Whether two graphs are structurally equal
    pub fn equal(left: &ObjectGraph, right: &ObjectGraph) -> bool {
        Self::run(left, right).is_empty()
    }

    fn compare_pair(
        left: &ObjectGraph,
        right: &ObjectGraph,
        lid: InstanceId,
        rid: InstanceId,
        report: &mut DiffReport,
        worklist: &mut Vec<(InstanceId, InstanceId)>,
    ) {
        let Some(class_name) = left.class_of(lid) else {
            return;
        };
        let Some(class) = left.registry().class(class_name) else {
            return;
        };
        let key = left.primary_key_text(lid).unwrap_or_default();

        for attr in &class.attributes {
            match &attr.kind {
                AttributeKind::Scalar(kind) => {
                    let lv = left.value(lid, &attr.name);
                    let rv = right.value(rid, &attr.name);
                    let equal = match (lv, rv) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.value_equal(b),
                        _ => false,
                    };
                    if !equal {
                        report.entries.push(DiffEntry::Attribute {
                            class: class.name.clone(),
                            key: key.clone(),
                            attribute: attr.name.clone(),
                            left: lv
                                .map(|v| left.registry().format_scalar(kind, v))
                                .unwrap_or_default(),
                            right: rv
                                .map(|v| right.registry().format_scalar(kind, v))
                                .unwrap_or_default(),
                        });
                    }
                }
                AttributeKind::List(_) => {
                    let lv = left.value(lid, &attr.name);
                    let rv = right.value(rid, &attr.name);
                    let equal = match (lv, rv) {
                        (None, None) => true,
                        (Some(a), Some(b)) => a.value_equal(b),
                        _ => false,
                    };
                    if !equal {
                        report.entries.push(DiffEntry::Attribute {
                            class: class.name.clone(),
                            key: key.clone(),
                            attribute: attr.name.clone(),
                            left: lv.map(|v| v.to_string()).unwrap_or_default(),
                            right: rv.map(|v| v.to_string()).unwrap_or_default(),
                        });
                    }
                }
                AttributeKind::Relation(_) => {
                    let ltargets = left.related(lid, &attr.name);
                    let rtargets = right.related(rid, &attr.name);
                    let lkeys: Vec<String> = ltargets
                        .iter()
                        .map(|&t| left.primary_key_text(t).unwrap_or_default())
                        .collect();
                    let rkeys: Vec<String> = rtargets
                        .iter()
                        .map(|&t| right.primary_key_text(t).unwrap_or_default())
                        .collect();
                    if lkeys != rkeys {
                        report.entries.push(DiffEntry::Attribute {
                            class: class.name.clone(),
                            key: key.clone(),
                            attribute: attr.name.clone(),
                            left: lkeys.join(", "),
                            right: rkeys.join(", "),
                        });
                    }
                    // descend into key-matched target pairs; the visited set
                    // keeps cycles bounded
                    for (i, (&lt, &rt)) in ltargets.iter().zip(rtargets.iter()).enumerate() {
                        if lkeys.get(i) == rkeys.get(i) {
                            worklist.push((lt, rt));
                        }
                    }
                }
            }
        }
    }
}

impl ObjectGraph {
    /// Structural equality under canonical ordering: every instance has a
    /// counterpart with the same class, primary key, scalar values, and
    /// relationship targets
    pub fn is_equal(&self, other: &ObjectGraph) -> bool {
        Differ::equal(self, other)
    }
}
