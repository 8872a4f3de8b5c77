//! Canonical ordering of relationship collections
//!
//! The order of a to-many relationship collection has no semantic meaning,
//! so two graphs that differ only in insertion order must serialize
//! identically. The normalizer sorts every to-many collection by a total
//! key: the target's primary-key value, then the target class's configured
//! `sort_fallback` attribute, then the target's construction sequence
//! number. The sequence tiebreak is reachable only when two members share
//! both keys, which a validated graph (unique primary keys) cannot produce;
//! it exists so the order is total even for graphs that have not been
//! validated yet.

use std::cmp::Ordering;
use std::collections::HashSet;

use tracing::debug;

use crate::graph::{InstanceId, ObjectGraph};
use crate::schema::AttributeKind;
use crate::value::Value;

/// Canonicalizes relationship-collection order in place
pub struct Normalizer;

#[derive(Clone)]
struct SortKey {
    primary: Value,
    fallback: Option<Value>,
    seq: u64,
}

impl SortKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.primary
            .canonical_cmp(&other.primary)
            .then_with(|| match (&self.fallback, &other.fallback) {
                (Some(a), Some(b)) => a.canonical_cmp(b),
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Less,
                (Some(_), None) => Ordering::Greater,
            })
            .then_with(|| self.seq.cmp(&other.seq))
    }
}

impl Normalizer {
    /// Sort every to-many relationship collection in the graph into
    /// canonical order. Idempotent and insertion-order independent.
    pub fn run(graph: &mut ObjectGraph) {
        let mut reorders: Vec<(InstanceId, String, Vec<InstanceId>)> = Vec::new();

        for id in graph.ids() {
            let Some(class_name) = graph.class_of(id) else {
                continue;
            };
            let Some(class) = graph.registry().class(class_name) else {
                continue;
            };
            for (attr, rel) in class.relations() {
                if !rel.cardinality.is_to_many() {
                    continue;
                }
                let targets = graph.related(id, &attr.name);
                if targets.len() < 2 {
                    continue;
                }
                let mut keyed: Vec<(SortKey, InstanceId)> = targets
                    .iter()
                    .map(|&t| (Self::sort_key(graph, t), t))
                    .collect();
                keyed.sort_by(|a, b| a.0.cmp(&b.0));
                let sorted: Vec<InstanceId> = keyed.into_iter().map(|(_, t)| t).collect();
                if sorted != targets {
                    reorders.push((id, attr.name.clone(), sorted));
                }
            }
        }

        debug!(collections = reorders.len(), "normalizer reordered collections");
        for (id, attr, order) in reorders {
            graph.set_edge_order(id, &attr, order);
        }
    }

    fn sort_key(graph: &ObjectGraph, id: InstanceId) -> SortKey {
        let primary = graph.primary_key(id).cloned().unwrap_or(Value::Null);
        let seq = graph.instance(id).map(|i| i.seq()).unwrap_or(u64::MAX);
        let fallback = Self::fallback_key(graph, id, &mut HashSet::new());
        SortKey {
            primary,
            fallback,
            seq,
        }
    }

    /// Secondary key from the class's `sort_fallback` attribute. A scalar
    /// fallback is used directly; a relational fallback resolves through the
    /// related instance's primary key. The visited set bounds resolution on
    /// cyclic relationship structures.
    fn fallback_key(
        graph: &ObjectGraph,
        id: InstanceId,
        visited: &mut HashSet<InstanceId>,
    ) -> Option<Value> {
        if !visited.insert(id) {
            return None;
        }
        let class = graph.registry().class(graph.class_of(id)?)?;
        let fallback_name = class.sort_fallback.as_ref()?;
        let attr = class.attribute(fallback_name)?;
        match &attr.kind {
            AttributeKind::Scalar(_) | AttributeKind::List(_) => {
                graph.value(id, fallback_name).cloned()
            }
            AttributeKind::Relation(_) => {
                let target = graph.related_one(id, fallback_name)?;
                match graph.primary_key(target) {
                    Some(pk) => Some(pk.clone()),
                    None => Self::fallback_key(graph, target, visited),
                }
            }
        }
    }
}

/// Live instances of one class in canonical order: primary key, then the
/// class's sort fallback, then construction sequence. The writer uses this
/// for row order so serialized output is reproducible.
pub(crate) fn sorted_instances(graph: &ObjectGraph, class: &str) -> Vec<InstanceId> {
    let mut keyed: Vec<(SortKey, InstanceId)> = graph
        .instances_of(class)
        .into_iter()
        .map(|id| (Normalizer::sort_key(graph, id), id))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.into_iter().map(|(_, id)| id).collect()
}
