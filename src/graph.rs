//! Typed object graph
//!
//! Instances live in a flat arena and never reference each other directly;
//! every relationship is an entry in a symmetric edge index keyed by
//! `(instance, attribute)`. Setting one side of a relationship updates the
//! inverse side in the same mutation, so no one-sided link is observable
//! after any operation completes. The arena-plus-index layout also means
//! cyclic relationship structures (Company ↔ Person ↔ Address) involve no
//! pointer cycles.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::trace;

use crate::error::GraphError;
use crate::registry::SchemaRegistry;
use crate::schema::{AttributeKind, RelationKind};
use crate::value::Value;

/// Handle to an instance within one [`ObjectGraph`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(u32);

/// One typed record conforming to a class definition
#[derive(Debug, Clone, Serialize)]
pub struct Instance {
    class: String,
    values: BTreeMap<String, Value>,
    /// Construction sequence number; the final normalization tiebreak
    seq: u64,
}

impl Instance {
    pub fn class(&self) -> &str {
        &self.class
    }

    pub fn get(&self, attribute: &str) -> Option<&Value> {
        self.values.get(attribute)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

/// The full set of instances plus all relationship edges, scoped to one
/// schema registry
#[derive(Clone)]
pub struct ObjectGraph {
    registry: Arc<SchemaRegistry>,
    instances: Vec<Option<Instance>>,
    edges: HashMap<(InstanceId, String), Vec<InstanceId>>,
    next_seq: u64,
}

impl ObjectGraph {
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            instances: Vec::new(),
            edges: HashMap::new(),
            next_seq: 0,
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn registry_arc(&self) -> Arc<SchemaRegistry> {
        Arc::clone(&self.registry)
    }

    /// Create an empty instance of a class
    pub fn add_instance(&mut self, class: &str) -> Result<InstanceId, GraphError> {
        if self.registry.class(class).is_none() {
            return Err(GraphError::UnknownClass(class.to_string()));
        }
        let id = InstanceId(self.instances.len() as u32);
        self.instances.push(Some(Instance {
            class: class.to_string(),
            values: BTreeMap::new(),
            seq: self.next_seq,
        }));
        self.next_seq += 1;
        trace!(class, id = id.0, "instance added");
        Ok(id)
    }

    /// Create an instance and set scalar values in one call
    pub fn add_with_values(
        &mut self,
        class: &str,
        values: &[(&str, Value)],
    ) -> Result<InstanceId, GraphError> {
        let id = self.add_instance(class)?;
        for (attr, value) in values {
            self.set_value(id, attr, value.clone())?;
        }
        Ok(id)
    }

    /// Remove an instance along with every edge touching it, updating the
    /// inverse side of each removed edge
    pub fn remove_instance(&mut self, id: InstanceId) -> Result<(), GraphError> {
        let class_name = self.class_of(id).ok_or(GraphError::StaleInstance)?.to_string();
        let class = self
            .registry
            .class(&class_name)
            .ok_or_else(|| GraphError::UnknownClass(class_name.clone()))?;
        let relations: Vec<(String, String)> = class
            .relations()
            .map(|(attr, rel)| (attr.name.clone(), rel.inverse.clone()))
            .collect();

        for (attr, inverse) in relations {
            if let Some(targets) = self.edges.remove(&(id, attr)) {
                for target in targets {
                    if let Some(list) = self.edges.get_mut(&(target, inverse.clone())) {
                        list.retain(|x| *x != id);
                    }
                }
            }
        }
        self.instances[id.0 as usize] = None;
        Ok(())
    }

    /// Set a scalar or list attribute value
    pub fn set_value(
        &mut self,
        id: InstanceId,
        attribute: &str,
        value: Value,
    ) -> Result<(), GraphError> {
        let class = self.class_of(id).ok_or(GraphError::StaleInstance)?.to_string();
        let attr = self.registry.attribute(&class, attribute).ok_or_else(|| {
            GraphError::UnknownAttribute {
                class: class.clone(),
                attribute: attribute.to_string(),
            }
        })?;
        if attr.kind.is_relation() {
            return Err(GraphError::NotScalar {
                class,
                attribute: attribute.to_string(),
            });
        }
        let instance = self.instances[id.0 as usize]
            .as_mut()
            .ok_or(GraphError::StaleInstance)?;
        instance.values.insert(attribute.to_string(), value);
        Ok(())
    }

    /// Scalar value of an attribute, if set
    pub fn value(&self, id: InstanceId, attribute: &str) -> Option<&Value> {
        self.instance(id).and_then(|i| i.get(attribute))
    }

    pub fn instance(&self, id: InstanceId) -> Option<&Instance> {
        self.instances.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn class_of(&self, id: InstanceId) -> Option<&str> {
        self.instance(id).map(|i| i.class())
    }

    /// Primary-key value of an instance, if set
    pub fn primary_key(&self, id: InstanceId) -> Option<&Value> {
        let instance = self.instance(id)?;
        let class = self.registry.class(instance.class())?;
        instance.get(&class.primary_key)
    }

    /// Primary-key value formatted as cell text, for reports and lookups
    pub fn primary_key_text(&self, id: InstanceId) -> Option<String> {
        let instance = self.instance(id)?;
        let class = self.registry.class(instance.class())?;
        let attr = class.primary_key_attr()?;
        let AttributeKind::Scalar(kind) = &attr.kind else {
            return None;
        };
        instance
            .get(&class.primary_key)
            .map(|v| self.registry.format_scalar(kind, v))
    }

    /// Replace the relationship edges on one side of a relational attribute,
    /// atomically updating the inverse side
    ///
    /// Prior edges on `(id, attribute)` are dropped (with their mirrors).
    /// When the inverse side is to-one, a target's existing link is
    /// displaced: linking an employee to a new company removes it from the
    /// old company's collection.
    pub fn set_relationship(
        &mut self,
        id: InstanceId,
        attribute: &str,
        targets: &[InstanceId],
    ) -> Result<(), GraphError> {
        let class = self.class_of(id).ok_or(GraphError::StaleInstance)?.to_string();
        let rel = self.relation_kind(&class, attribute)?;

        if !rel.cardinality.is_to_many() && targets.len() > 1 {
            return Err(GraphError::TooManyTargets {
                class,
                attribute: attribute.to_string(),
                got: targets.len(),
            });
        }
        for &target in targets {
            let found = self.class_of(target).ok_or(GraphError::StaleInstance)?;
            if found != rel.target {
                return Err(GraphError::TargetClassMismatch {
                    class,
                    attribute: attribute.to_string(),
                    expected: rel.target.clone(),
                    found: found.to_string(),
                });
            }
        }

        let mut deduped: Vec<InstanceId> = Vec::with_capacity(targets.len());
        for &t in targets {
            if !deduped.contains(&t) {
                deduped.push(t);
            }
        }

        // drop the prior edges on this side, mirrors included
        if let Some(old) = self.edges.remove(&(id, attribute.to_string())) {
            for target in old {
                if let Some(list) = self.edges.get_mut(&(target, rel.inverse.clone())) {
                    list.retain(|x| *x != id);
                }
            }
        }

        let inverse_is_to_one = !rel.cardinality.inverse().is_to_many();
        for &target in &deduped {
            if inverse_is_to_one {
                // displace the target's existing link on the inverse side
                let sources = self
                    .edges
                    .remove(&(target, rel.inverse.clone()))
                    .unwrap_or_default();
                for source in sources {
                    if let Some(list) = self.edges.get_mut(&(source, attribute.to_string())) {
                        list.retain(|x| *x != target);
                    }
                }
            }
            self.edges
                .entry((target, rel.inverse.clone()))
                .or_default()
                .push(id);
        }

        if !deduped.is_empty() {
            self.edges.insert((id, attribute.to_string()), deduped);
        }
        trace!(class = %class, attribute, "relationship set");
        Ok(())
    }

    /// Convenience for to-one attributes
    pub fn set_relationship_one(
        &mut self,
        id: InstanceId,
        attribute: &str,
        target: Option<InstanceId>,
    ) -> Result<(), GraphError> {
        match target {
            Some(t) => self.set_relationship(id, attribute, &[t]),
            None => self.set_relationship(id, attribute, &[]),
        }
    }

    /// Relationship targets of an attribute, in stored order
    pub fn related(&self, id: InstanceId, attribute: &str) -> &[InstanceId] {
        self.edges
            .get(&(id, attribute.to_string()))
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Single target of a to-one attribute
    pub fn related_one(&self, id: InstanceId, attribute: &str) -> Option<InstanceId> {
        self.related(id, attribute).first().copied()
    }

    /// Locate an instance of a class by primary-key value
    pub fn find_by_primary_key(&self, class: &str, key: &Value) -> Option<InstanceId> {
        self.instances_of(class)
            .into_iter()
            .find(|&id| self.primary_key(id).is_some_and(|pk| pk.value_equal(key)))
    }

    /// Live instances of one class, in construction order
    pub fn instances_of(&self, class: &str) -> Vec<InstanceId> {
        self.ids()
            .filter(|&id| self.class_of(id) == Some(class))
            .collect()
    }

    /// All live instance ids, in construction order
    pub fn ids(&self) -> impl Iterator<Item = InstanceId> + '_ {
        self.instances
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(i, _)| InstanceId(i as u32))
    }

    pub fn len(&self) -> usize {
        self.instances.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn relation_kind(&self, class: &str, attribute: &str) -> Result<RelationKind, GraphError> {
        let attr = self.registry.attribute(class, attribute).ok_or_else(|| {
            GraphError::UnknownAttribute {
                class: class.to_string(),
                attribute: attribute.to_string(),
            }
        })?;
        attr.kind
            .as_relation()
            .cloned()
            .ok_or_else(|| GraphError::NotRelational {
                class: class.to_string(),
                attribute: attribute.to_string(),
            })
    }

    /// Reorder the stored edges of a to-many attribute. The new order must
    /// be a permutation of the current targets; used by normalization.
    pub(crate) fn set_edge_order(&mut self, id: InstanceId, attribute: &str, order: Vec<InstanceId>) {
        debug_assert_eq!(order.len(), self.related(id, attribute).len());
        if !order.is_empty() {
            self.edges.insert((id, attribute.to_string()), order);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeDef, Cardinality, ClassDef, ScalarKind};

    fn registry() -> Arc<SchemaRegistry> {
        Arc::new(
            SchemaRegistry::from_classes(vec![
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
                        AttributeDef::relation(
                            "employer",
                            Cardinality::ManyToOne,
                            "Company",
                            "employees",
                        ),
                        AttributeDef::relation(
                            "mentor",
                            Cardinality::OneToOne,
                            "Person",
                            "mentee",
                        ),
                        AttributeDef::relation(
                            "mentee",
                            Cardinality::OneToOne,
                            "Person",
                            "mentor",
                        ),
                    ],
                ),
            ])
            .unwrap(),
        )
    }

    fn str_val(s: &str) -> Value {
        Value::Str(s.to_string())
    }

    #[test]
    fn test_set_relationship_updates_inverse() {
        let mut graph = ObjectGraph::new(registry());
        let acme = graph.add_with_values("Company", &[("name", str_val("acme"))]).unwrap();
        let p = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();

        graph.set_relationship_one(p, "employer", Some(acme)).unwrap();
        assert_eq!(graph.related_one(p, "employer"), Some(acme));
        assert_eq!(graph.related(acme, "employees"), &[p]);
    }

    #[test]
    fn test_reassignment_displaces_old_link() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_with_values("Company", &[("name", str_val("a"))]).unwrap();
        let b = graph.add_with_values("Company", &[("name", str_val("b"))]).unwrap();
        let p = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();

        graph.set_relationship_one(p, "employer", Some(a)).unwrap();
        graph.set_relationship_one(p, "employer", Some(b)).unwrap();

        assert!(graph.related(a, "employees").is_empty());
        assert_eq!(graph.related(b, "employees"), &[p]);
    }

    #[test]
    fn test_to_many_replacement_displaces_members() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_with_values("Company", &[("name", str_val("a"))]).unwrap();
        let b = graph.add_with_values("Company", &[("name", str_val("b"))]).unwrap();
        let p1 = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();
        let p2 = graph.add_with_values("Person", &[("id", str_val("p2"))]).unwrap();

        graph.set_relationship(a, "employees", &[p1, p2]).unwrap();
        assert_eq!(graph.related_one(p1, "employer"), Some(a));

        // moving p1 to company b removes it from a's collection
        graph.set_relationship(b, "employees", &[p1]).unwrap();
        assert_eq!(graph.related(a, "employees"), &[p2]);
        assert_eq!(graph.related_one(p1, "employer"), Some(b));
    }

    #[test]
    fn test_cardinality_checked() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_with_values("Company", &[("name", str_val("a"))]).unwrap();
        let b = graph.add_with_values("Company", &[("name", str_val("b"))]).unwrap();
        let p = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();

        let err = graph.set_relationship(p, "employer", &[a, b]).unwrap_err();
        assert!(matches!(err, GraphError::TooManyTargets { got: 2, .. }));
    }

    #[test]
    fn test_target_class_checked() {
        let mut graph = ObjectGraph::new(registry());
        let p1 = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();
        let p2 = graph.add_with_values("Person", &[("id", str_val("p2"))]).unwrap();
        let err = graph.set_relationship(p1, "employer", &[p2]).unwrap_err();
        assert!(matches!(err, GraphError::TargetClassMismatch { .. }));
    }

    #[test]
    fn test_one_to_one_displacement() {
        let mut graph = ObjectGraph::new(registry());
        let p1 = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();
        let p2 = graph.add_with_values("Person", &[("id", str_val("p2"))]).unwrap();
        let p3 = graph.add_with_values("Person", &[("id", str_val("p3"))]).unwrap();

        graph.set_relationship_one(p1, "mentor", Some(p2)).unwrap();
        assert_eq!(graph.related_one(p2, "mentee"), Some(p1));

        // p3 takes p2 as mentor; p1 loses the link
        graph.set_relationship_one(p3, "mentor", Some(p2)).unwrap();
        assert_eq!(graph.related_one(p2, "mentee"), Some(p3));
        assert!(graph.related(p1, "mentor").is_empty());
    }

    #[test]
    fn test_remove_instance_drops_all_edges() {
        let mut graph = ObjectGraph::new(registry());
        let a = graph.add_with_values("Company", &[("name", str_val("a"))]).unwrap();
        let p1 = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();
        let p2 = graph.add_with_values("Person", &[("id", str_val("p2"))]).unwrap();
        graph.set_relationship(a, "employees", &[p1, p2]).unwrap();

        graph.remove_instance(p1).unwrap();
        assert_eq!(graph.related(a, "employees"), &[p2]);
        assert!(graph.instance(p1).is_none());
        assert_eq!(graph.len(), 2);
    }

    #[test]
    fn test_find_by_primary_key() {
        let mut graph = ObjectGraph::new(registry());
        let p = graph.add_with_values("Person", &[("id", str_val("p1"))]).unwrap();
        assert_eq!(graph.find_by_primary_key("Person", &str_val("p1")), Some(p));
        assert_eq!(graph.find_by_primary_key("Person", &str_val("nope")), None);
    }
}
