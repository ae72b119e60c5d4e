//! Dependency graph logic for ordering schema creation
//!
//! This module provides functions to:
//! - Build a dependency graph from the catalog's relation properties
//! - Break relation cycles by deferring back-edges instead of failing
//! - Perform a stable topological sort for the phase-1 creation order
//! - Split every entity's properties into immediate and deferred sets
//! - Schedule deferred operations so no rollup runs before its relation exists

use serde::Serialize;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use thiserror::Error;

use crate::catalog::{
    EntityCatalog, EntityTypeDefinition, PropertyDefinition, PropertyKind, RelationMode, RollupSpec,
};

/// `from`'s creation payload must already know `to`'s remote id
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DependencyEdge {
    pub from: String,
    pub to: String,
    /// Relation property on `from` that produces the edge
    pub property: String,
}

/// What must exist before a deferred operation can run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Prerequisite {
    /// The related schema must have been created
    EntityCreated { entity: String },
    /// A relation declared on the same entity
    Declared { property: String },
    /// A relation mirrored onto this entity by another entity's dual relation
    #[serde(rename_all = "camelCase")]
    Mirrored {
        property: String,
        owner: String,
        owning_property: String,
    },
}

/// Phase in which a deferred operation runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeferredStage {
    /// Phase 2
    Relations,
    /// Phase 3, best effort
    SelfRelations,
}

/// Why a property could not go into the creation payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DeferralReason {
    /// Relation whose target is created later because of a cycle
    BackEdge,
    SelfRelation,
    Rollup,
}

/// A property added to an existing schema after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredOperation {
    pub target_entity: String,
    pub property: PropertyDefinition,
    pub prerequisite: Prerequisite,
    pub stage: DeferredStage,
    pub reason: DeferralReason,
}

impl DeferredOperation {
    /// e.g. `Goals.SubGoals/ParentGoal`
    pub fn label(&self) -> String {
        format!("{}.{}", self.target_entity, self.property.display_name())
    }

    /// Properties that exist on the store once this operation is applied
    fn effects(&self) -> Vec<(String, String)> {
        let mut effects = vec![(self.target_entity.clone(), self.property.name.clone())];
        if let Some(spec) = self.property.as_relation() {
            if let (true, Some(inverse)) = (spec.is_dual(), &spec.inverse) {
                effects.push((spec.target.clone(), inverse.clone()));
            }
        }
        effects
    }
}

/// Catalog bugs detected while planning
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlanningError {
    #[error("entity '{entity}' is declared more than once")]
    DuplicateEntity { entity: String },

    #[error("{entity}.{property} relates to unknown entity '{target}'")]
    UnknownTarget {
        entity: String,
        property: String,
        target: String,
    },

    #[error("{entity}.{property} is a self relation but targets '{target}'")]
    InvalidSelfRelation {
        entity: String,
        property: String,
        target: String,
    },

    #[error("property '{property}' on {entity} is declared or mirrored by more than one owner: {}", owners.join(", "))]
    PropertyCollision {
        entity: String,
        property: String,
        owners: Vec<String>,
    },

    #[error("rollup {entity}.{property} summarizes '{relation}', which is not a relation on {entity}")]
    MissingRollupRelation {
        entity: String,
        property: String,
        relation: String,
    },

    #[error("rollup {entity}.{property} reads '{rollup_property}', which {related_entity} does not have")]
    UnknownRollupProperty {
        entity: String,
        property: String,
        related_entity: String,
        rollup_property: String,
    },

    #[error("circular dependency detected involving: {}", entities.join(", "))]
    Cycle { entities: Vec<String> },

    #[error("deferred operations can never run: {}", operations.join(", "))]
    UnsatisfiablePrerequisite { operations: Vec<String> },
}

/// Dependency graph over the catalog's entities
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Entities in declaration order
    pub entities: Vec<String>,
    /// Adjacency list: entity -> entities whose ids its payload needs
    pub dependencies: HashMap<String, BTreeSet<String>>,
    /// Reverse adjacency: entity -> entities that need its id
    pub dependents: HashMap<String, BTreeSet<String>>,
}

impl DependencyGraph {
    fn new(entities: Vec<String>) -> Self {
        let mut graph = Self {
            entities,
            ..Default::default()
        };
        for name in &graph.entities {
            graph.dependencies.insert(name.clone(), BTreeSet::new());
            graph.dependents.insert(name.clone(), BTreeSet::new());
        }
        graph
    }

    fn add_edge(&mut self, from: &str, to: &str) {
        self.dependencies
            .entry(from.to_string())
            .or_default()
            .insert(to.to_string());
        self.dependents
            .entry(to.to_string())
            .or_default()
            .insert(from.to_string());
    }

    /// Whether `to` is reachable from `from` along dependencies
    pub fn reaches(&self, from: &str, to: &str) -> bool {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([from.to_string()]);
        while let Some(current) = queue.pop_front() {
            if current == to {
                return true;
            }
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(deps) = self.dependencies.get(&current) {
                queue.extend(deps.iter().cloned());
            }
        }
        false
    }

    /// No dependencies and no dependents
    pub fn is_isolated(&self, entity: &str) -> bool {
        let no_deps = self.dependencies.get(entity).is_none_or(|d| d.is_empty());
        let no_dependents = self.dependents.get(entity).is_none_or(|d| d.is_empty());
        no_deps && no_dependents
    }

    /// Kahn's algorithm; among ready entities the earliest declared goes first
    pub fn topological_sort(&self) -> Result<Vec<String>, PlanningError> {
        let index: HashMap<&str, usize> = self
            .entities
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut remaining: HashMap<&str, usize> = self
            .entities
            .iter()
            .map(|name| {
                let count = self.dependencies.get(name).map_or(0, |d| d.len());
                (name.as_str(), count)
            })
            .collect();

        let mut ready: BTreeSet<usize> = self
            .entities
            .iter()
            .enumerate()
            .filter(|(_, name)| remaining.get(name.as_str()) == Some(&0))
            .map(|(i, _)| i)
            .collect();

        let mut order = Vec::with_capacity(self.entities.len());
        while let Some(next) = ready.pop_first() {
            let entity = &self.entities[next];
            order.push(entity.clone());

            if let Some(dependents) = self.dependents.get(entity) {
                for dependent in dependents {
                    if let Some(count) = remaining.get_mut(dependent.as_str()) {
                        *count -= 1;
                        if *count == 0 {
                            ready.insert(index[dependent.as_str()]);
                        }
                    }
                }
            }
        }

        if order.len() != self.entities.len() {
            let entities = self
                .entities
                .iter()
                .filter(|e| !order.contains(e))
                .cloned()
                .collect();
            return Err(PlanningError::Cycle { entities });
        }

        Ok(order)
    }
}

/// Computed, inspectable provisioning plan
#[derive(Debug, Clone)]
pub struct ProvisioningPlan {
    order: Vec<String>,
    graph: DependencyGraph,
    edges: Vec<DependencyEdge>,
    back_edges: Vec<DependencyEdge>,
    immediate: HashMap<String, Vec<PropertyDefinition>>,
    deferred: Vec<DeferredOperation>,
    relation_waves: Vec<Vec<usize>>,
    self_waves: Vec<Vec<usize>>,
}

impl ProvisioningPlan {
    /// Build the plan for a catalog
    pub fn build(catalog: &EntityCatalog) -> Result<Self, PlanningError> {
        validate_catalog(catalog)?;

        let names: Vec<String> = catalog.entities().iter().map(|e| e.name.clone()).collect();

        let mut candidates = Vec::new();
        let mut full = DependencyGraph::new(names.clone());
        for entity in catalog.entities() {
            for (property, spec) in entity.relations() {
                if entity.is_self_relation(spec) {
                    continue;
                }
                full.add_edge(&entity.name, &spec.target);
                candidates.push(DependencyEdge {
                    from: entity.name.clone(),
                    to: spec.target.clone(),
                    property: property.name.clone(),
                });
            }
        }

        // An edge on a cycle pointing at a later-declared entity is a back-edge.
        // Every cycle has at least one, and what remains is acyclic.
        let mut graph = DependencyGraph::new(names);
        let mut edges = Vec::new();
        let mut back_edges = Vec::new();
        for edge in candidates {
            let on_cycle = full.reaches(&edge.to, &edge.from);
            let points_forward = catalog.index_of(&edge.to) > catalog.index_of(&edge.from);
            if on_cycle && points_forward {
                log::debug!("Deferring back-edge {}.{} -> {}", edge.from, edge.property, edge.to);
                back_edges.push(edge);
            } else {
                graph.add_edge(&edge.from, &edge.to);
                edges.push(edge);
            }
        }

        let order = graph.topological_sort()?;

        let mut immediate = HashMap::new();
        let mut deferred = Vec::new();
        for entity in catalog.entities() {
            let mut creation = Vec::new();
            for property in &entity.properties {
                match &property.kind {
                    PropertyKind::Relation(spec) if entity.is_self_relation(spec) => {
                        deferred.push(DeferredOperation {
                            target_entity: entity.name.clone(),
                            property: property.clone(),
                            prerequisite: Prerequisite::EntityCreated {
                                entity: entity.name.clone(),
                            },
                            stage: DeferredStage::SelfRelations,
                            reason: DeferralReason::SelfRelation,
                        });
                    }
                    PropertyKind::Relation(spec)
                        if back_edges
                            .iter()
                            .any(|e| e.from == entity.name && e.property == property.name) =>
                    {
                        deferred.push(DeferredOperation {
                            target_entity: entity.name.clone(),
                            property: property.clone(),
                            prerequisite: Prerequisite::EntityCreated {
                                entity: spec.target.clone(),
                            },
                            stage: DeferredStage::Relations,
                            reason: DeferralReason::BackEdge,
                        });
                    }
                    PropertyKind::Rollup(spec) => {
                        let (prerequisite, stage) =
                            rollup_prerequisite(catalog, entity, property, spec)?;
                        deferred.push(DeferredOperation {
                            target_entity: entity.name.clone(),
                            property: property.clone(),
                            prerequisite,
                            stage,
                            reason: DeferralReason::Rollup,
                        });
                    }
                    _ => creation.push(property.clone()),
                }
            }
            immediate.insert(entity.name.clone(), creation);
        }

        let mut plan = Self {
            order,
            graph,
            edges,
            back_edges,
            immediate,
            deferred,
            relation_waves: Vec::new(),
            self_waves: Vec::new(),
        };
        plan.relation_waves = plan.schedule(DeferredStage::Relations)?;
        plan.self_waves = plan.schedule(DeferredStage::SelfRelations)?;
        Ok(plan)
    }

    /// Phase-1 creation order
    pub fn order(&self) -> &[String] {
        &self.order
    }

    /// Edges honored at creation time
    pub fn edges(&self) -> &[DependencyEdge] {
        &self.edges
    }

    /// Edges turned into deferred relations to break cycles
    pub fn back_edges(&self) -> &[DependencyEdge] {
        &self.back_edges
    }

    /// Properties included in the entity's creation payload
    pub fn creation_properties(&self, entity: &str) -> &[PropertyDefinition] {
        self.immediate.get(entity).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn deferred_for(&self, entity: &str, stage: DeferredStage) -> Vec<&DeferredOperation> {
        self.deferred
            .iter()
            .filter(|op| op.target_entity == entity && op.stage == stage)
            .collect()
    }

    /// Phase-2 operations in waves; everything in a wave can run once the
    /// previous waves are applied
    pub fn relation_waves(&self) -> Vec<Vec<&DeferredOperation>> {
        self.resolve_waves(&self.relation_waves)
    }

    /// Phase-3 operations in waves
    pub fn self_waves(&self) -> Vec<Vec<&DeferredOperation>> {
        self.resolve_waves(&self.self_waves)
    }

    /// Group the creation order into batches. Consecutive entities with no
    /// edges in or out may share a batch of up to `max_parallel`.
    pub fn phase1_batches(&self, max_parallel: usize) -> Vec<Vec<String>> {
        let mut batches = Vec::new();
        let mut group: Vec<String> = Vec::new();

        for entity in &self.order {
            if max_parallel > 1 && self.graph.is_isolated(entity) {
                group.push(entity.clone());
                if group.len() == max_parallel {
                    batches.push(std::mem::take(&mut group));
                }
            } else {
                if !group.is_empty() {
                    batches.push(std::mem::take(&mut group));
                }
                batches.push(vec![entity.clone()]);
            }
        }
        if !group.is_empty() {
            batches.push(group);
        }
        batches
    }

    fn resolve_waves(&self, waves: &[Vec<usize>]) -> Vec<Vec<&DeferredOperation>> {
        waves
            .iter()
            .map(|wave| wave.iter().map(|&i| &self.deferred[i]).collect())
            .collect()
    }

    /// Order the operations of one stage by prerequisite, assuming phase 1
    /// and all earlier stages have completed
    fn schedule(&self, stage: DeferredStage) -> Result<Vec<Vec<usize>>, PlanningError> {
        let mut available: HashSet<(String, String)> = HashSet::new();
        for (entity, properties) in &self.immediate {
            for property in properties {
                available.insert((entity.clone(), property.name.clone()));
                if let Some(spec) = property.as_relation() {
                    if let (true, Some(inverse)) = (spec.is_dual(), &spec.inverse) {
                        available.insert((spec.target.clone(), inverse.clone()));
                    }
                }
            }
        }
        for op in self.deferred.iter().filter(|op| op.stage < stage) {
            available.extend(op.effects());
        }

        let mut pending: Vec<usize> = (0..self.deferred.len())
            .filter(|&i| self.deferred[i].stage == stage)
            .collect();
        let mut waves = Vec::new();

        while !pending.is_empty() {
            let (ready, blocked): (Vec<usize>, Vec<usize>) = pending
                .into_iter()
                .partition(|&i| is_satisfied(&self.deferred[i], &available));

            if ready.is_empty() {
                return Err(PlanningError::UnsatisfiablePrerequisite {
                    operations: blocked.iter().map(|&i| self.deferred[i].label()).collect(),
                });
            }

            for &i in &ready {
                available.extend(self.deferred[i].effects());
            }
            waves.push(ready);
            pending = blocked;
        }

        Ok(waves)
    }
}

fn is_satisfied(op: &DeferredOperation, available: &HashSet<(String, String)>) -> bool {
    match &op.prerequisite {
        Prerequisite::EntityCreated { .. } => true,
        Prerequisite::Declared { property } => {
            available.contains(&(op.target_entity.clone(), property.clone()))
        }
        Prerequisite::Mirrored {
            owner,
            owning_property,
            ..
        } => available.contains(&(owner.clone(), owning_property.clone())),
    }
}

/// Checks that need the whole catalog: names, targets, collisions
fn validate_catalog(catalog: &EntityCatalog) -> Result<(), PlanningError> {
    let mut seen = HashSet::new();
    for entity in catalog.entities() {
        if !seen.insert(entity.name.as_str()) {
            return Err(PlanningError::DuplicateEntity {
                entity: entity.name.clone(),
            });
        }
    }

    for entity in catalog.entities() {
        for (property, spec) in entity.relations() {
            if catalog.get(&spec.target).is_none() {
                return Err(PlanningError::UnknownTarget {
                    entity: entity.name.clone(),
                    property: property.name.clone(),
                    target: spec.target.clone(),
                });
            }
            if spec.mode == RelationMode::SelfRef && spec.target != entity.name {
                return Err(PlanningError::InvalidSelfRelation {
                    entity: entity.name.clone(),
                    property: property.name.clone(),
                    target: spec.target.clone(),
                });
            }
        }

        // A property is owned by exactly one declaration or one mirror
        let mut owners: HashMap<&str, Vec<String>> = HashMap::new();
        for property in &entity.properties {
            owners
                .entry(property.name.as_str())
                .or_default()
                .push(entity.name.clone());
        }
        let mirrors = catalog.mirrors_on(&entity.name);
        for mirror in &mirrors {
            owners
                .entry(mirror.name.as_str())
                .or_default()
                .push(format!("{}.{}", mirror.owner, mirror.owning_property));
        }
        let mut collisions: Vec<_> = owners.into_iter().filter(|(_, o)| o.len() > 1).collect();
        collisions.sort_by(|a, b| a.0.cmp(b.0));
        if let Some((property, owners)) = collisions.into_iter().next() {
            return Err(PlanningError::PropertyCollision {
                entity: entity.name.clone(),
                property: property.to_string(),
                owners,
            });
        }
    }

    Ok(())
}

/// Find the relation a rollup summarizes and the stage it can run in
fn rollup_prerequisite(
    catalog: &EntityCatalog,
    entity: &EntityTypeDefinition,
    property: &PropertyDefinition,
    spec: &RollupSpec,
) -> Result<(Prerequisite, DeferredStage), PlanningError> {
    let missing = || PlanningError::MissingRollupRelation {
        entity: entity.name.clone(),
        property: property.name.clone(),
        relation: spec.relation_property.clone(),
    };

    let check_related = |related: &str| {
        if catalog.has_property(related, &spec.rollup_property) {
            Ok(())
        } else {
            Err(PlanningError::UnknownRollupProperty {
                entity: entity.name.clone(),
                property: property.name.clone(),
                related_entity: related.to_string(),
                rollup_property: spec.rollup_property.clone(),
            })
        }
    };

    if let Some(declared) = entity.property(&spec.relation_property) {
        let relation = declared.as_relation().ok_or_else(missing)?;
        check_related(&relation.target)?;
        let stage = if entity.is_self_relation(relation) {
            DeferredStage::SelfRelations
        } else {
            DeferredStage::Relations
        };
        return Ok((
            Prerequisite::Declared {
                property: declared.name.clone(),
            },
            stage,
        ));
    }

    let mirror = catalog
        .mirrors_on(&entity.name)
        .into_iter()
        .find(|m| m.name == spec.relation_property)
        .ok_or_else(missing)?;
    check_related(&mirror.owner)?;
    let stage = if mirror.owner == entity.name {
        DeferredStage::SelfRelations
    } else {
        DeferredStage::Relations
    };
    Ok((
        Prerequisite::Mirrored {
            property: mirror.name,
            owner: mirror.owner,
            owning_property: mirror.owning_property,
        },
        stage,
    ))
}

#[cfg(test)]
impl ProvisioningPlan {
    pub fn position(&self, entity: &str) -> Option<usize> {
        self.order.iter().position(|e| e == entity)
    }

    pub fn deferred(&self) -> &[DeferredOperation] {
        &self.deferred
    }
}
