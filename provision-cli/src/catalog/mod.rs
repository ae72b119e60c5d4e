//! Entity catalog
//!
//! Static description of the schemas provisioned into a workspace, the
//! properties they declare, and the mirror properties that dual relations
//! materialize on their targets. The wire rendering of properties lives in
//! [`wire`].

pub mod entities;
pub mod types;
pub mod wire;

pub use entities::lifelog_entities;
pub use types::{EntityTypeDefinition, PropertyDefinition, PropertyKind, RelationMode, RollupSpec};

/// A property that exists on an entity only because another entity (or the
/// entity itself) declares a dual relation to it. Observed, never declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirroredProperty {
    /// Name of the mirror on the target entity
    pub name: String,
    /// Entity declaring the owning relation
    pub owner: String,
    /// Relation property on the owner that creates the mirror
    pub owning_property: String,
}

/// Ordered set of entity definitions
#[derive(Debug, Clone, Default)]
pub struct EntityCatalog {
    entities: Vec<EntityTypeDefinition>,
}

impl EntityCatalog {
    pub fn new(entities: Vec<EntityTypeDefinition>) -> Self {
        Self { entities }
    }

    /// The fixed eight-entity life-logging catalog
    pub fn lifelog() -> Self {
        Self::new(lifelog_entities())
    }

    /// Entities in declaration order
    pub fn entities(&self) -> &[EntityTypeDefinition] {
        &self.entities
    }

    pub fn get(&self, name: &str) -> Option<&EntityTypeDefinition> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Declaration index, used to break ties in ordering
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entities.iter().position(|e| e.name == name)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Mirror properties materialized on `name` by dual relations
    pub fn mirrors_on(&self, name: &str) -> Vec<MirroredProperty> {
        let mut mirrors = Vec::new();
        for owner in &self.entities {
            for (property, spec) in owner.relations() {
                if spec.target != name || !spec.is_dual() {
                    continue;
                }
                if let Some(inverse) = &spec.inverse {
                    mirrors.push(MirroredProperty {
                        name: inverse.clone(),
                        owner: owner.name.clone(),
                        owning_property: property.name.clone(),
                    });
                }
            }
        }
        mirrors
    }

    /// Whether `property` will exist on `entity`, declared or mirrored
    pub fn has_property(&self, entity: &str, property: &str) -> bool {
        let declared = self
            .get(entity)
            .map(|e| e.property(property).is_some())
            .unwrap_or(false);
        declared || self.mirrors_on(entity).iter().any(|m| m.name == property)
    }
}
