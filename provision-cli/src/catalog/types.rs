//! Property and entity definitions for the workspace catalog

use serde::{Deserialize, Serialize};

/// How a relation property links its owning entity to the target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationMode {
    /// One-sided relation; nothing is created on the target
    Forward,
    /// Creating the relation materializes a mirror property on the target
    Dual,
    /// Relation from an entity to itself (parent/child links)
    #[serde(rename = "self")]
    SelfRef,
}

/// Aggregation applied by a rollup property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollupFunction {
    Sum,
    Count,
    Checked,
}

impl RollupFunction {
    /// Function name as the remote store expects it
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Count => "count",
            Self::Checked => "checked",
        }
    }
}

/// Display format of a number property
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumberFormat {
    #[default]
    Number,
    Percent,
}

impl NumberFormat {
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::Number => "number",
            Self::Percent => "percent",
        }
    }
}

/// A selectable option on a select / multi-select property
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
    pub color: String,
}

/// Relation details: target entity, mode and the mirrored property name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationSpec {
    /// Logical name of the target entity
    pub target: String,
    pub mode: RelationMode,
    /// Name of the property materialized on the target (dual and self relations)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inverse: Option<String>,
}

impl RelationSpec {
    /// Whether the relation creates a mirror property somewhere
    pub fn is_dual(&self) -> bool {
        matches!(self.mode, RelationMode::Dual | RelationMode::SelfRef) && self.inverse.is_some()
    }
}

/// Rollup details: which relation is summarized and how
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollupSpec {
    /// Relation property on the same entity
    pub relation_property: String,
    /// Property read on the related entity
    pub rollup_property: String,
    pub function: RollupFunction,
}

/// Type tag of a property, carrying the per-kind configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum PropertyKind {
    Text,
    Select { options: Vec<SelectOption> },
    MultiSelect { options: Vec<SelectOption> },
    Date,
    Number { format: NumberFormat },
    Checkbox,
    Title,
    CreatedTime,
    LastEditedTime,
    Relation(RelationSpec),
    Rollup(RollupSpec),
}

impl PropertyKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Select { .. } => "select",
            Self::MultiSelect { .. } => "multiSelect",
            Self::Date => "date",
            Self::Number { .. } => "number",
            Self::Checkbox => "checkbox",
            Self::Title => "title",
            Self::CreatedTime => "createdTime",
            Self::LastEditedTime => "lastEditedTime",
            Self::Relation(spec) if spec.mode == RelationMode::SelfRef => "self-relation",
            Self::Relation(_) => "relation",
            Self::Rollup(_) => "rollup",
        }
    }
}

/// A single named property of an entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyDefinition {
    pub name: String,
    #[serde(flatten)]
    pub kind: PropertyKind,
}

impl PropertyDefinition {
    pub fn new(name: impl Into<String>, kind: PropertyKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn title(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Title)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Text)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Date)
    }

    pub fn checkbox(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::Checkbox)
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Number {
                format: NumberFormat::Number,
            },
        )
    }

    pub fn percent(name: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Number {
                format: NumberFormat::Percent,
            },
        )
    }

    pub fn created_time(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::CreatedTime)
    }

    pub fn last_edited_time(name: impl Into<String>) -> Self {
        Self::new(name, PropertyKind::LastEditedTime)
    }

    /// Select property from `(name, color)` pairs
    pub fn select(name: impl Into<String>, options: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            PropertyKind::Select {
                options: to_options(options),
            },
        )
    }

    pub fn multi_select(name: impl Into<String>, options: &[(&str, &str)]) -> Self {
        Self::new(
            name,
            PropertyKind::MultiSelect {
                options: to_options(options),
            },
        )
    }

    /// One-sided relation to `target`
    pub fn relation(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            name,
            PropertyKind::Relation(RelationSpec {
                target: target.into(),
                mode: RelationMode::Forward,
                inverse: None,
            }),
        )
    }

    /// Relation to `target` that materializes `inverse` on the target
    pub fn dual_relation(
        name: impl Into<String>,
        target: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            PropertyKind::Relation(RelationSpec {
                target: target.into(),
                mode: RelationMode::Dual,
                inverse: Some(inverse.into()),
            }),
        )
    }

    /// Relation from `entity` to itself, mirrored as `inverse`
    pub fn self_relation(
        name: impl Into<String>,
        entity: impl Into<String>,
        inverse: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            PropertyKind::Relation(RelationSpec {
                target: entity.into(),
                mode: RelationMode::SelfRef,
                inverse: Some(inverse.into()),
            }),
        )
    }

    pub fn rollup(
        name: impl Into<String>,
        relation_property: impl Into<String>,
        rollup_property: impl Into<String>,
        function: RollupFunction,
    ) -> Self {
        Self::new(
            name,
            PropertyKind::Rollup(RollupSpec {
                relation_property: relation_property.into(),
                rollup_property: rollup_property.into(),
                function,
            }),
        )
    }

    pub fn as_relation(&self) -> Option<&RelationSpec> {
        match &self.kind {
            PropertyKind::Relation(spec) => Some(spec),
            _ => None,
        }
    }

    /// Display form used in plans and reports, e.g. `SubGoals/ParentGoal`
    pub fn display_name(&self) -> String {
        match self.as_relation() {
            Some(spec) if spec.mode == RelationMode::SelfRef => match &spec.inverse {
                Some(inverse) => format!("{}/{}", self.name, inverse),
                None => self.name.clone(),
            },
            _ => self.name.clone(),
        }
    }
}

fn to_options(options: &[(&str, &str)]) -> Vec<SelectOption> {
    options
        .iter()
        .map(|(name, color)| SelectOption {
            name: name.to_string(),
            color: color.to_string(),
        })
        .collect()
}

/// A logical schema in the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityTypeDefinition {
    /// Logical name, e.g. `Goals`
    pub name: String,
    /// Key in the flat id map handed to the rest of the application
    pub manifest_key: String,
    /// Title given to the remote schema
    pub title: String,
    pub properties: Vec<PropertyDefinition>,
}

impl EntityTypeDefinition {
    pub fn new(
        name: impl Into<String>,
        manifest_key: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            manifest_key: manifest_key.into(),
            title: title.into(),
            properties: Vec::new(),
        }
    }

    pub fn with(mut self, property: PropertyDefinition) -> Self {
        self.properties.push(property);
        self
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDefinition> {
        self.properties.iter().find(|p| p.name == name)
    }

    /// Relation properties in declaration order
    pub fn relations(&self) -> impl Iterator<Item = (&PropertyDefinition, &RelationSpec)> {
        self.properties
            .iter()
            .filter_map(|p| p.as_relation().map(|spec| (p, spec)))
    }

    /// Whether a relation targets this entity itself
    pub fn is_self_relation(&self, spec: &RelationSpec) -> bool {
        spec.mode == RelationMode::SelfRef || spec.target == self.name
    }
}
