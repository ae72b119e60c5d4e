//! Rendering of property definitions to the store's JSON schema format
//!
//! Every create and patch payload goes through [`property_payload`], so the
//! type-tagged objects are built in exactly one place.

use serde_json::{json, Map, Value};
use thiserror::Error;

use super::types::{PropertyDefinition, PropertyKind, RelationMode, SelectOption};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("relation '{property}' targets '{target}' which has no remote id yet")]
    UnresolvedTarget { property: String, target: String },
}

/// Render one property. `resolve` maps an entity name to its remote id.
pub fn property_payload<F>(property: &PropertyDefinition, resolve: F) -> Result<Value, WireError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = match &property.kind {
        PropertyKind::Title => tagged("title", json!({})),
        PropertyKind::Text => tagged("rich_text", json!({})),
        PropertyKind::Date => tagged("date", json!({})),
        PropertyKind::Checkbox => tagged("checkbox", json!({})),
        PropertyKind::CreatedTime => tagged("created_time", json!({})),
        PropertyKind::LastEditedTime => tagged("last_edited_time", json!({})),
        PropertyKind::Number { format } => {
            tagged("number", json!({ "format": format.wire_name() }))
        }
        PropertyKind::Select { options } => {
            tagged("select", json!({ "options": options_payload(options) }))
        }
        PropertyKind::MultiSelect { options } => {
            tagged("multi_select", json!({ "options": options_payload(options) }))
        }
        PropertyKind::Relation(spec) => {
            let database_id = resolve(&spec.target).ok_or_else(|| WireError::UnresolvedTarget {
                property: property.name.clone(),
                target: spec.target.clone(),
            })?;

            let relation = match (spec.mode, &spec.inverse) {
                (RelationMode::Dual | RelationMode::SelfRef, Some(inverse)) => json!({
                    "database_id": database_id,
                    "type": "dual_property",
                    "dual_property": { "name": inverse },
                }),
                (RelationMode::Dual | RelationMode::SelfRef, None) => json!({
                    "database_id": database_id,
                    "type": "dual_property",
                    "dual_property": {},
                }),
                (RelationMode::Forward, _) => json!({
                    "database_id": database_id,
                    "type": "single_property",
                    "single_property": {},
                }),
            };
            tagged("relation", relation)
        }
        PropertyKind::Rollup(spec) => tagged(
            "rollup",
            json!({
                "relation_property_name": spec.relation_property,
                "rollup_property_name": spec.rollup_property,
                "function": spec.function.wire_name(),
            }),
        ),
    };
    Ok(value)
}

/// Render a set of properties into the `properties` object of a request
pub fn properties_payload<'a, I, F>(properties: I, resolve: F) -> Result<Map<String, Value>, WireError>
where
    I: IntoIterator<Item = &'a PropertyDefinition>,
    F: Fn(&str) -> Option<String>,
{
    let mut map = Map::new();
    for property in properties {
        map.insert(property.name.clone(), property_payload(property, &resolve)?);
    }
    Ok(map)
}

fn tagged(kind: &str, body: Value) -> Value {
    let mut object = Map::new();
    object.insert("type".to_string(), Value::String(kind.to_string()));
    object.insert(kind.to_string(), body);
    Value::Object(object)
}

fn options_payload(options: &[SelectOption]) -> Vec<Value> {
    options
        .iter()
        .map(|o| json!({ "name": o.name, "color": o.color }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::types::RollupFunction;

    fn ids(name: &str) -> Option<String> {
        match name {
            "Goals" => Some("g1".to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_dual_relation_payload() {
        let prop = PropertyDefinition::dual_relation("RelatedGoal", "Goals", "RelatedTodos");
        let value = property_payload(&prop, ids).unwrap();

        assert_eq!(value["type"], "relation");
        assert_eq!(value["relation"]["database_id"], "g1");
        assert_eq!(value["relation"]["type"], "dual_property");
        assert_eq!(value["relation"]["dual_property"]["name"], "RelatedTodos");
    }

    #[test]
    fn test_forward_relation_payload() {
        let prop = PropertyDefinition::relation("Goal", "Goals");
        let value = property_payload(&prop, ids).unwrap();

        assert_eq!(value["relation"]["type"], "single_property");
        assert!(value["relation"].get("dual_property").is_none());
    }

    #[test]
    fn test_unresolved_relation_target() {
        let prop = PropertyDefinition::relation("RelatedMainRecords", "MainRecords");
        let err = property_payload(&prop, ids).unwrap_err();

        assert_eq!(
            err,
            WireError::UnresolvedTarget {
                property: "RelatedMainRecords".to_string(),
                target: "MainRecords".to_string(),
            }
        );
    }

    #[test]
    fn test_rollup_payload() {
        let prop =
            PropertyDefinition::rollup("TotalTime", "ActivityDetails", "Duration", RollupFunction::Sum);
        let value = property_payload(&prop, ids).unwrap();

        assert_eq!(value["type"], "rollup");
        assert_eq!(value["rollup"]["relation_property_name"], "ActivityDetails");
        assert_eq!(value["rollup"]["rollup_property_name"], "Duration");
        assert_eq!(value["rollup"]["function"], "sum");
    }

    #[test]
    fn test_select_and_text_payloads() {
        let select = PropertyDefinition::select("Priority", &[("High", "red")]);
        let value = property_payload(&select, ids).unwrap();
        assert_eq!(value["select"]["options"][0]["name"], "High");
        assert_eq!(value["select"]["options"][0]["color"], "red");

        let text = property_payload(&PropertyDefinition::text("Notes"), ids).unwrap();
        assert_eq!(text["type"], "rich_text");

        let percent = property_payload(&PropertyDefinition::percent("Progress"), ids).unwrap();
        assert_eq!(percent["number"]["format"], "percent");
    }

    #[test]
    fn test_properties_payload_keys_by_name() {
        let props = vec![
            PropertyDefinition::title("Name"),
            PropertyDefinition::checkbox("Done"),
        ];
        let map = properties_payload(&props, ids).unwrap();

        assert_eq!(map.len(), 2);
        assert_eq!(map["Name"]["type"], "title");
        assert_eq!(map["Done"]["type"], "checkbox");
    }
}
