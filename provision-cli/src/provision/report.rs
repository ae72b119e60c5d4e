//! Outcome of a provisioning run

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::manifest::ProvisioningManifest;
use crate::api::ErrorKind;
use crate::catalog::EntityCatalog;

/// A step the user has to finish by hand in the store's UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualAction {
    pub entity: String,
    pub property: String,
    pub instruction: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    /// Every entity reached at least `relations-patched`
    pub success: bool,
    pub manifest: ProvisioningManifest,
    /// Entities with a remote id, in creation order
    pub completed_entities: Vec<String>,
    pub failed_at: Option<String>,
    pub error: Option<ErrorKind>,
    pub error_message: Option<String>,
    pub manual_action_required: Vec<ManualAction>,
}

impl RunReport {
    /// `{ "goals": "<id>", "mainRecords": "<id>", ... }`, null for entities
    /// that have no id yet
    pub fn flat_ids(&self, catalog: &EntityCatalog) -> Map<String, Value> {
        catalog
            .entities()
            .iter()
            .map(|entity| {
                let id = self
                    .manifest
                    .remote_id(&entity.name)
                    .map_or(Value::Null, |id| Value::String(id.to_string()));
                (entity.manifest_key.clone(), id)
            })
            .collect()
    }
}
