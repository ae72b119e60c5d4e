//! Provisioning manifest and its persistence
//!
//! The manifest is the only state that survives between runs: which schemas
//! exist remotely, how far each one got, and which deferred properties were
//! already patched in. It is persisted after every successful step so an
//! interrupted run can be resumed without creating anything twice.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::report::ManualAction;
use crate::catalog::EntityCatalog;

/// How far an entity has been provisioned
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "kebab-case")]
pub enum EntityPhase {
    #[default]
    Pending,
    Created,
    RelationsPatched,
    Complete,
}

impl std::fmt::Display for EntityPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Created => "created",
            Self::RelationsPatched => "relations-patched",
            Self::Complete => "complete",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestEntry {
    #[serde(default)]
    pub remote_id: Option<String>,
    #[serde(default)]
    pub phase: EntityPhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Deferred properties already patched onto the remote schema
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub applied_properties: BTreeSet<String>,
    /// Steps still open in the store's UI; the entity cannot complete before
    /// they are resolved
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub manual_actions: Vec<ManualAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("{entity} already has remote id '{existing}', refusing to replace it with '{attempted}'")]
    RemoteIdReassigned {
        entity: String,
        existing: String,
        attempted: String,
    },

    #[error("manifest belongs to parent '{recorded}', not '{requested}'")]
    ParentMismatch { recorded: String, requested: String },
}

/// Persistent record of a provisioning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisioningManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<String>,
    #[serde(default)]
    pub entities: BTreeMap<String, ManifestEntry>,
}

impl ProvisioningManifest {
    /// Fresh manifest with every catalog entity pending
    pub fn for_catalog(catalog: &EntityCatalog, parent_id: impl Into<String>) -> Self {
        let mut manifest = Self {
            parent_id: Some(parent_id.into()),
            ..Default::default()
        };
        manifest.ensure_entities(catalog);
        manifest
    }

    /// Add a pending entry for any catalog entity the manifest does not know
    pub fn ensure_entities(&mut self, catalog: &EntityCatalog) {
        for entity in catalog.entities() {
            self.entities.entry(entity.name.clone()).or_default();
        }
    }

    /// Refuse to resume under a different parent container
    pub fn check_parent(&self, parent_id: &str) -> Result<(), ManifestError> {
        match &self.parent_id {
            Some(recorded) if recorded != parent_id => Err(ManifestError::ParentMismatch {
                recorded: recorded.clone(),
                requested: parent_id.to_string(),
            }),
            _ => Ok(()),
        }
    }

    pub fn entry(&self, entity: &str) -> Option<&ManifestEntry> {
        self.entities.get(entity)
    }

    pub fn remote_id(&self, entity: &str) -> Option<&str> {
        self.entities
            .get(entity)
            .and_then(|e| e.remote_id.as_deref())
    }

    pub fn phase(&self, entity: &str) -> EntityPhase {
        self.entities
            .get(entity)
            .map(|e| e.phase)
            .unwrap_or_default()
    }

    pub fn is_applied(&self, entity: &str, property: &str) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|e| e.applied_properties.contains(property))
    }

    /// Whether every entity in `entities` reached at least `phase`
    pub fn all_reached<'a>(
        &self,
        entities: impl IntoIterator<Item = &'a str>,
        phase: EntityPhase,
    ) -> bool {
        entities.into_iter().all(|e| self.phase(e) >= phase)
    }

    /// Store the id of a newly created schema. An id, once recorded, is final.
    pub fn record_created(&mut self, entity: &str, remote_id: &str) -> Result<(), ManifestError> {
        let entry = self.entities.entry(entity.to_string()).or_default();
        match &entry.remote_id {
            Some(existing) if existing != remote_id => {
                return Err(ManifestError::RemoteIdReassigned {
                    entity: entity.to_string(),
                    existing: existing.clone(),
                    attempted: remote_id.to_string(),
                });
            }
            _ => {}
        }
        entry.remote_id = Some(remote_id.to_string());
        if entry.phase < EntityPhase::Created {
            entry.phase = EntityPhase::Created;
        }
        entry.last_error = None;
        entry.updated_at = Some(Utc::now());
        Ok(())
    }

    pub fn record_applied(&mut self, entity: &str, property: &str) {
        let entry = self.entities.entry(entity.to_string()).or_default();
        entry.applied_properties.insert(property.to_string());
        entry.updated_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self, entity: &str, message: impl Into<String>) {
        let entry = self.entities.entry(entity.to_string()).or_default();
        entry.last_error = Some(message.into());
        entry.updated_at = Some(Utc::now());
    }

    /// Open manual action for `property` (display name), if any
    pub fn manual_action(&self, entity: &str, property: &str) -> Option<&ManualAction> {
        self.entities
            .get(entity)
            .and_then(|e| e.manual_actions.iter().find(|a| a.property == property))
    }

    pub fn has_manual_actions(&self, entity: &str) -> bool {
        self.entities
            .get(entity)
            .is_some_and(|e| !e.manual_actions.is_empty())
    }

    /// Record an open manual action, replacing an earlier one for the same
    /// property. Its instruction becomes the entity's last error.
    pub fn record_manual_action(&mut self, action: ManualAction) {
        let entry = self.entities.entry(action.entity.clone()).or_default();
        entry.manual_actions.retain(|a| a.property != action.property);
        entry.last_error = Some(action.instruction.clone());
        entry.updated_at = Some(Utc::now());
        entry.manual_actions.push(action);
    }

    pub fn resolve_manual_action(&mut self, entity: &str, property: &str) {
        if let Some(entry) = self.entities.get_mut(entity) {
            entry.manual_actions.retain(|a| a.property != property);
        }
    }

    /// Move an entity forward; phases never go back
    pub fn advance(&mut self, entity: &str, phase: EntityPhase) {
        let entry = self.entities.entry(entity.to_string()).or_default();
        if entry.phase < phase {
            entry.phase = phase;
            entry.last_error = None;
            entry.updated_at = Some(Utc::now());
        }
    }
}

/// Where manifests are loaded from and saved to
pub trait ManifestStore: Send + Sync {
    fn load(&self) -> Result<Option<ProvisioningManifest>>;
    fn save(&self, manifest: &ProvisioningManifest) -> Result<()>;
}

/// JSON file store. Writes go to a sibling temp file that is then renamed
/// over the target, so a crash never leaves a half-written manifest.
#[derive(Debug, Clone)]
pub struct FileManifestStore {
    path: PathBuf,
}

impl FileManifestStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "manifest.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ManifestStore for FileManifestStore {
    fn load(&self) -> Result<Option<ProvisioningManifest>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read manifest: {}", self.path.display()))?;
        let manifest = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse manifest: {}", self.path.display()))?;
        log::debug!("Loaded manifest from {}", self.path.display());
        Ok(Some(manifest))
    }

    fn save(&self, manifest: &ProvisioningManifest) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create manifest directory: {}", dir.display()))?;
        }

        let json = serde_json::to_string_pretty(manifest).context("Failed to serialize manifest")?;
        let temp = self.temp_path();
        std::fs::write(&temp, json)
            .with_context(|| format!("Failed to write manifest: {}", temp.display()))?;
        std::fs::rename(&temp, &self.path)
            .with_context(|| format!("Failed to replace manifest: {}", self.path.display()))?;
        log::trace!("Saved manifest to {}", self.path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::entities::{GOALS, TODOS};

    #[test]
    fn test_fresh_manifest_is_all_pending() {
        let manifest = ProvisioningManifest::for_catalog(&EntityCatalog::lifelog(), "parent");

        assert_eq!(manifest.entities.len(), 8);
        assert!(manifest.entities.values().all(|e| e.phase == EntityPhase::Pending));
        assert_eq!(manifest.parent_id.as_deref(), Some("parent"));
    }

    #[test]
    fn test_remote_id_is_never_reassigned() {
        let mut manifest = ProvisioningManifest::default();
        manifest.record_created(GOALS, "g1").unwrap();
        manifest.record_created(GOALS, "g1").unwrap();

        let err = manifest.record_created(GOALS, "g2").unwrap_err();
        assert!(matches!(err, ManifestError::RemoteIdReassigned { .. }));
        assert_eq!(manifest.remote_id(GOALS), Some("g1"));
        assert_eq!(manifest.phase(GOALS), EntityPhase::Created);
    }

    #[test]
    fn test_phase_never_goes_back() {
        let mut manifest = ProvisioningManifest::default();
        manifest.advance(TODOS, EntityPhase::Complete);
        manifest.record_created(TODOS, "t1").unwrap();
        manifest.advance(TODOS, EntityPhase::Created);

        assert_eq!(manifest.phase(TODOS), EntityPhase::Complete);
    }

    #[test]
    fn test_advance_clears_last_error() {
        let mut manifest = ProvisioningManifest::default();
        manifest.record_created(GOALS, "g1").unwrap();
        manifest.record_failure(GOALS, "boom");
        manifest.advance(GOALS, EntityPhase::RelationsPatched);

        assert_eq!(manifest.entry(GOALS).unwrap().last_error, None);
    }

    #[test]
    fn test_manual_actions_are_kept_per_property() {
        let mut manifest = ProvisioningManifest::default();
        let action = |instruction: &str| ManualAction {
            entity: GOALS.to_string(),
            property: "SubGoals/ParentGoal".to_string(),
            instruction: instruction.to_string(),
        };
        manifest.record_manual_action(action("first"));
        manifest.record_manual_action(action("second"));

        let entry = manifest.entry(GOALS).unwrap();
        assert_eq!(entry.manual_actions.len(), 1);
        assert_eq!(entry.last_error.as_deref(), Some("second"));
        assert!(manifest.manual_action(GOALS, "SubGoals/ParentGoal").is_some());

        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(
            value["entities"]["Goals"]["manualActions"][0]["instruction"],
            "second"
        );
        let reloaded: ProvisioningManifest = serde_json::from_value(value).unwrap();
        assert!(reloaded.has_manual_actions(GOALS));

        manifest.resolve_manual_action(GOALS, "SubGoals/ParentGoal");
        assert!(!manifest.has_manual_actions(GOALS));
    }

    #[test]
    fn test_parent_guard() {
        let manifest = ProvisioningManifest::for_catalog(&EntityCatalog::lifelog(), "p1");
        assert!(manifest.check_parent("p1").is_ok());
        assert_eq!(
            manifest.check_parent("p2"),
            Err(ManifestError::ParentMismatch {
                recorded: "p1".to_string(),
                requested: "p2".to_string(),
            })
        );
        assert!(ProvisioningManifest::default().check_parent("p2").is_ok());
    }

    #[test]
    fn test_wire_shape() {
        let json = r#"{"entities":{"Goals":{"remoteId":"g1","phase":"complete"}}}"#;
        let manifest: ProvisioningManifest = serde_json::from_str(json).unwrap();

        assert_eq!(manifest.remote_id(GOALS), Some("g1"));
        assert_eq!(manifest.phase(GOALS), EntityPhase::Complete);

        let mut manifest = manifest;
        manifest.record_applied(GOALS, "SubGoals");
        manifest.advance(TODOS, EntityPhase::RelationsPatched);
        let value = serde_json::to_value(&manifest).unwrap();
        assert_eq!(value["entities"]["Goals"]["appliedProperties"][0], "SubGoals");
        assert_eq!(value["entities"]["Todos"]["phase"], "relations-patched");
    }

    #[test]
    fn test_file_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileManifestStore::new(dir.path().join("nested").join("manifest.json"));
        assert!(store.load().unwrap().is_none());

        let mut manifest = ProvisioningManifest::for_catalog(&EntityCatalog::lifelog(), "p1");
        manifest.record_created(GOALS, "g1").unwrap();
        store.save(&manifest).unwrap();

        assert_eq!(store.load().unwrap(), Some(manifest));
        assert!(!store.temp_path().exists());
    }

    #[test]
    fn test_file_store_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileManifestStore::new(&path).load().unwrap_err();
        assert!(err.to_string().contains("Failed to parse manifest"));
    }
}
