//! In-memory store and manifest store for pipeline tests

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Mutex;

use super::manifest::{ManifestStore, ProvisioningManifest};
use crate::api::models::PatchSchemaRequest;
use crate::api::{CreateSchemaRequest, SchemaResponse, SchemaStoreClient, StoreError};

#[derive(Default)]
struct FakeState {
    schemas: BTreeMap<String, BTreeSet<String>>,
    created: Vec<CreateSchemaRequest>,
    create_calls: usize,
    patch_calls: usize,
    patch_log: Vec<(String, String)>,
    create_failures: HashMap<usize, StoreError>,
    patch_failures: HashMap<String, StoreError>,
    drop_self_inverse: bool,
}

/// Schema store that keeps schemas in memory and materializes dual mirrors
/// the way the real store does
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<FakeState>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A schema that already exists remotely
    pub fn seed_schema(&self, id: &str, properties: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.schemas.insert(
            id.to_string(),
            properties.iter().map(|p| p.to_string()).collect(),
        );
    }

    /// Fail the `n`th create call (1-based, retries included)
    pub fn fail_create_call(&self, n: usize, error: StoreError) {
        self.state.lock().unwrap().create_failures.insert(n, error);
    }

    /// Fail every patch that adds `property`
    pub fn fail_patch(&self, property: &str, error: StoreError) {
        self.state
            .lock()
            .unwrap()
            .patch_failures
            .insert(property.to_string(), error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock().unwrap();
        state.create_failures.clear();
        state.patch_failures.clear();
    }

    /// Accept self relations without creating their inverse side
    pub fn drop_self_inverse(&self, drop: bool) {
        self.state.lock().unwrap().drop_self_inverse = drop;
    }

    pub fn create_calls(&self) -> usize {
        self.state.lock().unwrap().create_calls
    }

    pub fn patch_calls(&self) -> usize {
        self.state.lock().unwrap().patch_calls
    }

    /// Titles of successfully created schemas, in call order
    pub fn create_titles(&self) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state.created.iter().map(|r| r.title_text()).collect()
    }

    pub fn create_request(&self, title: &str) -> Option<CreateSchemaRequest> {
        let state = self.state.lock().unwrap();
        state.created.iter().find(|r| r.title_text() == title).cloned()
    }

    /// Patch attempts adding `property`, failed ones included
    pub fn patch_count(&self, property: &str) -> usize {
        let state = self.state.lock().unwrap();
        state.patch_log.iter().filter(|(_, p)| p == property).count()
    }

    pub fn patched_properties(&self, schema_id: &str) -> Vec<String> {
        let state = self.state.lock().unwrap();
        state
            .patch_log
            .iter()
            .filter(|(id, _)| id == schema_id)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn properties_of(&self, schema_id: &str) -> BTreeSet<String> {
        let state = self.state.lock().unwrap();
        state.schemas.get(schema_id).cloned().unwrap_or_default()
    }
}

impl FakeState {
    /// Add the inverse side of a dual relation payload to its target
    fn mirror(&mut self, owner_id: &str, payload: &Value) {
        let relation = &payload["relation"];
        let (Some(target), Some(inverse)) = (
            relation["database_id"].as_str(),
            relation["dual_property"]["name"].as_str(),
        ) else {
            return;
        };
        if target == owner_id && self.drop_self_inverse {
            return;
        }
        if let Some(schema) = self.schemas.get_mut(target) {
            schema.insert(inverse.to_string());
        }
    }

    fn response(&self, id: &str) -> SchemaResponse {
        SchemaResponse {
            id: id.to_string(),
            property_names: self
                .schemas
                .get(id)
                .map(|p| p.iter().cloned().collect())
                .unwrap_or_default(),
        }
    }
}

#[async_trait]
impl SchemaStoreClient for FakeStore {
    async fn create_schema(
        &self,
        request: &CreateSchemaRequest,
    ) -> Result<SchemaResponse, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.create_calls += 1;
        let call = state.create_calls;
        if let Some(error) = state.create_failures.remove(&call) {
            return Err(error);
        }

        let id = format!("db-{}", call);
        state
            .schemas
            .insert(id.clone(), request.properties.keys().cloned().collect());
        for payload in request.properties.values() {
            state.mirror(&id, payload);
        }
        state.created.push(request.clone());
        Ok(state.response(&id))
    }

    async fn patch_schema(
        &self,
        schema_id: &str,
        request: &PatchSchemaRequest,
    ) -> Result<SchemaResponse, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.patch_calls += 1;
        for name in request.properties.keys() {
            state.patch_log.push((schema_id.to_string(), name.clone()));
        }
        for name in request.properties.keys() {
            if let Some(error) = state.patch_failures.get(name) {
                return Err(error.clone());
            }
        }

        let Some(schema) = state.schemas.get_mut(schema_id) else {
            return Err(StoreError::NotFound(format!("database {}", schema_id)));
        };
        schema.extend(request.properties.keys().cloned());
        for payload in request.properties.values() {
            state.mirror(schema_id, payload);
        }
        Ok(state.response(schema_id))
    }
}

/// Manifest store that keeps the last saved manifest
#[derive(Default)]
pub struct MemoryManifestStore {
    saved: Mutex<Option<ProvisioningManifest>>,
    saves: Mutex<usize>,
}

impl MemoryManifestStore {
    pub fn saved(&self) -> Option<ProvisioningManifest> {
        self.saved.lock().unwrap().clone()
    }

    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }
}

impl ManifestStore for MemoryManifestStore {
    fn load(&self) -> anyhow::Result<Option<ProvisioningManifest>> {
        Ok(self.saved())
    }

    fn save(&self, manifest: &ProvisioningManifest) -> anyhow::Result<()> {
        *self.saved.lock().unwrap() = Some(manifest.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}
