//! Core operation types for schema provisioning

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::client::SchemaStoreClient;
use crate::api::error::StoreError;
use crate::api::models::{CreateSchemaRequest, PatchSchemaRequest, SchemaResponse};
use crate::api::resilience::RetryPolicy;

/// A single schema call against the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SchemaOperation {
    /// Create a new schema under the parent container
    /// POST /databases
    CreateSchema {
        /// Logical entity name (e.g., "Goals")
        entity: String,
        request: CreateSchemaRequest,
    },
    /// Add one property to an existing schema
    /// PATCH /databases/{id}
    AddProperty {
        /// Logical entity name
        entity: String,
        /// Remote id of the schema being patched
        schema_id: String,
        /// Property name
        property: String,
        /// Type-tagged property payload
        payload: Value,
    },
}

impl SchemaOperation {
    /// Create a new CreateSchema operation
    pub fn create_schema(entity: impl Into<String>, request: CreateSchemaRequest) -> Self {
        Self::CreateSchema {
            entity: entity.into(),
            request,
        }
    }

    /// Create a new AddProperty operation
    pub fn add_property(
        entity: impl Into<String>,
        schema_id: impl Into<String>,
        property: impl Into<String>,
        payload: Value,
    ) -> Self {
        Self::AddProperty {
            entity: entity.into(),
            schema_id: schema_id.into(),
            property: property.into(),
            payload,
        }
    }

    /// Get the entity name for this operation
    pub fn entity(&self) -> &str {
        match self {
            Self::CreateSchema { entity, .. } => entity,
            Self::AddProperty { entity, .. } => entity,
        }
    }

    /// Get the HTTP method for this operation
    pub fn http_method(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "POST",
            Self::AddProperty { .. } => "PATCH",
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::CreateSchema { .. } => "create_schema",
            Self::AddProperty { .. } => "add_property",
        }
    }

    /// Short label for logs, e.g. `create_schema Goals` or `add_property Todos.BlockingTodos`
    pub fn describe(&self) -> String {
        match self {
            Self::CreateSchema { entity, .. } => format!("{} {}", self.operation_type(), entity),
            Self::AddProperty {
                entity, property, ..
            } => format!("{} {}.{}", self.operation_type(), entity, property),
        }
    }

    /// Execute this operation, retrying transient failures
    pub async fn execute(
        &self,
        client: &dyn SchemaStoreClient,
        retry: &RetryPolicy,
    ) -> Result<SchemaResponse, StoreError> {
        let label = self.describe();
        log::debug!("{} {}", self.http_method(), label);
        match self {
            Self::CreateSchema { request, .. } => {
                retry
                    .execute(&label, || client.create_schema(request))
                    .await
            }
            Self::AddProperty {
                schema_id,
                property,
                payload,
                ..
            } => {
                let request = PatchSchemaRequest::add_property(property.clone(), payload.clone());
                retry
                    .execute(&label, || client.patch_schema(schema_id, &request))
                    .await
            }
        }
    }
}
