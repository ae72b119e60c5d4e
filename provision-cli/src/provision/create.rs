//! Phase 1: create schemas in dependency order

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info};

use super::manifest::EntityPhase;
use super::pipeline::Run;
use crate::api::{CreateSchemaRequest, SchemaOperation, StoreError};
use crate::catalog::wire;

impl Run<'_> {
    /// Returns false when a create failed and the run must stop
    pub(super) async fn create_schemas(&mut self) -> Result<bool> {
        for batch in self.plan.phase1_batches(self.max_parallel_creates) {
            let mut operations = Vec::new();

            for entity in &batch {
                if self.manifest.remote_id(entity).is_some() {
                    // Known id: never created twice, only brought up to `created`
                    self.manifest.advance(entity, EntityPhase::Created);
                    debug!("[{}] {} already exists, skipping create", self.run_id, entity);
                    continue;
                }

                match self.create_operation(entity) {
                    Ok(operation) => operations.push(operation),
                    Err(err) => {
                        self.fail(entity, err);
                        self.persist()?;
                        return Ok(false);
                    }
                }
            }

            if operations.is_empty() {
                continue;
            }

            let client = self.ctx.client.clone();
            let retry = self.retry.clone();
            let limiter = self.limiter.clone();
            let results = join_all(operations.iter().map(|operation| {
                let client = client.clone();
                let retry = retry.clone();
                let limiter = limiter.clone();
                async move {
                    let _permit = limiter.acquire().await;
                    operation.execute(client.as_ref(), &retry).await
                }
            }))
            .await;

            let mut failed = false;
            for (operation, result) in operations.iter().zip(results) {
                let entity = operation.entity();
                match result {
                    Ok(response) => {
                        self.manifest.record_created(entity, &response.id)?;
                        info!("[{}] Created {} ({})", self.run_id, entity, response.id);
                    }
                    Err(err) => {
                        self.fail(entity, err);
                        failed = true;
                    }
                }
                self.persist()?;
            }

            if failed {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Creation request: title, plain properties and relations whose targets
    /// already have ids
    fn create_operation(&self, entity: &str) -> Result<SchemaOperation, StoreError> {
        let definition = self
            .catalog
            .get(entity)
            .ok_or_else(|| StoreError::Validation(format!("unknown entity '{}'", entity)))?;

        let properties =
            wire::properties_payload(self.plan.creation_properties(entity), self.resolver())
                .map_err(|e| StoreError::Validation(e.to_string()))?;

        let request = CreateSchemaRequest::new(
            &self.ctx.parent_container_id,
            &definition.title,
            properties,
        );
        Ok(SchemaOperation::create_schema(entity, request))
    }
}
