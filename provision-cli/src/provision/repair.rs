//! Phase 2: patch deferred relations and rollups into existing schemas
//!
//! Operations run in waves. Within a wave, different entities are patched
//! concurrently while the operations of one entity stay in order.

use anyhow::Result;
use futures::future::join_all;
use log::{debug, info};
use std::collections::BTreeMap;

use super::manifest::EntityPhase;
use super::pipeline::Run;
use super::plan::{DeferredOperation, DeferredStage};
use crate::api::{SchemaOperation, SchemaResponse, StoreError};
use crate::catalog::wire;

impl Run<'_> {
    /// Returns false when a patch failed and the run must stop
    pub(super) async fn repair_relations(&mut self) -> Result<bool> {
        let names = self.catalog.entities().iter().map(|e| e.name.as_str());
        if !self.manifest.all_reached(names, EntityPhase::Created) {
            return Ok(false);
        }

        let plan = self.plan;
        for (index, wave) in plan.relation_waves().into_iter().enumerate() {
            let mut by_entity: BTreeMap<&str, Vec<(&DeferredOperation, SchemaOperation)>> =
                BTreeMap::new();

            for op in wave {
                let entity = op.target_entity.as_str();
                if self.manifest.phase(entity) >= EntityPhase::RelationsPatched
                    || self.manifest.is_applied(entity, &op.property.name)
                {
                    continue;
                }
                match self.patch_operation(op) {
                    Ok(operation) => by_entity.entry(entity).or_default().push((op, operation)),
                    Err(err) => {
                        self.fail(entity, err);
                        self.persist()?;
                        return Ok(false);
                    }
                }
            }

            if by_entity.is_empty() {
                continue;
            }
            debug!(
                "[{}] Relation wave {}: {} entities",
                self.run_id,
                index + 1,
                by_entity.len()
            );

            let client = self.ctx.client.clone();
            let retry = self.retry.clone();
            let limiter = self.limiter.clone();
            let chains = by_entity.values().map(|chain| {
                let client = client.clone();
                let retry = retry.clone();
                let limiter = limiter.clone();
                async move {
                    let mut results: Vec<Result<SchemaResponse, StoreError>> = Vec::new();
                    for (_, operation) in chain {
                        let _permit = limiter.acquire().await;
                        let result = operation.execute(client.as_ref(), &retry).await;
                        let stop = result.is_err();
                        results.push(result);
                        if stop {
                            break;
                        }
                    }
                    results
                }
            });
            let outcomes = join_all(chains).await;

            let mut failed = false;
            for (chain, results) in by_entity.values().zip(outcomes) {
                for ((op, _), result) in chain.iter().zip(results) {
                    match result {
                        Ok(_) => {
                            self.manifest
                                .record_applied(&op.target_entity, &op.property.name);
                            info!("[{}] Added {}", self.run_id, op.label());
                        }
                        Err(err) => {
                            self.fail(&op.target_entity, err);
                            failed = true;
                        }
                    }
                    self.persist()?;
                }
            }

            if failed {
                return Ok(false);
            }
        }

        for entity in plan.order() {
            let done = plan
                .deferred_for(entity, DeferredStage::Relations)
                .iter()
                .all(|op| self.manifest.is_applied(entity, &op.property.name));
            if done {
                self.manifest.advance(entity, EntityPhase::RelationsPatched);
            }
        }
        self.persist()?;

        Ok(true)
    }

    /// Additive patch adding one deferred property
    pub(super) fn patch_operation(
        &self,
        op: &DeferredOperation,
    ) -> Result<SchemaOperation, StoreError> {
        let schema_id = self.manifest.remote_id(&op.target_entity).ok_or_else(|| {
            StoreError::Validation(format!("{} has no remote id", op.target_entity))
        })?;
        let payload = wire::property_payload(&op.property, self.resolver())
            .map_err(|e| StoreError::Validation(e.to_string()))?;

        Ok(SchemaOperation::add_property(
            &op.target_entity,
            schema_id,
            &op.property.name,
            payload,
        ))
    }
}
