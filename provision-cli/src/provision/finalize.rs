//! Phase 3: best-effort self relations
//!
//! Not every store accepts a self-referencing dual relation through a schema
//! patch. Anything that fails or comes back incomplete is turned into a
//! manual action instead of failing the run.

use anyhow::Result;
use log::{info, warn};

use super::manifest::EntityPhase;
use super::pipeline::Run;
use super::plan::{DeferredOperation, DeferredStage, Prerequisite};
use super::report::ManualAction;
use crate::api::SchemaResponse;
use crate::catalog::PropertyKind;

impl Run<'_> {
    pub(super) async fn finalize_self_relations(&mut self) -> Result<()> {
        let plan = self.plan;

        for wave in plan.self_waves() {
            for op in wave {
                let entity = op.target_entity.as_str();
                if self.manifest.phase(entity) >= EntityPhase::Complete {
                    continue;
                }

                let property = op.property.display_name();
                if self.manifest.is_applied(entity, &op.property.name) {
                    // Landed earlier but still needs a hand-made fix
                    if let Some(action) = self.manifest.manual_action(entity, &property).cloned() {
                        warn!(
                            "[{}] Manual action still open for {}: {}",
                            self.run_id,
                            op.label(),
                            action.instruction
                        );
                        self.manual_actions.push(action);
                    }
                    continue;
                }
                self.manifest.resolve_manual_action(entity, &property);

                if let Some(blocker) = self.blocking_action(op) {
                    let instruction = format!(
                        "{} after fixing {}",
                        self.instruction(op),
                        blocker
                    );
                    self.require_manual(op, instruction);
                    continue;
                }

                let operation = match self.patch_operation(op) {
                    Ok(operation) => operation,
                    Err(err) => {
                        let instruction = format!("{} ({})", self.instruction(op), err);
                        self.require_manual(op, instruction);
                        continue;
                    }
                };

                match operation
                    .execute(self.ctx.client.as_ref(), &self.retry)
                    .await
                {
                    Ok(response) => self.verify_applied(op, &response),
                    Err(err) => {
                        warn!(
                            "[{}] {} rejected: {}",
                            self.run_id,
                            op.label(),
                            err
                        );
                        let instruction = format!("{} (store said: {})", self.instruction(op), err);
                        self.require_manual(op, instruction);
                    }
                }
                self.persist()?;
            }
        }

        for entity in plan.order() {
            let applied = plan
                .deferred_for(entity, DeferredStage::SelfRelations)
                .iter()
                .all(|op| self.manifest.is_applied(entity, &op.property.name));
            if self.manifest.phase(entity) >= EntityPhase::RelationsPatched
                && applied
                && !self.manifest.has_manual_actions(entity)
            {
                self.manifest.advance(entity, EntityPhase::Complete);
            }
        }
        self.persist()
    }

    /// The response must show the property, and for a dual self relation its
    /// inverse as well
    fn verify_applied(&mut self, op: &DeferredOperation, response: &SchemaResponse) {
        let entity = op.target_entity.as_str();
        let inverse = op
            .property
            .as_relation()
            .filter(|spec| spec.is_dual())
            .and_then(|spec| spec.inverse.clone());

        if !response.has_property(&op.property.name) {
            let instruction = format!(
                "{} (the store accepted the change but the property is missing)",
                self.instruction(op)
            );
            self.require_manual(op, instruction);
            return;
        }

        self.manifest.record_applied(entity, &op.property.name);
        match inverse {
            Some(inverse) if !response.has_property(&inverse) => {
                let title = self.title_of(entity);
                let instruction = format!(
                    "In '{}', open '{}' and enable showing it on {} as '{}'",
                    title, op.property.name, title, inverse
                );
                self.require_manual(op, instruction);
            }
            _ => info!("[{}] Added {}", self.run_id, op.label()),
        }
    }

    /// Name of an earlier manual action this operation depends on
    fn blocking_action(&self, op: &DeferredOperation) -> Option<String> {
        let Prerequisite::Declared { property } = &op.prerequisite else {
            return None;
        };
        self.manual_actions
            .iter()
            .find(|a| {
                a.entity == op.target_entity && a.property.split('/').next() == Some(property.as_str())
            })
            .map(|a| format!("{}.{}", a.entity, a.property))
    }

    fn require_manual(&mut self, op: &DeferredOperation, instruction: String) {
        warn!(
            "[{}] Manual action needed for {}: {}",
            self.run_id,
            op.label(),
            instruction
        );
        let action = ManualAction {
            entity: op.target_entity.clone(),
            property: op.property.display_name(),
            instruction,
        };
        self.manifest.record_manual_action(action.clone());
        self.manual_actions.push(action);
    }

    fn instruction(&self, op: &DeferredOperation) -> String {
        let title = self.title_of(&op.target_entity);
        match &op.property.kind {
            PropertyKind::Relation(spec) => match &spec.inverse {
                Some(inverse) => format!(
                    "In '{}', add relation '{}' to '{}' itself, shown on the other side as '{}'",
                    title, op.property.name, title, inverse
                ),
                None => format!(
                    "In '{}', add relation '{}' to '{}' itself",
                    title, op.property.name, title
                ),
            },
            PropertyKind::Rollup(spec) => format!(
                "In '{}', add rollup '{}' of '{}' over '{}' using {}",
                title,
                op.property.name,
                spec.rollup_property,
                spec.relation_property,
                spec.function.wire_name()
            ),
            other => format!(
                "In '{}', add {} property '{}'",
                title,
                other.label(),
                op.property.name
            ),
        }
    }

    fn title_of(&self, entity: &str) -> String {
        self.catalog
            .get(entity)
            .map_or_else(|| entity.to_string(), |e| e.title.clone())
    }
}
