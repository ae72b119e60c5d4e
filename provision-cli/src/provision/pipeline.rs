//! Three-phase provisioning pipeline
//!
//! 1. Create every schema in dependency order with the properties that can
//!    be declared up front.
//! 2. Patch in deferred relations and rollups once every schema exists.
//! 3. Best-effort self relations; failures become manual actions.
//!
//! Remote failures end up in the [`RunReport`]. Only losing the manifest
//! (local I/O) is returned as an error.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::sync::Arc;

use super::manifest::{EntityPhase, ManifestStore, ProvisioningManifest};
use super::plan::{PlanningError, ProvisioningPlan};
use super::report::{ManualAction, RunReport};
use crate::api::resilience::{ConcurrencyLimiter, ResilienceConfig, RetryPolicy};
use crate::api::{NotionClient, SchemaStoreClient, StoreError};
use crate::catalog::EntityCatalog;
use crate::config::ApiSettings;

/// Everything a run needs to talk to the store. The integration key lives
/// in the client only.
#[derive(Clone)]
pub struct ProvisioningContext {
    pub parent_container_id: String,
    pub client: Arc<dyn SchemaStoreClient>,
}

impl std::fmt::Debug for ProvisioningContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisioningContext")
            .field("parent_container_id", &self.parent_container_id)
            .finish_non_exhaustive()
    }
}

impl ProvisioningContext {
    pub fn new(parent_container_id: impl Into<String>, client: Arc<dyn SchemaStoreClient>) -> Self {
        Self {
            parent_container_id: parent_container_id.into(),
            client,
        }
    }

    /// Context backed by the HTTP client
    pub fn notion(
        api_key: impl Into<String>,
        parent_container_id: impl Into<String>,
        settings: &ApiSettings,
    ) -> Result<Self> {
        let client = NotionClient::new(api_key, settings)?;
        Ok(Self::new(parent_container_id, Arc::new(client)))
    }
}

/// Runs the catalog's plan against a store
pub struct Provisioner {
    catalog: EntityCatalog,
    plan: ProvisioningPlan,
    resilience: ResilienceConfig,
    store: Arc<dyn ManifestStore>,
}

impl Provisioner {
    pub fn new(
        catalog: EntityCatalog,
        resilience: ResilienceConfig,
        store: Arc<dyn ManifestStore>,
    ) -> Result<Self, PlanningError> {
        let plan = ProvisioningPlan::build(&catalog)?;
        Ok(Self {
            catalog,
            plan,
            resilience,
            store,
        })
    }

    pub fn catalog(&self) -> &EntityCatalog {
        &self.catalog
    }

    pub fn plan(&self) -> &ProvisioningPlan {
        &self.plan
    }

    /// Provision from scratch
    pub async fn run(&self, ctx: &ProvisioningContext) -> Result<RunReport> {
        let manifest = ProvisioningManifest::for_catalog(&self.catalog, &ctx.parent_container_id);
        self.resume(ctx, manifest).await
    }

    /// Continue from a previous manifest. Entities with a remote id are never
    /// created again; completed entities are left alone.
    pub async fn resume(
        &self,
        ctx: &ProvisioningContext,
        mut manifest: ProvisioningManifest,
    ) -> Result<RunReport> {
        manifest.check_parent(&ctx.parent_container_id)?;
        manifest.ensure_entities(&self.catalog);
        manifest.parent_id = Some(ctx.parent_container_id.clone());

        let run_id = uuid::Uuid::new_v4().to_string();
        manifest.run_id = Some(run_id.clone());

        info!(
            "[{}] Provisioning {} schemas under {}",
            run_id,
            self.catalog.len(),
            ctx.parent_container_id
        );

        let mut run = Run {
            ctx,
            catalog: &self.catalog,
            plan: &self.plan,
            retry: RetryPolicy::new(self.resilience.retry.clone()),
            limiter: ConcurrencyLimiter::new(self.resilience.concurrency.clone()),
            max_parallel_creates: self.resilience.concurrency.max_parallel_creates.max(1),
            store: self.store.as_ref(),
            manifest,
            run_id,
            failure: None,
            manual_actions: Vec::new(),
        };
        run.persist()?;

        if run.create_schemas().await? && run.repair_relations().await? {
            run.finalize_self_relations().await?;
        }

        let stats = run.limiter.stats();
        debug!(
            "[{}] {} store requests, {:.0}% waited for a permit",
            run.run_id,
            stats.requests_acquired,
            stats.wait_rate() * 100.0
        );
        Ok(run.into_report())
    }
}

/// The step that stopped a run
#[derive(Debug, Clone)]
pub(super) struct Failure {
    pub entity: String,
    pub error: StoreError,
}

/// State of one run; the single writer of the manifest
pub(super) struct Run<'a> {
    pub ctx: &'a ProvisioningContext,
    pub catalog: &'a EntityCatalog,
    pub plan: &'a ProvisioningPlan,
    pub retry: RetryPolicy,
    pub limiter: ConcurrencyLimiter,
    pub max_parallel_creates: usize,
    pub store: &'a dyn ManifestStore,
    pub manifest: ProvisioningManifest,
    pub run_id: String,
    pub failure: Option<Failure>,
    pub manual_actions: Vec<ManualAction>,
}

impl Run<'_> {
    pub fn persist(&self) -> Result<()> {
        self.store
            .save(&self.manifest)
            .context("Failed to persist provisioning manifest")
    }

    /// Record a fatal failure; the first one wins
    pub fn fail(&mut self, entity: &str, error: StoreError) {
        warn!("[{}] {} failed: {}", self.run_id, entity, error);
        self.manifest.record_failure(entity, error.to_string());
        if self.failure.is_none() {
            self.failure = Some(Failure {
                entity: entity.to_string(),
                error,
            });
        }
    }

    /// Resolve an entity name to its remote id
    pub fn resolver(&self) -> impl Fn(&str) -> Option<String> + '_ {
        move |name: &str| self.manifest.remote_id(name).map(str::to_string)
    }

    fn into_report(self) -> RunReport {
        let names = self.catalog.entities().iter().map(|e| e.name.as_str());
        let success =
            self.failure.is_none() && self.manifest.all_reached(names, EntityPhase::RelationsPatched);

        let completed_entities: Vec<String> = self
            .plan
            .order()
            .iter()
            .filter(|e| self.manifest.remote_id(e).is_some())
            .cloned()
            .collect();

        if success {
            info!(
                "[{}] Provisioning finished: {} schemas, {} manual actions",
                self.run_id,
                completed_entities.len(),
                self.manual_actions.len()
            );
        } else if let Some(failure) = &self.failure {
            warn!(
                "[{}] Provisioning stopped at {}: {}",
                self.run_id, failure.entity, failure.error
            );
        }

        RunReport {
            run_id: self.run_id,
            success,
            manifest: self.manifest,
            completed_entities,
            failed_at: self.failure.as_ref().map(|f| f.entity.clone()),
            error: self.failure.as_ref().map(|f| f.error.kind()),
            error_message: self.failure.as_ref().map(|f| f.error.to_string()),
            manual_action_required: self.manual_actions,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ErrorKind;
    use crate::api::resilience::RetryConfig;
    use crate::catalog::entities::*;
    use crate::provision::testing::{FakeStore, MemoryManifestStore};

    fn resilience() -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryConfig::immediate(3),
            ..Default::default()
        }
    }

    fn rate_limited() -> StoreError {
        StoreError::RateLimit {
            message: "slow down".to_string(),
            retry_after: None,
        }
    }

    fn setup(fake: &Arc<FakeStore>) -> (Provisioner, ProvisioningContext, Arc<MemoryManifestStore>) {
        let store = Arc::new(MemoryManifestStore::default());
        let provisioner =
            Provisioner::new(EntityCatalog::lifelog(), resilience(), store.clone()).unwrap();
        let ctx = ProvisioningContext::new("parent", fake.clone());
        (provisioner, ctx, store)
    }

    #[tokio::test]
    async fn test_full_run_provisions_everything() {
        let fake = Arc::new(FakeStore::new());
        let (provisioner, ctx, store) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(report.success);
        assert!(report.manual_action_required.is_empty());
        assert_eq!(report.completed_entities, provisioner.plan().order());
        assert_eq!(fake.create_titles().len(), 8);
        assert!(
            report
                .manifest
                .entities
                .values()
                .all(|e| e.phase == EntityPhase::Complete)
        );

        let goals = fake.properties_of(report.manifest.remote_id(GOALS).unwrap());
        for property in ["SubGoals", "ParentGoal", "RelatedTodos", "ActivityDetails"] {
            assert!(goals.contains(property), "Goals is missing {}", property);
        }
        let main = fake.properties_of(report.manifest.remote_id(MAIN_RECORDS).unwrap());
        assert!(main.contains("TotalTime"));
        assert!(main.contains("ActivityCount"));

        assert_eq!(store.saved().unwrap(), report.manifest);
        assert!(store.save_count() > 8);
        assert!(report.flat_ids(provisioner.catalog()).values().all(|v| v.is_string()));
    }

    #[tokio::test]
    async fn test_resume_never_recreates_existing_schema() {
        let fake = Arc::new(FakeStore::new());
        fake.seed_schema("g1", &["Name", "SubGoals", "ParentGoal"]);
        let (provisioner, ctx, _) = setup(&fake);

        let manifest: ProvisioningManifest = serde_json::from_str(
            r#"{"entities":{"Goals":{"remoteId":"g1","phase":"complete"}}}"#,
        )
        .unwrap();
        let report = provisioner.resume(&ctx, manifest).await.unwrap();

        assert!(report.success);
        assert!(!fake.create_titles().contains(&"Goals".to_string()));
        assert_eq!(report.manifest.remote_id(GOALS), Some("g1"));
        assert!(fake.patched_properties("g1").is_empty());

        let todos = fake.create_request("Todos").unwrap();
        assert_eq!(
            todos.properties["RelatedGoal"]["relation"]["database_id"],
            "g1"
        );
    }

    #[tokio::test]
    async fn test_rate_limit_is_retried_without_duplicates() {
        let fake = Arc::new(FakeStore::new());
        fake.fail_create_call(3, rate_limited());
        let (provisioner, ctx, _) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(report.success);
        assert_eq!(fake.create_calls(), 9);
        let titles = fake.create_titles();
        assert_eq!(titles.iter().filter(|t| *t == "Main Records").count(), 1);
        assert_eq!(report.manifest.phase(MAIN_RECORDS), EntityPhase::Complete);
    }

    #[tokio::test]
    async fn test_fatal_create_failure_stops_phase_one() {
        let fake = Arc::new(FakeStore::new());
        fake.fail_create_call(3, StoreError::Auth("invalid token".to_string()));
        let (provisioner, ctx, store) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.failed_at.as_deref(), Some(MAIN_RECORDS));
        assert_eq!(report.error, Some(ErrorKind::AuthError));
        assert_eq!(report.completed_entities, vec![GOALS, TODOS]);
        assert_eq!(fake.create_calls(), 3);
        assert_eq!(fake.patch_calls(), 0);

        let order = provisioner.plan().order();
        for (k, entity) in order.iter().enumerate() {
            let phase = report.manifest.phase(entity);
            if k < 2 {
                assert_eq!(phase, EntityPhase::Created);
            } else {
                assert_eq!(phase, EntityPhase::Pending);
                assert!(report.manifest.remote_id(entity).is_none());
            }
        }
        assert!(report.manifest.entry(MAIN_RECORDS).unwrap().last_error.is_some());
        assert_eq!(store.saved().unwrap(), report.manifest);
    }

    #[tokio::test]
    async fn test_resume_after_failure_completes_the_run() {
        let fake = Arc::new(FakeStore::new());
        fake.fail_create_call(3, StoreError::Auth("invalid token".to_string()));
        let (provisioner, ctx, store) = setup(&fake);
        let first = provisioner.run(&ctx).await.unwrap();
        assert!(!first.success);

        let report = provisioner
            .resume(&ctx, store.saved().unwrap())
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.manifest.remote_id(GOALS), first.manifest.remote_id(GOALS));
        let titles = fake.create_titles();
        assert_eq!(titles.len(), 8);
        assert_eq!(titles.iter().filter(|t| *t == "Goals").count(), 1);
    }

    #[tokio::test]
    async fn test_resume_refuses_other_parent() {
        let fake = Arc::new(FakeStore::new());
        let (provisioner, ctx, _) = setup(&fake);
        let manifest = ProvisioningManifest::for_catalog(provisioner.catalog(), "elsewhere");

        let err = provisioner.resume(&ctx, manifest).await.unwrap_err();

        assert!(err.to_string().contains("elsewhere"));
        assert_eq!(fake.create_calls(), 0);
    }

    #[tokio::test]
    async fn test_phase_two_failure_aborts_and_resume_does_not_repeat_patches() {
        let fake = Arc::new(FakeStore::new());
        fake.fail_patch("TotalTime", StoreError::Validation("bad rollup".to_string()));
        let (provisioner, ctx, store) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();
        assert!(!report.success);
        assert_eq!(report.failed_at.as_deref(), Some(MAIN_RECORDS));
        assert_eq!(report.error, Some(ErrorKind::ValidationError));
        assert_eq!(report.manifest.phase(MAIN_RECORDS), EntityPhase::Created);
        assert!(report.manifest.is_applied(TODOS, "RelatedMainRecords"));
        // Phase 3 never started
        assert!(!report.manifest.is_applied(GOALS, "SubGoals"));

        fake.clear_failures();
        let resumed = provisioner
            .resume(&ctx, store.saved().unwrap())
            .await
            .unwrap();

        assert!(resumed.success);
        assert_eq!(fake.patch_count("RelatedMainRecords"), 1);
        assert_eq!(fake.patch_count("TotalTime"), 2);
        assert_eq!(resumed.manifest.phase(MAIN_RECORDS), EntityPhase::Complete);
    }

    #[tokio::test]
    async fn test_rejected_self_relation_becomes_manual_action() {
        let fake = Arc::new(FakeStore::new());
        fake.fail_patch("SubGoals", StoreError::Validation("self relation".to_string()));
        let (provisioner, ctx, store) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(report.success);
        assert_eq!(report.failed_at, None);
        assert_eq!(report.manual_action_required.len(), 1);
        let action = &report.manual_action_required[0];
        assert_eq!(action.entity, GOALS);
        assert_eq!(action.property, "SubGoals/ParentGoal");
        assert!(action.instruction.contains("ParentGoal"));

        assert_eq!(report.manifest.phase(GOALS), EntityPhase::RelationsPatched);
        assert!(report.manifest.entry(GOALS).unwrap().last_error.is_some());
        assert_eq!(report.manifest.phase(TODOS), EntityPhase::Complete);

        fake.clear_failures();
        let resumed = provisioner
            .resume(&ctx, store.saved().unwrap())
            .await
            .unwrap();
        assert!(resumed.manual_action_required.is_empty());
        assert_eq!(resumed.manifest.phase(GOALS), EntityPhase::Complete);
        assert_eq!(fake.patch_count("BlockingTodos"), 1);
    }

    #[tokio::test]
    async fn test_missing_inverse_is_reported() {
        let fake = Arc::new(FakeStore::new());
        fake.drop_self_inverse(true);
        let (provisioner, ctx, store) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(report.success);
        let entities: Vec<&str> = report
            .manual_action_required
            .iter()
            .map(|a| a.entity.as_str())
            .collect();
        assert_eq!(entities, vec![GOALS, TODOS]);
        assert!(report.manifest.is_applied(GOALS, "SubGoals"));
        assert_eq!(report.manifest.phase(GOALS), EntityPhase::RelationsPatched);

        // The inverse is still missing after a resume
        let resumed = provisioner
            .resume(&ctx, store.saved().unwrap())
            .await
            .unwrap();

        assert!(resumed.success);
        assert_eq!(resumed.manual_action_required, report.manual_action_required);
        assert_eq!(resumed.manifest.phase(GOALS), EntityPhase::RelationsPatched);
        assert_eq!(resumed.manifest.phase(TODOS), EntityPhase::RelationsPatched);
        assert!(resumed.manifest.entry(GOALS).unwrap().last_error.is_some());
        assert_eq!(fake.patch_count("SubGoals"), 1);
        let goals = fake.properties_of(resumed.manifest.remote_id(GOALS).unwrap());
        assert!(!goals.contains("ParentGoal"));
    }

    #[tokio::test]
    async fn test_exhausted_retries_stop_phase_one() {
        let fake = Arc::new(FakeStore::new());
        for call in 3..=5 {
            fake.fail_create_call(call, rate_limited());
        }
        let (provisioner, ctx, _) = setup(&fake);

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.failed_at.as_deref(), Some(MAIN_RECORDS));
        assert_eq!(report.error, Some(ErrorKind::RateLimitError));
        assert_eq!(fake.create_calls(), 5);
        assert_eq!(report.completed_entities, vec![GOALS, TODOS]);
        assert!(report.manifest.remote_id(MAIN_RECORDS).is_none());
    }

    #[tokio::test]
    async fn test_failure_inside_parallel_batch() {
        let fake = Arc::new(FakeStore::new());
        // Calls 5-7 are the batch of isolated entities
        fake.fail_create_call(6, StoreError::Permission("not shared".to_string()));
        let store = Arc::new(MemoryManifestStore::default());
        let mut resilience = resilience();
        resilience.concurrency.max_parallel_creates = 3;
        let provisioner =
            Provisioner::new(EntityCatalog::lifelog(), resilience, store.clone()).unwrap();
        let ctx = ProvisioningContext::new("parent", fake.clone());

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(!report.success);
        assert_eq!(report.error, Some(ErrorKind::PermissionError));
        let batch = [DAILY_STATUS, HAPPY_THINGS, QUOTES];
        let failed = report.failed_at.clone().unwrap();
        assert!(batch.contains(&failed.as_str()));
        for entity in batch {
            let created = report.manifest.remote_id(entity).is_some();
            assert_eq!(created, entity != failed);
        }
        assert_eq!(report.manifest.phase(KNOWLEDGE), EntityPhase::Pending);
        assert_eq!(fake.create_calls(), 7);
        assert_eq!(fake.patch_calls(), 0);
        assert_eq!(store.saved().unwrap(), report.manifest);

        let resumed = provisioner
            .resume(&ctx, store.saved().unwrap())
            .await
            .unwrap();
        assert!(resumed.success);
        let titles = fake.create_titles();
        assert_eq!(titles.len(), 8);
        for entity in batch.iter().filter(|e| **e != failed) {
            assert_eq!(
                resumed.manifest.remote_id(entity),
                report.manifest.remote_id(entity)
            );
        }
    }

    #[tokio::test]
    async fn test_parallel_creates_for_isolated_entities() {
        let fake = Arc::new(FakeStore::new());
        let store = Arc::new(MemoryManifestStore::default());
        let mut resilience = resilience();
        resilience.concurrency.max_parallel_creates = 3;
        let provisioner = Provisioner::new(EntityCatalog::lifelog(), resilience, store).unwrap();
        let ctx = ProvisioningContext::new("parent", fake.clone());

        let report = provisioner.run(&ctx).await.unwrap();

        assert!(report.success);
        assert_eq!(fake.create_calls(), 8);
    }

    #[test]
    fn test_notion_context_debug_hides_key() {
        let ctx = ProvisioningContext::notion("secret", "parent", &ApiSettings::default()).unwrap();
        let debug = format!("{:?}", ctx);
        assert!(debug.contains("parent"));
        assert!(!debug.contains("secret"));
    }
}
