//! The shard-split lifecycle. Every operation is resumable under a
//! caller-supplied budget except `cutover`, the single routing-visible
//! publish.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use workersql_config::Config;

use super::plan::{BackfillStatus, Phase, SplitPlan, TailStatus};
use super::store::PlanStore;
use super::Error;
use crate::backend::{EventKind, ShardClient, ShardId};
use crate::cache::Kv;
use crate::frontend::classifier;
use crate::routing::{PolicyStore, TenantId, TenantRoute};
use crate::util::{now_ms, Deadline};

const EVENTS_PAGE: usize = 128;

/// Work bound for one backfill or tail-replay invocation.
#[derive(Debug, Clone, Copy)]
pub struct Budget {
    pub max_rows: u64,
    pub max_duration: Duration,
    /// Rows per export/import round trip.
    pub batch_size: usize,
}

impl Default for Budget {
    fn default() -> Self {
        Self {
            max_rows: 10_000,
            max_duration: Duration::from_secs(10),
            batch_size: 256,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackfillOutcome {
    pub completed: bool,
    pub rows_copied: u64,
}

#[derive(Debug, Clone, Copy)]
pub struct TailOutcome {
    pub caught_up: bool,
    pub events_applied: u64,
}

pub struct SplitController {
    plans: PlanStore,
    policy: Arc<dyn PolicyStore>,
    client: ShardClient,
    op_timeout: Duration,
    settle_interval: Duration,
}

impl SplitController {
    pub fn new(
        kv: Arc<dyn Kv>,
        policy: Arc<dyn PolicyStore>,
        client: ShardClient,
        config: &Config,
    ) -> Self {
        Self {
            plans: PlanStore::new(kv),
            policy,
            client,
            op_timeout: Duration::from_millis(config.general.query_timeout),
            settle_interval: Duration::from_millis(config.general.tail_settle_interval),
        }
    }

    pub fn store(&self) -> &PlanStore {
        &self.plans
    }

    pub async fn plan(&self, id: &str) -> Result<SplitPlan, Error> {
        self.plans.load(id).await
    }

    fn deadline(&self) -> Deadline {
        Deadline::after(self.op_timeout)
    }

    /// Record the error on the plan without regressing its phase.
    async fn fail<T>(&self, mut plan: SplitPlan, err: Error) -> Result<T, Error> {
        plan.error_message = Some(err.to_string());
        plan.touch();
        if let Err(save_err) = self.plans.save(&plan).await {
            warn!("could not persist plan error for {}: {}", plan.id, save_err);
        }
        Err(err)
    }

    /// Validate and record a new plan. The target must be reachable
    /// and hold no rows for the affected tenants.
    pub async fn create_plan(
        &self,
        source: ShardId,
        target: ShardId,
        tenants: BTreeSet<TenantId>,
        token: &CancellationToken,
    ) -> Result<SplitPlan, Error> {
        let busy = self.plans.in_flight_tenants().await?;
        if let Some(tenant) = tenants.iter().find(|t| busy.contains(*t)) {
            return Err(Error::TenantBusy(tenant.clone()));
        }

        // Reachability probe doubles as the schema listing for the
        // emptiness check.
        self.client.tables(&target, self.deadline(), token).await?;
        let source_tables = self.client.tables(&source, self.deadline(), token).await?;

        for table in &source_tables {
            for tenant in &tenants {
                let page = self
                    .client
                    .export(&target, table, tenant, None, 1, self.deadline(), token)
                    .await?;
                if !page.rows.is_empty() {
                    return Err(Error::TargetNotEmpty(target.clone(), tenant.clone()));
                }
            }
        }

        let at_start = self.policy.active().await?.version;
        let plan = SplitPlan::new(source, target, tenants, at_start);
        self.plans.save(&plan).await?;
        info!(
            "split plan {} created: {} -> {} at routing v{}",
            plan.id, plan.source, plan.target, at_start
        );
        Ok(plan)
    }

    /// Publish a routing version that marks the affected tenants as
    /// dual-write. From here on, every committed write to the source
    /// is mirrored to the target.
    pub async fn start_dual_write(&self, id: &str) -> Result<SplitPlan, Error> {
        let mut plan = self.plans.load(id).await?;
        if plan.phase == Phase::DualWrite {
            return Ok(plan);
        }
        if plan.phase != Phase::Planning {
            return Err(Error::InvalidTransition(plan.phase, Phase::DualWrite));
        }

        let result = async {
            let mut next = (*self.policy.active().await?).clone();
            for tenant in &plan.tenants {
                next = next.with_route(
                    tenant.clone(),
                    TenantRoute::dual_write(plan.source.clone(), vec![plan.target.clone()]),
                );
            }
            Ok::<u64, Error>(self.policy.publish(next).await?)
        }
        .await;

        match result {
            Ok(version) => {
                plan.advance(Phase::DualWrite)?;
                plan.error_message = None;
                self.plans.save(&plan).await?;
                info!("split plan {} dual-write active at routing v{}", id, version);
                Ok(plan)
            }
            Err(err) => self.fail(plan, err).await,
        }
    }

    /// Copy historical rows from source to target, one cursor-bounded
    /// batch at a time. Progress persists after every batch, so the
    /// operation may be interrupted and re-invoked freely.
    pub async fn run_backfill(
        &self,
        id: &str,
        budget: Budget,
        token: &CancellationToken,
    ) -> Result<(SplitPlan, BackfillOutcome), Error> {
        let mut plan = self.plans.load(id).await?;
        if plan.backfill.status == BackfillStatus::Completed {
            let outcome = BackfillOutcome {
                completed: true,
                rows_copied: 0,
            };
            return Ok((plan, outcome));
        }
        if plan.phase != Phase::DualWrite && plan.phase != Phase::Backfill {
            return Err(Error::InvalidTransition(plan.phase, Phase::Backfill));
        }

        plan.advance(Phase::Backfill)?;
        if plan.backfill.status == BackfillStatus::Pending {
            plan.backfill.status = BackfillStatus::InProgress;
            plan.backfill.started_at = Some(now_ms());
        }
        self.plans.save(&plan).await?;

        match self.backfill_segment(&mut plan, budget, token).await {
            Ok(outcome) => {
                if outcome.completed {
                    plan.backfill.status = BackfillStatus::Completed;
                    plan.backfill.completed_at = Some(now_ms());
                    plan.advance(Phase::Tailing)?;
                    info!(
                        "split plan {} backfill complete: {} rows total",
                        id, plan.backfill.total_rows_copied
                    );
                }
                self.plans.save(&plan).await?;
                Ok((plan, outcome))
            }
            Err(err) => self.fail(plan, err).await,
        }
    }

    async fn backfill_segment(
        &self,
        plan: &mut SplitPlan,
        budget: Budget,
        token: &CancellationToken,
    ) -> Result<BackfillOutcome, Error> {
        let started = Instant::now();
        let mut rows_copied = 0u64;
        let tables = self
            .client
            .tables(&plan.source, self.deadline(), token)
            .await?;

        for table in &tables {
            for tenant in plan.tenants.clone() {
                let cursor_key = format!("{}/{}", table, tenant);
                let mut cursor = match plan.backfill.table_cursor.get(&cursor_key) {
                    // Exhausted in a previous segment.
                    Some(None) => continue,
                    Some(Some(cursor)) => Some(*cursor),
                    None => None,
                };

                loop {
                    if rows_copied >= budget.max_rows
                        || started.elapsed() >= budget.max_duration
                        || token.is_cancelled()
                    {
                        return Ok(BackfillOutcome {
                            completed: false,
                            rows_copied,
                        });
                    }

                    let page = self
                        .client
                        .export(
                            &plan.source,
                            table,
                            &tenant,
                            cursor,
                            budget.batch_size,
                            self.deadline(),
                            token,
                        )
                        .await?;

                    if !page.rows.is_empty() {
                        // Idempotent upsert: rows dual-written after
                        // the cursor simply overwrite identically.
                        self.client
                            .import(&plan.target, table, &page.rows, self.deadline(), token)
                            .await?;
                        let copied = page.rows.len() as u64;
                        rows_copied += copied;
                        plan.backfill.total_rows_copied += copied;
                    }

                    match page.next_cursor {
                        Some(next) => {
                            // Cursors never move backwards.
                            debug_assert!(cursor.map(|c| next >= c).unwrap_or(true));
                            cursor = Some(next);
                            plan.backfill
                                .table_cursor
                                .insert(cursor_key.clone(), Some(next));
                            plan.touch();
                            self.plans.save(plan).await?;
                        }
                        None => {
                            plan.backfill.table_cursor.insert(cursor_key.clone(), None);
                            plan.touch();
                            self.plans.save(plan).await?;
                            break;
                        }
                    }
                }
            }
        }

        Ok(BackfillOutcome {
            completed: true,
            rows_copied,
        })
    }

    /// Mirror mutation events recorded on the source after the
    /// backfill cursor. Loops until the event log stays empty across a
    /// settle interval, then parks the plan at `cutover_pending`.
    pub async fn replay_tail(
        &self,
        id: &str,
        budget: Budget,
        token: &CancellationToken,
    ) -> Result<(SplitPlan, TailOutcome), Error> {
        let mut plan = self.plans.load(id).await?;
        if plan.phase == Phase::CutoverPending {
            let outcome = TailOutcome {
                caught_up: true,
                events_applied: 0,
            };
            return Ok((plan, outcome));
        }
        if plan.phase != Phase::Tailing {
            return Err(Error::InvalidTransition(plan.phase, Phase::Tailing));
        }

        if plan.tail.status == TailStatus::Pending {
            plan.tail.status = TailStatus::InProgress;
            plan.tail.started_at = Some(now_ms());
            self.plans.save(&plan).await?;
        }

        match self.tail_segment(&mut plan, budget, token).await {
            Ok(outcome) => {
                if outcome.caught_up {
                    plan.tail.status = TailStatus::CaughtUp;
                    plan.tail.completed_at = Some(now_ms());
                    plan.advance(Phase::CutoverPending)?;
                    info!("split plan {} tail caught up at event {}", id, plan.tail.last_event_id);
                }
                self.plans.save(&plan).await?;
                Ok((plan, outcome))
            }
            Err(err) => self.fail(plan, err).await,
        }
    }

    async fn tail_segment(
        &self,
        plan: &mut SplitPlan,
        budget: Budget,
        token: &CancellationToken,
    ) -> Result<TailOutcome, Error> {
        let started = Instant::now();
        let mut applied = 0u64;
        let mut settled_once = false;

        loop {
            if applied >= budget.max_rows
                || started.elapsed() >= budget.max_duration
                || token.is_cancelled()
            {
                return Ok(TailOutcome {
                    caught_up: false,
                    events_applied: applied,
                });
            }

            let events = self
                .client
                .events(
                    &plan.source,
                    plan.tail.last_event_id,
                    EVENTS_PAGE,
                    self.deadline(),
                    token,
                )
                .await?;

            if events.is_empty() {
                // The log must stay empty across the settle interval
                // before the tail counts as caught up; dual-write keeps
                // mirroring new writes in the meantime.
                if settled_once {
                    return Ok(TailOutcome {
                        caught_up: true,
                        events_applied: applied,
                    });
                }
                settled_once = true;
                select! {
                    biased;
                    _ = token.cancelled() => {
                        return Ok(TailOutcome { caught_up: false, events_applied: applied });
                    }
                    _ = tokio::time::sleep(self.settle_interval) => (),
                }
                continue;
            }
            settled_once = false;

            for event in events {
                if plan.includes(&event.tenant_id) {
                    if event.kind == EventKind::Ddl && !classifier::ddl_idempotent(&event.sql) {
                        warn!(
                            "split plan {}: replaying non-idempotent DDL event {}",
                            plan.id, event.id
                        );
                    }
                    match self
                        .client
                        .apply(&plan.target, &event, self.deadline(), token)
                        .await
                    {
                        Ok(_) => applied += 1,
                        // DDL already applied via dual-write is a no-op
                        // on redelivery.
                        Err(err) if event.kind == EventKind::Ddl => {
                            warn!(
                                "split plan {}: DDL event {} skipped: {}",
                                plan.id, event.id, err
                            );
                        }
                        Err(err) => return Err(err.into()),
                    }
                }
                plan.tail.last_event_id = plan.tail.last_event_id.max(event.id);
                plan.tail.last_event_ts = Some(event.ts);
            }

            plan.touch();
            self.plans.save(plan).await?;
        }
    }

    /// The single non-idempotent step: publish the routing version that
    /// maps the tenants to the target with dual-write disabled.
    pub async fn cutover(&self, id: &str) -> Result<SplitPlan, Error> {
        let mut plan = self.plans.load(id).await?;
        if plan.phase == Phase::Completed {
            return Ok(plan);
        }
        if plan.phase != Phase::CutoverPending {
            return Err(Error::InvalidTransition(plan.phase, Phase::Completed));
        }

        let result = async {
            let active = self.policy.active().await?;

            // Recovery: a previous cutover may have published but died
            // before persisting. Reconcile against the active policy.
            let already_cut = plan.tenants.iter().all(|tenant| {
                matches!(
                    active.resolve(tenant),
                    Ok(TenantRoute::Single { shard }) if shard == plan.target
                )
            });
            if already_cut && active.version > plan.routing_version_at_start {
                return Ok::<u64, Error>(active.version);
            }

            let mut next = (*active).clone();
            for tenant in &plan.tenants {
                next = next.with_route(tenant.clone(), TenantRoute::single(plan.target.clone()));
            }
            Ok(self.policy.publish(next).await?)
        }
        .await;

        match result {
            Ok(version) => {
                plan.routing_version_cutover = Some(version);
                plan.advance(Phase::Completed)?;
                plan.error_message = None;
                self.plans.save(&plan).await?;
                info!(
                    "split plan {} cut over: tenants now on {} at routing v{}",
                    id, plan.target, version
                );
                Ok(plan)
            }
            Err(err) => self.fail(plan, err).await,
        }
    }

    /// Revert the tenants to the source shard with dual-write off.
    /// Terminal: recovery requires a new plan. Source data outlives the
    /// plan for the rollback grace period.
    pub async fn rollback(&self, id: &str) -> Result<SplitPlan, Error> {
        let mut plan = self.plans.load(id).await?;
        if plan.phase.terminal() {
            return Err(Error::InvalidTransition(plan.phase, Phase::RolledBack));
        }

        let result = async {
            let mut next = (*self.policy.active().await?).clone();
            for tenant in &plan.tenants {
                next = next.with_route(tenant.clone(), TenantRoute::single(plan.source.clone()));
            }
            Ok::<u64, Error>(self.policy.publish(next).await?)
        }
        .await;

        match result {
            Ok(version) => {
                plan.rollback_version = Some(version);
                plan.advance(Phase::RolledBack)?;
                self.plans.save(&plan).await?;
                info!(
                    "split plan {} rolled back: tenants on {} at routing v{}",
                    id, plan.source, version
                );
                Ok(plan)
            }
            Err(err) => self.fail(plan, err).await,
        }
    }
}
