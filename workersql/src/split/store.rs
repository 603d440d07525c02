//! Plan persistence. Plans are saved after every step so a controller
//! restart resumes where the last one stopped.

use std::collections::BTreeSet;
use std::sync::Arc;

use bytes::Bytes;

use super::plan::SplitPlan;
use super::Error;
use crate::cache::Kv;
use crate::routing::TenantId;

const PLAN_PREFIX: &str = "split:plan:";
const LIST_PAGE: usize = 64;

#[derive(Clone)]
pub struct PlanStore {
    kv: Arc<dyn Kv>,
}

impl PlanStore {
    pub fn new(kv: Arc<dyn Kv>) -> Self {
        Self { kv }
    }

    fn key(id: &str) -> String {
        format!("{}{}", PLAN_PREFIX, id)
    }

    pub async fn save(&self, plan: &SplitPlan) -> Result<(), Error> {
        let bytes = Bytes::from(serde_json::to_vec(plan)?);
        self.kv.put(&Self::key(&plan.id), bytes, None).await?;
        Ok(())
    }

    pub async fn load(&self, id: &str) -> Result<SplitPlan, Error> {
        let bytes = self
            .kv
            .get(&Self::key(id))
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn list(&self) -> Result<Vec<SplitPlan>, Error> {
        let mut plans = vec![];
        let mut cursor: Option<String> = None;
        loop {
            let page = self.kv.list(PLAN_PREFIX, cursor.as_deref(), LIST_PAGE).await?;
            for key in &page.keys {
                if let Some(bytes) = self.kv.get(key).await? {
                    plans.push(serde_json::from_slice(&bytes)?);
                }
            }
            match page.cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        Ok(plans)
    }

    /// Tenants that belong to a non-terminal plan. A tenant appears in
    /// at most one in-flight plan at any time.
    pub async fn in_flight_tenants(&self) -> Result<BTreeSet<TenantId>, Error> {
        let mut tenants = BTreeSet::new();
        for plan in self.list().await? {
            if !plan.phase.terminal() {
                tenants.extend(plan.tenants.iter().cloned());
            }
        }
        Ok(tenants)
    }
}
