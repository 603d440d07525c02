//! The durable split-plan state machine.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Error;
use crate::backend::ShardId;
use crate::routing::TenantId;
use crate::util::now_ms;

/// Plan phases. The phase is non-decreasing, except for the explicit
/// transition to `RolledBack`, which is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Planning,
    DualWrite,
    Backfill,
    Tailing,
    CutoverPending,
    Completed,
    RolledBack,
}

impl Phase {
    pub fn terminal(&self) -> bool {
        matches!(self, Phase::Completed | Phase::RolledBack)
    }

    fn rank(&self) -> u8 {
        match self {
            Phase::Planning => 0,
            Phase::DualWrite => 1,
            Phase::Backfill => 2,
            Phase::Tailing => 3,
            Phase::CutoverPending => 4,
            Phase::Completed => 5,
            Phase::RolledBack => 6,
        }
    }

    fn can_advance_to(&self, next: Phase) -> bool {
        if self.terminal() {
            return false;
        }
        match next {
            Phase::RolledBack => true,
            // Re-entering the current phase is an idempotent resume.
            _ if next == *self => true,
            _ => next.rank() == self.rank() + 1,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Planning => "planning",
            Phase::DualWrite => "dual_write",
            Phase::Backfill => "backfill",
            Phase::Tailing => "tailing",
            Phase::CutoverPending => "cutover_pending",
            Phase::Completed => "completed",
            Phase::RolledBack => "rolled_back",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackfillStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TailStatus {
    Pending,
    InProgress,
    CaughtUp,
}

/// Backfill progress. Cursor map keys are `"{table}/{tenant}"`; a
/// value of `None` marks that pair as exhausted. Cursors only move
/// forward, which is what makes re-running a backfill safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackfillProgress {
    pub status: BackfillStatus,
    pub table_cursor: BTreeMap<String, Option<u64>>,
    pub total_rows_copied: u64,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Default for BackfillProgress {
    fn default() -> Self {
        Self {
            status: BackfillStatus::Pending,
            table_cursor: BTreeMap::new(),
            total_rows_copied: 0,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TailProgress {
    pub status: TailStatus,
    pub last_event_id: i64,
    pub last_event_ts: Option<i64>,
    pub started_at: Option<i64>,
    pub completed_at: Option<i64>,
}

impl Default for TailProgress {
    fn default() -> Self {
        Self {
            status: TailStatus::Pending,
            last_event_id: 0,
            last_event_ts: None,
            started_at: None,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SplitPlan {
    pub id: String,
    pub source: ShardId,
    pub target: ShardId,
    pub tenants: BTreeSet<TenantId>,
    pub phase: Phase,
    pub backfill: BackfillProgress,
    pub tail: TailProgress,
    pub routing_version_at_start: u64,
    pub routing_version_cutover: Option<u64>,
    pub rollback_version: Option<u64>,
    pub created_at: i64,
    pub updated_at: i64,
    pub error_message: Option<String>,
}

impl SplitPlan {
    pub fn new(
        source: ShardId,
        target: ShardId,
        tenants: BTreeSet<TenantId>,
        routing_version_at_start: u64,
    ) -> Self {
        let now = now_ms();
        Self {
            id: Uuid::new_v4().to_string(),
            source,
            target,
            tenants,
            phase: Phase::Planning,
            backfill: BackfillProgress::default(),
            tail: TailProgress::default(),
            routing_version_at_start,
            routing_version_cutover: None,
            rollback_version: None,
            created_at: now,
            updated_at: now,
            error_message: None,
        }
    }

    pub fn includes(&self, tenant: &TenantId) -> bool {
        self.tenants.contains(tenant)
    }

    pub fn touch(&mut self) {
        self.updated_at = now_ms();
    }

    /// Move to the next phase, enforcing monotonicity.
    pub fn advance(&mut self, next: Phase) -> Result<(), Error> {
        if !self.phase.can_advance_to(next) {
            return Err(Error::InvalidTransition(self.phase, next));
        }
        self.phase = next;
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn plan() -> SplitPlan {
        SplitPlan::new(
            "shard-a".into(),
            "shard-b".into(),
            ["alpha".into()].into_iter().collect(),
            1,
        )
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut plan = plan();
        for phase in [
            Phase::DualWrite,
            Phase::Backfill,
            Phase::Tailing,
            Phase::CutoverPending,
            Phase::Completed,
        ] {
            plan.advance(phase).unwrap();
        }
        assert!(plan.phase.terminal());
    }

    #[test]
    fn test_no_skipping_phases() {
        let mut plan = plan();
        assert!(plan.advance(Phase::Tailing).is_err());
        assert!(plan.advance(Phase::Completed).is_err());
    }

    #[test]
    fn test_no_regression() {
        let mut plan = plan();
        plan.advance(Phase::DualWrite).unwrap();
        plan.advance(Phase::Backfill).unwrap();
        assert!(plan.advance(Phase::DualWrite).is_err());
    }

    #[test]
    fn test_reentry_is_idempotent() {
        let mut plan = plan();
        plan.advance(Phase::DualWrite).unwrap();
        plan.advance(Phase::Backfill).unwrap();
        plan.advance(Phase::Backfill).unwrap();
        assert_eq!(plan.phase, Phase::Backfill);
    }

    #[test]
    fn test_rollback_from_any_pre_completed_phase() {
        for target in [Phase::DualWrite, Phase::Backfill, Phase::Tailing] {
            let mut plan = plan();
            while plan.phase != target {
                let next = match plan.phase {
                    Phase::Planning => Phase::DualWrite,
                    Phase::DualWrite => Phase::Backfill,
                    Phase::Backfill => Phase::Tailing,
                    _ => unreachable!(),
                };
                plan.advance(next).unwrap();
            }
            plan.advance(Phase::RolledBack).unwrap();
            assert!(plan.phase.terminal());
        }
    }

    #[test]
    fn test_terminal_is_final() {
        let mut plan = plan();
        plan.advance(Phase::RolledBack).unwrap();
        assert!(plan.advance(Phase::DualWrite).is_err());
        assert!(plan.advance(Phase::RolledBack).is_err());
    }

    #[test]
    fn test_serde_round_trip() {
        let plan = plan();
        let json = serde_json::to_string(&plan).unwrap();
        assert!(json.contains("\"phase\":\"planning\""));
        let back: SplitPlan = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, plan.id);
        assert_eq!(back.phase, Phase::Planning);
    }
}
