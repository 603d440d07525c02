//! Online, reversible tenant relocation between shards: dual-write,
//! cursor-driven backfill, tail-log replay, atomic routing cutover and
//! rollback.

pub mod controller;
pub mod error;
pub mod plan;
pub mod store;

pub use controller::{BackfillOutcome, Budget, SplitController, TailOutcome};
pub use error::Error;
pub use plan::{BackfillStatus, Phase, SplitPlan, TailStatus};
pub use store::PlanStore;
