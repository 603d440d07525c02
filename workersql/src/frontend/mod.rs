//! Request-facing half of the gateway: classification, tenant
//! isolation, batching, sticky transactions and the gateway facade.

pub mod batch;
pub mod classifier;
pub mod envelope;
pub mod error;
pub mod gateway;
pub mod isolation;
pub(crate) mod query_logger;
pub mod response;
pub(crate) mod sql;
pub mod transaction;

pub use batch::{BatchLayer, BatchOutcome, BatchRequest, BatchResponse};
pub use classifier::{Classification, Hint, StatementKind};
pub use envelope::{WsEnvelope, WsKind};
pub use error::Error;
pub use gateway::{Gateway, Hints, TransactionOp, WireConsistency};
pub use response::{ErrorCode, ErrorEnvelope, QueryResponse, ResponseMetadata};
pub use transaction::Sessions;
