use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("kv unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    Serde(#[from] serde_json::Error),
}
