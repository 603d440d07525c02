use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Routing(#[from] crate::routing::Error),

    #[error("{0}")]
    Backend(#[from] crate::backend::Error),

    #[error("{0}")]
    Cache(#[from] crate::cache::Error),

    #[error("{0}")]
    Queue(#[from] crate::queue::Error),
}
