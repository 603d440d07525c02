use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error")]
    Syntax,

    #[error("unknown admin command")]
    UnknownCommand,

    #[error("{0}")]
    Split(#[from] crate::split::Error),

    #[error("{0}")]
    Routing(#[from] crate::routing::Error),

    #[error("{0}")]
    Cache(#[from] crate::cache::Error),
}
