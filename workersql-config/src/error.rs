use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error on \"{0}\": {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid DSN: {0}")]
    Url(#[from] ::url::ParseError),

    #[error("DSN is missing a host")]
    NoHost,

    #[error("range \"{0}\" refers to unknown shard \"{1}\"")]
    UnknownShard(String, String),

    #[error("shard \"{0}\" is configured more than once")]
    DuplicateShard(String),

    #[error("{0}")]
    Invalid(String),
}
