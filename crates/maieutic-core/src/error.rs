//! Error types for the maieutic kernel.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum KernelError {
    #[error("input is empty")]
    EmptyInput,

    #[error("input too long: {len} chars (limit {limit})")]
    InputTooLong { len: usize, limit: usize },

    #[error("noun not found: {0}")]
    NounNotFound(String),

    #[error("unknown demon: {0}")]
    UnknownDemon(String),

    #[error("config error: {0}")]
    ConfigError(String),

    #[error("graph store error: {0}")]
    Store(#[from] sled::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type KernelResult<T> = std::result::Result<T, KernelError>;
