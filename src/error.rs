use thiserror::Error;

/// Why an options bundle was refused before anything was sent.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("no options were given")]
    MissingOptions,

    #[error("unknown option key: {0}")]
    UnknownField(String),

    #[error("click events require a `label` entry in `log`")]
    MissingLabel,

    #[error("malformed options: {0}")]
    Malformed(String),
}

/// Failure reported by one of the host environment's primitives.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct EnvError(pub String);

/// A step of a running sequence that failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("beacon dispatch failed: {0}")]
    Dispatch(#[source] EnvError),

    #[error("navigation failed: {0}")]
    Navigation(#[source] EnvError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid configuration: {0}")]
pub struct ConfigError(pub String);
