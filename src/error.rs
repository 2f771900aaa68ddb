use thiserror::Error;

/// Crate-wide error type.
///
/// Per the simulator's error-handling design, only *programmer errors* and
/// *infrastructure/setup errors* surface as `Result::Err`. Request-level failures
/// (AR verb on a non-AR resource, cancel of an unknown reservation, ...) are never
/// represented here -- they become typed reply payloads crossing back through the
/// engine as ordinary events.
#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown entity: {0}")]
    UnknownEntity(String),

    #[error("entity name already registered: {0}")]
    DuplicateEntityName(String),

    #[error("failed to read trace or scenario file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to write statistics log: {0}")]
    CsvError(#[from] csv::Error),

    #[error("failed to parse scenario configuration: {0}")]
    ConfigError(#[from] serde_json::Error),

    #[error("malformed trace line {line}: {reason}")]
    TraceParseError { line: usize, reason: String },

    #[error("invalid scenario: {0}")]
    InvalidScenario(String),
}

pub type Result<T> = std::result::Result<T, Error>;
