use std::fmt;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the fixture registry and the relation matchers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// No usable connection configuration, or one without resolved entities.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The store failed to open or close a connection.
    #[error("connection error: {source}")]
    Connection { source: BoxError },

    #[error("could not find entities by name {0}")]
    FixtureNotLoaded(String),

    #[error("criteria required to match against fixture {0}")]
    CriteriaRequired(String),

    #[error("no entity of fixture {0} matches the given criteria")]
    NotFound(String),

    /// Pass-through failure of a store operation.
    #[error("{operation} failed for fixture {fixture}: {source}")]
    Persistence {
        fixture: String,
        operation: &'static str,
        source: BoxError,
    },

    #[error("generator of fixture {fixture} failed: {source}")]
    Generator {
        fixture: String,
        source: Box<Error>,
    },

    #[error("invalid call sequence: cannot {operation} a registry that is {phase}")]
    InvalidCallSequence {
        operation: &'static str,
        phase: Phase,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] yaml_rust::ScanError),
}

impl Error {
    pub(crate) fn persistence(
        fixture: impl Into<String>,
        operation: &'static str,
        source: anyhow::Error,
    ) -> Self {
        Error::Persistence {
            fixture: fixture.into(),
            operation,
            source: source.into(),
        }
    }
}

/// Where a registry stands in its `load` / `drop` lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Registering,
    Loaded,
    Failed,
    Dropped,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let phase = match self {
            Phase::Registering => "not loaded yet",
            Phase::Loaded => "already loaded",
            Phase::Failed => "left by a failed load",
            Phase::Dropped => "already dropped",
            Phase::Closed => "closed",
        };
        f.write_str(phase)
    }
}
