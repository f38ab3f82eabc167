//! Error types of the evolution engine.
//!
//! Errors fall in two families:
//!
//! - **Fatal** errors ([`ConfigurationError`], [`PopulationError`], [`RestoreError`]) are
//!   returned before any population state exists.
//! - **Recoverable** conditions ([`PersistenceWarning`], [`SimulationError`]) are collected
//!   into reports while a generation keeps going.

use std::{io, path::PathBuf};

use darwini_controller::ControllerError;

/// Invalid population parameters.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum ConfigurationError {
    #[display("at least 2 survivors are required to breed children, got {nb_survivors}")]
    TooFewSurvivors { nb_survivors: usize },
    #[display(
        "number of survivors ({nb_survivors}) must be smaller than the population size ({size})"
    )]
    TooManySurvivors { nb_survivors: usize, size: usize },
}

/// Errors raised while reading a configuration file.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum LoadConfigError {
    #[display("failed to open configuration file: {}", path.display())]
    Open { path: PathBuf, source: io::Error },
    #[display("failed to parse configuration file: {}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display("invalid configuration")]
    Invalid { source: ConfigurationError },
}

/// Errors preventing a population from being created.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PopulationError {
    #[display("invalid population configuration")]
    Configuration { source: ConfigurationError },
    #[display("unable to create directory {}", path.display())]
    StorageInit { path: PathBuf, source: io::Error },
}

impl From<ConfigurationError> for PopulationError {
    fn from(source: ConfigurationError) -> Self {
        Self::Configuration { source }
    }
}

/// Errors preventing a population from being restored from its persisted records.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum RestoreError {
    #[display("unable to set up population storage")]
    Population { source: PopulationError },
    #[display("unable to read population metadata {}", path.display())]
    Metadata { path: PathBuf, source: io::Error },
    #[display(
        "persisted population has size {found_size} with {found_survivors} survivors, \
         expected size {size} with {nb_survivors} survivors"
    )]
    ConfigMismatch {
        size: usize,
        nb_survivors: usize,
        found_size: usize,
        found_survivors: usize,
    },
    #[display("unable to load individual {index} from {}", path.display())]
    Individual {
        index: usize,
        path: PathBuf,
        source: io::Error,
    },
    #[display("individual {index} is incompatible with the population parameters")]
    Incompatible {
        index: usize,
        source: ControllerError,
    },
}

impl From<PopulationError> for RestoreError {
    fn from(source: PopulationError) -> Self {
        Self::Population { source }
    }
}

impl From<ConfigurationError> for RestoreError {
    fn from(source: ConfigurationError) -> Self {
        PopulationError::from(source).into()
    }
}

/// Storage operation that can fail during a generation transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum StorageOp {
    #[display("copy")]
    Copy,
    #[display("delete")]
    Delete,
    #[display("rename")]
    Rename,
    #[display("write")]
    Write,
}

/// A single storage operation that failed without interrupting evolution.
///
/// The affected record is left absent or stale until a later advancement or export
/// overwrites it. The in-memory population is never affected.
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("failed to {op} {}{}", path.display(), display_target(target.as_ref()))]
pub struct PersistenceWarning {
    pub op: StorageOp,
    pub path: PathBuf,
    pub target: Option<PathBuf>,
    pub source: io::Error,
}

fn display_target(target: Option<&PathBuf>) -> String {
    target
        .map(|target| format!(" to {}", target.display()))
        .unwrap_or_default()
}

impl PersistenceWarning {
    pub(crate) fn new(op: StorageOp, path: PathBuf, source: io::Error) -> Self {
        Self {
            op,
            path,
            target: None,
            source,
        }
    }

    pub(crate) fn with_target(
        op: StorageOp,
        path: PathBuf,
        target: PathBuf,
        source: io::Error,
    ) -> Self {
        Self {
            op,
            path,
            target: Some(target),
            source,
        }
    }
}

/// The fight simulation failed for one individual.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display, derive_more::Error)]
#[display("fight failed: {reason}")]
pub struct SimulationError {
    reason: String,
}

impl SimulationError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    #[must_use]
    pub fn reason(&self) -> &str {
        &self.reason
    }
}
