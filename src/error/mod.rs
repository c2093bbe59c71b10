//! Error taxonomy
//!
//! Configuration and fixture lifecycle errors carry the scope and type they
//! belong to, so a single message is enough to locate the problem.

mod aggregator;

pub use aggregator::ExceptionAggregator;

use std::fmt;
use thiserror::Error;

use crate::fixture::FixtureScope;
use crate::models::FailureInfo;

/// A constructor parameter nothing could satisfy
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MissingParameter {
    pub name: String,
    pub type_name: String,
}

impl fmt::Display for MissingParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.type_name, self.name)
    }
}

fn join_missing(missing: &[MissingParameter]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

fn join_errors(errors: &[FixtureError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Shape problems detected before anything runs
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("{scope} fixture type '{fixture}' may only define a single public constructor (found {found})")]
    ConstructorCount {
        scope: FixtureScope,
        fixture: String,
        found: usize,
    },

    #[error(
        "{scope} fixture type '{fixture}' had one or more unresolved constructor arguments: {}",
        join_missing(.missing)
    )]
    UnresolvedParameters {
        scope: FixtureScope,
        fixture: String,
        missing: Vec<MissingParameter>,
    },

    #[error("{scope} fixture type '{fixture}' has a circular dependency: {}", .chain.join(" -> "))]
    CircularDependency {
        scope: FixtureScope,
        fixture: String,
        chain: Vec<String>,
    },

    #[error("generic fixture '{open}' expects {expected} type argument(s), got {actual}")]
    GenericArity {
        open: String,
        expected: usize,
        actual: usize,
    },

    #[error("collection definition '{name}' is declared {count} times")]
    DuplicateCollectionDefinition { name: String, count: usize },
}

/// Which disposal pass a failure came from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisposeStage {
    Async,
    Sync,
}

impl fmt::Display for DisposeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisposeStage::Async => write!(f, "DisposeAsync"),
            DisposeStage::Sync => write!(f, "Dispose"),
        }
    }
}

/// Fixture lifecycle failures, wrapped with scope and type context
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FixtureError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("{scope} fixture type '{fixture}' threw in its constructor: {}", .failure.message())]
    Construction {
        scope: FixtureScope,
        fixture: String,
        failure: FailureInfo,
    },

    #[error("{scope} fixture type '{fixture}' threw in InitializeAsync: {}", .failure.message())]
    Initialization {
        scope: FixtureScope,
        fixture: String,
        failure: FailureInfo,
    },

    #[error("{scope} fixture type '{fixture}' threw in {stage}: {}", .failure.message())]
    Disposal {
        scope: FixtureScope,
        fixture: String,
        stage: DisposeStage,
        failure: FailureInfo,
    },

    #[error("{scope} fixture manager has already been disposed")]
    Disposed { scope: FixtureScope },

    #[error("{} fixture failure(s): {}", .0.len(), join_errors(.0))]
    Aggregate(Vec<FixtureError>),
}

impl FixtureError {
    /// Collapse a list into a single error, or none
    pub fn from_many(mut errors: Vec<FixtureError>) -> Option<FixtureError> {
        match errors.len() {
            0 => None,
            1 => errors.pop(),
            _ => Some(FixtureError::Aggregate(errors)),
        }
    }

    pub fn is_configuration(&self) -> bool {
        match self {
            FixtureError::Configuration(_) => true,
            FixtureError::Aggregate(errors) => errors.iter().any(FixtureError::is_configuration),
            _ => false,
        }
    }

    /// Number of leaf failures
    pub fn count(&self) -> usize {
        match self {
            FixtureError::Aggregate(errors) => errors.iter().map(FixtureError::count).sum(),
            _ => 1,
        }
    }

    pub fn to_failure(&self) -> FailureInfo {
        match self {
            FixtureError::Aggregate(errors) => {
                let failures: Vec<_> = errors.iter().map(FixtureError::to_failure).collect();
                FailureInfo::aggregate(&failures)
            }
            FixtureError::Configuration(err) => FailureInfo::new("ConfigurationError", err.to_string()),
            FixtureError::Construction { failure, .. }
            | FixtureError::Initialization { failure, .. }
            | FixtureError::Disposal { failure, .. } => {
                let mut info = FailureInfo::new("FixtureError", self.to_string());
                let offset = info.frames.len();
                for frame in &failure.frames {
                    let mut frame = frame.clone();
                    frame.parent = Some(frame.parent.map(|p| p + offset).unwrap_or(0));
                    info.frames.push(frame);
                }
                info
            }
            FixtureError::Disposed { .. } => FailureInfo::new("FixtureError", self.to_string()),
        }
    }
}

/// Failures surfaced by the work dispatcher
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("work item was dropped before it completed")]
    Abandoned,

    #[error("work item panicked: {0}")]
    Panicked(String),

    #[error("failed to start worker: {0}")]
    Startup(String),
}

/// Failures loading a scripted catalog
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse catalog: {0}")]
    Parse(String),

    #[error("case '{case}' uses unknown fixture '{fixture}'")]
    UnknownFixture { case: String, fixture: String },

    #[error("catalog defines no cases")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unresolved_parameters_names_everything() {
        let err = ConfigurationError::UnresolvedParameters {
            scope: FixtureScope::Class,
            fixture: "DbFixture".into(),
            missing: vec![
                MissingParameter {
                    name: "cache".into(),
                    type_name: "CacheFixture".into(),
                },
                MissingParameter {
                    name: "clock".into(),
                    type_name: "Clock".into(),
                },
            ],
        };

        let text = err.to_string();
        assert!(text.contains("Class fixture type 'DbFixture'"));
        assert!(text.contains("CacheFixture cache"));
        assert!(text.contains("Clock clock"));
    }

    #[test]
    fn test_from_many() {
        assert!(FixtureError::from_many(vec![]).is_none());

        let single = FixtureError::Disposed {
            scope: FixtureScope::Assembly,
        };
        assert_eq!(
            FixtureError::from_many(vec![single.clone()]),
            Some(single.clone())
        );

        let many = FixtureError::from_many(vec![single.clone(), single]).unwrap();
        assert_eq!(many.count(), 2);
    }

    #[test]
    fn test_aggregate_failure_keeps_both_messages() {
        let first = FixtureError::Disposal {
            scope: FixtureScope::Collection,
            fixture: "A".into(),
            stage: DisposeStage::Sync,
            failure: FailureInfo::new("error", "first broke"),
        };
        let second = FixtureError::Disposal {
            scope: FixtureScope::Collection,
            fixture: "B".into(),
            stage: DisposeStage::Async,
            failure: FailureInfo::new("error", "second broke"),
        };

        let failure = FixtureError::Aggregate(vec![first, second]).to_failure();
        assert!(failure.mentions("first broke"));
        assert!(failure.mentions("second broke"));
    }
}
