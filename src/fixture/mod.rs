//! Fixture lifecycle management
//!
//! Fixtures are shared, lazily constructed values owned by a scope
//! (assembly, collection or class). Each scope has a
//! [`FixtureLifecycleManager`] that builds a fixture at most once, resolves
//! constructor arguments from the scope or its parents, runs the async
//! initializer and finally disposes everything it created.

mod descriptor;
mod injectable;
mod manager;

pub use descriptor::{
    ConstructorDescriptor, ErasedFixture, FixtureDescriptor, FixtureInstance, FixtureKey,
    GenericFixtureDescriptor, ParameterSpec, ResolvedArgs, TypeArg, Visibility,
};
pub use injectable::{ContextAccessor, Injectables};
pub use manager::FixtureLifecycleManager;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixtureScope {
    Assembly,
    Collection,
    Class,
}

impl fmt::Display for FixtureScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FixtureScope::Assembly => write!(f, "Assembly"),
            FixtureScope::Collection => write!(f, "Collection"),
            FixtureScope::Class => write!(f, "Class"),
        }
    }
}

/// Lifecycle hooks for a fixture value.
///
/// Every hook is optional. Returning `None` means the fixture does not
/// take part in that phase.
pub trait Fixture: Send + Sync + 'static {
    /// Async initializer, awaited once right after construction
    fn initialize(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
        None
    }

    /// Async disposer; all of a scope's async disposers run concurrently
    fn dispose_async(&self) -> Option<BoxFuture<'_, anyhow::Result<()>>> {
        None
    }

    /// Synchronous disposer, run in reverse creation order after the async pass
    fn dispose(&self) -> Option<anyhow::Result<()>> {
        None
    }
}

impl Fixture for crate::bus::DiagnosticSink {}
