//! Test execution engine
//!
//! One runner per level of the tree. [`AssemblyRunner`] owns the run; the
//! collection, class, method and case runners below it are straight-line
//! async code, and collections are the unit handed to the dispatcher.

mod assembly;
mod case;
mod class;
mod collection;
mod context;
mod method;
mod ordering;


pub use assembly::AssemblyRunner;
pub use context::{TestContext, TestOutputHelper};
pub use ordering::{
    DefaultCaseOrderer, DefaultClassOrderer, DefaultCollectionOrderer, DefaultMethodOrderer,
    Orderable, OrderingPolicy, TestCaseOrderer, TestClassOrderer, TestCollectionOrderer,
    TestMethodOrderer,
};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use crate::bus::MessageBus;
use crate::dispatch::Concurrency;
use crate::error::{ExceptionAggregator, FixtureError};
use crate::fixture::{FixtureDescriptor, FixtureLifecycleManager, GenericFixtureDescriptor};
use crate::models::{EntityRef, FailureInfo, Message, TestAssembly, TestCase};

/// Which cases run with respect to their explicit flag
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExplicitOption {
    /// Explicit cases are reported as not run
    #[default]
    Off,
    /// Everything runs
    On,
    /// Only explicit cases run
    Only,
}

impl ExplicitOption {
    pub fn should_run(&self, explicit: bool) -> bool {
        match self {
            ExplicitOption::Off => !explicit,
            ExplicitOption::On => true,
            ExplicitOption::Only => explicit,
        }
    }
}

impl std::str::FromStr for ExplicitOption {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" => Ok(ExplicitOption::Off),
            "on" => Ok(ExplicitOption::On),
            "only" => Ok(ExplicitOption::Only),
            _ => Err(format!("Unknown explicit option: {s} (expected off, on or only)")),
        }
    }
}

/// Execution options for one assembly run
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub concurrency: Concurrency,
    pub parallelize_collections: bool,
    pub explicit: ExplicitOption,
    pub stop_on_fail: bool,
    /// Seeds the orderer fallback shuffle
    pub seed: Option<u64>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Default,
            parallelize_collections: true,
            explicit: ExplicitOption::Off,
            stop_on_fail: false,
            seed: None,
        }
    }
}

/// State shared by every runner of one assembly run
pub(crate) struct RunShared {
    pub assembly: Arc<TestAssembly>,
    pub assembly_ref: EntityRef,
    pub bus: Arc<MessageBus>,
    pub options: RunOptions,
    pub ordering: OrderingPolicy,
}

impl RunShared {
    pub fn assembly_id(&self) -> &str {
        &self.assembly_ref.unique_id
    }

    pub fn keep_running(&self) -> bool {
        self.bus.keep_running()
    }

    pub fn publish(&self, message: Message) -> bool {
        self.bus.publish(message)
    }

    /// Initialize a scope's fixtures; a failure is recorded and published once
    pub async fn setup_fixtures(
        &self,
        manager: &FixtureLifecycleManager,
        fixtures: Vec<FixtureDescriptor>,
        generics: Vec<GenericFixtureDescriptor>,
        aggregator: &mut ExceptionAggregator,
    ) {
        if let Err(err) = manager.initialize(fixtures, generics).await {
            aggregator.add_fixture_error(&err);
            self.report_error(err.to_failure());
        }
    }

    /// Dispose a scope's fixtures, reporting failures as cleanup failures of `entity`
    pub async fn teardown_fixtures(&self, manager: &FixtureLifecycleManager, entity: &EntityRef) {
        if let Err(err) = manager.dispose().await {
            self.report_cleanup(entity, &err);
        }
    }

    pub fn report_error(&self, failure: FailureInfo) {
        self.publish(Message::Error { failure });
    }

    pub fn report_cleanup(&self, entity: &EntityRef, err: &FixtureError) {
        warn!("Cleanup of {} failed: {}", entity, err);
        self.publish(Message::CleanupFailure {
            entity: entity.clone(),
            failure: err.to_failure(),
        });
    }
}

/// Split cases by a parent key, keeping first-seen order of parents
pub(crate) fn group_by_parent<P: Clone>(
    cases: Vec<Arc<TestCase>>,
    parent: impl Fn(&TestCase) -> (String, P),
) -> (Vec<P>, HashMap<String, Vec<Arc<TestCase>>>) {
    let mut parents = Vec::new();
    let mut groups: HashMap<String, Vec<Arc<TestCase>>> = HashMap::new();
    for case in cases {
        let (id, value) = parent(&case);
        let group = groups.entry(id).or_insert_with(|| {
            parents.push(value);
            Vec::new()
        });
        group.push(case);
    }
    (parents, groups)
}
