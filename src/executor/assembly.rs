//! Assembly runner
//!
//! Owns a run: publishes the assembly frame, sets up assembly fixtures,
//! plans collections and hands them to the dispatcher.

use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::collection::{run_collection, CollectionWork};
use super::{
    group_by_parent, DefaultCollectionOrderer, OrderingPolicy, RunOptions, RunShared,
    TestCollectionOrderer,
};
use crate::bus::{DiagnosticSink, MessageBus};
use crate::dispatch::Dispatcher;
use crate::error::{ConfigurationError, ExceptionAggregator};
use crate::fixture::{ContextAccessor, FixtureLifecycleManager, FixtureScope, Injectables};
use crate::models::{
    CollectionDefinition, FailureInfo, Message, RunSummary, TestAssembly, TestCase,
    TestCollection,
};
use crate::utils::Timer;

pub struct AssemblyRunner {
    assembly: Arc<TestAssembly>,
    cases: Vec<Arc<TestCase>>,
    bus: Arc<MessageBus>,
    options: RunOptions,
}

impl AssemblyRunner {
    pub fn new(assembly: TestAssembly, cases: Vec<TestCase>, bus: Arc<MessageBus>) -> Self {
        Self {
            assembly: Arc::new(assembly),
            cases: cases.into_iter().map(Arc::new).collect(),
            bus,
            options: RunOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn bus(&self) -> &Arc<MessageBus> {
        &self.bus
    }

    /// Run every case; returns the assembly totals also carried on `AssemblyFinished`
    pub async fn run(self) -> RunSummary {
        let assembly_ref = self.assembly.entity_ref();
        let diagnostics = DiagnosticSink::new(Arc::downgrade(&self.bus));
        let run = Arc::new(RunShared {
            assembly: self.assembly.clone(),
            assembly_ref: assembly_ref.clone(),
            bus: self.bus.clone(),
            ordering: OrderingPolicy::new(diagnostics.clone(), self.options.seed),
            options: self.options.clone(),
        });

        info!(
            "Starting {} ({} cases, {})",
            self.assembly.display_name,
            self.cases.len(),
            self.options.concurrency
        );
        let timer = Timer::start(self.assembly.display_name.clone());
        run.publish(Message::AssemblyStarting {
            assembly: assembly_ref.clone(),
            started_at: Utc::now(),
        });

        let mut aggregator = ExceptionAggregator::new();
        let fixtures = Arc::new(FixtureLifecycleManager::new(
            FixtureScope::Assembly,
            &self.assembly.display_name,
            Injectables::new(
                diagnostics,
                ContextAccessor::for_assembly(assembly_ref.clone(), Arc::downgrade(&self.bus)),
            ),
        ));
        run.setup_fixtures(
            &fixtures,
            self.assembly.fixtures.clone(),
            self.assembly.generic_fixtures.clone(),
            &mut aggregator,
        )
        .await;

        let work = plan(&run, self.cases);
        let mut summary = run_collections(&run, &fixtures, &aggregator, work).await;

        run.teardown_fixtures(&fixtures, &assembly_ref).await;
        summary.time = timer.stop();

        info!(
            "{} finished in {}ms - Pass: {}/{} (failed {}, skipped {}, not run {})",
            self.assembly.display_name,
            summary.time.as_millis(),
            summary.passed(),
            summary.total,
            summary.failed,
            summary.skipped,
            summary.not_run
        );
        run.publish(Message::AssemblyFinished {
            assembly: assembly_ref,
            summary,
        });
        summary
    }
}

/// Group cases by collection, order the collections and resolve their definitions
fn plan(run: &RunShared, cases: Vec<Arc<TestCase>>) -> Vec<CollectionWork> {
    let (collections, mut groups) = group_by_parent(cases, |case| {
        (case.collection().unique_id.clone(), case.collection().clone())
    });

    let orderer: Arc<dyn TestCollectionOrderer> = run
        .assembly
        .collection_orderer
        .clone()
        .unwrap_or_else(|| Arc::new(DefaultCollectionOrderer::new()));
    let collections = run.ordering.order_collections(
        &run.assembly.display_name,
        orderer.as_ref(),
        collections,
    );

    collections
        .into_iter()
        .map(|collection| CollectionWork {
            definition: resolve_definition(&run.assembly, &collection),
            cases: groups.remove(&collection.unique_id).unwrap_or_default(),
            collection,
        })
        .collect()
}

fn resolve_definition(
    assembly: &TestAssembly,
    collection: &TestCollection,
) -> Result<Option<Arc<CollectionDefinition>>, ConfigurationError> {
    let Some(name) = &collection.definition else {
        return Ok(None);
    };
    match assembly.definitions_named(name).as_slice() {
        [] => {
            warn!(
                "Collection {} refers to unknown definition '{}'",
                collection.display_name, name
            );
            Ok(None)
        }
        [definition] => Ok(Some(Arc::new((*definition).clone()))),
        many => Err(ConfigurationError::DuplicateCollectionDefinition {
            name: name.clone(),
            count: many.len(),
        }),
    }
}

/// Parallel collections go through the dispatcher; the rest run in order afterwards
async fn run_collections(
    run: &Arc<RunShared>,
    fixtures: &Arc<FixtureLifecycleManager>,
    aggregator: &ExceptionAggregator,
    work: Vec<CollectionWork>,
) -> RunSummary {
    let (parallel, mut sequential): (Vec<_>, Vec<_>) = if run.options.parallelize_collections {
        work.into_iter()
            .partition(|w| !w.disables_parallelization())
    } else {
        (Vec::new(), work)
    };

    let mut summary = RunSummary::default();
    if !parallel.is_empty() {
        match Dispatcher::new(run.options.concurrency) {
            Ok(dispatcher) => {
                let mut handles = Vec::with_capacity(parallel.len());
                for w in parallel {
                    if !run.keep_running() {
                        debug!("Stop requested; not posting {}", w.collection.display_name);
                        break;
                    }
                    handles.push(dispatcher.post_future(run_collection(
                        run.clone(),
                        fixtures.clone(),
                        aggregator.clone(),
                        w,
                    )));
                }

                for handle in handles {
                    match handle.join().await {
                        Ok(collection) => summary += collection,
                        Err(e) => {
                            error!("Collection did not complete: {}", e);
                            run.report_error(FailureInfo::from_error("DispatchError", &e));
                        }
                    }
                }

                if let Err(e) = tokio::task::spawn_blocking(move || dispatcher.shutdown()).await {
                    warn!("Dispatcher shutdown did not complete cleanly: {}", e);
                }
            }
            Err(e) => {
                warn!("Could not start dispatcher ({}); running collections sequentially", e);
                let mut all = parallel;
                all.append(&mut sequential);
                sequential = all;
            }
        }
    }

    for w in sequential {
        if !run.keep_running() {
            debug!("Stop requested; not starting {}", w.collection.display_name);
            break;
        }
        summary += run_collection(run.clone(), fixtures.clone(), aggregator.clone(), w).await;
    }
    summary
}
