//! Collection runner
//!
//! A collection is the unit of parallelism. Everything below it runs
//! sequentially on whichever worker picked the collection up.

use std::sync::Arc;
use tracing::{debug, info};

use super::class::run_class;
use super::{group_by_parent, DefaultClassOrderer, RunShared, TestClassOrderer};
use crate::error::{ConfigurationError, ExceptionAggregator, FixtureError};
use crate::fixture::{FixtureLifecycleManager, FixtureScope};
use crate::models::{CollectionDefinition, Message, RunSummary, TestCase, TestCollection};
use crate::utils::Timer;

/// A collection with its cases and resolved definition
pub(crate) struct CollectionWork {
    pub collection: Arc<TestCollection>,
    pub definition: Result<Option<Arc<CollectionDefinition>>, ConfigurationError>,
    pub cases: Vec<Arc<TestCase>>,
}

impl CollectionWork {
    pub fn disables_parallelization(&self) -> bool {
        matches!(&self.definition, Ok(Some(d)) if d.disable_parallelization)
    }
}

/// Run one collection. Once called it always publishes its Starting and
/// Finished pair; a stop only skips the classes that have not begun.
pub(crate) async fn run_collection(
    run: Arc<RunShared>,
    assembly_fixtures: Arc<FixtureLifecycleManager>,
    parent_aggregator: ExceptionAggregator,
    work: CollectionWork,
) -> RunSummary {
    let CollectionWork {
        collection,
        definition,
        cases,
    } = work;

    let collection_ref = collection.entity_ref(run.assembly_id());
    run.publish(Message::CollectionStarting {
        collection: collection_ref.clone(),
    });
    let timer = Timer::start(collection.display_name.clone());
    debug!("Collection {} started ({} cases)", collection.display_name, cases.len());

    let mut aggregator = ExceptionAggregator::inherit(&parent_aggregator);
    let definition = match definition {
        Ok(definition) => definition,
        Err(err) => {
            let err = FixtureError::from(err);
            aggregator.add_fixture_error(&err);
            run.report_error(err.to_failure());
            None
        }
    };

    let injectables = assembly_fixtures.injectables();
    let injectables = match injectables.context() {
        Some(context) => injectables.nested(context.for_collection(collection_ref.clone())),
        None => injectables.clone(),
    };
    let fixtures = Arc::new(
        FixtureLifecycleManager::new(
            FixtureScope::Collection,
            &collection.display_name,
            injectables,
        )
        .with_parent(assembly_fixtures.clone()),
    );
    if let Some(definition) = &definition {
        run.setup_fixtures(
            &fixtures,
            definition.fixtures.clone(),
            definition.generic_fixtures.clone(),
            &mut aggregator,
        )
        .await;
    }

    let (classes, mut groups) = group_by_parent(cases, |case| {
        (case.class().unique_id.clone(), case.class().clone())
    });
    let orderer = class_orderer(&run, definition.as_deref());
    let classes = run
        .ordering
        .order_classes(&collection.display_name, orderer.as_ref(), classes);

    let mut summary = RunSummary::default();
    for class in classes {
        if !run.keep_running() {
            debug!(
                "Stop requested; skipping remaining classes of {}",
                collection.display_name
            );
            break;
        }
        let cases = groups.remove(&class.unique_id).unwrap_or_default();
        summary += run_class(
            &run,
            &fixtures,
            &aggregator,
            definition.as_deref(),
            class,
            cases,
        )
        .await;
    }

    run.teardown_fixtures(&fixtures, &collection_ref).await;
    summary.time = timer.elapsed();

    info!(
        "Collection {} finished: {}/{} passed",
        collection.display_name,
        summary.passed(),
        summary.total
    );
    run.publish(Message::CollectionFinished {
        collection: collection_ref,
        summary,
    });
    summary
}

/// Collection definition, then assembly, then the default
fn class_orderer(
    run: &RunShared,
    definition: Option<&CollectionDefinition>,
) -> Arc<dyn TestClassOrderer> {
    definition
        .and_then(|d| d.class_orderer.clone())
        .or_else(|| run.assembly.class_orderer.clone())
        .unwrap_or_else(|| Arc::new(DefaultClassOrderer))
}
