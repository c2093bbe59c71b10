//! Class runner
//!
//! Owns the class-scope fixture manager: fixtures are initialized before
//! the first method and disposed before `ClassFinished` is published.

use std::sync::Arc;
use tracing::debug;

use super::method::run_method;
use super::{group_by_parent, DefaultMethodOrderer, RunShared, TestMethodOrderer};
use crate::error::ExceptionAggregator;
use crate::fixture::{FixtureLifecycleManager, FixtureScope};
use crate::models::{CollectionDefinition, Message, RunSummary, TestCase, TestClass};
use crate::utils::Timer;

pub(crate) async fn run_class(
    run: &Arc<RunShared>,
    collection_fixtures: &Arc<FixtureLifecycleManager>,
    parent_aggregator: &ExceptionAggregator,
    definition: Option<&CollectionDefinition>,
    class: Arc<TestClass>,
    cases: Vec<Arc<TestCase>>,
) -> RunSummary {
    let class_ref = class.entity_ref(run.assembly_id());
    run.publish(Message::ClassStarting {
        class: class_ref.clone(),
    });
    let timer = Timer::start(class.display_name.clone());

    let mut aggregator = ExceptionAggregator::inherit(parent_aggregator);
    let injectables = collection_fixtures.injectables();
    let context = injectables
        .context()
        .map(|c| c.for_class(class_ref.clone()));
    let injectables = match context {
        Some(context) => injectables.nested(context),
        None => injectables.clone(),
    };
    let fixtures = Arc::new(
        FixtureLifecycleManager::new(FixtureScope::Class, &class.display_name, injectables)
            .with_parent(collection_fixtures.clone()),
    );
    run.setup_fixtures(
        &fixtures,
        class.fixtures.clone(),
        class.generic_fixtures.clone(),
        &mut aggregator,
    )
    .await;

    let (methods, mut groups) = group_by_parent(cases, |case| {
        (case.method.unique_id.clone(), case.method.clone())
    });
    let orderer = method_orderer(run, definition, &class);
    let methods = run
        .ordering
        .order_methods(&class.display_name, orderer.as_ref(), methods);

    let mut summary = RunSummary::default();
    for method in methods {
        if !run.keep_running() {
            debug!("Stop requested; skipping remaining methods of {}", class.display_name);
            break;
        }
        let cases = groups.remove(&method.unique_id).unwrap_or_default();
        summary += run_method(run, &fixtures, &aggregator, definition, method, cases).await;
    }

    run.teardown_fixtures(&fixtures, &class_ref).await;
    summary.time = timer.elapsed();

    run.publish(Message::ClassFinished {
        class: class_ref,
        summary,
    });
    summary
}

/// Class, then collection definition, then assembly, then the default
fn method_orderer(
    run: &RunShared,
    definition: Option<&CollectionDefinition>,
    class: &TestClass,
) -> Arc<dyn TestMethodOrderer> {
    class
        .method_orderer
        .clone()
        .or_else(|| definition.and_then(|d| d.method_orderer.clone()))
        .or_else(|| run.assembly.method_orderer.clone())
        .unwrap_or_else(|| Arc::new(DefaultMethodOrderer))
}
