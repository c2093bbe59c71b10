use std::sync::Arc;

use super::case::run_case;
use super::{DefaultCaseOrderer, RunShared, TestCaseOrderer};
use crate::error::ExceptionAggregator;
use crate::fixture::FixtureLifecycleManager;
use crate::models::{CollectionDefinition, Message, RunSummary, TestCase, TestMethod};
use crate::utils::Timer;

/// Run one method's cases sequentially, in case-orderer order
pub(crate) async fn run_method(
    run: &Arc<RunShared>,
    fixtures: &Arc<FixtureLifecycleManager>,
    aggregator: &ExceptionAggregator,
    definition: Option<&CollectionDefinition>,
    method: Arc<TestMethod>,
    cases: Vec<Arc<TestCase>>,
) -> RunSummary {
    let method_ref = method.entity_ref(run.assembly_id());
    run.publish(Message::MethodStarting {
        method: method_ref.clone(),
    });

    let timer = Timer::start(method.display_name.clone());
    let orderer = case_orderer(run, definition, &method);
    let cases = run
        .ordering
        .order_cases(&method.display_name, orderer.as_ref(), cases);

    let mut summary = RunSummary::default();
    for case in cases {
        if !run.keep_running() {
            break;
        }
        summary += run_case(run, fixtures, aggregator, case).await;
    }
    summary.time = timer.elapsed();

    run.publish(Message::MethodFinished {
        method: method_ref,
        summary,
    });
    summary
}

/// Class, then collection definition, then assembly, then the default
fn case_orderer(
    run: &RunShared,
    definition: Option<&CollectionDefinition>,
    method: &TestMethod,
) -> Arc<dyn TestCaseOrderer> {
    method
        .class
        .case_orderer
        .clone()
        .or_else(|| definition.and_then(|d| d.case_orderer.clone()))
        .or_else(|| run.assembly.case_orderer.clone())
        .unwrap_or_else(|| Arc::new(DefaultCaseOrderer))
}
