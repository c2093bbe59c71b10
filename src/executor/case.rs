//! Case runner
//!
//! Every case produces exactly one test and one outcome message, framed by
//! the case and test Starting/Finished pairs.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::{RunShared, TestContext, TestOutputHelper};
use crate::error::ExceptionAggregator;
use crate::fixture::FixtureLifecycleManager;
use crate::models::{EntityRef, FailureInfo, Message, RunSummary, TestCase};
use crate::utils::Timer;

pub(crate) async fn run_case(
    run: &Arc<RunShared>,
    fixtures: &Arc<FixtureLifecycleManager>,
    aggregator: &ExceptionAggregator,
    case: Arc<TestCase>,
) -> RunSummary {
    let case_ref = case.entity_ref(run.assembly_id());
    let test = case.test_ref(run.assembly_id());

    run.publish(Message::CaseStarting {
        case: case_ref.clone(),
        traits: case.traits.clone(),
        source: case.source.clone(),
    });
    run.publish(Message::TestStarting { test: test.clone() });

    let output = TestOutputHelper::new(test.clone(), Arc::downgrade(&run.bus));
    let mut execution_time = Duration::ZERO;

    let summary = if let Some(reason) = &case.skip_reason {
        debug!("Skipping {}: {}", case, reason);
        run.publish(Message::TestSkipped {
            test: test.clone(),
            reason: reason.clone(),
        });
        RunSummary::single_skipped()
    } else if !run.options.explicit.should_run(case.explicit) {
        run.publish(Message::TestNotRun { test: test.clone() });
        RunSummary::single_not_run()
    } else if let Some(failure) = aggregator.to_failure() {
        fail(run, &test, execution_time, &output, failure)
    } else {
        let context = TestContext::new(
            test.clone(),
            case.clone(),
            fixtures.clone(),
            run.bus.clone(),
            output.clone(),
        );

        let timer = Timer::start(case.display_name.clone());
        let outcome = AssertUnwindSafe(case.body.call(context)).catch_unwind().await;
        execution_time = timer.stop();

        match outcome {
            Ok(Ok(())) => {
                run.publish(Message::TestPassed {
                    test: test.clone(),
                    execution_time,
                    output: output.output(),
                });
                RunSummary::single_passed(execution_time)
            }
            Ok(Err(e)) => fail(run, &test, execution_time, &output, FailureInfo::from_anyhow(&e)),
            Err(panic) => fail(
                run,
                &test,
                execution_time,
                &output,
                FailureInfo::from_panic(&*panic),
            ),
        }
    };

    run.publish(Message::TestFinished {
        test,
        execution_time,
        output: output.output(),
    });
    run.publish(Message::CaseFinished {
        case: case_ref,
        summary,
    });
    summary
}

fn fail(
    run: &RunShared,
    test: &EntityRef,
    execution_time: Duration,
    output: &TestOutputHelper,
    failure: FailureInfo,
) -> RunSummary {
    debug!("{} failed: {}", test, failure.message());
    run.publish(Message::TestFailed {
        test: test.clone(),
        execution_time,
        output: output.output(),
        failure,
    });
    if run.options.stop_on_fail {
        info!("Stopping after failure of {}", test);
        run.bus.request_stop();
    }
    RunSummary::single_failed(execution_time)
}
