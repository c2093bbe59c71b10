//! Fail-skips policy
//!
//! Rewrites skipped tests as failures before dispatch, so every subscriber
//! (including the summary sink) sees the rewritten stream.

use std::time::Duration;

use crate::bus::MessageTransform;
use crate::models::{FailureInfo, Message};

pub const FAIL_SKIP_KIND: &str = "FAIL_SKIP";

#[derive(Clone, Copy, Debug, Default)]
pub struct FailSkips;

impl MessageTransform for FailSkips {
    fn transform(&self, message: Message) -> Message {
        match message {
            Message::TestSkipped { test, reason } => Message::TestFailed {
                test,
                execution_time: Duration::ZERO,
                output: String::new(),
                failure: FailureInfo::new(FAIL_SKIP_KIND, reason),
            },
            mut other => {
                if let Some(summary) = other.summary_mut() {
                    *summary = summary.fail_skips();
                }
                other
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityLevel, EntityRef, MessageKind, RunSummary};

    fn test_ref() -> EntityRef {
        EntityRef::new(EntityLevel::Test, "t", "Skipped test")
    }

    #[test]
    fn test_skip_becomes_failure_with_reason() {
        let rewritten = FailSkips.transform(Message::TestSkipped {
            test: test_ref(),
            reason: "flaky on CI".into(),
        });

        assert_eq!(rewritten.kind(), MessageKind::TestFailed);
        let failure = rewritten.failure().unwrap();
        assert_eq!(failure.kind(), FAIL_SKIP_KIND);
        assert_eq!(failure.message(), "flaky on CI");
    }

    #[test]
    fn test_finished_summaries_move_skips_to_failures() {
        let finished = Message::MethodFinished {
            method: EntityRef::new(EntityLevel::Method, "m", "method"),
            summary: RunSummary {
                total: 4,
                failed: 1,
                skipped: 2,
                ..RunSummary::default()
            },
        };

        let once = FailSkips.transform(finished);
        let twice = FailSkips.transform(once.clone());
        assert_eq!(once, twice);

        let summary = once.summary().unwrap();
        assert_eq!((summary.failed, summary.skipped), (3, 0));
    }

    #[test]
    fn test_other_messages_pass_through() {
        let diagnostic = Message::Diagnostic { text: "x".into() };
        assert_eq!(FailSkips.transform(diagnostic.clone()), diagnostic);
    }
}
