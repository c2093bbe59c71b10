//! Exception aggregation
//!
//! Records failures instead of bailing on the first one. Runners clone the
//! parent's aggregator when they start, so a failure recorded at assembly
//! scope is inherited by every test underneath it.

use crate::error::FixtureError;
use crate::models::FailureInfo;

#[derive(Clone, Debug, Default)]
pub struct ExceptionAggregator {
    failures: Vec<FailureInfo>,
}

impl ExceptionAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Child aggregator that starts with the parent's failures
    pub fn inherit(parent: &ExceptionAggregator) -> Self {
        parent.clone()
    }

    /// Record one failure
    pub fn add(&mut self, failure: FailureInfo) {
        self.failures.push(failure);
    }

    pub fn add_fixture_error(&mut self, error: &FixtureError) {
        self.add(error.to_failure());
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Snapshot of the current failures as one reportable failure
    pub fn to_failure(&self) -> Option<FailureInfo> {
        if self.failures.is_empty() {
            None
        } else {
            Some(FailureInfo::aggregate(&self.failures))
        }
    }
}
