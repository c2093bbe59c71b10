//! Per-test execution context

use anyhow::Context as _;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::bus::{DiagnosticSink, MessageBus};
use crate::fixture::{FixtureKey, FixtureLifecycleManager, TypeArg};
use crate::models::{EntityRef, Message, TestCase, Traits};

/// Captures test output and forwards each line to the bus as it is written
#[derive(Clone)]
pub struct TestOutputHelper {
    test: EntityRef,
    bus: Weak<MessageBus>,
    buffer: Arc<Mutex<String>>,
}

impl TestOutputHelper {
    pub fn new(test: EntityRef, bus: Weak<MessageBus>) -> Self {
        Self {
            test,
            bus,
            buffer: Arc::new(Mutex::new(String::new())),
        }
    }

    pub fn write_line(&self, text: impl AsRef<str>) {
        let line = format!("{}\n", text.as_ref());
        self.buffer.lock().push_str(&line);
        if let Some(bus) = self.bus.upgrade() {
            bus.publish(Message::TestOutput {
                test: self.test.clone(),
                text: line,
            });
        }
    }

    /// Everything written so far
    pub fn output(&self) -> String {
        self.buffer.lock().clone()
    }
}

/// What a test body sees while it runs
#[derive(Clone)]
pub struct TestContext {
    test: EntityRef,
    case: Arc<TestCase>,
    fixtures: Arc<FixtureLifecycleManager>,
    bus: Arc<MessageBus>,
    output: TestOutputHelper,
}

impl TestContext {
    pub fn new(
        test: EntityRef,
        case: Arc<TestCase>,
        fixtures: Arc<FixtureLifecycleManager>,
        bus: Arc<MessageBus>,
        output: TestOutputHelper,
    ) -> Self {
        Self {
            test,
            case,
            fixtures,
            bus,
            output,
        }
    }

    pub fn test(&self) -> &EntityRef {
        &self.test
    }

    pub fn display_name(&self) -> &str {
        &self.case.display_name
    }

    pub fn traits(&self) -> &Traits {
        &self.case.traits
    }

    /// Shared fixture of type `T`, from the class scope outwards
    pub async fn fixture<T: Send + Sync + 'static>(&self) -> anyhow::Result<Arc<T>> {
        self.fixture_by_key(&FixtureKey::of::<T>()).await
    }

    /// Closed generic fixture `open<args..>`
    pub async fn generic_fixture<T: Send + Sync + 'static>(
        &self,
        open: &str,
        args: Vec<TypeArg>,
    ) -> anyhow::Result<Arc<T>> {
        self.fixture_by_key(&FixtureKey::closed(open, args)).await
    }

    pub async fn fixture_by_key<T: Send + Sync + 'static>(
        &self,
        key: &FixtureKey,
    ) -> anyhow::Result<Arc<T>> {
        let instance = self
            .fixtures
            .resolve(key)
            .await
            .with_context(|| format!("resolving fixture {key}"))?
            .ok_or_else(|| anyhow::anyhow!("no fixture {key} is registered for this test"))?;
        instance.downcast::<T>().ok_or_else(|| {
            anyhow::anyhow!(
                "fixture {key} is not a {}",
                std::any::type_name::<T>()
            )
        })
    }

    pub fn output(&self) -> &TestOutputHelper {
        &self.output
    }

    pub fn diagnostics(&self) -> Arc<DiagnosticSink> {
        self.fixtures.injectables().diagnostics()
    }

    /// False once the run has been asked to stop
    pub fn keep_running(&self) -> bool {
        self.bus.keep_running()
    }
}

impl std::fmt::Debug for TestContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestContext")
            .field("test", &self.test.unique_id)
            .finish()
    }
}
