//! Long-running test watchdog
//!
//! Tracks in-flight cases and periodically reports every case that has
//! been running for longer than the threshold.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::bus::{MessageBus, MessageSink};
use crate::models::{EntityRef, LongRunningTest, Message, MessageKind};

const MIN_PERIOD: Duration = Duration::from_secs(1);

pub struct LongRunningWatchdog {
    threshold: Duration,
    bus: Weak<MessageBus>,
    running: Mutex<HashMap<String, (EntityRef, Instant)>>,
    ticker: Mutex<Option<JoinHandle<()>>>,
    this: Weak<LongRunningWatchdog>,
}

impl LongRunningWatchdog {
    /// Create a watchdog and subscribe it to the lifecycle messages it needs
    pub fn attach(bus: &Arc<MessageBus>, threshold: Duration) -> Arc<Self> {
        let watchdog = Arc::new_cyclic(|this| Self {
            threshold,
            bus: Arc::downgrade(bus),
            running: Mutex::new(HashMap::new()),
            ticker: Mutex::new(None),
            this: this.clone(),
        });
        bus.subscribe_many(
            &[
                MessageKind::AssemblyStarting,
                MessageKind::AssemblyFinished,
                MessageKind::CaseStarting,
                MessageKind::CaseFinished,
            ],
            watchdog.clone(),
        );
        watchdog
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    /// Tick period: a tenth of the threshold, but never under a second
    pub fn period(&self) -> Duration {
        (self.threshold / 10).max(MIN_PERIOD)
    }

    pub fn in_flight(&self) -> usize {
        self.running.lock().len()
    }

    pub fn is_ticking(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Cases over the threshold at `now`, longest first
    pub fn overdue(&self, now: Instant) -> Vec<LongRunningTest> {
        let mut overdue: Vec<_> = self
            .running
            .lock()
            .values()
            .filter_map(|(case, started)| {
                let elapsed = now.saturating_duration_since(*started);
                (elapsed >= self.threshold).then(|| LongRunningTest {
                    case: case.clone(),
                    elapsed,
                })
            })
            .collect();
        overdue.sort_by(|a, b| b.elapsed.cmp(&a.elapsed));
        overdue
    }

    fn tick(&self) {
        let tests = self.overdue(Instant::now());
        if tests.is_empty() {
            return;
        }
        for test in &tests {
            warn!(
                "{} has been running for {}s",
                test.case,
                test.elapsed.as_secs()
            );
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.publish(Message::LongRunningTests {
                threshold: self.threshold,
                tests,
            });
        }
    }

    fn start(&self) {
        let Ok(handle) = Handle::try_current() else {
            warn!("No tokio runtime; long-running test detection is disabled");
            return;
        };
        let this = self.this.clone();
        let period = self.period();
        let task = handle.spawn(async move {
            let mut interval = time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                match this.upgrade() {
                    Some(watchdog) => watchdog.tick(),
                    None => break,
                }
            }
        });
        if let Some(previous) = self.ticker.lock().replace(task) {
            previous.abort();
        }
        debug!("Watchdog started (threshold {:?}, period {:?})", self.threshold, period);
    }

    fn stop(&self) {
        if let Some(task) = self.ticker.lock().take() {
            task.abort();
            debug!("Watchdog stopped");
        }
        self.running.lock().clear();
    }
}

impl MessageSink for LongRunningWatchdog {
    fn on_message(&self, message: &Message) -> bool {
        match message {
            Message::AssemblyStarting { .. } => self.start(),
            Message::AssemblyFinished { .. } => self.stop(),
            Message::CaseStarting { case, .. } => {
                self.running
                    .lock()
                    .insert(case.unique_id.clone(), (case.clone(), Instant::now()));
            }
            Message::CaseFinished { case, .. } => {
                self.running.lock().remove(&case.unique_id);
            }
            _ => {}
        }
        true
    }
}

impl Drop for LongRunningWatchdog {
    fn drop(&mut self) {
        if let Some(task) = self.ticker.get_mut().take() {
            task.abort();
        }
    }
}
