//! Concurrency dispatcher
//!
//! Bounded runs go through a [`WorkerPool`] sized by [`Concurrency`];
//! unbounded runs spawn straight onto the ambient tokio runtime.

mod pool;
mod signal;

pub use pool::WorkerPool;
pub use signal::WorkSignal;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use parking_lot::RwLock;
use std::panic::AssertUnwindSafe;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn, Instrument, Span};

use crate::error::DispatchError;
use crate::models::FailureInfo;

/// Sentinel used in configuration for an uncapped run
pub const UNBOUNDED: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Concurrency {
    /// One worker per available CPU
    Default,
    Bounded(usize),
    Unbounded,
}

impl Concurrency {
    /// Map the configured thread count: 0 is the default, negative is unbounded
    pub fn from_max_threads(max_threads: i32) -> Self {
        match max_threads {
            0 => Concurrency::Default,
            n if n < 0 => Concurrency::Unbounded,
            n => Concurrency::Bounded(n as usize),
        }
    }

    /// Number of pool workers, or `None` when unbounded
    pub fn worker_count(&self) -> Option<usize> {
        match self {
            Concurrency::Default => Some(
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1),
            ),
            Concurrency::Bounded(n) => Some((*n).max(1)),
            Concurrency::Unbounded => None,
        }
    }
}

impl std::fmt::Display for Concurrency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.worker_count() {
            Some(n) => write!(f, "{n} thread(s)"),
            None => write!(f, "unlimited"),
        }
    }
}

enum Mode {
    Pool(WorkerPool),
    Spawn(Handle),
}

pub struct Dispatcher {
    concurrency: Concurrency,
    mode: Mode,
    /// Posts hold the read side while queueing, so shutdown cannot slip in between
    shut_down: RwLock<bool>,
}

impl Dispatcher {
    /// Start the workers for `concurrency`
    pub fn new(concurrency: Concurrency) -> Result<Self, DispatchError> {
        let mode = match concurrency.worker_count() {
            Some(workers) => Mode::Pool(WorkerPool::new(workers)?),
            None => match Handle::try_current() {
                Ok(handle) => Mode::Spawn(handle),
                Err(_) => {
                    warn!("Unbounded concurrency needs a tokio runtime; using the default pool");
                    let workers = Concurrency::Default.worker_count().unwrap_or(1);
                    Mode::Pool(WorkerPool::new(workers)?)
                }
            },
        };
        debug!("Dispatcher ready ({})", concurrency);
        Ok(Self {
            concurrency,
            mode,
            shut_down: RwLock::new(false),
        })
    }

    /// The concurrency this dispatcher was built for
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Fire-and-forget `work`; runs inline once shut down
    pub fn post<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let shut_down = self.shut_down.read();
        if *shut_down {
            drop(shut_down);
            work();
            return;
        }
        match &self.mode {
            Mode::Pool(pool) => {
                pool.enqueue(Box::new(move |_| work()));
            }
            Mode::Spawn(handle) => {
                let span = Span::current();
                handle.spawn_blocking(move || span.in_scope(work));
            }
        }
    }

    /// Queue a future; the handle yields its output or why it never produced one
    pub fn post_future<F>(&self, fut: F) -> WorkHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let shut_down = self.shut_down.read();
        if *shut_down {
            return WorkHandle {
                inner: HandleInner::Inline(fut.boxed()),
            };
        }
        match &self.mode {
            Mode::Pool(pool) => {
                let (tx, rx) = oneshot::channel();
                pool.enqueue(Box::new(move |rt| {
                    let outcome = rt
                        .block_on(AssertUnwindSafe(fut).catch_unwind())
                        .map_err(|panic| panicked(&*panic));
                    if tx.send(outcome).is_err() {
                        debug!("Work handle dropped before completion");
                    }
                }));
                WorkHandle {
                    inner: HandleInner::Queued(rx),
                }
            }
            Mode::Spawn(handle) => WorkHandle {
                inner: HandleInner::Spawned(handle.spawn(fut.instrument(Span::current()))),
            },
        }
    }

    /// Run `work` on the caller's thread
    pub fn send<R>(&self, work: impl FnOnce() -> R) -> R {
        work()
    }

    /// Terminate and join the workers; later posts run inline
    pub fn shutdown(&self) {
        {
            let mut shut_down = self.shut_down.write();
            if *shut_down {
                return;
            }
            *shut_down = true;
        }
        if let Mode::Pool(pool) = &self.mode {
            pool.shutdown();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panicked(payload: &(dyn std::any::Any + Send)) -> DispatchError {
    DispatchError::Panicked(FailureInfo::from_panic(payload).message().to_string())
}

enum HandleInner<T> {
    Queued(oneshot::Receiver<Result<T, DispatchError>>),
    Spawned(JoinHandle<T>),
    Inline(BoxFuture<'static, T>),
}

/// Completion handle for posted work
pub struct WorkHandle<T> {
    inner: HandleInner<T>,
}

impl<T: Send + 'static> WorkHandle<T> {
    pub async fn join(self) -> Result<T, DispatchError> {
        match self.inner {
            HandleInner::Queued(rx) => rx.await.unwrap_or(Err(DispatchError::Abandoned)),
            HandleInner::Spawned(handle) => handle.await.map_err(|e| {
                if e.is_panic() {
                    panicked(&*e.into_panic())
                } else {
                    DispatchError::Abandoned
                }
            }),
            HandleInner::Inline(fut) => AssertUnwindSafe(fut)
                .catch_unwind()
                .await
                .map_err(|panic| panicked(&*panic)),
        }
    }

    /// Whether this handle will run on the caller when awaited
    pub fn is_inline(&self) -> bool {
        matches!(self.inner, HandleInner::Inline(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_concurrency_from_config() {
        assert_eq!(Concurrency::from_max_threads(0), Concurrency::Default);
        assert_eq!(Concurrency::from_max_threads(-1), Concurrency::Unbounded);
        assert_eq!(Concurrency::from_max_threads(3), Concurrency::Bounded(3));
        assert_eq!(Concurrency::Bounded(0).worker_count(), Some(1));
        assert!(Concurrency::Default.worker_count().unwrap() >= 1);
        assert_eq!(Concurrency::Unbounded.worker_count(), None);
    }

    #[test]
    fn test_post_future_on_pool() {
        let dispatcher = Dispatcher::new(Concurrency::Bounded(2)).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|i| dispatcher.post_future(async move { i * 2 }))
            .collect();

        let results: Vec<_> = tokio_test::block_on(futures::future::join_all(
            handles.into_iter().map(WorkHandle::join),
        ));
        let values: Vec<_> = results.into_iter().map(Result::unwrap).collect();
        assert_eq!(values, vec![0, 2, 4, 6]);
    }

    #[test]
    fn test_panicking_future_reports_panic() {
        let dispatcher = Dispatcher::new(Concurrency::Bounded(1)).unwrap();
        let handle = dispatcher.post_future(async { panic!("worker blew up") });

        let err = tokio_test::block_on(handle.join()).unwrap_err();
        assert_eq!(err, DispatchError::Panicked("worker blew up".into()));

        // the worker survives the panic
        let next = dispatcher.post_future(async { 1 });
        assert_eq!(tokio_test::block_on(next.join()).unwrap(), 1);
    }

    #[test]
    fn test_bounded_pool_caps_parallelism() {
        let dispatcher = Dispatcher::new(Concurrency::Bounded(2)).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let (active, peak) = (active.clone(), peak.clone());
                dispatcher.post_future(async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        tokio_test::block_on(async {
            for handle in handles {
                handle.join().await.unwrap();
            }
        });
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_posts_after_shutdown_run_inline() {
        let dispatcher = Dispatcher::new(Concurrency::Bounded(1)).unwrap();
        dispatcher.shutdown();

        let ran = Arc::new(AtomicBool::new(false));
        let flag = ran.clone();
        dispatcher.post(move || flag.store(true, Ordering::SeqCst));
        assert!(ran.load(Ordering::SeqCst));

        let handle = dispatcher.post_future(async { "late" });
        assert!(handle.is_inline());
        assert_eq!(tokio_test::block_on(handle.join()).unwrap(), "late");
    }

    #[test]
    fn test_no_post_is_lost_to_a_concurrent_shutdown() {
        let dispatcher = Arc::new(Dispatcher::new(Concurrency::Bounded(2)).unwrap());
        let done = Arc::new(AtomicUsize::new(0));

        let posters: Vec<_> = (0..4)
            .map(|_| {
                let (dispatcher, done) = (dispatcher.clone(), done.clone());
                std::thread::spawn(move || {
                    for _ in 0..200 {
                        let done = done.clone();
                        dispatcher.post(move || {
                            done.fetch_add(1, Ordering::SeqCst);
                        });
                    }
                })
            })
            .collect();

        std::thread::sleep(Duration::from_millis(1));
        dispatcher.shutdown();
        for poster in posters {
            poster.join().unwrap();
        }

        // queued work was drained by shutdown, later posts ran inline
        assert_eq!(done.load(Ordering::SeqCst), 800);
    }

    #[test]
    fn test_send_is_inline() {
        let dispatcher = Dispatcher::new(Concurrency::Bounded(1)).unwrap();
        let caller = std::thread::current().id();
        let ran_on = dispatcher.send(|| std::thread::current().id());
        assert_eq!(caller, ran_on);
    }

    #[tokio::test]
    async fn test_unbounded_spawns_on_runtime() {
        let dispatcher = Dispatcher::new(Concurrency::Unbounded).unwrap();
        let handle = dispatcher.post_future(async { 7 });
        assert!(!handle.is_inline());
        assert_eq!(handle.join().await.unwrap(), 7);

        let failing = dispatcher.post_future(async { panic!("spawned panic") });
        assert!(matches!(
            failing.join().await,
            Err(DispatchError::Panicked(_))
        ));
    }
}
