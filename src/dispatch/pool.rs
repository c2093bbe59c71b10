//! Fixed-size worker pool
//!
//! Workers are OS threads pulling from a lock-free queue. Each worker owns a
//! current-thread tokio runtime so posted futures run to completion on the
//! worker that dequeued them.

use crossbeam::queue::SegQueue;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, error, info, warn, Span};

use super::signal::WorkSignal;
use crate::error::DispatchError;

const IDLE_WAIT: Duration = Duration::from_millis(250);

pub(crate) type Work = Box<dyn FnOnce(&Runtime) + Send + 'static>;

struct Job {
    span: Span,
    work: Work,
}

struct Shared {
    queue: SegQueue<Job>,
    signal: WorkSignal,
    terminate: AtomicBool,
    completed: AtomicUsize,
}

pub struct WorkerPool {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, DispatchError> {
        let size = size.max(1);
        let shared = Arc::new(Shared {
            queue: SegQueue::new(),
            signal: WorkSignal::new(),
            terminate: AtomicBool::new(false),
            completed: AtomicUsize::new(0),
        });

        let mut workers = Vec::with_capacity(size);
        for id in 0..size {
            let runtime = Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(|e| DispatchError::Startup(e.to_string()))?;
            let shared = shared.clone();
            let handle = std::thread::Builder::new()
                .name(format!("suite-worker-{id}"))
                .spawn(move || worker_loop(id, shared, runtime))
                .map_err(|e| DispatchError::Startup(e.to_string()))?;
            workers.push(handle);
        }

        debug!("Worker pool started with {} thread(s)", size);
        Ok(Self {
            shared,
            workers: Mutex::new(workers),
            size,
        })
    }

    /// Number of worker threads
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_terminated(&self) -> bool {
        self.shared.terminate.load(Ordering::SeqCst)
    }

    /// Queue `work` with the caller's span; never blocks.
    ///
    /// Returns false, dropping `work`, once the pool has been shut down.
    /// Callers that race with [`WorkerPool::shutdown`] must serialize the two.
    pub(crate) fn enqueue(&self, work: Work) -> bool {
        if self.is_terminated() {
            warn!("Work posted to a terminated pool was dropped");
            return false;
        }
        self.shared.queue.push(Job {
            span: Span::current(),
            work,
        });
        self.shared.signal.set();
        true
    }

    /// Items queued but not yet picked up by a worker
    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }

    /// Items run to completion, panicked ones included
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::SeqCst)
    }

    /// Stop accepting work, let workers drain the queue, then join them
    pub fn shutdown(&self) {
        if self.shared.terminate.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.signal.set_all();

        let workers: Vec<_> = self.workers.lock().drain(..).collect();
        let count = workers.len();
        for worker in workers {
            if worker.join().is_err() {
                error!("A worker thread panicked during shutdown");
            }
        }
        info!(
            "Worker pool shut down ({} thread(s), {} item(s) completed)",
            count,
            self.completed()
        );
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(id: usize, shared: Arc<Shared>, runtime: Runtime) {
    loop {
        if let Some(Job { span, work }) = shared.queue.pop() {
            shared.signal.set();
            let _entered = span.enter();
            if std::panic::catch_unwind(AssertUnwindSafe(|| work(&runtime))).is_err() {
                error!("Work item panicked on worker {}", id);
            }
            shared.completed.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        if shared.terminate.load(Ordering::SeqCst) {
            // a push can land between the failed pop and the flag
            if shared.queue.is_empty() {
                break;
            }
            continue;
        }
        shared.signal.wait(&shared.terminate, IDLE_WAIT);
    }
    debug!("Worker {} exiting", id);
}
