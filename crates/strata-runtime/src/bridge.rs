//! Synchronous entry point into the async agent.
//!
//! One dedicated OS thread owns a current-thread tokio runtime and a
//! `LocalSet`; every job runs there on a single cooperative scheduler.
//! Callers on other threads hand jobs over a bounded channel and wait on a
//! private reply channel with a deadline. A job whose caller gave up before
//! it started never runs at all; one already running is cancelled at its next
//! suspension point. Either way its result never reaches anyone else.

use futures::future::LocalBoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use strata_core::StrataError;

/// Admission limits of the bridge.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Jobs allowed to run concurrently on the scheduler.
    pub max_in_flight: usize,
    /// Jobs allowed to wait for a slot; beyond this `submit` fails fast.
    pub queue_depth: usize,
    /// How long `start` waits for the state to be built.
    pub init_timeout: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 8,
            queue_depth: 64,
            init_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&strata_config::BridgeConfig> for BridgeConfig {
    fn from(config: &strata_config::BridgeConfig) -> Self {
        Self {
            max_in_flight: config.max_in_flight,
            queue_depth: config.queue_depth,
            init_timeout: Duration::from_secs(config.init_timeout_secs),
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("bridge queue is full")]
    Overloaded,

    #[error("bridge is closed")]
    Closed,

    #[error("bridge initialization failed: {0}")]
    Init(String),

    #[error(transparent)]
    Job(#[from] StrataError),
}

impl From<BridgeError> for StrataError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Timeout(after) => StrataError::Timeout(after),
            BridgeError::Overloaded => StrataError::Overloaded,
            BridgeError::Closed => StrataError::BridgeClosed,
            BridgeError::Init(msg) => {
                StrataError::Other(anyhow::anyhow!("bridge initialization failed: {msg}"))
            }
            BridgeError::Job(e) => e,
        }
    }
}

type JobFn<S> = Box<dyn FnOnce(Arc<S>) -> LocalBoxFuture<'static, ()> + Send>;

struct Job<S> {
    run: JobFn<S>,
    token: CancellationToken,
}

/// Handle to the scheduler thread owning a shared state `S`.
///
/// `S` never leaves the scheduler thread, so it does not need to be `Send`.
pub struct AsyncBridge<S> {
    sender: Mutex<Option<mpsc::Sender<Job<S>>>>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl<S: 'static> AsyncBridge<S> {
    /// Spawn the scheduler thread and build the state on it.
    ///
    /// Blocks until `init` finishes or `init_timeout` elapses.
    pub fn start<I, Fut>(config: BridgeConfig, init: I) -> Result<Self, BridgeError>
    where
        I: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = strata_core::Result<S>> + 'static,
    {
        let (tx, rx) = mpsc::channel::<Job<S>>(config.queue_depth.max(1));
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<(), String>>(1);
        let max_in_flight = config.max_in_flight.max(1);

        let thread = std::thread::Builder::new()
            .name("strata-bridge".into())
            .spawn(move || run_scheduler(rx, ready_tx, max_in_flight, init))
            .map_err(|e| BridgeError::Init(e.to_string()))?;

        match ready_rx.recv_timeout(config.init_timeout) {
            Ok(Ok(())) => {
                info!(
                    max_in_flight,
                    queue_depth = config.queue_depth,
                    "execution bridge started"
                );
                Ok(Self {
                    sender: Mutex::new(Some(tx)),
                    thread: Mutex::new(Some(thread)),
                })
            }
            Ok(Err(msg)) => {
                let _ = thread.join();
                Err(BridgeError::Init(msg))
            }
            // The thread exits on its own once init returns: `tx` is gone.
            Err(std_mpsc::RecvTimeoutError::Timeout) => Err(BridgeError::Init(format!(
                "state not ready within {:?}",
                config.init_timeout
            ))),
            Err(std_mpsc::RecvTimeoutError::Disconnected) => {
                Err(BridgeError::Init("scheduler thread exited during init".into()))
            }
        }
    }

    /// Run a job and block the calling thread for at most `timeout`.
    ///
    /// Must not be called from the scheduler thread itself, and blocks an
    /// async worker if called from one; use [`submit_async`](Self::submit_async) there.
    pub fn submit<F, Fut, T>(&self, factory: F, timeout: Duration) -> Result<T, BridgeError>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = strata_core::Result<T>> + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = std_mpsc::sync_channel(1);
        let token = CancellationToken::new();
        self.enqueue(factory, token.clone(), move |out| {
            let _ = tx.send(out);
        })?;

        match rx.recv_timeout(timeout) {
            Ok(out) => out.map_err(BridgeError::Job),
            Err(std_mpsc::RecvTimeoutError::Timeout) => {
                token.cancel();
                warn!(?timeout, "bridge job timed out, cancelled");
                Err(BridgeError::Timeout(timeout))
            }
            Err(std_mpsc::RecvTimeoutError::Disconnected) => Err(BridgeError::Closed),
        }
    }

    /// Same as [`submit`](Self::submit) for async callers.
    ///
    /// Dropping the returned future cancels the job as well.
    pub async fn submit_async<F, Fut, T>(&self, factory: F, timeout: Duration) -> Result<T, BridgeError>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = strata_core::Result<T>> + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let token = CancellationToken::new();
        self.enqueue(factory, token.clone(), move |out| {
            let _ = tx.send(out);
        })?;
        let guard = token.drop_guard();

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(out)) => {
                let _ = guard.disarm();
                out.map_err(BridgeError::Job)
            }
            Ok(Err(_)) => Err(BridgeError::Closed),
            Err(_) => {
                warn!(?timeout, "bridge job timed out, cancelled");
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    fn enqueue<F, Fut, T, D>(&self, factory: F, token: CancellationToken, deliver: D) -> Result<(), BridgeError>
    where
        F: FnOnce(Arc<S>) -> Fut + Send + 'static,
        Fut: Future<Output = strata_core::Result<T>> + 'static,
        T: 'static,
        D: FnOnce(strata_core::Result<T>) + Send + 'static,
    {
        let job_token = token.clone();
        let run: JobFn<S> = Box::new(move |state: Arc<S>| -> LocalBoxFuture<'static, ()> {
            Box::pin(async move {
                if job_token.is_cancelled() {
                    debug!("bridge job cancelled before start");
                    return;
                }
                tokio::select! {
                    biased;
                    _ = job_token.cancelled() => debug!("bridge job dropped after cancellation"),
                    out = factory(state) => deliver(out),
                }
            })
        });

        let sender = self.sender.lock().clone().ok_or(BridgeError::Closed)?;
        sender.try_send(Job { run, token }).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => {
                warn!("bridge queue full, rejecting job");
                BridgeError::Overloaded
            }
            mpsc::error::TrySendError::Closed(_) => BridgeError::Closed,
        })
    }

    pub fn is_running(&self) -> bool {
        self.sender.lock().as_ref().is_some_and(|s| !s.is_closed())
    }

    /// Stop accepting jobs, let in-flight ones finish, and join the thread.
    pub fn shutdown(&self) {
        self.sender.lock().take();
        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                warn!("bridge scheduler thread panicked");
            }
            info!("execution bridge stopped");
        }
    }
}

impl<S> Drop for AsyncBridge<S> {
    fn drop(&mut self) {
        self.sender.lock().take();
    }
}

fn run_scheduler<S, I, Fut>(
    mut jobs: mpsc::Receiver<Job<S>>,
    ready: std_mpsc::SyncSender<Result<(), String>>,
    max_in_flight: usize,
    init: I,
) where
    S: 'static,
    I: FnOnce() -> Fut,
    Fut: Future<Output = strata_core::Result<S>> + 'static,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            let _ = ready.send(Err(e.to_string()));
            return;
        }
    };

    let local = tokio::task::LocalSet::new();
    local.block_on(&runtime, async move {
        let state = match init().await {
            Ok(state) => Arc::new(state),
            Err(e) => {
                let _ = ready.send(Err(e.to_string()));
                return;
            }
        };
        let _ = ready.send(Ok(()));

        let slots = Arc::new(Semaphore::new(max_in_flight));
        while let Some(job) = jobs.recv().await {
            if job.token.is_cancelled() {
                debug!("skipping job cancelled while queued");
                continue;
            }
            let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                break;
            };
            if job.token.is_cancelled() {
                debug!("skipping job cancelled while waiting for a slot");
                continue;
            }
            let state = Arc::clone(&state);
            tokio::task::spawn_local(async move {
                let _permit = permit;
                (job.run)(state).await;
            });
        }

        // Channel closed: wait for in-flight jobs before the runtime goes away.
        let _ = slots.acquire_many(max_in_flight as u32).await;
        debug!("bridge scheduler drained");
    });
}
