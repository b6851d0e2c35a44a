//! The load generator: lifecycle, wiring and shutdown ordering.

mod dispatcher;
mod executor;
mod settings;
mod status;

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{self, Instant},
};
use tracing::{Instrument, Span};

pub use self::{
    settings::{GeneratorSettings, MAX_LPS},
    status::Status,
};
use self::{dispatcher::Dispatcher, executor::CallExecutor, status::StatusCell};
use crate::{
    caller::Caller,
    error::Error,
    pipeline::{self, ResultSender},
    stats::{self, StatsSnapshot},
    tickets::TicketPool,
};

// Deadline used when `duration` reaches past what `Instant` can represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Cleanup callback run while the generator stops. See [`LoadGenerator::before_exit`].
pub type ExitHook = Box<dyn FnOnce() + Send + 'static>;

/// Drives a [`Caller`] at a fixed rate with bounded concurrency.
///
/// Cloning yields another handle to the same generator.
///
/// # Lifecycle
///
/// [`start`](Self::start) spawns the dispatcher, the statistics aggregator and a supervisor
/// onto the current Tokio runtime. The run ends when `duration` elapses or
/// [`stop`](Self::stop) is called, whichever comes first. Shutdown always happens in this
/// order:
///
/// 1. status becomes [`Status::Stopping`] and dispatch stops,
/// 2. the ticket pool closes,
/// 3. every in-flight call finishes and submits its result,
/// 4. the result pipeline closes, letting the aggregator finish,
/// 5. [`before_exit`](Self::before_exit) callbacks run,
/// 6. status becomes [`Status::Stopped`].
pub struct LoadGenerator<C> {
    inner: Arc<Inner<C>>,
}

struct Inner<C> {
    settings: GeneratorSettings,
    concurrency: usize,
    interval: Duration,
    caller: Arc<C>,
    tickets: TicketPool,
    status: StatusCell,
    call_count: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    stop: watch::Sender<bool>,
    finished: watch::Sender<bool>,
    live_stats: watch::Sender<StatsSnapshot>,
    final_stats: watch::Sender<Option<StatsSnapshot>>,
    // `None` once the hooks have run.
    exit_hooks: Mutex<Option<Vec<ExitHook>>>,
    span: Span,
}

impl<C: Caller> LoadGenerator<C> {
    /// Validates `settings`, derives the concurrency and prepares the ticket pool.
    ///
    /// This is the only fallible operation; see [`Error`] for what is rejected.
    pub fn new(caller: C, settings: GeneratorSettings) -> Result<Self, Error> {
        let concurrency = settings.validate()?;
        let interval = settings.interval()?;
        let tickets = TicketPool::new(concurrency)?;

        let span = info_span!("load_generator", lps = settings.lps, concurrency);
        span.in_scope(|| {
            debug!(
                message = "Load generator created.",
                timeout_ms = settings.timeout.as_millis() as u64,
                interval_us = interval.as_micros() as u64,
                duration_ms = settings.duration.as_millis() as u64,
            )
        });

        Ok(Self {
            inner: Arc::new(Inner {
                settings,
                concurrency,
                interval,
                caller: Arc::new(caller),
                tickets,
                status: StatusCell::new(),
                call_count: Arc::default(),
                dropped: Arc::default(),
                stop: watch::Sender::new(false),
                finished: watch::Sender::new(false),
                live_stats: watch::Sender::new(StatsSnapshot::default()),
                final_stats: watch::Sender::new(None),
                exit_hooks: Mutex::new(Some(Vec::new())),
                span,
            }),
        })
    }

    /// Starts generating load. Returns `false`, doing nothing, unless the generator is
    /// still in [`Status::Origin`].
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start(&self) -> bool {
        let inner = &self.inner;
        let _entered = inner.span.enter();

        if !inner.status.transition(Status::Origin, Status::Starting) {
            debug!(message = "Start ignored.", status = %inner.status.load());
            return false;
        }

        let deadline = deadline_after(Instant::now(), inner.settings.duration);
        let (results, receiver) = pipeline::channel(inner.concurrency, Arc::clone(&inner.dropped));

        let aggregator = Arc::clone(inner);
        tokio::spawn(
            async move {
                let snapshot = stats::aggregate(receiver, &aggregator.live_stats).await;
                aggregator.final_stats.send_replace(Some(snapshot));
            }
            .instrument(inner.span.clone()),
        );

        let dispatcher = Dispatcher {
            executor: Arc::new(CallExecutor::new(
                Arc::clone(&inner.caller),
                inner.settings.timeout,
                inner.tickets.clone(),
            )),
            tickets: inner.tickets.clone(),
            interval: inner.interval,
            deadline,
            stop: inner.stop.subscribe(),
            call_count: Arc::clone(&inner.call_count),
            span: inner.span.clone(),
        };
        let dispatcher = tokio::spawn(dispatcher.run(results).instrument(inner.span.clone()));

        inner.status.transition(Status::Starting, Status::Started);
        info!(
            message = "Load generator started.",
            timeout_ms = inner.settings.timeout.as_millis() as u64,
            duration_ms = inner.settings.duration.as_millis() as u64,
        );

        let supervisor = Arc::clone(inner).supervise(deadline, dispatcher);
        tokio::spawn(supervisor.instrument(inner.span.clone()));
        true
    }

    /// Stops the run and waits until the generator reaches [`Status::Stopped`].
    ///
    /// In-flight calls are not aborted; this returns once they have all finished. Calling it
    /// again, or after the run ended on its own, returns immediately. On a generator that
    /// was never started it does nothing.
    pub async fn stop(&self) {
        match self.status() {
            Status::Origin => {
                debug!(
                    parent: &self.inner.span,
                    message = "Stop ignored; generator was never started."
                );
                return;
            }
            Status::Stopped => return,
            Status::Starting | Status::Started | Status::Stopping => {}
        }

        self.inner.stop.send_replace(true);
        let mut finished = self.inner.finished.subscribe();
        let _ = finished.wait_for(|finished| *finished).await;
    }

    /// Waits for the final statistics, which are available once the run has ended and
    /// every result has been aggregated. Does not stop the run.
    ///
    /// Returns `None` if the generator was never started.
    pub async fn wait(&self) -> Option<StatsSnapshot> {
        if self.status() == Status::Origin {
            return None;
        }
        let mut final_stats = self.inner.final_stats.subscribe();
        final_stats
            .wait_for(Option::is_some)
            .await
            .ok()
            .and_then(|snapshot| snapshot.clone())
    }

    /// Registers a callback run during shutdown, before the status becomes
    /// [`Status::Stopped`]. Callbacks run in registration order.
    ///
    /// `None` is ignored with a warning, as is anything registered after the callbacks ran.
    pub fn before_exit(&self, hook: Option<ExitHook>) {
        let Some(hook) = hook else {
            warn!(parent: &self.inner.span, message = "Ignoring empty exit callback.");
            return;
        };

        let mut hooks = self.inner.exit_hooks.lock().unwrap_or_else(PoisonError::into_inner);
        match hooks.as_mut() {
            Some(hooks) => hooks.push(hook),
            None => warn!(
                parent: &self.inner.span,
                message = "Exit callbacks already ran; ignoring callback."
            ),
        }
    }
}

impl<C> LoadGenerator<C> {
    pub fn status(&self) -> Status {
        self.inner.status.load()
    }

    /// Calls dispatched so far. Completed calls may lag behind.
    pub fn call_count(&self) -> u64 {
        self.inner.call_count.load(Ordering::Acquire)
    }

    /// Results dropped because the result pipeline was full.
    pub fn dropped_results(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }

    /// Statistics aggregated so far.
    pub fn stats(&self) -> StatsSnapshot {
        self.inner.live_stats.borrow().clone()
    }

    /// Maximum number of calls in flight at once.
    pub fn concurrency(&self) -> usize {
        self.inner.concurrency
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.inner.settings
    }
}

impl<C: Caller> Inner<C> {
    async fn supervise(self: Arc<Self>, deadline: Instant, dispatcher: JoinHandle<ResultSender>) {
        let mut stop = self.stop.subscribe();
        tokio::select! {
            _ = time::sleep_until(deadline) => info!(message = "Run duration elapsed."),
            _ = stop_requested(&mut stop) => info!(message = "Stop requested."),
        }
        self.shutdown(dispatcher).await;
    }

    async fn shutdown(&self, dispatcher: JoinHandle<ResultSender>) {
        if !self.status.transition(Status::Started, Status::Stopping) {
            error!(
                message = "Shutdown entered from unexpected status.",
                status = %self.status.load(),
            );
        }

        self.stop.send_replace(true);
        self.tickets.close();

        // The dispatcher returns only after its in-flight calls finished.
        match dispatcher.await {
            Ok(results) => results.close(),
            Err(error) => error!(message = "Dispatcher task failed.", %error),
        }

        self.run_exit_hooks();

        self.status.transition(Status::Stopping, Status::Stopped);
        info!(
            message = "Load generator stopped.",
            call_count = self.call_count.load(Ordering::Acquire),
            dropped_results = self.dropped.load(Ordering::Relaxed),
        );
        self.finished.send_replace(true);
    }

    fn run_exit_hooks(&self) {
        let hooks = self
            .exit_hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .unwrap_or_default();

        for hook in hooks {
            if panic::catch_unwind(AssertUnwindSafe(hook)).is_err() {
                error!(message = "Exit callback panicked.");
            }
        }
    }
}

/// `now + duration`, saturating at [`FAR_FUTURE`] for durations `Instant` cannot hold.
fn deadline_after(now: Instant, duration: Duration) -> Instant {
    now.checked_add(duration).unwrap_or_else(|| now + FAR_FUTURE)
}

/// Resolves once `true` is published on `stop`, or when its sender is gone.
pub(crate) async fn stop_requested(stop: &mut watch::Receiver<bool>) {
    let _ = stop.wait_for(|stop| *stop).await;
}

impl<C> Clone for LoadGenerator<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> fmt::Debug for LoadGenerator<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadGenerator")
            .field("settings", &self.inner.settings)
            .field("concurrency", &self.inner.concurrency)
            .field("status", &self.status())
            .field("call_count", &self.call_count())
            .finish()
    }
}
