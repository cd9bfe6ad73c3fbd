//! A background worker that periodically runs an [`Updater`] on a dedicated thread.
use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
    time::Duration,
};

use rand::{thread_rng, Rng};
use tokio::{
    sync::oneshot,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use crate::{updater::Updater, Error, Result};

/// Configuration for [`RecurringWorker`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Delay before the first run.
    ///
    /// Defaults to [`WorkerConfig::DEFAULT_DUE_TIME`].
    pub due_time: Duration,
    /// Delay between subsequent runs. Zero means the action runs only once, after `due_time`.
    ///
    /// Defaults to [`WorkerConfig::DEFAULT_PERIOD`].
    pub period: Duration,
    /// Randomized duration subtracted from `due_time`. This helps to avoid multiple instances
    /// started together from requesting the remote resource in lockstep.
    ///
    /// Defaults to [`WorkerConfig::DEFAULT_JITTER`].
    pub jitter: Duration,
}

impl WorkerConfig {
    /// Default value for [`WorkerConfig::due_time`].
    pub const DEFAULT_DUE_TIME: Duration = Duration::ZERO;
    /// Default value for [`WorkerConfig::period`].
    pub const DEFAULT_PERIOD: Duration = Duration::from_secs(30);
    /// Default value for [`WorkerConfig::jitter`].
    pub const DEFAULT_JITTER: Duration = Duration::ZERO;

    /// Create a new `WorkerConfig` using default configuration.
    pub fn new() -> WorkerConfig {
        WorkerConfig::default()
    }

    /// Update due time with `due_time`.
    pub fn with_due_time(mut self, due_time: Duration) -> WorkerConfig {
        self.due_time = due_time;
        self
    }

    /// Update period with `period`.
    pub fn with_period(mut self, period: Duration) -> WorkerConfig {
        self.period = period;
        self
    }

    /// Update due time jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> WorkerConfig {
        self.jitter = jitter;
        self
    }
}

impl Default for WorkerConfig {
    fn default() -> WorkerConfig {
        WorkerConfig {
            due_time: WorkerConfig::DEFAULT_DUE_TIME,
            period: WorkerConfig::DEFAULT_PERIOD,
            jitter: WorkerConfig::DEFAULT_JITTER,
        }
    }
}

/// Outcome of a single tick of a [`RecurringWorker`].
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    /// The action ran and completed successfully.
    Ran,
    /// The tick was skipped because the previous run had not completed yet.
    Omitted,
    /// The action failed or panicked. The schedule continues.
    Failed(Error),
}

/// Receives [`WorkerEvent`]s.
///
/// Observers are called on the worker thread. `Omitted` is delivered synchronously on the skipped
/// tick; `Ran` and `Failed` when the run completes.
pub trait WorkerObserver {
    /// Handle a worker event.
    fn on_event(&self, event: &WorkerEvent);
}

impl<T: Fn(&WorkerEvent)> WorkerObserver for T {
    fn on_event(&self, event: &WorkerEvent) {
        self(event);
    }
}

type BoxedFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;
type Action = Arc<dyn Fn() -> BoxedFuture + Send + Sync>;

/// State shared between the worker handle and its thread(s).
#[derive(Default)]
struct Shared {
    in_progress: AtomicBool,
    observers: RwLock<Vec<Box<dyn WorkerObserver + Send + Sync>>>,
}

impl Shared {
    fn notify(&self, event: &WorkerEvent) {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        for observer in observers.iter() {
            observer.on_event(event);
        }
    }
}

struct TimerThread {
    join_handle: std::thread::JoinHandle<()>,
    /// Used to send a stop command to the timer thread. Dropping it stops the thread too.
    stop_sender: oneshot::Sender<()>,
}

impl TimerThread {
    fn is_alive(&self) -> bool {
        !self.join_handle.is_finished()
    }
}

/// Executes an [`Updater`] periodically.
///
/// The worker is created stopped. While running, the updater is invoked once after
/// [`due_time`](WorkerConfig::due_time) and then every [`period`](WorkerConfig::period).
///
/// A tick that fires while the previous run is still in progress is skipped and reported as
/// [`WorkerEvent::Omitted`]. Failures (errors and panics) are reported as
/// [`WorkerEvent::Failed`] and never end the schedule. Use [`RecurringWorker::observe`] to
/// receive events.
///
/// Stopping cancels future ticks but lets a run in progress finish.
pub struct RecurringWorker {
    action: Action,
    config: WorkerConfig,
    shared: Arc<Shared>,
    timer: Mutex<Option<TimerThread>>,
    /// Threads told to stop that may still be finishing a run. Joined by `shutdown`.
    stopping: Mutex<Vec<std::thread::JoinHandle<()>>>,
}

impl RecurringWorker {
    /// Create a stopped worker for `updater`.
    pub fn new<U: Updater + 'static>(updater: Arc<U>, config: WorkerConfig) -> RecurringWorker {
        let action: Action = Arc::new(move || {
            let updater = Arc::clone(&updater);
            Box::pin(async move { updater.update().await }) as BoxedFuture
        });

        RecurringWorker {
            action,
            config,
            shared: Arc::default(),
            timer: Mutex::new(None),
            stopping: Mutex::new(Vec::new()),
        }
    }

    /// Delay before the first run.
    pub fn due_time(&self) -> Duration {
        self.config.due_time
    }

    /// Delay between runs.
    pub fn period(&self) -> Duration {
        self.config.period
    }

    /// `true` while the timer is on.
    ///
    /// Turns `false` once stopped, after the single run of a zero-period worker, or if the timer
    /// thread died.
    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(TimerThread::is_alive)
    }

    /// `true` while the action is being executed.
    pub fn work_in_progress(&self) -> bool {
        self.shared.in_progress.load(Ordering::Acquire)
    }

    /// Register an observer for worker events. Can be called before or after start.
    pub fn observe(&self, observer: impl WorkerObserver + Send + Sync + 'static) {
        self.shared
            .observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Box::new(observer));
    }

    /// Start the recurring execution of the action.
    ///
    /// Does nothing if the worker is already running.
    ///
    /// # Errors
    ///
    /// This method can return the following errors:
    /// - IO Error if the timer thread failed to start.
    pub fn start(&self) -> Result<()> {
        let mut timer = self.timer.lock().unwrap_or_else(PoisonError::into_inner);
        if timer.as_ref().is_some_and(TimerThread::is_alive) {
            return Ok(());
        }
        if let Some(finished) = timer.take() {
            self.retire(finished.join_handle);
        }

        let (stop_sender, stop_receiver) = oneshot::channel::<()>();

        let join_handle = {
            let action = Arc::clone(&self.action);
            let shared = Arc::clone(&self.shared);
            let config = self.config.clone();

            std::thread::Builder::new()
                .name("doppler-toggle-worker".to_owned())
                .spawn(move || {
                    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                        run_timer(action, Arc::clone(&shared), config, stop_receiver)
                    }));

                    // If catch_unwind returns Err, it means a panic occurred.
                    if let Err(_panic_info) = result {
                        log::error!(target: "doppler_toggle", "recurring worker thread panicked");
                        shared.in_progress.store(false, Ordering::Release);
                        shared.notify(&WorkerEvent::Failed(Error::WorkerThreadPanicked));
                    }
                })?
        };

        log::debug!(target: "doppler_toggle",
                    due_time:? = self.config.due_time,
                    period:? = self.config.period;
                    "recurring worker started");

        *timer = Some(TimerThread {
            join_handle,
            stop_sender,
        });
        Ok(())
    }

    /// Stop the recurring execution of the action.
    ///
    /// Does nothing if the worker is already stopped. This function does not wait for a run in
    /// progress to finish.
    pub fn stop(&self) {
        let timer = self
            .timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(timer) = timer {
            // Error means that the timer thread has exited already.
            let _ = timer.stop_sender.send(());
            self.retire(timer.join_handle);
            log::debug!(target: "doppler_toggle", "recurring worker stopped");
        }
    }

    /// Keep the handle of a stopped thread so that `shutdown` can wait for it.
    fn retire(&self, join_handle: std::thread::JoinHandle<()>) {
        let mut stopping = self.stopping.lock().unwrap_or_else(PoisonError::into_inner);
        stopping.retain(|handle| !handle.is_finished());
        stopping.push(join_handle);
    }

    /// Stop the worker and block waiting for its thread to exit, including a run in progress.
    /// Runs left in progress by an earlier [`RecurringWorker::stop`] are waited for too.
    ///
    /// If you don't need to wait, use [`RecurringWorker::stop`] instead.
    ///
    /// # Errors
    ///
    /// - [`Error::WorkerThreadPanicked`] if the thread has panicked.
    pub fn shutdown(self) -> Result<()> {
        self.stop();

        let stopping = std::mem::take(
            &mut *self.stopping.lock().unwrap_or_else(PoisonError::into_inner),
        );
        let mut result = Ok(());
        for join_handle in stopping {
            if join_handle.join().is_err() {
                result = Err(Error::WorkerThreadPanicked);
            }
        }
        result
    }
}

impl Drop for RecurringWorker {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Timer loop of the worker thread. Returns once stopped and the last run has completed.
fn run_timer(
    action: Action,
    shared: Arc<Shared>,
    config: WorkerConfig,
    mut stop_receiver: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            log::warn!(target: "doppler_toggle", "failed to build worker runtime: {:?}", err);
            shared.notify(&WorkerEvent::Failed(Error::from(err)));
            return;
        }
    };

    runtime.block_on(async move {
        let first_run = Instant::now() + jitter(config.due_time, config.jitter);
        let mut last_run: Option<JoinHandle<()>> = None;

        if config.period.is_zero() {
            tokio::select! {
                _ = tokio::time::sleep_until(first_run) => {
                    last_run = tick(&action, &shared);
                }
                _ = &mut stop_receiver => {}
            }
        } else {
            let mut interval = tokio::time::interval_at(first_run, config.period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Some(run) = tick(&action, &shared) {
                            last_run = Some(run);
                        }
                    }
                    _ = &mut stop_receiver => {
                        log::debug!(target: "doppler_toggle", "recurring worker received stop command");
                        break;
                    }
                }
            }
        }

        // A run in progress is allowed to finish. Dropping the runtime would cancel it.
        if let Some(run) = last_run {
            let _ = run.await;
        }
    });
}

/// Start a run unless the previous one is still in progress.
fn tick(action: &Action, shared: &Arc<Shared>) -> Option<JoinHandle<()>> {
    if shared.in_progress.swap(true, Ordering::AcqRel) {
        log::warn!(target: "doppler_toggle", "previous run has not finished yet, omitting execution");
        shared.notify(&WorkerEvent::Omitted);
        return None;
    }

    let run = action();
    let shared = Arc::clone(shared);
    Some(tokio::spawn(async move {
        // Running the action in its own task so that a panic surfaces as a `JoinError` instead of
        // tearing down the timer.
        let event = match tokio::spawn(run).await {
            Ok(Ok(())) => WorkerEvent::Ran,
            Ok(Err(err)) => {
                log::warn!(target: "doppler_toggle", "recurring worker action failed: {:?}", err);
                WorkerEvent::Failed(err)
            }
            Err(_join_error) => {
                log::warn!(target: "doppler_toggle", "recurring worker action panicked");
                WorkerEvent::Failed(Error::ActionPanicked)
            }
        };

        shared.in_progress.store(false, Ordering::Release);
        shared.notify(&event);
    }))
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}
