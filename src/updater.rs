//! Scheduling seam between the recurring worker and the things it refreshes.
use std::{future::Future, sync::Arc, time::Duration};

use crate::{
    worker::{RecurringWorker, WorkerConfig},
    Result,
};

/// Something that can update an object based on a resource.
///
/// [`RecurringWorker`] can drive any `Updater`; it has no knowledge of feature toggles.
/// [`RuleStore`](crate::RuleStore) implements it by refreshing its rules, and so does any
/// `Fn() -> impl Future<Output = Result<()>>` closure.
pub trait Updater: Send + Sync {
    /// Execute the update.
    fn update(&self) -> impl Future<Output = Result<()>> + Send;
}

impl<F, Fut> Updater for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn update(&self) -> impl Future<Output = Result<()>> + Send {
        self()
    }
}

/// Helpers available on every shared [`Updater`].
pub trait UpdaterExt: Updater + Sized + 'static {
    /// Run the update periodically: first after `due_time`, then every `period`.
    ///
    /// The returned worker is already started. Dropping it stops the schedule.
    fn update_periodically(
        self: &Arc<Self>,
        due_time: Duration,
        period: Duration,
    ) -> Result<RecurringWorker> {
        let worker = RecurringWorker::new(
            Arc::clone(self),
            WorkerConfig::new()
                .with_due_time(due_time)
                .with_period(period),
        );
        worker.start()?;
        Ok(worker)
    }
}

impl<U: Updater + 'static> UpdaterExt for U {}
