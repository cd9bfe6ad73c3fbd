//! Feature toggles whose treatments are decided by a remotely hosted rule document.
//!
//! # Overview
//!
//! A rule document lists features. Each feature has named treatments, and each treatment lists
//! the differentiators (user ids, account names, ...) it applies to. The crate revolves around
//! three pieces:
//! - [`RuleStore`] holds the last successfully fetched rules and resolves a treatment for a
//!   feature and differentiator. [`RuleStore::refresh()`] fetches the document conditionally
//!   (using the last etag) and swaps the new rules in atomically.
//! - [`RecurringWorker`] runs an [`Updater`] on a schedule, skipping ticks that overlap a run
//!   still in progress and surviving failures of individual runs.
//! - [`FeatureToggleAccessor`] maps resolved treatments to typed behaviors. It is created with a
//!   [`FeatureToggleAccessorBuilder`] that validates the default and forced treatments.
//!
//! ```no_run
//! # fn main() -> doppler_toggle::Result<()> {
//! use doppler_toggle::ClientConfig;
//!
//! let (store, _worker) = ClientConfig::from_url("https://example.com/features.json").start()?;
//!
//! let new_checkout = store
//!     .create_feature::<bool>("NewCheckout")
//!     .add_value("Enabled", true)
//!     .add_value("Disabled", false)
//!     .set_default_treatment("Disabled")
//!     .build()?;
//!
//! if new_checkout.get("user-42")? {
//!     // ...
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! Errors are represented by the [`Error`] enum.
//!
//! Refresh failures never discard the rules already in use, so a store that failed to refresh
//! keeps answering with the last good rules (or default treatments if none were ever fetched).
//! Builder errors indicate a programming mistake and should be fixed rather than ignored.
//!
//! # Logging
//!
//! The package uses the [`log`](https://docs.rs/log/latest/log/) crate for logging messages under
//! the `doppler_toggle` target. Consider integrating a `log`-compatible logger implementation for
//! better visibility into refreshes and worker failures.
//!
//! # Examples
//!
//! A runnable example can be found in the `demos/simple` directory of the crate repository.

#![warn(rustdoc::missing_crate_level_docs)]
#![warn(missing_docs)]

mod accessor;
mod config;
mod decoder;
mod error;
mod rule_store;
mod rules;
mod str;
mod transport;
mod updater;
mod worker;

#[cfg(test)]
mod testing;

pub use accessor::{FeatureToggleAccessor, FeatureToggleAccessorBuilder, Function};
pub use config::ClientConfig;
pub use decoder::{Decoder, JsonDecoder};
pub use error::{Error, Result};
pub use rule_store::{RuleStore, Snapshot, TreatmentResolver};
pub use rules::{Feature, RuleSet, Treatment};
pub use str::ArcStr;
pub use transport::{FetchResponse, HttpTransport, Transport};
pub use updater::{Updater, UpdaterExt};
pub use worker::{RecurringWorker, WorkerConfig, WorkerEvent, WorkerObserver};
