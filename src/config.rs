//! Client configuration building an HTTP-backed rule store and its refresh schedule.
use std::{sync::Arc, time::Duration};

use crate::{
    decoder::JsonDecoder,
    rule_store::RuleStore,
    transport::HttpTransport,
    worker::{RecurringWorker, WorkerConfig},
    Error, Result,
};

/// Configuration for an HTTP-backed [`RuleStore`] and its refresh schedule.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub(crate) url: String,
    pub(crate) timeout: Option<Duration>,
    pub(crate) worker: WorkerConfig,
}

impl ClientConfig {
    /// Create a default configuration fetching the rule document from `url`.
    ///
    /// ```
    /// # use doppler_toggle::ClientConfig;
    /// ClientConfig::from_url("https://example.com/features.json");
    /// ```
    pub fn from_url(url: impl Into<String>) -> Self {
        ClientConfig {
            url: url.into(),
            timeout: None,
            worker: WorkerConfig::default(),
        }
    }

    /// Fail rule document requests that take longer than `timeout`. No timeout by default.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the refresh schedule.
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use doppler_toggle::{ClientConfig, WorkerConfig};
    /// ClientConfig::from_url("https://example.com/features.json")
    ///     .worker(WorkerConfig::new().with_period(Duration::from_secs(60)));
    /// ```
    pub fn worker(&mut self, worker: WorkerConfig) -> &mut Self {
        self.worker = worker;
        self
    }

    /// Create a [`RuleStore`] using this configuration. The store is empty until refreshed.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidUrl`] if the URL cannot be parsed.
    /// - [`Error::Network`] if the HTTP client cannot be created.
    pub fn to_rule_store(&self) -> Result<RuleStore> {
        url::Url::parse(&self.url).map_err(Error::InvalidUrl)?;

        let transport = match self.timeout {
            Some(timeout) => HttpTransport::with_timeout(timeout)?,
            None => HttpTransport::new(),
        };

        Ok(RuleStore::new(self.url.clone(), transport, JsonDecoder))
    }

    /// Create a [`RuleStore`] and start a [`RecurringWorker`] refreshing it on the configured
    /// schedule.
    ///
    /// The store keeps resolving default treatments until the first refresh completes. Dropping
    /// the worker stops the refresh.
    pub fn start(&self) -> Result<(Arc<RuleStore>, RecurringWorker)> {
        let store = Arc::new(self.to_rule_store()?);
        let worker = RecurringWorker::new(Arc::clone(&store), self.worker.clone());
        worker.start()?;
        Ok((store, worker))
    }
}
