//! A thread-safe in-memory store for the currently active rule set. [`RuleStore`] serves
//! treatment resolution to any number of concurrent readers while a refresh replaces the rules
//! in the background.
use std::{
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

use chrono::{DateTime, Utc};

use crate::{
    accessor::FeatureToggleAccessorBuilder,
    decoder::{Decoder, JsonDecoder},
    rules::RuleSet,
    transport::{HttpTransport, Transport},
    updater::Updater,
    ArcStr, Error, Result,
};

/// Something that can resolve the treatment of a feature for a differentiator.
pub trait TreatmentResolver: Send + Sync {
    /// Resolve the treatment for `differentiator`, returning `default_treatment` unchanged when no
    /// rule applies. Never fails.
    fn resolve_treatment(
        &self,
        feature_name: &str,
        differentiator: &str,
        default_treatment: ArcStr,
    ) -> ArcStr;
}

/// Rule set together with the cache validation token it was fetched with.
///
/// Both are always replaced together, so a reader never sees an etag that belongs to different
/// rules.
#[derive(Debug, Default)]
pub struct Snapshot {
    rules: RuleSet,
    etag: Option<String>,
    fetched_at: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// The rule set.
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Cache validation token of the applied document.
    pub fn etag(&self) -> Option<&str> {
        self.etag.as_deref()
    }

    /// When the rules were fetched. `None` for the initial empty snapshot.
    pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }
}

/// `RuleStore` holds the latest rule set fetched from `url` and resolves treatments against it.
///
/// Resolution reads an immutable snapshot and never waits for a refresh. [`RuleStore::refresh`]
/// builds a new snapshot and publishes it in a single pointer swap.
///
/// Concurrent manual refresh is safe but not deduplicated; scheduled refresh through
/// [`RecurringWorker`](crate::RecurringWorker) is deduplicated by its overlap rule.
pub struct RuleStore<T = HttpTransport, D = JsonDecoder> {
    url: String,
    transport: T,
    decoder: D,
    snapshot: RwLock<Arc<Snapshot>>,
}

impl RuleStore {
    /// Create a store fetching JSON rules from `url` over HTTP.
    pub fn from_url(url: impl Into<String>) -> RuleStore {
        RuleStore::new(url, HttpTransport::new(), JsonDecoder)
    }
}

impl<T: Transport, D: Decoder> RuleStore<T, D> {
    /// Create an empty store. Until the first successful refresh every resolution returns the
    /// default treatment.
    pub fn new(url: impl Into<String>, transport: T, decoder: D) -> Self {
        RuleStore {
            url: url.into(),
            transport,
            decoder,
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
        }
    }

    /// URL of the rule document.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Transport used to fetch the rule document.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get currently active snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        // A writer only swaps the pointer, so a poisoned lock still holds a consistent value.
        let snapshot = self
            .snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&snapshot)
    }

    /// Cache validation token of the active snapshot.
    pub fn etag(&self) -> Option<String> {
        self.snapshot().etag.clone()
    }

    /// When the active rules were fetched. `None` until the first successful refresh.
    pub fn last_refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot().fetched_at
    }

    /// Resolve the treatment of `feature_name` for `differentiator`.
    ///
    /// Returns the first treatment in document order that lists `differentiator` (ignoring case),
    /// or `default_treatment` unchanged if the feature is unknown or no treatment matches.
    pub fn resolve_treatment(
        &self,
        feature_name: &str,
        differentiator: &str,
        default_treatment: impl Into<ArcStr>,
    ) -> ArcStr {
        let snapshot = self.snapshot();
        match snapshot.rules.find_treatment(feature_name, differentiator) {
            Some(treatment) => {
                log::trace!(target: "doppler_toggle",
                            feature_name,
                            differentiator,
                            treatment;
                            "resolved treatment");
                treatment.clone()
            }
            None => default_treatment.into(),
        }
    }

    /// Fetch the rule document and, if it changed and decodes, replace the active snapshot.
    ///
    /// A "not modified" response leaves the store untouched. Transport and decode errors are
    /// returned to the caller and also leave the store untouched, so the etag is only advanced
    /// together with rules that were understood.
    pub async fn refresh(&self) -> Result<()> {
        let current = self.snapshot();

        log::debug!(target: "doppler_toggle", url:display = self.url; "refreshing rules");
        let response = match self.transport.fetch(&self.url, current.etag()).await {
            Ok(response) => response,
            Err(err) => {
                log::warn!(target: "doppler_toggle", url:display = self.url; "error while fetching rules: {:?}", err);
                return Err(err);
            }
        };

        if response.not_modified {
            log::debug!(target: "doppler_toggle", url:display = self.url; "rules not modified");
            return Ok(());
        }

        let body = response.body.ok_or(Error::MissingBody)?;
        let rules = match self.decoder.decode(&body) {
            Ok(rules) => rules,
            Err(err) => {
                log::warn!(target: "doppler_toggle", url:display = self.url; "failed to decode rules: {:?}", err);
                return Err(err);
            }
        };

        let features = rules.len();
        // Constructing new value before requesting the lock to minimize lock span.
        let new_snapshot = Arc::new(Snapshot {
            rules,
            etag: response.etag,
            fetched_at: Some(Utc::now()),
        });

        *self
            .snapshot
            .write()
            .unwrap_or_else(PoisonError::into_inner) = new_snapshot;

        log::debug!(target: "doppler_toggle", url:display = self.url, features; "applied new rules");
        Ok(())
    }

    /// Start building a typed accessor for `feature_name` backed by this store.
    pub fn create_feature<V>(
        self: &Arc<Self>,
        feature_name: impl Into<ArcStr>,
    ) -> FeatureToggleAccessorBuilder<V>
    where
        T: 'static,
        D: 'static,
    {
        FeatureToggleAccessorBuilder::new(Arc::clone(self) as Arc<dyn TreatmentResolver>, feature_name)
    }
}

impl<T: Transport, D: Decoder> TreatmentResolver for RuleStore<T, D> {
    fn resolve_treatment(
        &self,
        feature_name: &str,
        differentiator: &str,
        default_treatment: ArcStr,
    ) -> ArcStr {
        RuleStore::resolve_treatment(self, feature_name, differentiator, default_treatment)
    }
}

impl<T: Transport, D: Decoder> Updater for RuleStore<T, D> {
    fn update(&self) -> impl Future<Output = Result<()>> + Send {
        self.refresh()
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, sync::Arc};

    use super::RuleStore;
    use crate::{
        decoder::JsonDecoder,
        testing::TransportDouble,
        transport::FetchResponse,
        ArcStr, Error,
    };

    fn document(name: &str) -> String {
        fs::read_to_string(format!("tests/data/{name}"))
            .unwrap_or_else(|_| panic!("Failed to open tests/data/{name}"))
    }

    fn store() -> RuleStore<TransportDouble, JsonDecoder> {
        RuleStore::new("url", TransportDouble::default(), JsonDecoder)
    }

    #[test]
    fn returns_default_while_no_rules() {
        let store = store();

        assert!(store.last_refreshed_at().is_none());
        assert_eq!(store.resolve_treatment("Feature2", "H", "default"), "default");
    }

    #[test]
    fn default_is_returned_unchanged() {
        let store = store();
        let default = ArcStr::from("default");

        let treatment = store.resolve_treatment("Feature2", "H", default.clone());

        assert!(ArcStr::ptr_eq(&treatment, &default));
    }

    #[tokio::test]
    async fn updates_rules_after_refresh() {
        let store = store();
        store
            .transport()
            .respond(Ok(FetchResponse::modified(document("features-v1.json"), Some("v1".into()))));

        store.refresh().await.unwrap();

        assert_eq!(store.resolve_treatment("Feature2", "H", "default"), "Treatment2A");
        assert_eq!(store.resolve_treatment("Feature2", "h", "default"), "Treatment2A");
        assert_eq!(store.resolve_treatment("Feature2", "Z", "default"), "default");
        assert_eq!(store.resolve_treatment("Feature3", "M", "default"), "Disabled");
        assert_eq!(store.resolve_treatment("Unknown", "M", "default"), "default");
        assert_eq!(store.etag().as_deref(), Some("v1"));
        assert!(store.last_refreshed_at().is_some());

        store
            .transport()
            .respond(Ok(FetchResponse::modified(document("features-v2.json"), Some("v2".into()))));
        store.refresh().await.unwrap();

        assert_eq!(store.resolve_treatment("Feature2", "Z", "default"), "Treatment2B");

        store
            .transport()
            .respond(Ok(FetchResponse::modified(r#"{ "features": [ ] }"#, Some("v3".into()))));
        store.refresh().await.unwrap();

        assert_eq!(store.resolve_treatment("Feature2", "H", "default"), "default");
        assert_eq!(store.resolve_treatment("Feature2", "Z", "default"), "default");

        assert_eq!(
            store.transport().requested_etags(),
            vec![None, Some("v1".to_owned()), Some("v2".to_owned())]
        );
    }

    #[tokio::test]
    async fn not_modified_keeps_snapshot() {
        let store = store();
        store
            .transport()
            .respond(Ok(FetchResponse::modified(document("features-v1.json"), Some("v1".into()))));
        store.refresh().await.unwrap();
        let before = store.snapshot();

        store.transport().respond(Ok(FetchResponse::not_modified()));
        store.refresh().await.unwrap();

        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(store.etag().as_deref(), Some("v1"));
    }

    #[tokio::test]
    async fn decode_failure_keeps_snapshot_and_etag() {
        let store = store();
        store
            .transport()
            .respond(Ok(FetchResponse::modified(document("features-v1.json"), Some("v1".into()))));
        store.refresh().await.unwrap();
        let before = store.snapshot();

        store
            .transport()
            .respond(Ok(FetchResponse::modified("{ broken", Some("v2".into()))));
        let result = store.refresh().await;

        assert!(matches!(result, Err(Error::Decode(_))));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(store.etag().as_deref(), Some("v1"));
        assert_eq!(store.resolve_treatment("Feature2", "H", "default"), "Treatment2A");

        // The next poll asks for the same document again instead of being told it's unchanged.
        store
            .transport()
            .respond(Ok(FetchResponse::modified(document("features-v2.json"), Some("v2".into()))));
        store.refresh().await.unwrap();
        assert_eq!(store.transport().requested_etags().last().unwrap().as_deref(), Some("v1"));
        assert_eq!(store.resolve_treatment("Feature2", "Z", "default"), "Treatment2B");
    }

    #[tokio::test]
    async fn transport_failure_keeps_snapshot() {
        let store = store();
        let before = store.snapshot();

        store
            .transport()
            .respond(Err(Error::Transport("connection refused".into())));
        let result = store.refresh().await;

        assert!(matches!(result, Err(Error::Transport(_))));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
        assert_eq!(store.etag(), None);
    }

    #[tokio::test]
    async fn modified_response_without_body_fails() {
        let store = store();
        store.transport().respond(Ok(FetchResponse {
            not_modified: false,
            body: None,
            etag: Some("v1".into()),
        }));

        assert!(matches!(store.refresh().await, Err(Error::MissingBody)));
        assert_eq!(store.etag(), None);
    }

    #[tokio::test]
    async fn readers_on_other_threads_see_refreshed_rules() {
        let store = Arc::new(store());
        store
            .transport()
            .respond(Ok(FetchResponse::modified(document("features-v1.json"), None)));
        store.refresh().await.unwrap();

        let reader = {
            let store = Arc::clone(&store);
            std::thread::spawn(move || store.resolve_treatment("Feature1", "E", "default"))
        };

        assert_eq!(reader.join().unwrap(), "Treatment1B");
    }
}
