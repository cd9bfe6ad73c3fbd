//! Test doubles shared by unit tests.
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use crate::{
    rule_store::TreatmentResolver,
    transport::{FetchResponse, Transport},
    ArcStr, Error, Result,
};

/// Transport returning scripted responses and recording the etags it was asked with.
#[derive(Default)]
pub(crate) struct TransportDouble {
    responses: Mutex<VecDeque<Result<FetchResponse>>>,
    requested_etags: Mutex<Vec<Option<String>>>,
}

impl TransportDouble {
    /// Queue a response for the next fetch.
    pub fn respond(&self, response: Result<FetchResponse>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn requested_etags(&self) -> Vec<Option<String>> {
        self.requested_etags.lock().unwrap().clone()
    }
}

impl Transport for TransportDouble {
    async fn fetch(&self, _url: &str, etag: Option<&str>) -> Result<FetchResponse> {
        self.requested_etags
            .lock()
            .unwrap()
            .push(etag.map(str::to_owned));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Transport("no scripted response".into())))
    }
}

/// Resolver that always answers with a fixed treatment and counts calls.
pub(crate) struct FixedResolver {
    treatment: Option<ArcStr>,
    calls: Arc<Mutex<usize>>,
}

impl FixedResolver {
    /// Resolve every differentiator to `treatment`.
    pub fn new(treatment: &str) -> FixedResolver {
        FixedResolver {
            treatment: Some(treatment.into()),
            calls: Arc::default(),
        }
    }

    /// Resolve every differentiator to the default treatment.
    pub fn defaulting() -> FixedResolver {
        FixedResolver {
            treatment: None,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Arc<Mutex<usize>> {
        Arc::clone(&self.calls)
    }
}

impl TreatmentResolver for FixedResolver {
    fn resolve_treatment(
        &self,
        _feature_name: &str,
        _differentiator: &str,
        default_treatment: ArcStr,
    ) -> ArcStr {
        *self.calls.lock().unwrap() += 1;
        self.treatment.clone().unwrap_or(default_treatment)
    }
}
