//! Fetching the rule document from a remote resource.
use std::{future::Future, time::Duration};

use reqwest::{
    header::{ETAG, IF_NONE_MATCH},
    StatusCode, Url,
};

use crate::{Error, Result};

/// Response of a conditional fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResponse {
    /// `true` if the resource did not change relative to the supplied etag.
    pub not_modified: bool,
    /// Response body. `None` when `not_modified` is set.
    pub body: Option<String>,
    /// Cache validation token returned with the response, if any.
    pub etag: Option<String>,
}

impl FetchResponse {
    /// A "not modified" response.
    pub fn not_modified() -> FetchResponse {
        FetchResponse {
            not_modified: true,
            body: None,
            etag: None,
        }
    }

    /// A response carrying a full body and an optional new etag.
    pub fn modified(body: impl Into<String>, etag: Option<String>) -> FetchResponse {
        FetchResponse {
            not_modified: false,
            body: Some(body.into()),
            etag,
        }
    }
}

/// Fetches a resource by URL honoring a cache-validation token.
///
/// Any timeout policy belongs to the implementation; the rule store imposes none.
pub trait Transport: Send + Sync {
    /// Fetch `url`. When `etag` is given and the resource is unchanged, return a response with
    /// `not_modified` set.
    fn fetch(
        &self,
        url: &str,
        etag: Option<&str>,
    ) -> impl Future<Output = Result<FetchResponse>> + Send;
}

/// HTTP transport on top of `reqwest`.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    // Client holds a connection pool internally, so we're reusing the client between requests.
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport without a request timeout.
    pub fn new() -> HttpTransport {
        HttpTransport {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport whose requests fail after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<HttpTransport> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpTransport { client })
    }
}

impl Default for HttpTransport {
    fn default() -> HttpTransport {
        HttpTransport::new()
    }
}

impl Transport for HttpTransport {
    async fn fetch(&self, url: &str, etag: Option<&str>) -> Result<FetchResponse> {
        let url = Url::parse(url).map_err(Error::InvalidUrl)?;

        let mut request = self.client.get(url);
        if let Some(etag) = etag {
            request = request.header(IF_NONE_MATCH, etag);
        }

        log::debug!(target: "doppler_toggle", etag:?; "fetching rule document");
        let response = request.send().await?;

        let new_etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        if response.status() == StatusCode::NOT_MODIFIED {
            return Ok(FetchResponse {
                not_modified: true,
                body: None,
                etag: new_etag,
            });
        }

        let response = response.error_for_status().map_err(|err| {
            log::warn!(target: "doppler_toggle", "received non-success response while fetching rule document: {:?}", err);
            Error::from(err)
        })?;

        let body = response.text().await?;

        Ok(FetchResponse::modified(body, new_etag))
    }
}
