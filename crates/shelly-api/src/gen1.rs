// Gen1 REST client
//
// Gen1 devices expose a flat REST surface under `http://{ip}/`. Reads and
// writes are both GETs; a write carries its values as URL-encoded query
// parameters. Success is HTTP 200 -- the caller inspects the returned
// payload for a structured `"error"` field where the endpoint has one.

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::transport::{with_retry, RetryPolicy, TransportConfig};

/// HTTP client for the Gen1 REST dialect.
///
/// `host` arguments are the device authority (`192.168.1.100` or
/// `192.168.1.100:8080`); URLs are always plain `http` -- Gen1 firmware has
/// no TLS.
#[derive(Clone)]
pub struct Gen1Client {
    http: reqwest::Client,
    retry: RetryPolicy,
}

impl Gen1Client {
    /// Create a client from a [`TransportConfig`].
    pub fn new(transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            retry: transport.retry,
        })
    }

    /// Create a client around a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, retry: RetryPolicy) -> Self {
        Self { http, retry }
    }

    /// Build `http://{host}/{subpath}` with optional query pairs.
    fn endpoint_url(host: &str, subpath: &str, query: &[(String, String)]) -> Result<Url, Error> {
        let mut url = Url::parse(&format!("http://{host}/"))?.join(subpath.trim_start_matches('/'))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query.iter());
        }
        Ok(url)
    }

    /// GET an endpoint and parse the JSON body.
    ///
    /// Reads pass an empty `query`; writes pass the key/value pairs to apply.
    /// Non-200 responses become [`Error::Http`] with the raw body attached.
    pub async fn get(
        &self,
        host: &str,
        subpath: &str,
        query: &[(String, String)],
        cancel: &CancellationToken,
    ) -> Result<Value, Error> {
        let url = Self::endpoint_url(host, subpath, query)?;
        debug!(%url, "GET");

        let resp = with_retry(self.retry, cancel, || self.http.get(url.clone()).send()).await?;

        let status = resp.status();
        let body = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            b = resp.text() => b.map_err(Error::Transport)?,
        };

        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }

    /// Probe `GET http://{host}/shelly` without retry.
    ///
    /// Used by discovery sweeps: any transport error or non-JSON body means
    /// "not a reachable Shelly" and the address is skipped.
    pub async fn probe_identify(
        &self,
        host: &str,
        cancel: &CancellationToken,
    ) -> Result<Value, Error> {
        let url = Self::endpoint_url(host, "shelly", &[])?;
        debug!(%url, "probe");

        let resp = with_retry(RetryPolicy::none(), cancel, || {
            self.http.get(url.clone()).send()
        })
        .await?;

        let status = resp.status();
        let body = resp.text().await.map_err(Error::Transport)?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
