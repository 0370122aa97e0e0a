//! HTTP clients for the history store API.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Response, Url};

use super::{Endpoint, ForwardError};
use crate::record::ExecutionRecord;
use crate::rpc::{ErrorResponse, GetFromToRequest, HistoryResponse};

/// Turn a configured instance address into a URL.
///
/// A bare `host:port` gets an `http://` scheme. When the address carries no
/// path of its own, `default_path` is used.
pub fn instance_url(instance: &str, default_path: &str) -> Result<Url> {
    let instance = instance.trim();
    if instance.is_empty() {
        bail!("empty instance address");
    }

    let with_scheme = if instance.contains("://") {
        instance.to_string()
    } else {
        format!("http://{instance}")
    };

    let mut url = Url::parse(&with_scheme).with_context(|| format!("bad URL '{with_scheme}'"))?;
    if url.cannot_be_a_base() || url.host_str().is_none() {
        bail!("'{instance}' has no host");
    }
    if url.path().is_empty() || url.path() == "/" {
        url.set_path(default_path);
    }
    Ok(url)
}

/// Pull the `{"error": ...}` message out of a failed response.
async fn error_message(resp: Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorResponse>().await {
        Ok(body) => body.error,
        Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
    }
}

// ---------------------------------------------------------------------------
// Forwarding
// ---------------------------------------------------------------------------

/// Posts records to one store instance's `/store` endpoint.
pub struct StoreClient {
    instance: String,
    url: Url,
    http: reqwest::Client,
}

impl StoreClient {
    pub fn new(instance: &str, http: reqwest::Client) -> Result<Self> {
        Ok(Self {
            instance: instance.to_string(),
            url: instance_url(instance, "/store")?,
            http,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl Endpoint for StoreClient {
    async fn call(&self, record: &ExecutionRecord) -> Result<(), ForwardError> {
        let resp = self
            .http
            .post(self.url.clone())
            .json(record)
            .send()
            .await
            .map_err(|source| ForwardError::Transport {
                instance: self.instance.clone(),
                source,
            })?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        Err(ForwardError::Rejected {
            instance: self.instance.clone(),
            status: status.as_u16(),
            message: error_message(resp).await,
        })
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Reads history back from a store instance.
pub struct HistoryClient {
    base: Url,
    http: reqwest::Client,
}

impl HistoryClient {
    pub fn new(instance: &str) -> Result<Self> {
        Ok(Self {
            base: instance_url(instance, "/")?,
            http: reqwest::Client::new(),
        })
    }

    /// Records with `from < timestamp_exec < to`.
    pub async fn get_from_to(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<ExecutionRecord>> {
        let resp = self
            .http
            .post(self.endpoint("/get-from-to"))
            .json(&GetFromToRequest { from, to })
            .send()
            .await
            .context("get-from-to request failed")?;
        Self::records(resp).await
    }

    pub async fn get_all(&self) -> Result<Vec<ExecutionRecord>> {
        let resp = self
            .http
            .get(self.endpoint("/history"))
            .send()
            .await
            .context("history request failed")?;
        Self::records(resp).await
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base.clone();
        url.set_path(path);
        url
    }

    async fn records(resp: Response) -> Result<Vec<ExecutionRecord>> {
        let status = resp.status();
        if !status.is_success() {
            bail!("store returned {status}: {}", error_message(resp).await);
        }
        let body: HistoryResponse = resp.json().await.context("malformed history response")?;
        if let Some(err) = body.err {
            bail!("store error: {err}");
        }
        Ok(body.res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_host_gets_scheme_and_store_path() {
        let url = instance_url("store-a:9001", "/store").unwrap();
        assert_eq!(url.as_str(), "http://store-a:9001/store");
    }

    #[test]
    fn test_explicit_path_is_kept() {
        let url = instance_url("https://store-b:9002/v2/store", "/store").unwrap();
        assert_eq!(url.as_str(), "https://store-b:9002/v2/store");
    }

    #[test]
    fn test_root_path_is_replaced() {
        let url = instance_url("http://127.0.0.1:8081/", "/store").unwrap();
        assert_eq!(url.path(), "/store");
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(instance_url("", "/store").is_err());
        assert!(instance_url("http://[::1", "/store").is_err());
    }

    #[test]
    fn test_history_client_endpoints() {
        let client = HistoryClient::new("localhost:8081").unwrap();
        assert_eq!(client.endpoint("/history").as_str(), "http://localhost:8081/history");
        assert_eq!(
            client.endpoint("/get-from-to").as_str(),
            "http://localhost:8081/get-from-to"
        );
    }
}
