// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! HTTP implementation of the target-index seam.
//!
//! Speaks the OpenSearch-style document REST API:
//!
//! - `PUT {endpoint}/{index}/_doc/{key}` - upsert (full document replace)
//! - `DELETE {endpoint}/{index}/_doc/{key}` - delete (404 = already gone)
//! - `GET {endpoint}/{index}` - reachability probe
//!
//! # Error Classification
//!
//! | Signal | Class |
//! |--------|-------|
//! | Transport timeout / connect failure | Transient |
//! | 408, 429, 5xx | Transient |
//! | 401, 403, other 4xx | Permanent |
//!
//! Credentials are optional HTTP basic auth, supplied via
//! [`IndexConfig`](crate::config::IndexConfig) at construction time. The
//! core does not manage credential rotation.

use crate::config::IndexConfig;
use crate::error::{ReplicateError, Result};
use crate::index::{BoxFuture, SearchIndexRef};
use crate::record::Document;
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use tracing::trace;

/// Connect timeout for the underlying client. Per-call deadlines are
/// enforced by the replicator on top of this.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// `reqwest`-backed search index client.
#[derive(Debug)]
pub struct HttpSearchIndex {
    client: Client,
    endpoint: Url,
    index: String,
    username: Option<String>,
    password: Option<String>,
}

impl HttpSearchIndex {
    /// Create a client from index configuration.
    ///
    /// Fails with a precondition error if the endpoint is not a usable
    /// base URL; nothing is sent over the network here.
    pub fn new(config: &IndexConfig) -> Result<Self> {
        let endpoint = Url::parse(&config.endpoint).map_err(|e| {
            ReplicateError::Precondition(format!("invalid index endpoint {}: {e}", config.endpoint))
        })?;
        if endpoint.cannot_be_a_base() {
            return Err(ReplicateError::Precondition(format!(
                "index endpoint is not a base URL: {}",
                config.endpoint
            )));
        }
        if config.index.is_empty() {
            return Err(ReplicateError::Precondition("index name is empty".to_string()));
        }

        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ReplicateError::Precondition(format!("http client init: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            index: config.index.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    /// Build the document URL for a key.
    ///
    /// Keys are pushed as path segments, so special characters are
    /// percent-encoded rather than splitting the path.
    fn doc_url(&self, key: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ReplicateError::permanent("url", "endpoint cannot carry a path"))?
            .extend([self.index.as_str(), "_doc", key]);
        Ok(url)
    }

    /// URL of the index itself, used for the reachability probe.
    fn index_url(&self) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| ReplicateError::permanent("url", "endpoint cannot carry a path"))?
            .push(&self.index);
        Ok(url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.username {
            Some(user) => request.basic_auth(user, self.password.as_deref()),
            None => request,
        }
    }
}

/// Map an HTTP status to the error taxonomy.
///
/// 408 (request timeout) and 429 (throttling) are transient along with all
/// server-side errors; remaining client errors are rejections the index
/// will repeat on retry.
fn classify_status(operation: &str, status: StatusCode, body: &str) -> ReplicateError {
    let message = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        ReplicateError::transient(operation, message)
    } else {
        ReplicateError::permanent(operation, message)
    }
}

/// Map a transport-level failure to the error taxonomy.
///
/// Anything that happened on the wire (timeout, connection reset, DNS) is
/// transient; only request-construction bugs are permanent.
fn classify_transport(operation: &str, err: reqwest::Error) -> ReplicateError {
    if err.is_builder() {
        ReplicateError::permanent(operation, err.to_string())
    } else {
        ReplicateError::transient(operation, err.to_string())
    }
}

impl SearchIndexRef for HttpSearchIndex {
    fn upsert(&self, key: String, document: Document) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let url = self.doc_url(&key)?;
            trace!(key = %key, %url, "PUT document");

            let response = self
                .authorize(self.client.put(url).json(&document))
                .send()
                .await
                .map_err(|e| classify_transport("PUT", e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(classify_status("PUT", status, &body))
        })
    }

    fn delete(&self, key: String) -> BoxFuture<'_, bool> {
        Box::pin(async move {
            let url = self.doc_url(&key)?;
            trace!(key = %key, %url, "DELETE document");

            let response = self
                .authorize(self.client.delete(url))
                .send()
                .await
                .map_err(|e| classify_transport("DELETE", e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(true);
            }
            // Deleting a document that does not exist is not an error.
            if status == StatusCode::NOT_FOUND {
                return Ok(false);
            }
            let body = response.text().await.unwrap_or_default();
            Err(classify_status("DELETE", status, &body))
        })
    }

    fn ping(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let url = self.index_url()?;
            let response = self
                .authorize(self.client.get(url))
                .send()
                .await
                .map_err(|e| classify_transport("GET", e))?;

            let status = response.status();
            // A 404 here just means the index has not been created yet;
            // the first upsert will create it.
            if status.is_success() || status == StatusCode::NOT_FOUND {
                return Ok(());
            }
            let body = response.text().await.unwrap_or_default();
            Err(classify_status("GET", status, &body))
        })
    }
}
