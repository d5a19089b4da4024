//! HTTP client for GitHub's GraphQL (v4) and REST (v3) APIs.
//!
//! Outbound requests go through a primary async transport. When that fails
//! for transport-level reasons (network, timeout, malformed body) the request
//! is replayed once on a blocking fallback transport; a fallback failure
//! propagates to the caller. REST endpoints that answer 202 ACCEPTED are
//! retried on a fixed interval until a bounded budget runs out, after which
//! the resource is treated as a non-fatal gap.
//!
//! A semaphore bounds the number of simultaneous in-flight requests across
//! both query types.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tracing::{debug, error, warn};

const GRAPHQL_URL: &str = "https://api.github.com/graphql";
const REST_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = "gh-stats";

pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

const HTTP_ACCEPTED: u16 = 202;

/// Transport-level failure, classified so the fallback decision is driven by
/// an explicit error kind rather than a catch-all.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("malformed response body: {0}")]
    Decode(String),
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Whether the secondary transport is worth trying. `Other` covers
    /// request-building and task errors that a different transport cannot
    /// fix.
    pub fn recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Decode(_)
        )
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        let msg = err.to_string();
        if err.is_timeout() {
            Self::Timeout(msg)
        } else if err.is_connect() || err.is_request() || err.is_body() {
            Self::Network(msg)
        } else if err.is_decode() {
            Self::Decode(msg)
        } else {
            Self::Other(msg)
        }
    }
}

/// Raw REST outcome before the 202-retry policy is applied.
pub struct RestResponse {
    pub status: u16,
    pub body: Value,
}

/// One way of getting bytes to and from the GitHub API. The client composes
/// a primary and a fallback implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn graphql(&self, token: &str, query: &str) -> Result<Value, TransportError>;

    async fn rest(
        &self,
        token: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<RestResponse, TransportError>;
}

/// Primary transport over the async `reqwest` client.
pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> Self {
        Self {
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn graphql(&self, token: &str, query: &str) -> Result<Value, TransportError> {
        let resp = self
            .http
            .post(GRAPHQL_URL)
            .bearer_auth(token)
            .header("User-Agent", USER_AGENT)
            .json(&json!({ "query": query }))
            .send()
            .await?;
        Ok(resp.json().await?)
    }

    async fn rest(
        &self,
        token: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<RestResponse, TransportError> {
        let resp = self
            .http
            .get(format!("{REST_BASE}/{path}"))
            .header("Authorization", format!("token {token}"))
            .header("User-Agent", USER_AGENT)
            .query(params)
            .send()
            .await?;
        let status = resp.status().as_u16();
        let body = read_body(resp.text().await?)?;
        Ok(RestResponse { status, body })
    }
}

/// Fallback transport over the blocking `reqwest` client, run off the async
/// runtime via `spawn_blocking`.
pub struct BlockingTransport;

#[async_trait]
impl Transport for BlockingTransport {
    async fn graphql(&self, token: &str, query: &str) -> Result<Value, TransportError> {
        let token = token.to_owned();
        let query = query.to_owned();
        tokio::task::spawn_blocking(move || {
            let resp = reqwest::blocking::Client::new()
                .post(GRAPHQL_URL)
                .bearer_auth(&token)
                .header("User-Agent", USER_AGENT)
                .json(&json!({ "query": query }))
                .send()?;
            Ok(resp.json()?)
        })
        .await
        .map_err(|e| TransportError::Other(format!("blocking task failed: {e}")))?
    }

    async fn rest(
        &self,
        token: &str,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<RestResponse, TransportError> {
        let token = token.to_owned();
        let url = format!("{REST_BASE}/{path}");
        let params: Vec<(String, String)> = params
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        tokio::task::spawn_blocking(move || {
            let resp = reqwest::blocking::Client::new()
                .get(&url)
                .header("Authorization", format!("token {token}"))
                .header("User-Agent", USER_AGENT)
                .query(&params)
                .send()?;
            let status = resp.status().as_u16();
            let body = read_body(resp.text()?)?;
            Ok(RestResponse { status, body })
        })
        .await
        .map_err(|e| TransportError::Other(format!("blocking task failed: {e}")))?
    }
}

/// 202 responses often arrive with an empty body, which is not valid JSON.
fn read_body(text: String) -> Result<Value, TransportError> {
    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&text).map_err(|e| TransportError::Decode(e.to_string()))
}

/// Retry policy for 202 ACCEPTED responses.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 60,
            delay: Duration::from_secs(2),
        }
    }
}

/// The seam the aggregator talks through, so tests can substitute a scripted
/// implementation.
#[async_trait]
pub trait GithubApi: Send + Sync {
    async fn graphql(&self, query: &str) -> Result<Value>;

    async fn rest(&self, path: &str, params: &[(&str, &str)]) -> Result<Value>;
}

pub struct ApiClient {
    token: String,
    gate: Semaphore,
    primary: Box<dyn Transport>,
    fallback: Box<dyn Transport>,
    retry: RetryPolicy,
}

impl ApiClient {
    pub fn new(token: String) -> Self {
        Self::with_transports(
            token,
            Box::new(ReqwestTransport::new()),
            Box::new(BlockingTransport),
            DEFAULT_MAX_CONNECTIONS,
            RetryPolicy::default(),
        )
    }

    pub fn with_transports(
        token: String,
        primary: Box<dyn Transport>,
        fallback: Box<dyn Transport>,
        max_connections: usize,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            token,
            gate: Semaphore::new(max_connections),
            primary,
            fallback,
            retry,
        }
    }

    /// POST a GraphQL document. Falls back once to the blocking transport on
    /// a recoverable primary failure; a fallback failure propagates.
    pub async fn graphql_query(&self, query: &str) -> Result<Value> {
        let _permit = self.gate.acquire().await.context("admission gate closed")?;
        debug!("sending GraphQL request");
        let body = match self.primary.graphql(&self.token, query).await {
            Ok(body) => body,
            Err(err) if err.recoverable() => {
                warn!(%err, "primary transport failed for GraphQL query, falling back");
                self.fallback
                    .graphql(&self.token, query)
                    .await
                    .context("fallback transport failed for GraphQL query")?
            }
            Err(err) => return Err(err).context("GraphQL request failed"),
        };
        if let Some(errors) = body.get("errors") {
            warn!(%errors, "GraphQL response reports errors, continuing with partial data");
        }
        Ok(body)
    }

    /// GET a REST path. 202 ACCEPTED retries on a fixed interval until the
    /// budget is spent, after which the resource degrades to an empty result.
    /// The fallback transport is subject to the same 202 policy.
    pub async fn rest_query(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        let path = path.trim_start_matches('/');
        for attempt in 1..=self.retry.max_attempts {
            let resp = {
                let _permit = self.gate.acquire().await.context("admission gate closed")?;
                debug!(path, attempt, "sending REST request");
                match self.primary.rest(&self.token, path, params).await {
                    Ok(resp) => resp,
                    Err(err) if err.recoverable() => {
                        warn!(%err, path, "primary transport failed for REST query, falling back");
                        self.fallback
                            .rest(&self.token, path, params)
                            .await
                            .with_context(|| format!("fallback transport failed for {path}"))?
                    }
                    Err(err) => return Err(err).context("REST request failed"),
                }
            };

            if resp.status == HTTP_ACCEPTED {
                warn!(path, attempt, "202 ACCEPTED, retrying after delay");
                sleep(self.retry.delay).await;
                continue;
            }
            if (200..300).contains(&resp.status) {
                debug!(path, "REST request succeeded");
                return Ok(resp.body);
            }
            warn!(path, status = resp.status, "unexpected REST status, treating as missing data");
            return Ok(json!({}));
        }
        error!(path, "too many 202 ACCEPTED responses, giving up; data for this resource will be incomplete");
        Ok(json!({}))
    }
}

#[async_trait]
impl GithubApi for ApiClient {
    async fn graphql(&self, query: &str) -> Result<Value> {
        self.graphql_query(query).await
    }

    async fn rest(&self, path: &str, params: &[(&str, &str)]) -> Result<Value> {
        self.rest_query(path, params).await
    }
}
