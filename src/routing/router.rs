//! Request dispatch and retry orchestration.
//!
//! # Responsibilities
//! - Pick candidates from the app's failover queue
//! - Forward the request with provider credentials and tiered deadlines
//! - Record every attempt's outcome in the health store
//! - Guard streamed bodies so the outcome lands when the stream ends
//!
//! # Design Decisions
//! - Settings are snapshotted once per request
//! - One retry is spent per failed attempt; skipped candidates are free
//! - No failover once a streamed body has started flowing
//! - 4xx responses go back to the client verbatim and count for nothing

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use futures_util::{stream, Stream, StreamExt};

use crate::config::{AppType, ListenerConfig, RuntimeSettings};
use crate::error::{ProxyError, UpstreamError};
use crate::failover::{Candidate, CandidateWalker, FailoverQueues};
use crate::health::{Admission, HealthStore};
use crate::http::request::{upstream_headers, X_REQUEST_ID};
use crate::observability::metrics;
use crate::observability::stats::ProxyStats;
use crate::provider::{Provider, ProviderCatalog};
use crate::resilience::timeouts::{next_within, with_deadline};
use crate::resilience::{RetryBudget, TierTimeouts, TimeoutTier};

/// Longest upstream error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 2048;

/// Body stream handed to the HTTP layer.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, UpstreamError>> + Send>>;

type UpstreamStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// An inbound request with its body buffered for replay.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub request_id: String,
    pub app_type: AppType,
    pub method: Method,
    /// Path and query relative to the provider's base URL.
    pub forward_path: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub streaming: bool,
}

pub enum ResponseBody {
    Full(Bytes),
    Stream(ByteStream),
}

impl std::fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full(bytes) => f.debug_tuple("Full").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Upstream response plus routing metadata.
#[derive(Debug)]
pub struct RoutedResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ResponseBody,
    pub provider_id: String,
    pub attempts: u32,
}

/// What one attempt produced when it did not fail.
enum Delivered {
    Complete {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    Streaming {
        status: StatusCode,
        headers: HeaderMap,
        first: Option<Bytes>,
        rest: UpstreamStream,
    },
    /// 4xx from upstream.
    Rejected {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
}

fn truncate(mut body: String) -> String {
    if body.len() > MAX_ERROR_BODY {
        let mut end = MAX_ERROR_BODY;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        body.truncate(end);
    }
    body
}

fn settle_failure(admission: Option<Admission>, err: &UpstreamError) {
    if let Some(admission) = admission {
        if err.counts_against_breaker() {
            admission.record_failure(&err.to_string());
        } else {
            admission.release();
        }
    }
}

/// Routes requests across an app's providers.
pub struct RequestRouter {
    settings: Arc<RuntimeSettings>,
    queues: Arc<FailoverQueues>,
    health: Arc<HealthStore>,
    catalog: Arc<dyn ProviderCatalog>,
    client: reqwest::Client,
    stats: ProxyStats,
}

impl RequestRouter {
    pub fn new(
        listener: &ListenerConfig,
        settings: Arc<RuntimeSettings>,
        queues: Arc<FailoverQueues>,
        health: Arc<HealthStore>,
        catalog: Arc<dyn ProviderCatalog>,
        stats: ProxyStats,
    ) -> Result<Self, reqwest::Error> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(listener.connect_timeout_secs));
        if !listener.use_system_proxy {
            builder = builder.no_proxy();
        }
        Ok(Self {
            settings,
            queues,
            health,
            catalog,
            client: builder.build()?,
            stats,
        })
    }

    /// Forward one request, failing over as configured.
    pub async fn dispatch(&self, request: ProxyRequest) -> Result<RoutedResponse, ProxyError> {
        let app = request.app_type;
        let settings = self.settings.app(app);
        let timeouts = TierTimeouts::from_app(&settings.proxy);

        if !settings.proxy.auto_failover_enabled {
            return self
                .dispatch_direct(&request, settings.current_provider, &timeouts)
                .await;
        }

        let mut order = self.queues.provider_ids(app);
        if order.is_empty() {
            order.extend(settings.current_provider);
        }
        if order.is_empty() {
            return Err(ProxyError::NoProvider(app));
        }

        let walker = CandidateWalker::new(
            app,
            order,
            &self.health,
            self.catalog.as_ref(),
            settings.proxy.breaker(),
        );
        let mut budget = RetryBudget::new(settings.proxy.max_retries);
        let mut last_error = None;

        for Candidate { provider, admission } in walker {
            if budget.attempts() > 0 {
                tracing::info!(
                    request_id = %request.request_id,
                    app = %app,
                    provider = %provider.id,
                    attempt = budget.attempts() + 1,
                    "Failing over to next provider"
                );
                self.stats.record_failover();
                metrics::record_failover(app);
            }
            budget.begin_attempt();

            match self.attempt(&request, &provider, &timeouts).await {
                Ok(delivered) => {
                    return Ok(self.deliver(delivered, Some(admission), &provider, budget.attempts(), &timeouts, app));
                }
                Err(err) => {
                    tracing::warn!(
                        request_id = %request.request_id,
                        app = %app,
                        provider = %provider.id,
                        probe = admission.is_probe(),
                        error = %err,
                        "Upstream attempt failed"
                    );
                    metrics::record_upstream_failure(app, &provider.id, err.kind());
                    settle_failure(Some(admission), &err);
                    let retry = budget.try_consume(&err);
                    last_error = Some(err);
                    if !retry {
                        break;
                    }
                }
            }
        }

        Err(ProxyError::QueueExhausted {
            app,
            attempts: budget.attempts(),
            last_error,
        })
    }

    /// Single-target mode: one attempt, no breaker involvement.
    async fn dispatch_direct(
        &self,
        request: &ProxyRequest,
        current: Option<String>,
        timeouts: &TierTimeouts,
    ) -> Result<RoutedResponse, ProxyError> {
        let app = request.app_type;
        let provider = current
            .and_then(|id| self.catalog.get(app, &id))
            .ok_or(ProxyError::NoProvider(app))?;

        match self.attempt(request, &provider, timeouts).await {
            Ok(delivered) => Ok(self.deliver(delivered, None, &provider, 1, timeouts, app)),
            Err(err) => {
                tracing::warn!(
                    request_id = %request.request_id,
                    app = %app,
                    provider = %provider.id,
                    error = %err,
                    "Upstream request failed"
                );
                metrics::record_upstream_failure(app, &provider.id, err.kind());
                Err(ProxyError::QueueExhausted {
                    app,
                    attempts: 1,
                    last_error: Some(err),
                })
            }
        }
    }

    async fn attempt(
        &self,
        request: &ProxyRequest,
        provider: &Provider,
        timeouts: &TierTimeouts,
    ) -> Result<Delivered, UpstreamError> {
        let url = provider
            .upstream_url(&request.forward_path)
            .map_err(|e| UpstreamError::Connect(format!("invalid upstream url: {e}")))?;

        let mut headers = upstream_headers(&request.headers);
        provider.apply_credentials(&mut headers);
        if let Ok(id) = HeaderValue::from_str(&request.request_id) {
            headers.insert(X_REQUEST_ID, id);
        }

        tracing::debug!(
            request_id = %request.request_id,
            provider = %provider.id,
            url = %url,
            streaming = request.streaming,
            "Forwarding request"
        );

        let send = self
            .client
            .request(request.method.clone(), url)
            .headers(headers)
            .body(request.body.clone())
            .send();

        let streaming = request.streaming;
        let exchange = async move {
            let response = send.await.map_err(|e| UpstreamError::from_reqwest(&e))?;
            let status = response.status();
            let headers = response.headers().clone();

            if status.is_server_error() {
                let body = response.text().await.unwrap_or_default();
                return Err(UpstreamError::ServerError {
                    status,
                    body: truncate(body),
                });
            }
            if status.is_client_error() {
                let body = response.bytes().await.map_err(|e| UpstreamError::from_reqwest(&e))?;
                return Ok(Delivered::Rejected { status, headers, body });
            }

            if streaming {
                let mut rest: UpstreamStream = response.bytes_stream().boxed();
                let first = match rest.next().await {
                    Some(Ok(chunk)) => Some(chunk),
                    Some(Err(e)) => return Err(UpstreamError::from_reqwest(&e)),
                    None => None,
                };
                Ok(Delivered::Streaming {
                    status,
                    headers,
                    first,
                    rest,
                })
            } else {
                let body = response.bytes().await.map_err(|e| UpstreamError::from_reqwest(&e))?;
                Ok(Delivered::Complete { status, headers, body })
            }
        };

        let tier = if streaming {
            TimeoutTier::StreamingFirstByte
        } else {
            TimeoutTier::NonStreaming
        };
        let limit = timeouts.limit(tier);
        with_deadline(limit, exchange)
            .await
            .map_err(|_| UpstreamError::Timeout {
                tier,
                secs: limit.map(|d| d.as_secs()).unwrap_or_default(),
            })?
    }

    fn deliver(
        &self,
        delivered: Delivered,
        admission: Option<Admission>,
        provider: &Provider,
        attempts: u32,
        timeouts: &TierTimeouts,
        app: AppType,
    ) -> RoutedResponse {
        let respond = |status: StatusCode, headers: HeaderMap, body: ResponseBody| RoutedResponse {
            status,
            headers,
            body,
            provider_id: provider.id.clone(),
            attempts,
        };

        match delivered {
            Delivered::Complete { status, headers, body } => {
                if let Some(admission) = admission {
                    admission.record_success();
                }
                respond(status, headers, ResponseBody::Full(body))
            }
            Delivered::Rejected { status, headers, body } => {
                tracing::debug!(provider = %provider.id, status = %status, "Passing upstream client error through");
                if let Some(admission) = admission {
                    admission.release();
                }
                respond(status, headers, ResponseBody::Full(body))
            }
            Delivered::Streaming {
                status,
                headers,
                first: None,
                ..
            } => {
                if let Some(admission) = admission {
                    admission.record_success();
                }
                respond(status, headers, ResponseBody::Full(Bytes::new()))
            }
            Delivered::Streaming {
                status,
                headers,
                first: Some(first),
                rest,
            } => {
                let guard = StreamGuard {
                    first: Some(first),
                    rest,
                    admission,
                    idle: timeouts.idle,
                    app,
                    provider_id: provider.id.clone(),
                    done: false,
                };
                respond(status, headers, ResponseBody::Stream(guard.into_stream()))
            }
        }
    }
}

/// Streamed body that settles the admission when the stream ends.
///
/// Dropping it early (client went away) releases the admission unrecorded.
struct StreamGuard {
    first: Option<Bytes>,
    rest: UpstreamStream,
    admission: Option<Admission>,
    idle: Option<Duration>,
    app: AppType,
    provider_id: String,
    done: bool,
}

impl StreamGuard {
    fn fail(&mut self, err: &UpstreamError) {
        tracing::warn!(
            app = %self.app,
            provider = %self.provider_id,
            error = %err,
            "Stream aborted mid-flight"
        );
        metrics::record_upstream_failure(self.app, &self.provider_id, err.kind());
        settle_failure(self.admission.take(), err);
        self.done = true;
    }

    fn into_stream(self) -> ByteStream {
        stream::unfold(self, |mut guard| async move {
            if guard.done {
                return None;
            }
            if let Some(chunk) = guard.first.take() {
                return Some((Ok(chunk), guard));
            }
            match next_within(guard.idle, &mut guard.rest).await {
                Ok(Some(Ok(chunk))) => Some((Ok(chunk), guard)),
                Ok(None) => {
                    if let Some(admission) = guard.admission.take() {
                        admission.record_success();
                    }
                    None
                }
                Ok(Some(Err(e))) => {
                    let err = UpstreamError::from_reqwest(&e);
                    guard.fail(&err);
                    Some((Err(err), guard))
                }
                Err(_) => {
                    let err = UpstreamError::Timeout {
                        tier: TimeoutTier::StreamingIdle,
                        secs: guard.idle.map(|d| d.as_secs()).unwrap_or_default(),
                    };
                    guard.fail(&err);
                    Some((Err(err), guard))
                }
            }
        })
        .boxed()
    }
}
