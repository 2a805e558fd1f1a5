//! Request-gating middleware.
//!
//! Two guard variants wrap an inner handler behind a rate limit check:
//! [`RateLimitGuard`] binds a single policy, [`MethodRateLimitGuard`]
//! selects a policy by HTTP method. Both are wired into a router with
//! `axum::middleware::from_fn_with_state` and the [`rate_limit`] /
//! [`rate_limit_by_method`] entry points.
//!
//! The guards are a pre-condition gate, not an error boundary: a denied
//! request short-circuits with a 429 and never reaches the inner handler,
//! while failures from an admitted handler propagate unchanged.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::RETRY_AFTER;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::audit::{AuditSink, Incident, IncidentKind};
use crate::ratelimit::{client_identity, unix_now_ms, Decision, RateLimitPolicy, RateLimiter};

/// Quota headers set on every gated response, admitted or denied.
pub const HEADER_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const HEADER_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const HEADER_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

/// Body message returned with a 429.
const THROTTLE_MESSAGE: &str = "Too many requests, please try again later.";

/// Gate wrapping handlers behind a single rate limit policy.
///
/// The bucket key is `identity:endpoint`, where the endpoint identifier
/// defaults to the request path unless bound with [`with_endpoint`].
/// Leaving it defaulted means dynamic path segments (`/item/1` vs
/// `/item/2`) count as separate endpoints and fragment the quota.
///
/// [`with_endpoint`]: RateLimitGuard::with_endpoint
#[derive(Clone)]
pub struct RateLimitGuard {
    limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
    policy: RateLimitPolicy,
    endpoint: Option<String>,
}

impl RateLimitGuard {
    /// Create a guard applying one policy.
    pub fn new(
        limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditSink>,
        policy: RateLimitPolicy,
    ) -> Self {
        Self {
            limiter,
            audit,
            policy,
            endpoint: None,
        }
    }

    /// Bind an explicit endpoint identifier instead of the request path.
    ///
    /// Useful when several routes share one quota, or when one code path
    /// serves dynamic URLs that should count as a single endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Run the gate: deny with a 429 or admit and invoke the inner handler.
    pub async fn handle(&self, request: Request, next: Next) -> Response {
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| request.uri().path().to_string());

        gate(
            &self.limiter,
            &self.audit,
            &self.policy,
            &endpoint,
            request,
            next,
        )
        .await
    }
}

/// Gate selecting its policy by HTTP method.
///
/// Methods without an explicit entry fall back to the default policy.
#[derive(Clone)]
pub struct MethodRateLimitGuard {
    limiter: Arc<RateLimiter>,
    audit: Arc<dyn AuditSink>,
    methods: HashMap<String, RateLimitPolicy>,
    default_policy: RateLimitPolicy,
    endpoint: Option<String>,
}

impl MethodRateLimitGuard {
    /// Create a guard with a default policy and no per-method entries.
    pub fn new(
        limiter: Arc<RateLimiter>,
        audit: Arc<dyn AuditSink>,
        default_policy: RateLimitPolicy,
    ) -> Self {
        Self {
            limiter,
            audit,
            methods: HashMap::new(),
            default_policy,
            endpoint: None,
        }
    }

    /// Bind a policy to an HTTP method.
    pub fn method(mut self, method: Method, policy: RateLimitPolicy) -> Self {
        self.methods
            .insert(method.as_str().to_ascii_uppercase(), policy);
        self
    }

    /// Bind an explicit endpoint identifier instead of the request path.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    fn policy_for(&self, method: &Method) -> RateLimitPolicy {
        self.methods
            .get(&method.as_str().to_ascii_uppercase())
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Run the gate: deny with a 429 or admit and invoke the inner handler.
    pub async fn handle(&self, request: Request, next: Next) -> Response {
        let policy = self.policy_for(request.method());
        let endpoint = self
            .endpoint
            .clone()
            .unwrap_or_else(|| request.uri().path().to_string());

        gate(&self.limiter, &self.audit, &policy, &endpoint, request, next).await
    }
}

/// Middleware entry point for [`RateLimitGuard`].
pub async fn rate_limit(
    State(guard): State<RateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    guard.handle(request, next).await
}

/// Middleware entry point for [`MethodRateLimitGuard`].
pub async fn rate_limit_by_method(
    State(guard): State<MethodRateLimitGuard>,
    request: Request,
    next: Next,
) -> Response {
    guard.handle(request, next).await
}

/// Shared admit/deny path for both guard variants.
async fn gate(
    limiter: &RateLimiter,
    audit: &Arc<dyn AuditSink>,
    policy: &RateLimitPolicy,
    endpoint: &str,
    request: Request,
    next: Next,
) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let identity = client_identity(request.headers(), peer);
    let key = format!("{identity}:{endpoint}");

    let now_ms = unix_now_ms();
    let decision = limiter.check_at(&key, policy, now_ms);

    if decision.allowed {
        let mut response = next.run(request).await;
        apply_quota_headers(response.headers_mut(), &decision);
        return response;
    }

    let retry_after = decision.retry_after_secs(now_ms);

    let incident = Incident::new(
        IncidentKind::RateLimitExceeded,
        &identity,
        endpoint,
        json!({
            "limit": policy.limit,
            "window_ms": policy.window_ms,
            "retry_after_secs": retry_after,
        }),
    );
    audit.log_incident(&incident).await;

    let body = Json(json!({
        "error": THROTTLE_MESSAGE,
        "retryAfter": retry_after,
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    apply_quota_headers(response.headers_mut(), &decision);
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(retry_after));
    response
}

fn apply_quota_headers(headers: &mut HeaderMap, decision: &Decision) {
    headers.insert(HEADER_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(HEADER_REMAINING, HeaderValue::from(decision.remaining));
    headers.insert(HEADER_RESET, HeaderValue::from(decision.reset_secs()));
}
