// Per-request admission: identity, then gate, then rate rules
use axum::{
    extract::{ConnectInfo, MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::config::{Policy, RouteRateSpec};
use crate::error::AdmissionError;
use crate::gate::AuthGate;
use crate::identity::{API_KEY_HEADER, Identity, IdentityResolver};
use crate::metrics::{
    ADMISSION_LATENCY, ADMITTED_TOTAL, RATE_LIMITED_TOTAL, REQUEST_TOTAL, UNAUTHORIZED_TOTAL,
};
use crate::rate_limit::{AdmitDecision, RateLimitRegistry, RateRule};
use crate::state::AppState;

// Origin used when the server runs without connect info
pub const UNKNOWN_ORIGIN: &str = "unknown";

/// What the HTTP layer hands to the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct AdmissionRequest<'a> {
    pub route: &'a str,
    pub credential: Option<&'a str>,
    pub source: &'a str,
}

/// Handed to business handlers once a request is admitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub identity: Identity,
}

pub struct AdmissionMiddleware {
    resolver: IdentityResolver,
    gate: AuthGate,
    route_rules: RouteRateSpec,
    registry: RateLimitRegistry,
}

impl AdmissionMiddleware {
    pub fn new(resolver: IdentityResolver, gate: AuthGate, route_rules: RouteRateSpec) -> Self {
        Self {
            resolver,
            gate,
            route_rules,
            registry: RateLimitRegistry::new(),
        }
    }

    pub fn from_policy(policy: Policy) -> Self {
        Self::new(
            IdentityResolver::new(Arc::new(policy.credentials)),
            policy.gate,
            policy.route_rules,
        )
    }

    pub fn admit(&self, request: &AdmissionRequest<'_>) -> Result<RequestContext, AdmissionError> {
        self.admit_at(request, Instant::now())
    }

    // Unknown routes are neither gated nor limited
    pub fn admit_at(
        &self,
        request: &AdmissionRequest<'_>,
        now: Instant,
    ) -> Result<RequestContext, AdmissionError> {
        let identity = self.resolver.resolve(request.credential, request.source);

        self.gate.check(request.route, &identity)?;

        let rules = self.route_rules.rules_for(request.route);
        if !rules.is_empty() {
            if let AdmitDecision::Denied { retry_after } =
                self.registry.admit_all(&identity, rules, now)
            {
                return Err(AdmissionError::RateLimited { retry_after });
            }
        }

        Ok(RequestContext { identity })
    }

    pub fn rules_for(&self, route: &str) -> &[RateRule] {
        self.route_rules.rules_for(route)
    }

    #[cfg(test)]
    pub(crate) fn usage(&self, identity: &Identity, rule: &RateRule, now: Instant) -> u32 {
        self.registry.count(identity, rule, now)
    }

    pub fn tracked_counters(&self) -> usize {
        self.registry.tracked()
    }

    pub fn prune_idle(&self, now: Instant) -> usize {
        self.registry.prune_idle(now)
    }
}

// Install with `route_layer` so the matched route path is available
pub async fn enforce(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Response {
    REQUEST_TOTAL.inc();

    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let source = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_ORIGIN.to_string());
    let credential = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    let started = Instant::now();
    let outcome = state.admission.admit(&AdmissionRequest {
        route: &route,
        credential,
        source: &source,
    });
    ADMISSION_LATENCY.observe(started.elapsed().as_secs_f64());

    match outcome {
        Ok(context) => {
            ADMITTED_TOTAL.inc();
            debug!(
                route = %route,
                identity = %context.identity,
                owner = context.identity.owner().unwrap_or("anonymous"),
                "request admitted"
            );
            request.extensions_mut().insert(context);
            next.run(request).await
        }
        Err(err) => {
            match &err {
                AdmissionError::Unauthorized(_) => UNAUTHORIZED_TOTAL.inc(),
                AdmissionError::RateLimited { .. } => RATE_LIMITED_TOTAL.inc(),
            }
            debug!(route = %route, source = %source, error = %err, "request rejected");
            err.into_response()
        }
    }
}
