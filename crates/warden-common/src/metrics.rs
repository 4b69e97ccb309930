//! Metrics for the authorization engine
//!
//! Provides OpenTelemetry metrics for:
//! - Authorization decisions
//! - Fact cache watch events
//! - Permission expansion latency and deadline overruns

use once_cell::sync::Lazy;
use opentelemetry::global;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;

static METER: Lazy<Meter> = Lazy::new(|| global::meter("warden"));

// ============================================================================
// Authorization Metrics
// ============================================================================

/// Counter of authorization decisions
///
/// Labels:
/// - `decision`: allow, deny, error
/// - `verb`: get, list, watch, create, update, patch, delete, deletecollection
pub static AUTHZ_DECISIONS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("warden_authz_decisions_total")
        .with_description("Total number of authorization decisions")
        .with_unit("{decisions}")
        .build()
});

/// Histogram of permission expansion duration
pub static EXPAND_DURATION: Lazy<Histogram<f64>> = Lazy::new(|| {
    METER
        .f64_histogram("warden_expand_duration_seconds")
        .with_description("Duration of permission expansion in seconds")
        .with_unit("s")
        .build()
});

/// Counter of expansions cut short by deadline or cancellation
///
/// Labels:
/// - `reason`: deadline, cancelled
pub static EXPAND_INTERRUPTED: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("warden_expand_interrupted_total")
        .with_description("Expansions that returned partial results")
        .with_unit("{expansions}")
        .build()
});

// ============================================================================
// Cache Metrics
// ============================================================================

/// Counter of watch events applied to fact caches
///
/// Labels:
/// - `kind`: User, UserBinding, ClusterRole
/// - `event`: apply, delete, relist
/// - `result`: ok, skipped
pub static CACHE_EVENTS: Lazy<Counter<u64>> = Lazy::new(|| {
    METER
        .u64_counter("warden_cache_events_total")
        .with_description("Total number of watch events applied to fact caches")
        .with_unit("{events}")
        .build()
});

// ============================================================================
// Helper Types
// ============================================================================

/// Labels for authorization decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthDecision {
    /// Request was allowed
    Allow,
    /// Request was denied
    Deny,
    /// Resolution failed before a decision was reached
    Error,
}

impl AuthDecision {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Error => "error",
        }
    }
}

/// Labels for the outcome of applying a watch event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOutcome {
    /// Event applied
    Ok,
    /// Event could not be converted and was skipped
    Skipped,
}

impl EventOutcome {
    /// Convert to label value
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Skipped => "skipped",
        }
    }
}

/// Record an authorization decision
pub fn record_decision(decision: AuthDecision, verb: &str) {
    AUTHZ_DECISIONS.add(
        1,
        &[
            KeyValue::new("decision", decision.as_str()),
            KeyValue::new("verb", verb.to_string()),
        ],
    );
}

/// Record a watch event applied to a cache
pub fn record_cache_event(kind: &'static str, event: &'static str, outcome: EventOutcome) {
    CACHE_EVENTS.add(
        1,
        &[
            KeyValue::new("kind", kind),
            KeyValue::new("event", event),
            KeyValue::new("result", outcome.as_str()),
        ],
    );
}

/// Record how long an expansion took
pub fn record_expand_duration(seconds: f64) {
    EXPAND_DURATION.record(seconds, &[]);
}

/// Record an expansion that returned partial results
pub fn record_expand_interrupted(reason: &'static str) {
    EXPAND_INTERRUPTED.add(1, &[KeyValue::new("reason", reason)]);
}
