//! Wire types for the JSON-over-HTTP surface.
//!
//! The HTTP host (and the CLI, which reuses the same shapes) lives outside
//! this crate; these are the request/response contracts it mounts. Transport
//! concerns — routing, status codes, content negotiation — stay with the
//! host. Every response carries a `metadata` envelope with a request id and
//! timestamp.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::metrics::alerts::{AlertEvent, AlertRule};
use crate::metrics::history::MetricsSample;
use crate::metrics::store::CircuitMetricsSnapshot;

/// Per-response envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
}

impl ResponseMetadata {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string()[..8].to_string(),
            timestamp,
        }
    }
}

/// Machine-readable error codes.
pub const ERR_INVALID_DATE_RANGE: &str = "invalid_date_range";
pub const ERR_CIRCUIT_OPEN: &str = "circuit_open";
pub const ERR_NOT_FOUND: &str = "not_found";

/// Error payload, wrapped as `{"error": {...}}` on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

/// `{"error": {...}}` wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ApiError,
}

impl From<ApiError> for ErrorBody {
    fn from(error: ApiError) -> Self {
        Self { error }
    }
}

/// Details for a call rejected by an open circuit (HTTP 503 at the host).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitOpenDetails {
    pub retry_after_seconds: u64,
    pub circuit_state: String,
    pub endpoint: String,
}

// ---------------------------------------------------------------------------
// Responses
// ---------------------------------------------------------------------------

/// `GET /metrics/resilience`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub metadata: ResponseMetadata,
    pub data: CircuitMetricsSnapshot,
    /// Per-tool breakdown, narrowed by the query filters.
    pub tools: BTreeMap<String, CircuitMetricsSnapshot>,
}

/// `GET /metrics/resilience/history`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub metadata: ResponseMetadata,
    pub total: usize,
    pub page: usize,
    pub per_page: usize,
    pub items: Vec<MetricsSample>,
}

/// `PUT|POST /metrics/resilience/reset`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub metadata: ResponseMetadata,
    pub ok: bool,
    pub reset_at: DateTime<Utc>,
}

/// `POST /alerts` body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRuleBody {
    pub name: Option<String>,
    #[serde(default)]
    pub open_threshold: i64,
    #[serde(default)]
    pub retry_threshold: i64,
    #[serde(default = "default_window_minutes")]
    pub window_minutes: i64,
    pub severity: Option<String>,
}

fn default_window_minutes() -> i64 {
    5
}

/// `POST /alerts` / `PATCH /alerts/{ruleId}` response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleResponse {
    pub metadata: ResponseMetadata,
    pub rule: AlertRule,
}

/// A rule together with its most recent events.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleWithEvents {
    #[serde(flatten)]
    pub rule: AlertRule,
    pub recent_events: Vec<AlertEvent>,
}

/// `GET /alerts`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsOverviewResponse {
    pub metadata: ResponseMetadata,
    pub rules: Vec<RuleWithEvents>,
    pub events: Vec<AlertEvent>,
}

/// `PATCH /alerts/events/{eventId}`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventResponse {
    pub metadata: ResponseMetadata,
    pub event: AlertEvent,
}

/// `DELETE /alerts`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRulesResponse {
    pub metadata: ResponseMetadata,
    pub ok: bool,
    pub removed: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
}
