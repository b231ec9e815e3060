//! View functions behind the JSON surface.
//!
//! Each function does the filtering, validation, and shaping for one endpoint
//! and returns a serializable response (or an [`ErrorBody`] the host maps to
//! the right status code). No transport here — the host owns routing and
//! status codes.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::api::types::{
    AlertsOverviewResponse, ApiError, CircuitOpenDetails, CreateRuleBody, DeleteRulesResponse,
    ErrorBody, EventResponse, HistoryResponse, MetricsResponse, ResetResponse, ResponseMetadata,
    RuleResponse, RuleWithEvents, ERR_CIRCUIT_OPEN, ERR_INVALID_DATE_RANGE, ERR_NOT_FOUND,
};
use crate::breaker::CircuitBreaker;
use crate::hub::DiagnosticsHub;
use crate::metrics::alerts::{AlertSeverity, AlertStore, EventQuery, RuleUpdate};
use crate::metrics::history::MetricsSample;

/// How many recent events are embedded per rule in the alerts overview.
const RECENT_EVENTS_PER_RULE: usize = 5;

/// Default page size for history pagination.
const DEFAULT_PER_PAGE: usize = 50;

fn metadata(timestamp: DateTime<Utc>) -> ResponseMetadata {
    ResponseMetadata::new(timestamp)
}

// ---------------------------------------------------------------------------
// GET /metrics/resilience
// ---------------------------------------------------------------------------

/// Query for the current-metrics endpoint. The filters narrow the per-tool
/// breakdown; the global snapshot is always returned as `data`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsQuery {
    /// Keep only tools that have entered this state (`open`, `halfopen`,
    /// `closed`). Unrecognized values are ignored.
    pub state: Option<String>,
    /// Keep only tools with at least this many retry attempts.
    pub min_retry_attempts: Option<u64>,
}

pub fn resilience_metrics(hub: &DiagnosticsHub, query: &MetricsQuery) -> MetricsResponse {
    let data = hub.peek();
    let state = query
        .state
        .as_deref()
        .map(|s| s.trim().to_lowercase());

    let tools = hub
        .tool_snapshots()
        .into_iter()
        .filter(|(_, snap)| match state.as_deref() {
            Some("open") => snap.open_count > 0,
            Some("halfopen") | Some("half-open") => snap.half_open_count > 0,
            Some("closed") => snap.closed_count > 0,
            _ => true,
        })
        .filter(|(_, snap)| {
            query
                .min_retry_attempts
                .map(|min| snap.retry_attempts >= min)
                .unwrap_or(true)
        })
        .collect();

    MetricsResponse {
        metadata: metadata(hub.clock().wall()),
        data,
        tools,
    }
}

// ---------------------------------------------------------------------------
// GET /metrics/resilience/history
// ---------------------------------------------------------------------------

/// Query for the history endpoint. An explicit `start`/`end` range wins over
/// `minutes`; `bucketMinutes` down-samples before pagination.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub minutes: Option<i64>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
    pub bucket_minutes: Option<i64>,
}

pub fn resilience_history(
    hub: &DiagnosticsHub,
    query: &HistoryQuery,
) -> Result<HistoryResponse, ErrorBody> {
    if let (Some(start), Some(end)) = (query.start, query.end) {
        if start > end {
            return Err(ApiError::new(
                ERR_INVALID_DATE_RANGE,
                format!("start {} is after end {}", start, end),
            )
            .into());
        }
    }

    let now = hub.clock().wall();
    let mut items: Vec<MetricsSample> = hub.history().snapshot(None, None);

    if query.start.is_some() || query.end.is_some() {
        items.retain(|s| {
            query.start.map(|t| s.timestamp >= t).unwrap_or(true)
                && query.end.map(|t| s.timestamp <= t).unwrap_or(true)
        });
    } else if let Some(minutes) = query.minutes {
        let cutoff = now - chrono::Duration::minutes(minutes.max(0));
        items.retain(|s| s.timestamp >= cutoff);
    }

    if let Some(bucket) = query.bucket_minutes {
        items = bucketize(items, bucket.max(1));
    }

    if let Some(limit) = query.limit {
        if items.len() > limit {
            items.drain(..items.len() - limit);
        }
    }

    let total = items.len();
    let per_page = query.per_page.unwrap_or(DEFAULT_PER_PAGE).max(1);
    let page = query.page.unwrap_or(1).max(1);
    let start_idx = (page - 1).saturating_mul(per_page).min(total);
    let end_idx = (start_idx + per_page).min(total);
    let items = items[start_idx..end_idx].to_vec();

    Ok(HistoryResponse {
        metadata: metadata(now),
        total,
        page,
        per_page,
        items,
    })
}

/// Down-sample to one entry per bucket, keeping the last sample of each
/// bucket (counters are cumulative, so the last value is the bucket's total).
fn bucketize(items: Vec<MetricsSample>, bucket_minutes: i64) -> Vec<MetricsSample> {
    let bucket_secs = bucket_minutes * 60;
    let mut out: Vec<MetricsSample> = Vec::new();
    let mut current_bucket: Option<i64> = None;
    for sample in items {
        let key = sample.timestamp.timestamp().div_euclid(bucket_secs);
        if current_bucket == Some(key) {
            *out.last_mut().unwrap() = sample;
        } else {
            current_bucket = Some(key);
            out.push(sample);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// PUT|POST /metrics/resilience/reset
// ---------------------------------------------------------------------------

pub fn reset_metrics(hub: &DiagnosticsHub) -> ResetResponse {
    hub.reset();
    let now = hub.clock().wall();
    ResetResponse {
        metadata: metadata(now),
        ok: true,
        reset_at: now,
    }
}

// ---------------------------------------------------------------------------
// Alerts
// ---------------------------------------------------------------------------

pub fn create_rule(alerts: &AlertStore, body: &CreateRuleBody) -> RuleResponse {
    let rule = alerts.add_rule(
        body.name.clone(),
        body.open_threshold,
        body.retry_threshold,
        body.window_minutes,
        body.severity.as_deref(),
    );
    RuleResponse {
        metadata: metadata(Utc::now()),
        rule,
    }
}

pub fn patch_rule(
    alerts: &AlertStore,
    rule_id: &str,
    update: &RuleUpdate,
) -> Result<RuleResponse, ErrorBody> {
    match alerts.update_rule(rule_id, update) {
        Some(rule) => Ok(RuleResponse {
            metadata: metadata(Utc::now()),
            rule,
        }),
        None => Err(ApiError::new(ERR_NOT_FOUND, format!("unknown rule {}", rule_id)).into()),
    }
}

/// Query for the alerts overview endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertsQuery {
    pub severity: Option<String>,
    pub include_acknowledged: Option<bool>,
    pub limit: Option<usize>,
}

pub fn alerts_overview(alerts: &AlertStore, query: &AlertsQuery) -> AlertsOverviewResponse {
    let rules = alerts
        .list_rules()
        .into_iter()
        .map(|rule| {
            let recent_events = alerts.list_events(&EventQuery {
                limit: Some(RECENT_EVENTS_PER_RULE),
                include_acknowledged: true,
                rule_id: Some(rule.id.clone()),
                severity: None,
            });
            RuleWithEvents {
                rule,
                recent_events,
            }
        })
        .collect();

    let events = alerts.list_events(&EventQuery {
        limit: query.limit,
        severity: query.severity.as_deref().and_then(AlertSeverity::parse),
        include_acknowledged: query.include_acknowledged.unwrap_or(false),
        rule_id: None,
    });

    AlertsOverviewResponse {
        metadata: metadata(Utc::now()),
        rules,
        events,
    }
}

pub fn acknowledge_event(alerts: &AlertStore, event_id: &str) -> Result<EventResponse, ErrorBody> {
    match alerts.acknowledge(event_id) {
        Some(event) => Ok(EventResponse {
            metadata: metadata(Utc::now()),
            event,
        }),
        None => Err(ApiError::new(ERR_NOT_FOUND, format!("unknown event {}", event_id)).into()),
    }
}

pub fn delete_rules(alerts: &AlertStore, rule_id: Option<&str>) -> DeleteRulesResponse {
    let (ok, removed) = match rule_id {
        Some(id) => {
            let removed = alerts.remove_rule(id);
            (removed, usize::from(removed))
        }
        None => (true, alerts.clear_rules()),
    };
    DeleteRulesResponse {
        metadata: metadata(Utc::now()),
        ok,
        removed,
        rule_id: rule_id.map(|s| s.to_string()),
    }
}

// ---------------------------------------------------------------------------
// Circuit-open rejection
// ---------------------------------------------------------------------------

/// Body for a guarded call rejected by an open circuit. The host returns it
/// with HTTP 503.
pub fn circuit_open_rejection(breaker: &CircuitBreaker, endpoint: &str) -> ErrorBody {
    let retry_after = breaker
        .remaining_cooldown()
        .map(|d| {
            let secs = d.as_secs();
            if d.subsec_nanos() > 0 {
                secs + 1
            } else {
                secs
            }
        })
        .unwrap_or(0);
    let details = CircuitOpenDetails {
        retry_after_seconds: retry_after,
        circuit_state: breaker.state().to_string(),
        endpoint: endpoint.to_string(),
    };
    ApiError::new(
        ERR_CIRCUIT_OPEN,
        format!("circuit for {} is {}", endpoint, breaker.state()),
    )
    .with_details(serde_json::to_value(&details).unwrap_or(serde_json::Value::Null))
    .into()
}
