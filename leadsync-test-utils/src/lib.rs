//! leadsync Test Utilities
//!
//! Centralized test infrastructure for the leadsync workspace:
//! - Scripted mock gateway and push transport
//! - Proptest generators for wire types
//! - Test fixtures for common scenarios

pub mod gateway;
pub mod transport;

pub use gateway::{MockGateway, RecordedRequest};
pub use transport::{ConnectScript, MockPushTransport, PushHandle};

// Re-export core types for convenience
pub use leadsync_core::{
    DashboardStats, GatewayError, GatewayResponse, GatewayResult, Method, NotificationEvent,
    RequestOptions, SessionGateway, Submission, SubmissionId, SubmissionQuery, SubmissionStatus,
    TransportError,
};

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating leadsync wire types.

    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use proptest::prelude::*;

    /// Generate a SubmissionId.
    pub fn arb_submission_id() -> impl Strategy<Value = SubmissionId> {
        (1u64..100_000).prop_map(SubmissionId)
    }

    /// Generate any SubmissionStatus.
    pub fn arb_status() -> impl Strategy<Value = SubmissionStatus> {
        prop::sample::select(SubmissionStatus::ALL.to_vec())
    }

    /// Generate a UTC timestamp with millisecond precision in 2020..2030.
    pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (1_577_836_800_000i64..1_893_456_000_000i64).prop_map(|millis| {
            Utc.timestamp_millis_opt(millis)
                .single()
                .unwrap_or_else(Utc::now)
        })
    }

    /// Generate a submission.
    pub fn arb_submission() -> impl Strategy<Value = Submission> {
        (arb_submission_id(), "[A-Z][a-z]{2,10}", arb_status(), arb_timestamp()).prop_map(
            |(id, name, status, created_at)| Submission {
                id,
                email: format!("{}@example.com", name.to_lowercase()),
                name,
                phone: None,
                service: None,
                message: "Please call me back".to_string(),
                status,
                created_at,
                responded_at: None,
            },
        )
    }

    /// Generate any notification event.
    pub fn arb_event() -> impl Strategy<Value = NotificationEvent> {
        prop_oneof![
            prop::collection::vec(arb_submission(), 0..3)
                .prop_map(|items| NotificationEvent::NewItems { items }),
            arb_timestamp().prop_map(|timestamp| NotificationEvent::Heartbeat { timestamp }),
            (arb_submission_id(), arb_status())
                .prop_map(|(id, new_status)| NotificationEvent::StatusChanged { id, new_status }),
            arb_submission_id().prop_map(|id| NotificationEvent::ResponseSent { id }),
        ]
    }

    /// Generate a cache key from the conventional namespace.
    pub fn arb_cache_key() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("dashboard-data".to_string()),
            Just("dashboard-stats".to_string()),
            (1u32..20).prop_map(|page| format!("submissions:page={}", page)),
            (arb_status(), 1u32..5)
                .prop_map(|(status, page)| format!("submissions:page={}&status={}", page, status)),
            arb_submission_id().prop_map(|id| format!("submission-detail:{}", id)),
        ]
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built test fixtures for common testing scenarios.

    use super::*;
    use chrono::{DateTime, TimeZone, Utc};
    use serde_json::{json, Value};

    /// Fixed reference time used by fixtures.
    pub fn reference_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0)
            .single()
            .unwrap_or_else(Utc::now)
    }

    /// A new submission with the given id.
    pub fn submission(id: u64) -> Submission {
        Submission {
            id: SubmissionId(id),
            name: "Jordan Smith".to_string(),
            email: "jordan@example.com".to_string(),
            phone: Some("555-0100".to_string()),
            service: Some("Landscaping".to_string()),
            message: "Looking for a quote".to_string(),
            status: SubmissionStatus::New,
            created_at: reference_time(),
            responded_at: None,
        }
    }

    /// Dashboard payload with `new` unread submissions.
    pub fn dashboard_json(new: u64) -> Value {
        json!({ "stats": { "new": new } })
    }

    /// Render events as a polling body (`data: <json>` per line).
    pub fn poll_body(events: &[NotificationEvent]) -> String {
        events
            .iter()
            .map(|event| format!("data: {}", event_record(event)))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render events as a newline-delimited push payload.
    pub fn push_payload(events: &[NotificationEvent]) -> String {
        events
            .iter()
            .map(event_record)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// JSON record for one event.
    pub fn event_record(event: &NotificationEvent) -> String {
        serde_json::to_string(event).unwrap_or_default()
    }

    pub fn heartbeat(at: DateTime<Utc>) -> NotificationEvent {
        NotificationEvent::Heartbeat { timestamp: at }
    }

    pub fn status_changed(id: u64, status: SubmissionStatus) -> NotificationEvent {
        NotificationEvent::StatusChanged {
            id: SubmissionId(id),
            new_status: status,
        }
    }

    pub fn new_items(ids: &[u64]) -> NotificationEvent {
        NotificationEvent::NewItems {
            items: ids.iter().copied().map(submission).collect(),
        }
    }
}
