//! Line framing for notification payloads.
//!
//! The polling endpoint answers with server-sent-event text (`data: <json>`
//! lines) over a plain request, and the push transport delivers
//! newline-delimited JSON. Both are decoded here, one record per line.

use crate::event::NotificationEvent;
use chrono::{DateTime, SecondsFormat, Utc};

/// Prefix that marks an event record in the polling body.
pub const DATA_PREFIX: &str = "data:";

/// Query parameter carrying the freshness cursor.
pub const CURSOR_PARAM: &str = "lastCheck";

/// Parse a polling response body.
///
/// Only lines starting with `data:` are considered; everything else (SSE
/// comments, `event:` lines, blanks) is ignored. Records that fail to decode
/// are skipped so one bad record cannot hide the rest.
pub fn parse_event_stream(body: &str) -> Vec<NotificationEvent> {
    body.lines()
        .filter_map(|line| strip_data_prefix(line.trim_end_matches('\r')))
        .filter_map(decode_record)
        .collect()
}

/// Parse a push transport payload.
///
/// Every non-blank line is a JSON record. A leading `data:` is tolerated so
/// that servers reusing the SSE writer for the push feed still work.
pub fn parse_push_payload(payload: &str) -> Vec<NotificationEvent> {
    payload
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .map(|line| strip_data_prefix(line).unwrap_or(line))
        .filter_map(decode_record)
        .collect()
}

/// Render a cursor the way the server expects it in `lastCheck`.
pub fn format_cursor(cursor: DateTime<Utc>) -> String {
    cursor.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn strip_data_prefix(line: &str) -> Option<&str> {
    let rest = line.strip_prefix(DATA_PREFIX)?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

fn decode_record(raw: &str) -> Option<NotificationEvent> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    match serde_json::from_str::<NotificationEvent>(raw) {
        Ok(event) => Some(event),
        Err(err) => {
            tracing::debug!(error = %err, record = raw, "Skipping undecodable notification record");
            None
        }
    }
}
