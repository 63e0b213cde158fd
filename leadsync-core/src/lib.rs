//! leadsync core - wire types and collaborator contracts.
//!
//! Shared by the cache, the client and the test utilities:
//! - submission domain types and the cache key namespace
//! - [`NotificationEvent`] and the poll/push line framing
//! - the [`SessionGateway`] and [`PushTransport`] seams

pub mod error;
pub mod event;
pub mod framing;
pub mod gateway;
pub mod keys;
pub mod transport;
pub mod types;

pub use error::{GatewayError, GatewayResult, TransportError};
pub use event::NotificationEvent;
pub use framing::{format_cursor, parse_event_stream, parse_push_payload, CURSOR_PARAM};
pub use gateway::{GatewayResponse, Method, RequestOptions, SessionGateway};
pub use transport::{PushStream, PushTransport};
pub use types::{DashboardStats, Submission, SubmissionId, SubmissionQuery, SubmissionStatus};
