//! Cache key namespace.
//!
//! Keys are plain strings so that pattern invalidation can work on substring
//! containment: the pattern `"submissions"` matches every list-page key and
//! the pattern `"dashboard"` matches both dashboard entries.

use crate::types::{SubmissionId, SubmissionQuery};

/// Full dashboard payload.
pub const DASHBOARD_DATA: &str = "dashboard-data";

/// Auxiliary dashboard counters, prefetched after a refresh.
pub const DASHBOARD_STATS: &str = "dashboard-stats";

/// Pattern matching both dashboard entries.
pub const DASHBOARD_GROUP: &str = "dashboard";

/// Pattern matching every submission list page.
pub const SUBMISSIONS_GROUP: &str = "submissions";

/// Prefix of single-submission keys.
pub const SUBMISSION_DETAIL_PREFIX: &str = "submission-detail";

/// `submissions:<canonical query string>`
pub fn submissions(query: &SubmissionQuery) -> String {
    format!("{}:{}", SUBMISSIONS_GROUP, query.canonical())
}

/// `submission-detail:<id>`
pub fn submission_detail(id: SubmissionId) -> String {
    format!("{}:{}", SUBMISSION_DETAIL_PREFIX, id)
}
