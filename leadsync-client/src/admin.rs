//! Admin API operations over the cached read path.
//!
//! Reads go through the [`CachedLoader`], so a live entry answers without a
//! request and concurrent misses for one key share a single fetch. Writes
//! go straight to the gateway and, on success, invalidate every cache entry
//! that may now show stale data.

use std::sync::Arc;

use leadsync_cache::{CachedLoader, Invalidation};
use leadsync_core::{
    keys, DashboardStats, GatewayError, GatewayResult, RequestOptions, SessionGateway, Submission,
    SubmissionId, SubmissionQuery, SubmissionStatus,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

/// Cached reads store the raw JSON payload.
pub type DataLoader = CachedLoader<Value, GatewayError>;

/// Admin endpoint paths.
pub mod paths {
    pub const DASHBOARD: &str = "/api/admin/dashboard";
    pub const STATS: &str = "/api/admin/stats";
    pub const SUBMISSIONS: &str = "/api/admin/submissions";
    pub const POLL: &str = "/api/admin/notifications/poll";

    pub fn submission(id: leadsync_core::SubmissionId) -> String {
        format!("{}/{}", SUBMISSIONS, id)
    }

    pub fn submission_status(id: leadsync_core::SubmissionId) -> String {
        format!("{}/{}/status", SUBMISSIONS, id)
    }

    pub fn submission_respond(id: leadsync_core::SubmissionId) -> String {
        format!("{}/{}/respond", SUBMISSIONS, id)
    }
}

/// One page of the submission list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionPage {
    #[serde(default)]
    pub submissions: Vec<Submission>,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub page: u32,
    #[serde(default)]
    pub total_pages: u32,
}

pub struct AdminApi {
    gateway: Arc<dyn SessionGateway>,
    loader: DataLoader,
}

impl AdminApi {
    pub fn new(gateway: Arc<dyn SessionGateway>, loader: DataLoader) -> Self {
        Self { gateway, loader }
    }

    pub fn loader(&self) -> &DataLoader {
        &self.loader
    }

    pub fn gateway(&self) -> &Arc<dyn SessionGateway> {
        &self.gateway
    }

    /// Full dashboard payload, kept opaque.
    pub async fn dashboard(&self) -> GatewayResult<Value> {
        self.cached_get(keys::DASHBOARD_DATA, paths::DASHBOARD, RequestOptions::get())
            .await
    }

    pub async fn stats(&self) -> GatewayResult<DashboardStats> {
        let value = self
            .cached_get(keys::DASHBOARD_STATS, paths::STATS, RequestOptions::get())
            .await?;
        decode(value)
    }

    pub async fn list_submissions(&self, query: &SubmissionQuery) -> GatewayResult<SubmissionPage> {
        let options = query
            .to_pairs()
            .into_iter()
            .fold(RequestOptions::get(), |options, (key, value)| {
                options.with_query(key, value)
            });
        let value = self
            .cached_get(&keys::submissions(query), paths::SUBMISSIONS, options)
            .await?;
        decode(value)
    }

    pub async fn submission_detail(&self, id: SubmissionId) -> GatewayResult<Submission> {
        let value = self
            .cached_get(
                &keys::submission_detail(id),
                &paths::submission(id),
                RequestOptions::get(),
            )
            .await?;
        decode(value)
    }

    pub async fn update_status(
        &self,
        id: SubmissionId,
        status: SubmissionStatus,
    ) -> GatewayResult<()> {
        self.gateway
            .request(
                &paths::submission_status(id),
                RequestOptions::patch(json!({ "status": status })),
            )
            .await?
            .error_for_status()?;
        info!(submission_id = %id, status = %status, "Submission status updated");
        self.invalidate_after_write(id);
        Ok(())
    }

    pub async fn send_response(&self, id: SubmissionId, message: &str) -> GatewayResult<()> {
        self.gateway
            .request(
                &paths::submission_respond(id),
                RequestOptions::post(json!({ "message": message })),
            )
            .await?
            .error_for_status()?;
        info!(submission_id = %id, "Response sent");
        self.invalidate_after_write(id);
        Ok(())
    }

    /// Drop the cached detail for `id` and every list page.
    pub fn invalidate_submission(&self, id: SubmissionId) -> usize {
        self.loader.invalidate_key(&keys::submission_detail(id))
            + self.loader.invalidate_pattern(keys::SUBMISSIONS_GROUP)
    }

    /// Drop both cache groups a full refresh replaces.
    pub fn invalidate_groups(&self) -> usize {
        self.loader.invalidate(&Invalidation::pattern(keys::DASHBOARD_GROUP))
            + self.loader.invalidate(&Invalidation::pattern(keys::SUBMISSIONS_GROUP))
    }

    fn invalidate_after_write(&self, id: SubmissionId) {
        let removed = self.invalidate_submission(id)
            + self.loader.invalidate_pattern(keys::DASHBOARD_GROUP);
        debug!(submission_id = %id, removed, "Invalidated after write");
    }

    async fn cached_get(
        &self,
        key: &str,
        path: &str,
        options: RequestOptions,
    ) -> GatewayResult<Value> {
        let gateway = Arc::clone(&self.gateway);
        let path = path.to_string();
        self.loader
            .load(key, move || async move {
                gateway.request(&path, options).await?.error_for_status()?.json()
            })
            .await
    }
}

fn decode<T: DeserializeOwned>(value: Value) -> GatewayResult<T> {
    Ok(serde_json::from_value(value)?)
}
