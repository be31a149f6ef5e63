//! HTTP implementation of the source paging capability.
//!
//! Speaks the remote service's paginated log-read endpoint. Credential
//! acquisition stays a boundary concern: the session token comes
//! pre-provisioned from configuration and is refreshed once on expiry.

use async_trait::async_trait;
use serde::Deserialize;
use snafu::prelude::*;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::SourceConfig;
use crate::error::{
    ClientBuildSnafu, FetchError, PageDecodeSnafu, PageRequestSnafu, SessionRefreshSnafu,
};

use super::{FetchPage, FetchQuery, LogSource};

/// Request timeout for page fetches.
const PAGE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct SessionResponse {
    token: String,
}

/// Paging client for the remote service's log-read API.
pub struct HttpLogSource {
    base_url: String,
    app_name: String,
    token: Option<String>,
    http: reqwest::Client,
}

impl HttpLogSource {
    /// Create a client for the configured source.
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(PAGE_TIMEOUT)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            app_name: config.app_name.clone(),
            token: config.token.clone(),
            http,
        })
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn fetch_page(
        &mut self,
        query: &FetchQuery,
        cursor: Option<&str>,
    ) -> Result<FetchPage, FetchError> {
        let start_time = query.start.to_string();
        let end_time = query.end.to_string();
        let min_level = query.min_level.code().to_string();
        let version_ids = query.versions.join(",");
        let include_app_logs = query.include_app_logs.to_string();
        let include_incomplete = query.include_incomplete.to_string();

        let mut request = self
            .http
            .get(format!("{}/remote_api/logs", self.base_url))
            .query(&[
                ("app", self.app_name.as_str()),
                ("start_time", start_time.as_str()),
                ("end_time", end_time.as_str()),
                ("minimum_log_level", min_level.as_str()),
                ("version_ids", version_ids.as_str()),
                ("include_app_logs", include_app_logs.as_str()),
                ("include_incomplete", include_incomplete.as_str()),
            ]);

        if let Some(cursor) = cursor {
            request = request.query(&[("offset", cursor)]);
        }
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.context(PageRequestSnafu)?;
        let status = response.status();

        if status == reqwest::StatusCode::UNAUTHORIZED
            || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(FetchError::AuthExpired);
        }
        if !status.is_success() {
            return Err(FetchError::PageRejected {
                status: status.as_u16(),
            });
        }

        let page: FetchPage = response.json().await.context(PageDecodeSnafu)?;
        debug!(
            start = query.start,
            end = query.end,
            records = page.records.len(),
            "Fetched page"
        );
        Ok(page)
    }

    async fn refresh_session(&mut self) -> Result<(), FetchError> {
        let mut request = self
            .http
            .post(format!("{}/remote_api/session", self.base_url))
            .query(&[("app", self.app_name.as_str())]);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .context(SessionRefreshSnafu)?
            .error_for_status()
            .context(SessionRefreshSnafu)?;

        let session: SessionResponse =
            response.json().await.context(SessionRefreshSnafu)?;
        self.token = Some(session.token);

        info!("Source session refreshed");
        Ok(())
    }
}
