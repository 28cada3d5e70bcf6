//! Fetches the three option catalogs (course types, schedules, study weeks)
//! for a school/course context. Pure request/response: the loader owns no
//! state, the reconciler decides when a reload is due.

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::constants::{course_types_url, schedules_url, weeks_url};
use crate::domain::{Catalog, CourseOption};
use crate::error::EngineError;
use crate::normalize::normalize;
use crate::ports::HttpClientPort;

pub struct CatalogLoader {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
}

impl CatalogLoader {
    pub fn new(http: Arc<dyn HttpClientPort>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// Course-type catalog for a school. `prior` is the last good item list,
    /// retained on failure.
    #[instrument(skip(self, prior, cancel))]
    pub async fn load_courses(
        &self,
        school_id: &str,
        prior: &[CourseOption],
        cancel: &CancellationToken,
    ) -> Option<Catalog> {
        if school_id.trim().is_empty() {
            warn!("load_courses called without a school id");
            return Some(Catalog::failed(prior.to_vec()));
        }
        let url = course_types_url(&self.base_url, school_id);
        self.fetch_catalog(&url, prior, cancel).await
    }

    /// Schedule catalog for a school/course pair.
    #[instrument(skip(self, prior, cancel))]
    pub async fn load_schedules(
        &self,
        school_id: &str,
        course_key: &str,
        prior: &[CourseOption],
        cancel: &CancellationToken,
    ) -> Option<Catalog> {
        if school_id.trim().is_empty() || course_key.trim().is_empty() {
            warn!("load_schedules called without school id or course key");
            return Some(Catalog::failed(prior.to_vec()));
        }
        let url = schedules_url(&self.base_url, school_id, course_key);
        self.fetch_catalog(&url, prior, cancel).await
    }

    /// Study-week catalog for a school/course pair.
    #[instrument(skip(self, prior, cancel))]
    pub async fn load_weeks(
        &self,
        school_id: &str,
        course_key: &str,
        prior: &[CourseOption],
        cancel: &CancellationToken,
    ) -> Option<Catalog> {
        if school_id.trim().is_empty() || course_key.trim().is_empty() {
            warn!("load_weeks called without school id or course key");
            return Some(Catalog::failed(prior.to_vec()));
        }
        let url = weeks_url(&self.base_url, school_id, course_key);
        self.fetch_catalog(&url, prior, cancel).await
    }

    /// One GET, fully normalized result. Returns `None` when the request was
    /// cancelled by a superseding reload; the caller must discard.
    async fn fetch_catalog(
        &self,
        url: &str,
        prior: &[CourseOption],
        cancel: &CancellationToken,
    ) -> Option<Catalog> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "catalog request cancelled before completion");
                return None;
            }
            resp = self.http.get(url) => resp,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, error = %e, "catalog fetch failed; keeping last good items");
                return Some(Catalog::failed(prior.to_vec()));
            }
        };

        if !response.is_success() {
            let err = EngineError::from_response(response.status, &response.bytes);
            warn!(%url, status = response.status, message = %err.user_message(), "catalog fetch returned error status");
            return Some(Catalog::failed(prior.to_vec()));
        }

        let body: Value = match serde_json::from_slice(&response.bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(%url, error = %e, "catalog body was not valid JSON; keeping last good items");
                return Some(Catalog::failed(prior.to_vec()));
            }
        };

        // Responses are usually wrapped in {data: ...}; the normalizer copes
        // with everything below that.
        let payload = body.get("data").unwrap_or(&body);
        let items = normalize(payload);
        debug!(%url, count = items.len(), "catalog loaded");
        Some(Catalog::loaded(items))
    }
}
