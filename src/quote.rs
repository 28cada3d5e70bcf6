//! Obtains price quotes from the booking backend: either the
//! cheapest-for-course endpoint (server picks the minimum-price combination
//! and tells us which schedule it was) or the full calculation for an exact
//! (course, weeks, schedule) triple. Either endpoint may answer with the
//! per-country advisor-required business rule instead of a price.

use std::sync::Arc;

use chrono::NaiveDate;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::constants::{cheapest_quote_url, full_quote_url};
use crate::domain::{AdvisorNotice, Reservation};
use crate::error::{EngineError, Result};
use crate::ports::HttpClientPort;

/// Discriminated outcome of a quote request. A response is exactly one of
/// these; the engine never holds both a reservation and an advisor notice.
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    Quoted(Reservation),
    AdvisorRequired(AdvisorNotice),
}

pub struct QuoteCalculator {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
}

impl QuoteCalculator {
    pub fn new(http: Arc<dyn HttpClientPort>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    /// "What is the minimum price for this course at this school, at any
    /// schedule." Used right after a course change and for one-week stays.
    /// Returns `None` when superseded and cancelled.
    #[instrument(skip(self, cancel))]
    pub async fn cheapest_for_course(
        &self,
        school_id: &str,
        course_key: &str,
        cancel: &CancellationToken,
    ) -> Option<Result<QuoteOutcome>> {
        if school_id.trim().is_empty() || course_key.trim().is_empty() {
            return Some(Err(EngineError::MissingParam(
                "school and course are required for a quote".to_string(),
            )));
        }
        let url = cheapest_quote_url(&self.base_url, school_id, course_key);
        self.request(&url, school_id, course_key, None, cancel).await
    }

    /// Deterministic price for an exact (course, weeks, schedule) triple.
    #[instrument(skip(self, cancel))]
    pub async fn full_calculation(
        &self,
        school_id: &str,
        course_key: &str,
        weeks: u32,
        schedule: &str,
        cancel: &CancellationToken,
    ) -> Option<Result<QuoteOutcome>> {
        if school_id.trim().is_empty() || course_key.trim().is_empty() || schedule.trim().is_empty()
        {
            return Some(Err(EngineError::MissingParam(
                "school, course and schedule are required for a full calculation".to_string(),
            )));
        }
        let url = full_quote_url(&self.base_url, school_id, course_key, weeks, schedule);
        self.request(&url, school_id, course_key, Some(weeks), cancel)
            .await
    }

    async fn request(
        &self,
        url: &str,
        school_id: &str,
        course_key: &str,
        requested_weeks: Option<u32>,
        cancel: &CancellationToken,
    ) -> Option<Result<QuoteOutcome>> {
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(%url, "quote request cancelled before completion");
                return None;
            }
            resp = self.http.get(url) => resp,
        };

        let response = match response {
            Ok(r) => r,
            Err(e) => {
                warn!(%url, error = %e, "quote request failed");
                return Some(Err(EngineError::Transport(e)));
            }
        };

        if !response.is_success() {
            return Some(Err(EngineError::from_response(
                response.status,
                &response.bytes,
            )));
        }

        let body: Value = match serde_json::from_slice(&response.bytes) {
            Ok(v) => v,
            Err(e) => {
                warn!(%url, error = %e, "quote body was not valid JSON");
                return Some(Err(EngineError::Api {
                    message: "The booking service returned an unreadable quote".to_string(),
                }));
            }
        };

        Some(parse_outcome(&body, school_id, course_key, requested_weeks))
    }
}

/// Parses a quote payload, tolerating both the Spanish and English key
/// dialects the backend emits, with or without a `{data: ...}` wrapper.
pub fn parse_outcome(
    body: &Value,
    school_id: &str,
    course_key: &str,
    requested_weeks: Option<u32>,
) -> Result<QuoteOutcome> {
    let payload = body.get("data").unwrap_or(body);

    if payload
        .get("requiresAdvisor")
        .and_then(|v| v.as_bool())
        .unwrap_or(false)
    {
        return Ok(QuoteOutcome::AdvisorRequired(AdvisorNotice {
            can_book_instantly: payload
                .get("canBookInstantly")
                .and_then(|v| v.as_bool())
                .unwrap_or(false),
            country_code: first_str(payload, &["countryCode", "pais"]).unwrap_or_default(),
            advisor_contact: first_str(payload, &["advisorContact", "asesor"]).unwrap_or_default(),
            message: first_str(payload, &["message", "mensaje"]).unwrap_or_default(),
        }));
    }

    let schedule = first_str(payload, &["horario", "schedule"]);
    let base_price = first_f64(payload, &["precioBase", "basePrice", "precio", "price", "precioMinimo"]);

    let (schedule, base_price) = match (schedule, base_price) {
        (Some(s), Some(p)) => (s, p),
        _ => {
            warn!("quote payload missing schedule or price");
            return Err(EngineError::Api {
                message: "The booking service returned an incomplete quote".to_string(),
            });
        }
    };

    let weeks = first_u32(payload, &["semanas", "weeks"])
        .or(requested_weeks)
        .unwrap_or(1);

    Ok(QuoteOutcome::Quoted(Reservation {
        school_id: school_id.to_string(),
        course_key: course_key.to_string(),
        course_label: first_str(payload, &["curso", "course", "courseName"])
            .unwrap_or_else(|| course_key.to_string()),
        schedule,
        weeks,
        base_price,
        offer_price: first_f64(payload, &["precioOferta", "offerPrice"]),
        city: first_str(payload, &["ciudad", "city"]).unwrap_or_default(),
        school_name: first_str(payload, &["escuela", "schoolName", "school"]).unwrap_or_default(),
        booking_deadline: first_date(payload, &["fechaLimiteReserva", "bookingDeadline"]),
        class_start_deadline: first_date(payload, &["fechaLimiteClase", "classStartDeadline"]),
    }))
}

fn first_str(payload: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(|v| v.as_str()))
        .map(|s| s.to_string())
}

fn first_f64(payload: &Value, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| match payload.get(*k) {
        Some(Value::Number(n)) => n.as_f64().filter(|f| f.is_finite()),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok().filter(|f| f.is_finite()),
        _ => None,
    })
}

fn first_u32(payload: &Value, keys: &[&str]) -> Option<u32> {
    keys.iter().find_map(|k| match payload.get(*k) {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse::<u32>().ok(),
        _ => None,
    })
}

fn first_date(payload: &Value, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter()
        .find_map(|k| payload.get(*k).and_then(|v| v.as_str()))
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}
