//! Posts the final reservation. Contact fields come from the form; price,
//! course, schedule and school fields come from the last server-confirmed
//! reservation snapshot, never from a locally edited copy.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::constants::reservation_submit_url;
use crate::domain::{Reservation, Selection};
use crate::error::EngineError;
use crate::ports::HttpClientPort;

/// User-entered contact/profile fields gathered at the summary step.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContactFields {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub country: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubmissionReceipt {
    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

pub struct SubmissionCoordinator {
    http: Arc<dyn HttpClientPort>,
    base_url: String,
    session_id: Uuid,
}

impl SubmissionCoordinator {
    pub fn new(http: Arc<dyn HttpClientPort>, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            session_id: Uuid::new_v4(),
        }
    }

    /// Merges contact fields with the reservation snapshot and posts the
    /// booking. Fails fast without a network call when no reservation
    /// exists (state was AdvisorRequired, Failed or never quoted).
    ///
    /// Repeated submits are not deduplicated here; idempotency is the
    /// calling UI's responsibility.
    #[instrument(skip(self, reservation, contact, selection))]
    pub async fn submit(
        &self,
        reservation: Option<&Reservation>,
        selection: &Selection,
        contact: &ContactFields,
    ) -> SubmissionReceipt {
        let Some(reservation) = reservation else {
            warn!("submit called without a reservation");
            return SubmissionReceipt::failed("Reservation not initialized");
        };

        let body = json!({
            "sessionId": self.session_id,
            "firstName": contact.first_name,
            "lastName": contact.last_name,
            "email": contact.email,
            "phone": contact.phone,
            "country": contact.country,
            "notes": contact.notes,
            "schoolId": reservation.school_id,
            "schoolName": reservation.school_name,
            "city": reservation.city,
            "curso": reservation.course_key,
            "courseLabel": reservation.course_label,
            "horario": reservation.schedule,
            "semanas": reservation.weeks,
            "basePrice": reservation.base_price,
            "offerPrice": reservation.offer_price,
            "startDate": selection.start_date,
            "accommodation": selection.accommodation,
        });

        let url = reservation_submit_url(&self.base_url);
        let response = match self.http.post_json(&url, &body).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "reservation submission transport failure");
                return SubmissionReceipt::failed(
                    EngineError::Transport(e).user_message(),
                );
            }
        };

        if !response.is_success() {
            let err = EngineError::from_response(response.status, &response.bytes);
            warn!(status = response.status, message = %err.user_message(), "reservation submission rejected");
            return SubmissionReceipt::failed(err.user_message());
        }

        // Success bodies carry {success, message?}; a 2xx with an unreadable
        // body still counts as accepted.
        let receipt = serde_json::from_slice::<SubmissionReceipt>(&response.bytes)
            .unwrap_or(SubmissionReceipt {
                success: true,
                message: None,
            });
        info!(success = receipt.success, "reservation submitted");
        receipt
    }
}
