use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single selectable option (schedule slot or study-week length) after
/// normalization. `code` is trimmed, non-empty and never a sentinel value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseOption {
    pub code: String,
    #[serde(rename = "minPrice", default)]
    pub min_price: f64,
    #[serde(rename = "offerPrice", skip_serializing_if = "Option::is_none")]
    pub offer_price: Option<f64>,
}

impl CourseOption {
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            min_price: 0.0,
            offer_price: None,
        }
    }
}

/// One axis of the option space (courses, schedules or weeks).
///
/// Replaced wholesale on each reload. On a failed reload `error` is set and
/// `items` keeps the last good value so the UI never flickers to "no
/// options" on a retryable blip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    pub items: Vec<CourseOption>,
    pub loading: bool,
    pub error: bool,
}

impl Catalog {
    pub fn loaded(items: Vec<CourseOption>) -> Self {
        Self {
            items,
            loading: false,
            error: false,
        }
    }

    pub fn failed(last_good: Vec<CourseOption>) -> Self {
        Self {
            items: last_good,
            loading: false,
            error: true,
        }
    }

    pub fn contains_code(&self, code: &str) -> bool {
        self.items.iter().any(|o| o.code.eq_ignore_ascii_case(code))
    }

    /// First item after normalization's natural sort; the auto-correction
    /// default. No further tie-break between equally priced options.
    pub fn first_code(&self) -> Option<&str> {
        self.items.first().map(|o| o.code.as_str())
    }
}

/// The mutable user intent. Mutated only by explicit engine methods or by
/// auto-correction after a catalog reload.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Selection {
    pub course_key: Option<String>,
    pub schedule: Option<String>,
    pub study_weeks: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub accommodation: Option<String>,
}

/// Server-confirmed quote snapshot. Immutable once produced; each successful
/// quote replaces it wholesale. The summary/submission step must read prices
/// from here, never recompute them locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reservation {
    pub school_id: String,
    pub course_key: String,
    pub course_label: String,
    pub schedule: String,
    pub weeks: u32,
    pub base_price: f64,
    pub offer_price: Option<f64>,
    pub city: String,
    pub school_name: String,
    pub booking_deadline: Option<NaiveDate>,
    pub class_start_deadline: Option<NaiveDate>,
}

/// Payload of the per-country "talk to an advisor" business rule. Not an
/// error: a valid terminal state with its own UI treatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorNotice {
    pub can_book_instantly: bool,
    pub country_code: String,
    pub advisor_contact: String,
    pub message: String,
}

/// Quote lifecycle. `Quoted` and `AdvisorRequired` are mutually exclusive by
/// construction: the reservation lives inside the variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum QuotePhase {
    #[default]
    Idle,
    Loading,
    Quoted(Reservation),
    AdvisorRequired(AdvisorNotice),
    Failed(String),
}

impl QuotePhase {
    pub fn reservation(&self) -> Option<&Reservation> {
        match self {
            QuotePhase::Quoted(r) => Some(r),
            _ => None,
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, QuotePhase::Loading)
    }
}

/// Immutable view of the whole engine state handed to callers and change
/// sinks after every applied transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineSnapshot {
    pub selection: Selection,
    pub courses: Catalog,
    pub schedules: Catalog,
    pub weeks: Catalog,
    pub phase: QuotePhase,
}
