//! The orchestrating state machine. Owns the current selection, the three
//! option catalogs and the quote phase; decides which catalogs a field
//! change invalidates, auto-corrects selections the fresh catalogs no
//! longer support, and keeps exactly one quote request in flight per axis.
//!
//! Supersession rule: last writer wins by request start, not by response
//! arrival. Every catalog reload and quote request is stamped with a
//! generation number and a cancellation token; starting a newer request for
//! the same axis cancels the older token, and a response whose generation
//! is no longer current is discarded without touching state.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::NaiveDate;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::catalog::CatalogLoader;
use crate::domain::{Catalog, EngineSnapshot, QuotePhase, Selection};
use crate::ports::{ChangeSink, HttpClientPort};
use crate::quote::{QuoteCalculator, QuoteOutcome};

pub struct SelectionReconciler {
    school_id: String,
    catalogs: CatalogLoader,
    quotes: QuoteCalculator,
    inner: Arc<Mutex<EngineInner>>,
    sink: Option<Arc<dyn ChangeSink>>,
}

struct EngineInner {
    selection: Selection,
    courses: Catalog,
    schedules: Catalog,
    weeks: Catalog,
    phase: QuotePhase,
    catalog_gen: u64,
    catalog_cancel: CancellationToken,
    quote_gen: u64,
    quote_cancel: CancellationToken,
}

impl EngineInner {
    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            selection: self.selection.clone(),
            courses: self.courses.clone(),
            schedules: self.schedules.clone(),
            weeks: self.weeks.clone(),
            phase: self.phase.clone(),
        }
    }

    /// Cancels the in-flight catalog reload (if any) and opens a new
    /// generation. Returns (generation, token) for the superseding reload.
    fn supersede_catalogs(&mut self) -> (u64, CancellationToken) {
        self.catalog_cancel.cancel();
        self.catalog_cancel = CancellationToken::new();
        self.catalog_gen += 1;
        (self.catalog_gen, self.catalog_cancel.clone())
    }

    fn supersede_quote(&mut self) -> (u64, CancellationToken) {
        self.quote_cancel.cancel();
        self.quote_cancel = CancellationToken::new();
        self.quote_gen += 1;
        (self.quote_gen, self.quote_cancel.clone())
    }
}

/// Which quote endpoint a transition resolved to.
#[derive(Debug, Clone)]
enum QuoteKind {
    Cheapest,
    Full { weeks: u32, schedule: String },
}

impl SelectionReconciler {
    pub fn new(
        school_id: impl Into<String>,
        http: Arc<dyn HttpClientPort>,
        base_url: impl Into<String>,
        sink: Option<Arc<dyn ChangeSink>>,
    ) -> Self {
        let base_url = base_url.into();
        Self {
            school_id: school_id.into(),
            catalogs: CatalogLoader::new(http.clone(), base_url.clone()),
            quotes: QuoteCalculator::new(http, base_url),
            inner: Arc::new(Mutex::new(EngineInner {
                selection: Selection::default(),
                courses: Catalog::default(),
                schedules: Catalog::default(),
                weeks: Catalog::default(),
                phase: QuotePhase::Idle,
                catalog_gen: 0,
                catalog_cancel: CancellationToken::new(),
                quote_gen: 0,
                quote_cancel: CancellationToken::new(),
            })),
            sink,
        }
    }

    fn lock(&self) -> MutexGuard<'_, EngineInner> {
        // The lock is only ever held for in-memory mutation, never across an
        // await point; a poisoned lock still holds consistent data.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn notify(&self, snapshot: &EngineSnapshot) {
        if let Some(sink) = &self.sink {
            sink.on_change(snapshot);
        }
    }

    /// Loads the course-type catalog and enters the initial course context:
    /// `initial_course` when it exists in the catalog, the first catalog
    /// entry otherwise.
    #[instrument(skip(self))]
    pub async fn init(&self, initial_course: Option<&str>) -> EngineSnapshot {
        let (_gen, token, prior) = {
            let mut inner = self.lock();
            inner.courses.loading = true;
            let (generation, token) = inner.supersede_catalogs();
            (generation, token, inner.courses.items.clone())
        };

        let loaded = self
            .catalogs
            .load_courses(&self.school_id, &prior, &token)
            .await;

        let course = {
            let mut inner = self.lock();
            if let Some(catalog) = loaded {
                inner.courses = catalog;
            } else {
                inner.courses.loading = false;
            }
            let requested = initial_course.map(str::to_string);
            match requested {
                Some(c) if inner.courses.contains_code(&c) => Some(c),
                Some(c) if inner.courses.items.is_empty() => Some(c),
                _ => inner.courses.first_code().map(str::to_string),
            }
        };

        match course {
            Some(course) => self.change_course(&course, true).await,
            None => {
                let snapshot = self.lock().snapshot();
                self.notify(&snapshot);
                snapshot
            }
        }
    }

    /// User picked a different course type. Reloads the schedule and week
    /// catalogs in parallel, auto-corrects the selection against them and
    /// pre-fills the quote with the cheapest combination for the course.
    #[instrument(skip(self))]
    pub async fn select_course(&self, course_key: &str) -> EngineSnapshot {
        self.change_course(course_key, true).await
    }

    /// Refreshes the schedule/week catalogs for the current course without
    /// changing it. Runs the same auto-correction, then requotes with the
    /// (possibly corrected) selection.
    #[instrument(skip(self))]
    pub async fn reload_catalogs(&self) -> EngineSnapshot {
        let course = self.lock().selection.course_key.clone();
        match course {
            Some(course) => self.change_course(&course, false).await,
            None => {
                let snapshot = {
                    let mut inner = self.lock();
                    inner.phase = QuotePhase::Failed("No course selected yet".to_string());
                    inner.snapshot()
                };
                warn!("reload_catalogs called before any course was selected");
                self.notify(&snapshot);
                snapshot
            }
        }
    }

    async fn change_course(&self, course_key: &str, course_changed: bool) -> EngineSnapshot {
        let (my_gen, token, prior_schedules, prior_weeks) = {
            let mut inner = self.lock();
            inner.selection.course_key = Some(course_key.to_string());
            if course_changed {
                // A quote for the old course must never land.
                inner.supersede_quote();
            }
            inner.phase = QuotePhase::Loading;
            inner.schedules.loading = true;
            inner.weeks.loading = true;
            let (generation, token) = inner.supersede_catalogs();
            (
                generation,
                token,
                inner.schedules.items.clone(),
                inner.weeks.items.clone(),
            )
        };
        let started = self.lock().snapshot();
        self.notify(&started);

        let (schedules, weeks) = tokio::join!(
            self.catalogs
                .load_schedules(&self.school_id, course_key, &prior_schedules, &token),
            self.catalogs
                .load_weeks(&self.school_id, course_key, &prior_weeks, &token),
        );

        let kind = {
            let mut guard = self.lock();
            if guard.catalog_gen != my_gen {
                debug!(course = course_key, "catalog reload superseded; discarding");
                return guard.snapshot();
            }
            let (Some(schedules), Some(weeks)) = (schedules, weeks) else {
                debug!(course = course_key, "catalog reload cancelled; discarding");
                return guard.snapshot();
            };
            let inner = &mut *guard;
            inner.schedules = schedules;
            inner.weeks = weeks;

            let schedule_corrected =
                auto_correct_code(&mut inner.selection.schedule, &inner.schedules);
            let weeks_corrected = auto_correct_weeks(&mut inner.selection.study_weeks, &inner.weeks);
            if schedule_corrected || weeks_corrected {
                info!(
                    course = course_key,
                    schedule = ?inner.selection.schedule,
                    weeks = ?inner.selection.study_weeks,
                    "selection auto-corrected against reloaded catalogs"
                );
            }

            quote_kind_for(&inner.selection, course_changed)
        };
        let corrected = self.lock().snapshot();
        self.notify(&corrected);

        self.request_quote(course_key, kind).await
    }

    /// User picked a schedule slot. No catalog reload; requote directly.
    #[instrument(skip(self))]
    pub async fn select_schedule(&self, schedule: &str) -> EngineSnapshot {
        let (course, kind) = {
            let mut inner = self.lock();
            inner.selection.schedule = Some(schedule.to_string());
            let Some(course) = inner.selection.course_key.clone() else {
                inner.phase = QuotePhase::Failed("No course selected yet".to_string());
                let snapshot = inner.snapshot();
                drop(inner);
                self.notify(&snapshot);
                return snapshot;
            };
            inner.phase = QuotePhase::Loading;
            (course, quote_kind_for(&inner.selection, false))
        };
        let loading = self.lock().snapshot();
        self.notify(&loading);
        self.request_quote(&course, kind).await
    }

    /// User picked a number of study weeks. One week always goes through the
    /// cheapest-for-course endpoint; longer stays get a full calculation
    /// once the schedule is known.
    #[instrument(skip(self))]
    pub async fn select_weeks(&self, weeks: u32) -> EngineSnapshot {
        let (course, kind) = {
            let mut inner = self.lock();
            inner.selection.study_weeks = Some(weeks);
            let Some(course) = inner.selection.course_key.clone() else {
                inner.phase = QuotePhase::Failed("No course selected yet".to_string());
                let snapshot = inner.snapshot();
                drop(inner);
                self.notify(&snapshot);
                return snapshot;
            };
            inner.phase = QuotePhase::Loading;
            (course, quote_kind_for(&inner.selection, false))
        };
        let loading = self.lock().snapshot();
        self.notify(&loading);
        self.request_quote(&course, kind).await
    }

    /// Start date does not affect the price; no requote.
    pub fn set_start_date(&self, start_date: NaiveDate) -> EngineSnapshot {
        let snapshot = {
            let mut inner = self.lock();
            inner.selection.start_date = Some(start_date);
            inner.snapshot()
        };
        self.notify(&snapshot);
        snapshot
    }

    /// Accommodation is quoted separately by the advisor flow; no requote.
    pub fn set_accommodation(&self, accommodation: &str) -> EngineSnapshot {
        let snapshot = {
            let mut inner = self.lock();
            inner.selection.accommodation = Some(accommodation.to_string());
            inner.snapshot()
        };
        self.notify(&snapshot);
        snapshot
    }

    async fn request_quote(&self, course_key: &str, kind: QuoteKind) -> EngineSnapshot {
        let (my_gen, token) = self.lock().supersede_quote();

        let outcome = match &kind {
            QuoteKind::Cheapest => {
                self.quotes
                    .cheapest_for_course(&self.school_id, course_key, &token)
                    .await
            }
            QuoteKind::Full { weeks, schedule } => {
                self.quotes
                    .full_calculation(&self.school_id, course_key, *weeks, schedule, &token)
                    .await
            }
        };

        let snapshot = {
            let mut inner = self.lock();
            if inner.quote_gen != my_gen {
                debug!(course = course_key, "quote response superseded; discarding");
                return inner.snapshot();
            }
            match outcome {
                None => {
                    // Cancelled mid-flight by a newer request; that request
                    // owns the phase now.
                    debug!(course = course_key, "quote cancelled; discarding");
                    return inner.snapshot();
                }
                Some(Ok(QuoteOutcome::Quoted(reservation))) => {
                    // Only the cheapest-for-course answer picks the schedule
                    // for us; a full calculation echoing a different horario
                    // must not override the user's explicit choice.
                    if matches!(kind, QuoteKind::Cheapest) {
                        inner.selection.schedule = Some(reservation.schedule.clone());
                        if inner.selection.study_weeks.is_none() {
                            inner.selection.study_weeks = Some(reservation.weeks);
                        }
                    }
                    info!(
                        course = course_key,
                        schedule = %reservation.schedule,
                        price = reservation.base_price,
                        "quote applied"
                    );
                    inner.phase = QuotePhase::Quoted(reservation);
                }
                Some(Ok(QuoteOutcome::AdvisorRequired(notice))) => {
                    info!(
                        course = course_key,
                        country = %notice.country_code,
                        "instant pricing suppressed; advisor required"
                    );
                    inner.phase = QuotePhase::AdvisorRequired(notice);
                }
                Some(Err(e)) => {
                    warn!(course = course_key, error = %e, "quote failed");
                    inner.phase = QuotePhase::Failed(e.user_message());
                }
            }
            inner.snapshot()
        };
        self.notify(&snapshot);
        snapshot
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.lock().snapshot()
    }

    /// The last server-confirmed reservation, if the engine is in `Quoted`.
    pub fn reservation(&self) -> Option<crate::domain::Reservation> {
        self.lock().phase.reservation().cloned()
    }

    /// Unmount obligation: cancels every outstanding request. Responses that
    /// arrive afterwards are discarded by their generation checks.
    pub fn shutdown(&self) {
        let inner = self.lock();
        inner.catalog_cancel.cancel();
        inner.quote_cancel.cancel();
    }
}

/// If the current code is absent from the freshly loaded catalog, adopt the
/// first (naturally sorted) entry. An empty catalog leaves the prior
/// selection untouched; surfacing "no options" is the UI's job.
fn auto_correct_code(current: &mut Option<String>, catalog: &Catalog) -> bool {
    if catalog.items.is_empty() {
        return false;
    }
    match current {
        Some(code) if catalog.contains_code(code) => false,
        _ => {
            *current = catalog.first_code().map(str::to_string);
            true
        }
    }
}

fn auto_correct_weeks(current: &mut Option<u32>, catalog: &Catalog) -> bool {
    if catalog.items.is_empty() {
        return false;
    }
    if let Some(weeks) = current {
        if catalog.contains_code(&weeks.to_string()) {
            return false;
        }
    }
    match catalog.first_code().and_then(parse_weeks_code) {
        Some(weeks) => {
            *current = Some(weeks);
            true
        }
        None => false,
    }
}

/// Week codes are usually bare numbers but occasionally "2 weeks"; the
/// leading digit run is the value.
fn parse_weeks_code(code: &str) -> Option<u32> {
    let digits: String = code.trim().chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn quote_kind_for(selection: &Selection, course_changed: bool) -> QuoteKind {
    // Cheapest-for-course answers both "immediately after a course change"
    // and one-week stays; everything else with a known schedule is a
    // deterministic full calculation.
    if course_changed {
        return QuoteKind::Cheapest;
    }
    match (selection.study_weeks, &selection.schedule) {
        (Some(weeks), Some(schedule)) if weeks > 1 => QuoteKind::Full {
            weeks,
            schedule: schedule.clone(),
        },
        _ => QuoteKind::Cheapest,
    }
}
