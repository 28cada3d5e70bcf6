/// Backend-internal catalog entries that must never surface as selectable
/// options. The backend mixes these mode markers into the same lists as the
/// real options.
pub const SENTINEL_CODES: [&str; 3] = ["legacy", "country-service", "hybrid"];

// Key aliases used by the various backend response shapes. First present
// alias wins, in this order.
pub const CODE_KEYS: [&str; 6] = ["horario", "schedule", "label", "name", "curso", "code"];
pub const MIN_PRICE_KEYS: [&str; 5] = ["precioMinimo", "priceMin", "minPrice", "precio", "price"];
pub const OFFER_PRICE_KEYS: [&str; 3] = ["precioOferta", "offerPrice", "offer"];

pub fn is_sentinel(code: &str) -> bool {
    SENTINEL_CODES.iter().any(|s| s.eq_ignore_ascii_case(code))
}

// Endpoint path builders. All booking endpoints are GET; the reservation
// submission is the single POST.

pub fn course_types_url(base: &str, school_id: &str) -> String {
    format!("{base}/booking/tipo-cursos/{school_id}")
}

pub fn schedules_url(base: &str, school_id: &str, course: &str) -> String {
    format!("{base}/booking/horarios/{school_id}/{course}")
}

pub fn weeks_url(base: &str, school_id: &str, course: &str) -> String {
    format!("{base}/booking/semanas/{school_id}/{course}")
}

pub fn cheapest_quote_url(base: &str, school_id: &str, course: &str) -> String {
    format!("{base}/booking/curso-mas-economico/{school_id}/{course}")
}

pub fn full_quote_url(base: &str, school_id: &str, course: &str, weeks: u32, schedule: &str) -> String {
    format!(
        "{base}/booking/calculo-reserva/{school_id}?schoolId={school_id}&curso={course}&semanas={weeks}&horario={schedule}"
    )
}

pub fn reservation_submit_url(base: &str) -> String {
    format!("{base}/email/reservation")
}
