//! Canonicalizes the heterogeneous option payloads the booking backend
//! returns. Every shape the backend has been observed to produce funnels
//! through here, so the rest of the engine only ever sees `Vec<CourseOption>`.

use std::cmp::Ordering;

use serde_json::Value;
use tracing::debug;

use crate::constants::{is_sentinel, CODE_KEYS, MIN_PRICE_KEYS, OFFER_PRICE_KEYS};
use crate::domain::CourseOption;

/// Converts a raw backend payload into a deduplicated, naturally-sorted
/// option list.
///
/// Accepted shapes: a plain string (single value or CSV), an array of
/// strings/numbers/objects with any of the known alias keys, or a nested
/// object whose values are flattened recursively (`{list: [...]}`,
/// `{courses: [...]}`, object-of-objects).
///
/// Never fails: unparseable input yields an empty list. Idempotent over its
/// own serialized output.
pub fn normalize(raw: &Value) -> Vec<CourseOption> {
    let mut candidates = Vec::new();
    collect(raw, &mut candidates);

    let mut out: Vec<CourseOption> = Vec::new();
    for option in candidates {
        let code = option.code.trim();
        if code.is_empty() || is_sentinel(code) {
            continue;
        }
        // Case-insensitive dedup, first occurrence wins.
        if out.iter().any(|o| o.code.eq_ignore_ascii_case(code)) {
            continue;
        }
        out.push(CourseOption {
            code: code.to_string(),
            ..option
        });
    }

    out.sort_by(|a, b| natural_cmp(&a.code, &b.code));
    debug!("normalized {} options", out.len());
    out
}

fn collect(value: &Value, out: &mut Vec<CourseOption>) {
    match value {
        Value::String(s) => {
            for part in s.split(',') {
                out.push(CourseOption::new(part.trim()));
            }
        }
        Value::Number(n) => out.push(CourseOption::new(n.to_string())),
        Value::Array(items) => {
            for item in items {
                collect(item, out);
            }
        }
        Value::Object(map) => {
            if let Some(code) = extract_code(value) {
                out.push(CourseOption {
                    code,
                    min_price: extract_number(value, &MIN_PRICE_KEYS).unwrap_or(0.0),
                    offer_price: extract_number(value, &OFFER_PRICE_KEYS),
                });
            } else {
                // Container object: {list: [...]}, {courses: [...]},
                // object-of-objects keyed by id, etc. Flatten the values.
                for child in map.values() {
                    collect(child, out);
                }
            }
        }
        _ => {}
    }
}

fn extract_code(value: &Value) -> Option<String> {
    for key in CODE_KEYS {
        match value.get(key) {
            Some(Value::String(s)) => return Some(s.clone()),
            Some(Value::Number(n)) => return Some(n.to_string()),
            _ => {}
        }
    }
    None
}

fn extract_number(value: &Value, keys: &[&str]) -> Option<f64> {
    for key in keys {
        let found = match value.get(*key) {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        if let Some(n) = found {
            if n.is_finite() {
                return Some(n);
            }
        }
    }
    None
}

/// Case-insensitive natural ordering: digit runs compare numerically, so
/// "2 weeks" sorts before "10 weeks".
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut ai = a.chars().peekable();
    let mut bi = b.chars().peekable();
    loop {
        match (ai.peek().copied(), bi.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(ac), Some(bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let an = take_number(&mut ai);
                    let bn = take_number(&mut bi);
                    match an.cmp(&bn) {
                        Ordering::Equal => {}
                        other => return other,
                    }
                } else {
                    let al = ac.to_ascii_lowercase();
                    let bl = bc.to_ascii_lowercase();
                    match al.cmp(&bl) {
                        Ordering::Equal => {
                            ai.next();
                            bi.next();
                        }
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_number(iter: &mut std::iter::Peekable<std::str::Chars>) -> u64 {
    let mut n: u64 = 0;
    while let Some(c) = iter.peek().copied() {
        if let Some(d) = c.to_digit(10) {
            n = n.saturating_mul(10).saturating_add(d as u64);
            iter.next();
        } else {
            break;
        }
    }
    n
}
