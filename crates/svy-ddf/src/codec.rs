//! Encoding of stored values.
//!
//! - Single-response categoricals hold the category value, `-1` for no answer.
//! - Multi-response categoricals hold `;`-terminated value lists (`3;5;`).
//! - Dates hold day counts since 1899-12-30 with the time of day as the
//!   fractional part.

use chrono::{Duration, NaiveDate, NaiveDateTime};

/// Stored value meaning "not answered".
pub const NO_ANSWER: i64 = -1;

const SECONDS_PER_DAY: f64 = 86_400.0;
/// Distance from a whole second still read as that second; covers the
/// precision lost by storing seconds as a day fraction.
const SECOND_TOLERANCE: f64 = 1e-4;

fn epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1899, 12, 30)
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

pub fn encode_multi(values: &[i64]) -> String {
    values.iter().map(|value| format!("{value};")).collect()
}

/// Values of a multi-response cell; the trailing separator is optional.
pub fn decode_multi(raw: &str) -> Vec<i64> {
    raw.split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter_map(|part| part.parse::<i64>().ok())
        .filter(|&value| value != NO_ANSWER)
        .collect()
}

pub fn encode_date(value: NaiveDateTime) -> f64 {
    let elapsed = value - epoch();
    elapsed.num_seconds() as f64 / SECONDS_PER_DAY
}

/// Decode a day count, truncating the time of day to whole seconds.
pub fn decode_date(days: f64) -> Option<NaiveDateTime> {
    if !days.is_finite() {
        return None;
    }
    let exact = days * SECONDS_PER_DAY;
    let nearest = exact.round();
    let seconds = if (exact - nearest).abs() < SECOND_TOLERANCE {
        nearest
    } else {
        exact.floor()
    };
    if seconds.abs() > i64::MAX as f64 {
        return None;
    }
    epoch().checked_add_signed(Duration::try_seconds(seconds as i64)?)
}

/// Render a stored date: `YYYY-MM-DD`, plus ` HH:MM:SS` when the day count
/// has a fractional part.
pub fn format_date(days: f64) -> Option<String> {
    let value = decode_date(days)?;
    if days.fract() == 0.0 {
        Some(value.format("%Y-%m-%d").to_string())
    } else {
        Some(value.format("%Y-%m-%d %H:%M:%S").to_string())
    }
}

/// Make text safe for single-line delimited output.
pub fn escape_text(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\'' => escaped.push_str("''"),
            '"' => escaped.push('\''),
            '\r' => escaped.push_str("\\r"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            other if other.is_control() => {}
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn multi_accepts_both_forms() {
        assert_eq!(encode_multi(&[1, 3]), "1;3;");
        assert_eq!(decode_multi("1;3;"), [1, 3]);
        assert_eq!(decode_multi("1;3"), [1, 3]);
        assert!(decode_multi("").is_empty());
        assert!(decode_multi("-1").is_empty());
    }

    #[test]
    fn dates_render_with_optional_time() {
        let noon = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(12, 30, 15)
            .unwrap();
        let midnight = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        assert_eq!(encode_date(midnight), 45352.0);
        assert_eq!(format_date(encode_date(midnight)).unwrap(), "2024-03-01");
        assert_eq!(
            format_date(encode_date(noon)).unwrap(),
            "2024-03-01 12:30:15"
        );
        assert_eq!(decode_date(f64::NAN), None);
    }

    #[test]
    fn time_just_before_midnight_stays_on_its_day() {
        assert_eq!(
            format_date(45352.99999999).unwrap(),
            "2024-03-01 23:59:59"
        );
        assert_eq!(format_date(45352.000001).unwrap(), "2024-03-01 00:00:00");
    }

    #[test]
    fn escape_text_flattens_quotes_and_breaks() {
        assert_eq!(escape_text("it's \"ok\"\r\nnext"), "it''s 'ok'\\r\\nnext");
    }

    proptest! {
        #[test]
        fn date_round_trip_to_the_second(days in 0i64..80_000, seconds in 0u32..86_400) {
            let date = epoch().date() + Duration::days(days);
            let value = date.and_time(chrono::NaiveTime::MIN) + Duration::seconds(i64::from(seconds));
            prop_assert_eq!(decode_date(encode_date(value)), Some(value));
        }
    }
}
