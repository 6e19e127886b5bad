use chrono::{DateTime, NaiveDate, NaiveDateTime};
use chrono_tz::Tz;
use tracing::{debug, warn};

/// Naive datetime layouts accepted in addition to RFC 3339.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
];

// ── System timezone detection ─────────────────────────────────────────────────

/// Detect the IANA timezone name of the running system.
///
/// Falls back to `"UTC"` if detection fails.
pub fn get_system_timezone() -> String {
    iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string())
}

// ── TimezoneHandler ───────────────────────────────────────────────────────────

/// Timezone-aware timestamp parsing used to assign records to calendar days.
#[derive(Debug, Clone, Copy)]
pub struct TimezoneHandler {
    default_tz: Tz,
}

impl Default for TimezoneHandler {
    fn default() -> Self {
        Self { default_tz: Tz::UTC }
    }
}

impl TimezoneHandler {
    /// Create a handler with the given IANA timezone name as the default.
    ///
    /// If `tz_name` is not a recognised IANA timezone, falls back to UTC
    /// and logs a warning.
    pub fn new(tz_name: &str) -> Self {
        let tz = tz_name.parse::<Tz>().unwrap_or_else(|_| {
            warn!(
                "TimezoneHandler: unrecognised timezone \"{}\", falling back to UTC",
                tz_name
            );
            Tz::UTC
        });
        Self { default_tz: tz }
    }

    /// Build a handler from an optional name; `None` means UTC.
    pub fn from_optional(tz_name: Option<&str>) -> Self {
        tz_name.map(Self::new).unwrap_or_default()
    }

    /// Calendar day `s` falls on in the handler's timezone.
    ///
    /// - RFC 3339 values carry their own offset and are converted into the
    ///   handler's timezone first.
    /// - A bare `YYYY-MM-DD` or a naive datetime is already wall-clock time
    ///   there, so its date is taken as written. This also holds for local
    ///   times skipped by a DST transition.
    ///
    /// Returns `None` for empty strings and unknown layouts.
    pub fn local_date(&self, s: &str) -> Option<NaiveDate> {
        let s = s.trim();
        if s.is_empty() {
            return None;
        }

        if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
            return Some(date);
        }

        if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
            return Some(dt.with_timezone(&self.default_tz).date_naive());
        }

        let naive = NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok());
        if naive.is_none() {
            debug!("TimezoneHandler: could not parse timestamp \"{}\"", s);
        }
        naive.map(|dt| dt.date())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
