//! Wall-clock → UTC conversion for the schedule form.
//!
//! The form submits a naive `YYYY-MM-DDTHH:MM` string that is interpreted in
//! the configured IANA zone. Daylight-saving transitions resolve as follows:
//!
//! | Local time            | Result                                          |
//! |-----------------------|-------------------------------------------------|
//! | unambiguous           | the single matching instant                     |
//! | fold (occurs twice)   | the standard-offset reading (the later instant) |
//! | gap (never occurs)    | the first valid instant after the gap           |
//!
//! Both rules keep the mapping non-decreasing in the local input.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, TimeZone, Utc};
use chrono_tz::{OffsetComponents, Tz};
use thiserror::Error;

/// Format accepted from the `datetime` form field (HTML `datetime-local`).
pub const LOCAL_FORMAT: &str = "%Y-%m-%dT%H:%M";

/// Upper bound when scanning forward out of a DST gap.
const MAX_GAP_MINUTES: i64 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The input does not match [`LOCAL_FORMAT`].
    #[error("expected a date and time like 2024-07-15T09:00, got {input:?}")]
    Parse { input: String },

    /// The local time falls in a gap with no valid instant after it.
    #[error("{local} does not exist in {zone}")]
    Nonexistent { local: String, zone: String },

    /// The zone name is not in the IANA database.
    #[error("unknown timezone: {0}")]
    UnknownZone(String),
}

/// Resolve an IANA zone name such as `America/Vancouver`.
pub fn parse_zone(name: &str) -> Result<Tz, TimeError> {
    name.parse::<Tz>()
        .map_err(|_| TimeError::UnknownZone(name.to_string()))
}

/// Parse the naive form value without attaching a zone.
pub fn parse_local(input: &str) -> Result<NaiveDateTime, TimeError> {
    NaiveDateTime::parse_from_str(input.trim(), LOCAL_FORMAT).map_err(|_| TimeError::Parse {
        input: input.to_string(),
    })
}

/// Convert a naive local datetime string in `zone` to an absolute UTC deadline.
pub fn to_utc_deadline(local: &str, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    let naive = parse_local(local)?;
    resolve_local(naive, zone)
}

/// Attach `zone` to `naive`, applying the fold/gap policy described above.
pub fn resolve_local(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    match zone.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(a, b) => {
            let standard = [a, b]
                .into_iter()
                .find(|dt| dt.offset().dst_offset() == Duration::zero())
                .unwrap_or_else(|| a.max(b));
            Ok(standard.with_timezone(&Utc))
        }
        LocalResult::None => end_of_gap(naive, zone),
    }
}

/// Format an instant as wall-clock time in `zone`, using [`LOCAL_FORMAT`].
pub fn to_local_string(instant: DateTime<Utc>, zone: Tz) -> String {
    instant.with_timezone(&zone).format(LOCAL_FORMAT).to_string()
}

fn end_of_gap(naive: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, TimeError> {
    let mut candidate = naive;
    for _ in 0..MAX_GAP_MINUTES {
        candidate += Duration::minutes(1);
        if let Some(dt) = zone.from_local_datetime(&candidate).earliest() {
            tracing::debug!(local = %naive, zone = %zone, resolved = %dt, "local time in DST gap; clamped forward");
            return Ok(dt.with_timezone(&Utc));
        }
    }
    Err(TimeError::Nonexistent {
        local: naive.format(LOCAL_FORMAT).to_string(),
        zone: zone.name().to_string(),
    })
}
