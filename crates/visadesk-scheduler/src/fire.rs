//! Fire-time computation: due date + reminder time in the organization's zone.

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use visadesk_core::deadline::ReminderTime;
use visadesk_core::error::{Result, VisaDeskError};

/// The instant a reminder should fire.
///
/// Year/month/day come from `date`, hour/minute from `time`, seconds are zero,
/// and the wall-clock result is read in `tz`. When a DST fall-back makes the
/// local time ambiguous the earlier instant wins; a local time that falls in
/// a spring-forward gap does not exist and is rejected.
pub fn fire_instant(date: NaiveDate, time: ReminderTime, tz: Tz) -> Result<DateTime<Utc>> {
    let local = date.and_time(time.as_naive());
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .ok_or_else(|| {
            VisaDeskError::Schedule(format!(
                "{local} does not exist in {tz} (DST gap)"
            ))
        })
}

/// Parse an IANA zone name such as `Asia/Kathmandu`.
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| VisaDeskError::Timezone(name.to_string()))
}
