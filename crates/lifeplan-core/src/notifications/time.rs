//! Berlin-timezone send-window arithmetic (C15).
//!
//! Quiet hours run outside `[08:00, 20:00)` local Europe/Berlin time. All
//! reminder dispatch timing funnels through this module so the boundary
//! lives in exactly one place.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Europe::Berlin;
use chrono_tz::Tz;

const QUIET_HOURS_START: (u32, u32) = (8, 0);
const QUIET_HOURS_END: (u32, u32) = (20, 0);

fn quiet_start() -> NaiveTime {
    NaiveTime::from_hms_opt(QUIET_HOURS_START.0, QUIET_HOURS_START.1, 0).unwrap()
}

fn quiet_end() -> NaiveTime {
    NaiveTime::from_hms_opt(QUIET_HOURS_END.0, QUIET_HOURS_END.1, 0).unwrap()
}

/// The current instant, for callers that want a single injectable "now".
pub fn now_utc() -> DateTime<Utc> {
    Utc::now()
}

/// Whether `at` (any timezone) falls inside the Berlin send window.
pub fn is_within_send_window(at: DateTime<Utc>) -> bool {
    let local = at.with_timezone(&Berlin).time();
    local >= quiet_start() && local <= quiet_end()
}

/// The next moment the send window opens, at or after `at`.
///
/// If `at` is already inside today's window, callers should check
/// [`is_within_send_window`] first — this always returns the *next*
/// opening, which may be tomorrow's if `at` is past today's `quiet_start`.
pub fn next_send_window_start(at: DateTime<Utc>) -> DateTime<Utc> {
    let local: DateTime<Tz> = at.with_timezone(&Berlin);
    let local_time = local.time();

    let candidate_date = if local_time < quiet_start() {
        local.date_naive()
    } else {
        local.date_naive() + Duration::days(1)
    };

    local_midnight_plus(candidate_date, quiet_start())
}

fn local_midnight_plus(date: NaiveDate, time: NaiveTime) -> DateTime<Utc> {
    let naive = date.and_time(time);
    Berlin
        .from_local_datetime(&naive)
        .single()
        .unwrap_or_else(|| Berlin.from_utc_datetime(&naive))
        .with_timezone(&Utc)
}

/// The `[today, today+3days]` inclusive local-date window "due soon" scans
/// over.
pub fn due_soon_window(at: DateTime<Utc>) -> (NaiveDate, NaiveDate) {
    let today = at.with_timezone(&Berlin).date_naive();
    (today, today + Duration::days(3))
}

/// Today's local (Berlin) calendar date for `at`.
pub fn local_today(at: DateTime<Utc>) -> NaiveDate {
    at.with_timezone(&Berlin).date_naive()
}

/// The UTC instants bounding `at`'s Berlin calendar day: `[start, end)`.
///
/// Daily reminder caps count rows created within the *local* day, so the
/// local midnights are converted back to UTC before hitting the store.
pub fn local_day_utc_bounds(at: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = local_today(at);
    let start = local_midnight_plus(today, NaiveTime::MIN);
    let end = local_midnight_plus(today + Duration::days(1), NaiveTime::MIN);
    (start, end)
}
