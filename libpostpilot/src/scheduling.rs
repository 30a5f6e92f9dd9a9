//! Publish-slot computation and the approval window
//!
//! Posts are queued into a fixed set of daily publish slots rather than
//! published the moment they become eligible.

use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};

/// Daily publish slots, UTC hours. Always picked strictly after "now".
pub const PREFERRED_HOURS: [u32; 3] = [9, 14, 18];

/// How long an approval request stays answerable before the expiry sweep
/// cancels the post.
pub const APPROVAL_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Compute the next preferred publish slot strictly after `after`.
///
/// Picks the first slot hour later than `after`'s hour on the same day, or
/// rolls over to the first slot of the next day once all of today's slots
/// have passed. Slots land on exact hour boundaries (minute and second zero).
pub fn next_preferred_slot(after: DateTime<Utc>) -> DateTime<Utc> {
    let next_hour = PREFERRED_HOURS.iter().copied().find(|h| *h > after.hour());

    let (date, hour) = match next_hour {
        Some(hour) => (after.date_naive(), hour),
        None => (after.date_naive() + Duration::days(1), PREFERRED_HOURS[0]),
    };

    let slot = date
        .and_hms_opt(hour, 0, 0)
        .expect("preferred hours are valid times of day");
    Utc.from_utc_datetime(&slot)
}

/// Same computation over Unix-second timestamps, as stored on posts.
pub fn next_preferred_slot_ts(after_ts: i64) -> i64 {
    let after = DateTime::from_timestamp(after_ts, 0).unwrap_or_else(Utc::now);
    next_preferred_slot(after).timestamp()
}

/// Cutoff before which a still-pending approval counts as stale.
pub fn approval_cutoff(now: i64) -> i64 {
    now - APPROVAL_WINDOW_SECS
}
