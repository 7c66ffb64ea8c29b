//! Conversion between [`DateTime<Utc>`] and 100-nanosecond "ticks" since
//! 0001-01-01, the on-disk time encoding required for bit-compat with
//! existing deployments.

use chrono::{DateTime, Utc};

/// Ticks between 0001-01-01T00:00:00Z and the Unix epoch.
const TICKS_AT_UNIX_EPOCH: i64 = 621_355_968_000_000_000;

/// One tick is 100ns; a second is 10_000_000 ticks.
const TICKS_PER_SECOND: i64 = 10_000_000;
const NANOS_PER_TICK: i64 = 100;

/// Sentinel meaning "never expires". Corresponds to the maximum tick value
/// representable in the `CreatedAt`/`Expiration` columns.
pub const NEVER_TICKS: i64 = i64::MAX;

/// Convert a UTC instant to ticks since 0001-01-01.
///
/// Saturates to [`NEVER_TICKS`] rather than overflow/panic for instants far
/// enough in the future that the tick count would not fit in an `i64`.
pub fn to_ticks(dt: DateTime<Utc>) -> i64 {
    let unix_secs = dt.timestamp();
    let unix_nanos = dt.timestamp_subsec_nanos() as i64;

    let Some(unix_ticks) = unix_secs
        .checked_mul(TICKS_PER_SECOND)
        .and_then(|t| t.checked_add(unix_nanos / NANOS_PER_TICK))
    else {
        return NEVER_TICKS;
    };

    unix_ticks
        .checked_add(TICKS_AT_UNIX_EPOCH)
        .unwrap_or(NEVER_TICKS)
}

/// Convert ticks since 0001-01-01 back to a UTC instant.
///
/// [`NEVER_TICKS`] maps to [`DateTime::<Utc>::MAX_UTC`].
pub fn from_ticks(ticks: i64) -> DateTime<Utc> {
    if ticks == NEVER_TICKS {
        return DateTime::<Utc>::MAX_UTC;
    }

    let unix_ticks = ticks - TICKS_AT_UNIX_EPOCH;
    let unix_secs = unix_ticks.div_euclid(TICKS_PER_SECOND);
    let remainder_ticks = unix_ticks.rem_euclid(TICKS_PER_SECOND);
    let nanos = (remainder_ticks * NANOS_PER_TICK) as u32;

    DateTime::<Utc>::from_timestamp(unix_secs, nanos).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// The "never expires" instant, as represented in memory. Deliberately a
/// finite (but enormous) timestamp rather than a separate `Option` so that
/// ordinary `expires_at <= now` comparisons don't need a special case.
pub fn never() -> DateTime<Utc> {
    from_ticks(NEVER_TICKS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn round_trips_unix_epoch() {
        let epoch = Utc.timestamp_opt(0, 0).unwrap();
        assert_eq!(to_ticks(epoch), TICKS_AT_UNIX_EPOCH);
        assert_eq!(from_ticks(TICKS_AT_UNIX_EPOCH), epoch);
    }

    #[test]
    fn round_trips_arbitrary_instant() {
        let dt = Utc.with_ymd_and_hms(2024, 3, 15, 12, 30, 45).unwrap();
        let ticks = to_ticks(dt);
        let back = from_ticks(ticks);
        assert_eq!(dt, back);
    }

    #[test]
    fn never_sentinel_is_stable() {
        assert_eq!(to_ticks(never()), NEVER_TICKS);
    }

    #[test]
    fn sub_second_precision_survives() {
        let dt = Utc.timestamp_opt(1_700_000_000, 123_400).unwrap();
        let ticks = to_ticks(dt);
        let back = from_ticks(ticks);
        assert_eq!(dt, back);
    }
}
