use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

/// Current UTC time truncated to whole seconds.
///
/// Recorded timestamps are RFC3339 with second precision, so truncating up
/// front keeps in-memory values equal to what a reload produces.
pub fn now_utc() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// Formats a timestamp as RFC3339 (`2024-05-01T10:15:00Z`).
pub fn format_rfc3339(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Milliseconds since the Unix epoch.
pub fn to_epoch_millis(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn rfc3339_uses_second_precision_and_z_suffix() {
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 10, 15, 0).unwrap();
        assert_eq!(format_rfc3339(at), "2024-05-01T10:15:00Z");
    }

    #[test]
    fn epoch_millis() {
        let at = Utc.with_ymd_and_hms(1970, 1, 1, 0, 0, 2).unwrap();
        assert_eq!(to_epoch_millis(at), 2000);
    }

    #[test]
    fn now_has_no_subseconds() {
        assert_eq!(now_utc().timestamp_subsec_nanos(), 0);
    }
}
