use chrono::{DateTime, Utc};

/// `from` から `to` までの経過時間（時間単位、小数）。
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub(crate) fn hours_between(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_seconds() as f64 / 3600.0
}

/// `YYYY-MM-DD` 形式の日付文字列。
#[must_use]
pub(crate) fn date_string(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn hours_between_handles_fractions() {
        let from = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2026, 2, 1, 1, 30, 0).unwrap();
        assert!((hours_between(from, to) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn date_string_is_iso_date() {
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 23, 59, 0).unwrap();
        assert_eq!(date_string(at), "2026-02-01");
    }
}
