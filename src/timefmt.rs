//! Parsing and printing archive wall-clock times on the command line.

use std::time::Duration;

use chrono::NaiveDateTime;

/// Accepted input layouts, tried in order.
const FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y%m%d-%H%M%S"];

/// Parse a local wall-clock time. Usable as a clap `value_parser`.
pub fn parse_time(s: &str) -> Result<NaiveDateTime, String> {
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| {
            format!("invalid time '{s}'; expected YYYY-MM-DD HH:MM:SS or YYYYMMDD-HHMMSS")
        })
}

/// Format a duration as `HH:MM:SS`, with milliseconds when present.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let millis = d.subsec_millis();
    let base = format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60);
    if millis == 0 {
        base
    } else {
        format!("{base}.{millis:03}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn expected() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 11, 4)
            .unwrap()
            .and_hms_opt(14, 35, 0)
            .unwrap()
    }

    #[test]
    fn accepts_every_layout() {
        assert_eq!(parse_time("2025-11-04 14:35:00").unwrap(), expected());
        assert_eq!(parse_time("2025-11-04T14:35:00").unwrap(), expected());
        assert_eq!(parse_time("20251104-143500").unwrap(), expected());
        assert_eq!(parse_time("  20251104-143500 ").unwrap(), expected());
    }

    #[test]
    fn rejects_garbage() {
        let err = parse_time("yesterday").unwrap_err();
        assert!(err.contains("invalid time 'yesterday'"));
        assert!(parse_time("2025-11-04").is_err());
        assert!(parse_time("2025-13-04 14:35:00").is_err());
    }

    #[test]
    fn formats_durations() {
        assert_eq!(format_duration(Duration::from_secs(600)), "00:10:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_duration(Duration::from_millis(1500)), "00:00:01.500");
    }
}
