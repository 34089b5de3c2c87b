//! Units formatting and conversion utilities
//!
//! Human-readable rendering of measured durations and phase speedups, and
//! parsing of duration arguments.

use std::time::Duration;

/// Format a duration given in seconds with a unit suited to its magnitude
///
/// # Examples
/// ```
/// use pipebench::util::units::format_seconds;
///
/// assert_eq!(format_seconds(0.918224), "918.224ms");
/// assert_eq!(format_seconds(2.5), "2.500000s");
/// assert_eq!(format_seconds(0.000042), "42.0µs");
/// ```
pub fn format_seconds(seconds: f64) -> String {
    if seconds >= 1.0 {
        format!("{:.6}s", seconds)
    } else if seconds >= 0.001 {
        format!("{:.3}ms", seconds * 1_000.0)
    } else {
        format!("{:.1}µs", seconds * 1_000_000.0)
    }
}

/// Format a baseline/candidate ratio as "N.Nx faster" or "N.Nx slower"
///
/// # Examples
/// ```
/// use pipebench::util::units::format_speedup;
///
/// assert_eq!(format_speedup(Some(6.5)), "6.5x faster");
/// assert_eq!(format_speedup(Some(0.5)), "2.0x slower");
/// assert_eq!(format_speedup(None), "n/a");
/// ```
pub fn format_speedup(speedup: Option<f64>) -> String {
    match speedup {
        Some(ratio) if ratio >= 1.0 => format!("{:.1}x faster", ratio),
        Some(ratio) if ratio > 0.0 => format!("{:.1}x slower", 1.0 / ratio),
        _ => "n/a".to_string(),
    }
}

/// Format a duration the way it is written in config files ("1m 30s")
pub fn format_duration(duration: Duration) -> String {
    humantime::format_duration(duration).to_string()
}

/// Parse duration string into Duration
///
/// Supports formats like: "10s", "1m 30s", "500ms"
///
/// # Examples
/// ```
/// use std::time::Duration;
/// use pipebench::util::units::parse_duration;
///
/// assert_eq!(parse_duration("10s").unwrap(), Duration::from_secs(10));
/// assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
/// ```
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let input = input.trim();
    if input == "0" {
        return Ok(Duration::ZERO);
    }
    humantime::parse_duration(input).map_err(|e| format!("Invalid duration '{}': {}", input, e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_seconds() {
        assert_eq!(format_seconds(0.141815), "141.815ms");
        assert_eq!(format_seconds(1.0), "1.000000s");
        assert_eq!(format_seconds(0.0005), "500.0µs");
        assert_eq!(format_seconds(0.0), "0.0µs");
    }

    #[test]
    fn test_format_speedup() {
        assert_eq!(format_speedup(Some(1.0)), "1.0x faster");
        assert_eq!(format_speedup(Some(0.25)), "4.0x slower");
        assert_eq!(format_speedup(Some(0.0)), "n/a");
    }

    #[test]
    fn test_duration_round_trip() {
        assert_eq!(format_duration(Duration::from_secs(90)), "1m 30s");
        assert_eq!(parse_duration("1m 30s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("250ms").unwrap(), Duration::from_millis(250));
        assert_eq!(parse_duration("0").unwrap(), Duration::ZERO);

        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("1x").is_err());
    }
}
