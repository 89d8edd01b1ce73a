//! Duration strings used in the configuration file.

use anyhow::Context;

const UNITS: [(char, i64); 4] = [('d', 86_400), ('h', 3_600), ('m', 60), ('s', 1)];

/// Parse a duration string like "24h", "30m", "10s" or "10" into seconds.
///
/// A plain number is seconds. Negative durations are rejected.
pub fn parse_duration_to_secs(s: &str) -> anyhow::Result<i64> {
    let s = s.trim();
    if s.is_empty() {
        anyhow::bail!("Empty duration string");
    }

    let (digits, scale) = UNITS
        .iter()
        .find_map(|&(suffix, scale)| s.strip_suffix(suffix).map(|n| (n.trim(), scale)))
        .unwrap_or((s, 1));

    let value: i64 = digits
        .parse()
        .with_context(|| format!("Invalid duration value: {s}"))?;
    if value < 0 {
        anyhow::bail!("Duration must not be negative: {s}");
    }
    value
        .checked_mul(scale)
        .with_context(|| format!("Duration too large: {s}"))
}

/// Parse a duration string into a [`chrono::Duration`].
///
/// Fails when the value exceeds what a `chrono::Duration` can hold.
pub fn parse_duration(s: &str) -> anyhow::Result<chrono::Duration> {
    let secs = parse_duration_to_secs(s)?;
    chrono::Duration::try_seconds(secs).with_context(|| format!("Duration out of range: {s}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_units() {
        assert_eq!(parse_duration_to_secs("10").unwrap(), 10);
        assert_eq!(parse_duration_to_secs("10s").unwrap(), 10);
        assert_eq!(parse_duration_to_secs("30m").unwrap(), 1_800);
        assert_eq!(parse_duration_to_secs(" 24h ").unwrap(), 86_400);
        assert_eq!(parse_duration_to_secs("2d").unwrap(), 172_800);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(parse_duration_to_secs("").is_err());
        assert!(parse_duration_to_secs("abc").is_err());
        assert!(parse_duration_to_secs("-5s").is_err());
        assert!(parse_duration_to_secs("5w").is_err());
    }

    #[test]
    fn test_duration_range() {
        assert_eq!(parse_duration("24h").unwrap(), chrono::Duration::hours(24));
        assert!(parse_duration_to_secs("9223372036854775807s").is_ok());
        assert!(parse_duration("9223372036854775807s").is_err());
        assert!(parse_duration("9223372036854775807d").is_err());
    }
}
