use crate::StreamVaultError;

/// A validated clip range in seconds. `end == None` means "to end of source".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeRange {
    pub start: f64,
    pub end: Option<f64>,
}

impl TimeRange {
    /// Everything from the beginning of the source.
    pub const FULL: TimeRange = TimeRange { start: 0.0, end: None };

    /// Target duration when the end is bounded.
    pub fn duration(&self) -> Option<f64> {
        self.end.map(|end| end - self.start)
    }
}

/// Keywords mapping to the whole source, including the localized synonym
/// used by the chat surface.
const WHOLE_SOURCE_KEYWORDS: &[&str] = &["all", "full", "entire", "전체"];

const SEPARATOR: char = '~';

/// Parse a human range expression like `00:05:00~00:12:30`, `10:00~`, `~90`
/// or `all` into validated clip boundaries.
pub fn parse_range(expr: &str) -> crate::Result<TimeRange> {
    let trimmed = expr.trim();
    if trimmed.is_empty() {
        return Err(StreamVaultError::Validation(
            "empty range, use start~end or 'all'".to_string(),
        )
        .into());
    }

    if WHOLE_SOURCE_KEYWORDS.contains(&trimmed.to_lowercase().as_str()) {
        return Ok(TimeRange::FULL);
    }

    let parts: Vec<&str> = trimmed.split(SEPARATOR).collect();
    if parts.len() != 2 {
        return Err(StreamVaultError::Validation(format!(
            "range must contain exactly one '{}' separator: {}",
            SEPARATOR, trimmed
        ))
        .into());
    }

    let start = match parts[0].trim() {
        "" => 0.0,
        text => parse_clock(text)?,
    };
    let end = match parts[1].trim() {
        "" => None,
        text => Some(parse_clock(text)?),
    };

    if let Some(end) = end {
        if end <= start {
            return Err(StreamVaultError::Validation(format!(
                "range end ({}) must be after start ({})",
                format_clock(end),
                format_clock(start)
            ))
            .into());
        }
    }

    Ok(TimeRange { start, end })
}

/// Parse up to three colon-separated components with hours:minutes:seconds
/// weighting; fractional seconds are allowed.
fn parse_clock(text: &str) -> crate::Result<f64> {
    let components: Vec<&str> = text.split(':').collect();
    if components.is_empty() || components.len() > 3 {
        return Err(StreamVaultError::Validation(format!(
            "expected H:M:S, M:S or S, got: {}",
            text
        ))
        .into());
    }

    let mut total = 0.0;
    for component in &components {
        let value: f64 = component.trim().parse().map_err(|_| {
            StreamVaultError::Validation(format!("not a number: {}", component.trim()))
        })?;
        if value < 0.0 {
            return Err(
                StreamVaultError::Validation(format!("negative time component: {}", value)).into(),
            );
        }
        total = total * 60.0 + value;
    }

    Ok(total)
}

/// Render seconds as HH:MM:SS for messages.
pub fn format_clock(seconds: f64) -> String {
    let total = seconds as u64;
    format!("{:02}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_clock_range() {
        let range = parse_range("00:05:00~00:12:30").unwrap();
        assert_eq!(range.start, 300.0);
        assert_eq!(range.end, Some(750.0));
        assert_eq!(range.duration(), Some(450.0));
    }

    #[test]
    fn test_open_end() {
        let range = parse_range("00:10:00~").unwrap();
        assert_eq!(range.start, 600.0);
        assert_eq!(range.end, None);
        assert_eq!(range.duration(), None);
    }

    #[test]
    fn test_open_start() {
        let range = parse_range("~90").unwrap();
        assert_eq!(range.start, 0.0);
        assert_eq!(range.end, Some(90.0));
    }

    #[test]
    fn test_whole_source_keywords() {
        for expr in ["all", "FULL", "entire", "전체"] {
            let range = parse_range(expr).unwrap();
            assert_eq!(range, TimeRange::FULL);
        }
    }

    #[test]
    fn test_two_component_weighting() {
        let range = parse_range("1:30~2:15.5").unwrap();
        assert_eq!(range.start, 90.0);
        assert_eq!(range.end, Some(135.5));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let err = parse_range("10~5").unwrap_err();
        assert!(err.to_string().contains("after start"));
    }

    #[test]
    fn test_equal_bounds_rejected() {
        assert!(parse_range("10~10").is_err());
    }

    #[test]
    fn test_malformed_rejected() {
        assert!(parse_range("").is_err());
        assert!(parse_range("10").is_err());
        assert!(parse_range("1~2~3").is_err());
        assert!(parse_range("abc~10").is_err());
        assert!(parse_range("1:2:3:4~10").is_err());
        assert!(parse_range("-5~10").is_err());
    }

    #[test]
    fn test_format_clock() {
        assert_eq!(format_clock(0.0), "00:00:00");
        assert_eq!(format_clock(750.0), "00:12:30");
        assert_eq!(format_clock(3661.0), "01:01:01");
    }
}
