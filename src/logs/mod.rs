use std::time::SystemTime;

use crate::api::LogTail;

/// Which stream a log line arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Access,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Access => "access",
            Self::Error => "error",
        }
    }
}

/// One structured log line handed to the rendering boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    /// Extracted leading timestamp, when the line carries one.
    pub timestamp: Option<SystemTime>,
    pub body: String,
    pub level: LogLevel,
}

/// Parse one raw log line, extracting a leading RFC 3339 timestamp token
/// when present. A line without one is all body, timestamp `None`.
pub fn parse_line(line: &str, level: LogLevel) -> LogRecord {
    let (token, rest) = match line.split_once(char::is_whitespace) {
        Some((token, rest)) => (token, rest),
        None => (line, ""),
    };

    match humantime::parse_rfc3339(token) {
        Ok(timestamp) => LogRecord {
            timestamp: Some(timestamp),
            body: rest.trim_start().to_string(),
            level,
        },
        Err(_) => LogRecord {
            timestamp: None,
            body: line.to_string(),
            level,
        },
    }
}

/// Structure a raw log tail into records, access lines first, preserving
/// per-stream order.
pub fn structure_tail(tail: &LogTail) -> Vec<LogRecord> {
    tail.access
        .iter()
        .map(|line| parse_line(line, LogLevel::Access))
        .chain(tail.error.iter().map(|line| parse_line(line, LogLevel::Error)))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;

    #[test]
    fn test_parse_line_with_leading_timestamp() {
        let record = parse_line(
            "2024-01-01T00:00:00Z GET /index.html 200",
            LogLevel::Access,
        );

        assert_eq!(
            record.timestamp,
            Some(UNIX_EPOCH + Duration::from_secs(1_704_067_200))
        );
        assert_eq!(record.body, "GET /index.html 200");
        assert_eq!(record.level, LogLevel::Access);
    }

    #[test]
    fn test_parse_line_with_fractional_seconds() {
        let record = parse_line(
            "2024-01-01T00:00:00.500Z upstream timed out",
            LogLevel::Error,
        );

        assert_eq!(
            record.timestamp,
            Some(UNIX_EPOCH + Duration::from_secs(1_704_067_200) + Duration::from_millis(500))
        );
        assert_eq!(record.body, "upstream timed out");
    }

    #[test]
    fn test_parse_line_without_timestamp_is_all_body() {
        let record = parse_line("connection refused to backend", LogLevel::Error);

        assert_eq!(record.timestamp, None);
        assert_eq!(record.body, "connection refused to backend");
        assert_eq!(record.level, LogLevel::Error);
    }

    #[test]
    fn test_parse_line_with_non_timestamp_leading_token() {
        // Date-only tokens do not match; the whole line stays intact.
        let record = parse_line("2024-01-01 GET / 200", LogLevel::Access);

        assert_eq!(record.timestamp, None);
        assert_eq!(record.body, "2024-01-01 GET / 200");
    }

    #[test]
    fn test_parse_line_timestamp_only() {
        let record = parse_line("2024-01-01T00:00:00Z", LogLevel::Access);

        assert!(record.timestamp.is_some());
        assert!(record.body.is_empty());
    }

    #[test]
    fn test_parse_empty_line() {
        let record = parse_line("", LogLevel::Access);
        assert_eq!(record.timestamp, None);
        assert!(record.body.is_empty());
    }

    #[test]
    fn test_structure_tail_preserves_order_and_levels() {
        let tail = LogTail {
            access: vec![
                "2024-01-01T00:00:00Z GET / 200".to_string(),
                "GET /health 200".to_string(),
            ],
            error: vec!["500 internal error".to_string()],
        };

        let records = structure_tail(&tail);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].level, LogLevel::Access);
        assert!(records[0].timestamp.is_some());
        assert_eq!(records[1].body, "GET /health 200");
        assert_eq!(records[2].level, LogLevel::Error);
        assert_eq!(records[2].body, "500 internal error");
    }
}
