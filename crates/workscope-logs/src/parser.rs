use std::sync::LazyLock;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeDelta, Utc};
use regex::Regex;
use tracing::debug;
use workscope_types::{LogEntry, Severity};

static SEVERITY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)ERROR|WARN|DEBUG|TRACE").expect("severity pattern is valid"));

/// `start + duration`, saturating at the representable range
fn window_end(start: DateTime<Utc>, duration: TimeDelta) -> DateTime<Utc> {
    start.checked_add_signed(duration).unwrap_or(if duration < TimeDelta::zero() {
        DateTime::<Utc>::MIN_UTC
    } else {
        DateTime::<Utc>::MAX_UTC
    })
}

/// Parser for timestamped container logs
pub struct LogParser;

impl LogParser {
    /// Parse raw `<timestamp> <message>` output into entries.
    ///
    /// With a `duration`, lines later than the window end are cut. The end is
    /// `since_time + duration`, or the first parsed line's time plus
    /// `duration` when no start was requested. `tail_lines` then keeps the
    /// last N entries of the window.
    pub fn parse_window(
        raw: &str,
        since_time: Option<DateTime<Utc>>,
        duration: Option<TimeDelta>,
        tail_lines: Option<i64>,
    ) -> Vec<LogEntry> {
        let mut entries = Vec::new();
        let mut end: Option<DateTime<Utc>> =
            since_time.zip(duration).map(|(s, d)| window_end(s, d));

        for line in raw.lines() {
            let Some((timestamp, message)) = line.split_once(' ') else {
                debug!(line, "skipping unexpected log line");
                continue;
            };

            let message = message.trim();
            if message.is_empty() {
                debug!(line, "skipping empty log line");
                continue;
            }

            let Some(time) = Self::parse_timestamp(timestamp) else {
                debug!(timestamp, "failed to parse log timestamp, skipping");
                continue;
            };

            if let Some(duration) = duration {
                let end = *end.get_or_insert_with(|| window_end(time, duration));
                if time > end {
                    break;
                }
            }

            entries.push(LogEntry {
                message: message.to_string(),
                severity: Self::extract_severity(line),
                timestamp: time.to_rfc3339_opts(SecondsFormat::Secs, true),
                timestamp_unix: time.timestamp(),
            });
        }

        if duration.is_some() {
            if let Some(tail) = tail_lines.and_then(|n| usize::try_from(n).ok()) {
                if entries.len() > tail {
                    entries.drain(..entries.len() - tail);
                }
            }
        }

        entries
    }

    /// Parse a log timestamp at second precision. Fractional timestamps and
    /// timestamps without an offset are read as UTC.
    fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
        let (seconds, fractional) = match raw.split_once('.') {
            Some((head, _)) => (head, true),
            None => (raw, false),
        };

        if !fractional {
            if let Ok(ts) = DateTime::parse_from_rfc3339(seconds) {
                return Some(ts.with_timezone(&Utc));
            }
        }

        let seconds = seconds.strip_suffix('Z').unwrap_or(seconds);
        NaiveDateTime::parse_from_str(seconds, "%Y-%m-%dT%H:%M:%S")
            .ok()
            .map(|naive| naive.and_utc())
    }

    /// First severity keyword found in the line, INFO when there is none
    fn extract_severity(line: &str) -> Severity {
        SEVERITY
            .find(line)
            .and_then(|m| Severity::from_keyword(m.as_str()))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LOGS: &str = "\
2024-01-15T10:30:00.123456789Z starting server
2024-01-15T10:30:01.000000001Z WARN cache is cold
2024-01-15T10:30:02.5Z error: upstream connect timeout
2024-01-15T10:30:03Z request served
2024-01-15T10:30:04Z debug: pool size 4
2024-01-15T10:30:05Z shutting down
";

    fn messages(entries: &[LogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.message.as_str()).collect()
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let entries = LogParser::parse_window(LOGS, None, None, Some(1));
        // Without a window the tail was already applied by the server
        assert_eq!(entries.len(), 6);
    }

    #[test]
    fn test_window_from_first_line_is_inclusive() {
        let entries = LogParser::parse_window(LOGS, None, Some(TimeDelta::seconds(2)), None);
        assert_eq!(
            messages(&entries),
            vec![
                "starting server",
                "WARN cache is cold",
                "error: upstream connect timeout"
            ]
        );
    }

    #[test]
    fn test_tail_applies_inside_window() {
        let entries = LogParser::parse_window(LOGS, None, Some(TimeDelta::seconds(2)), Some(1));
        assert_eq!(messages(&entries), vec!["error: upstream connect timeout"]);
    }

    #[test]
    fn test_window_from_requested_start() {
        let since = DateTime::parse_from_rfc3339("2024-01-15T10:29:59Z")
            .unwrap()
            .with_timezone(&Utc);
        let entries = LogParser::parse_window(LOGS, Some(since), Some(TimeDelta::seconds(2)), None);
        assert_eq!(
            messages(&entries),
            vec!["starting server", "WARN cache is cold"]
        );
    }

    #[test]
    fn test_window_end_saturates() {
        let since = DateTime::<Utc>::MAX_UTC - TimeDelta::seconds(1);
        let entries = LogParser::parse_window(LOGS, Some(since), Some(TimeDelta::hours(1)), None);
        assert_eq!(entries.len(), 6);

        let entries = LogParser::parse_window(LOGS, None, Some(TimeDelta::MAX), Some(2));
        assert_eq!(messages(&entries), vec!["debug: pool size 4", "shutting down"]);
    }

    #[test]
    fn test_severity() {
        let entries = LogParser::parse_window(LOGS, None, None, None);
        let severities: Vec<Severity> = entries.iter().map(|e| e.severity).collect();
        assert_eq!(
            severities,
            vec![
                Severity::Info,
                Severity::Warn,
                Severity::Error,
                Severity::Info,
                Severity::Debug,
                Severity::Info,
            ]
        );
    }

    #[test]
    fn test_timestamps_truncate_to_seconds() {
        let entries = LogParser::parse_window(LOGS, None, None, None);
        assert_eq!(entries[0].timestamp, "2024-01-15T10:30:00Z");
        assert_eq!(entries[2].timestamp, "2024-01-15T10:30:02Z");
        assert_eq!(entries[0].timestamp_unix, 1_705_314_600);
    }

    #[test]
    fn test_bare_timestamp_is_utc() {
        let entries = LogParser::parse_window("2024-01-15T10:30:00 hello\n", None, None, None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].timestamp, "2024-01-15T10:30:00Z");
    }

    #[test]
    fn test_offset_timestamp_is_normalized() {
        let entries =
            LogParser::parse_window("2024-01-15T12:30:00+02:00 hello\n", None, None, None);
        assert_eq!(entries[0].timestamp, "2024-01-15T10:30:00Z");
    }

    #[test]
    fn test_malformed_lines_are_skipped() {
        let raw = "\
no-space-here
2024-01-15T10:30:00Z
yesterday something happened
2024-01-15T10:30:01Z kept
";
        let entries = LogParser::parse_window(raw, None, None, None);
        assert_eq!(messages(&entries), vec!["kept"]);
    }

    #[test]
    fn test_message_is_trimmed() {
        let entries = LogParser::parse_window("2024-01-15T10:30:00Z   padded  \n", None, None, None);
        assert_eq!(entries[0].message, "padded");
    }
}
