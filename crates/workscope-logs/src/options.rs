use std::sync::LazyLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;
use workscope_k8s::PodLogRequest;

use crate::LogError;

static DURATION_PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d+\.?\d*|\.\d+)(ns|us|µs|μs|ms|s|m|h)").expect("duration pattern is valid")
});

fn unit_nanos(unit: &str) -> f64 {
    match unit {
        "ns" => 1.0,
        "us" | "µs" | "μs" => 1e3,
        "ms" => 1e6,
        "s" => 1e9,
        "m" => 60.0 * 1e9,
        _ => 3600.0 * 1e9,
    }
}

/// Parse a duration such as `1h30m`, `2.5s` or `300ms`
pub fn parse_duration(input: &str) -> Result<TimeDelta, LogError> {
    let invalid = |reason: &str| LogError::InvalidDuration {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let (negative, body) = match input.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, input.strip_prefix('+').unwrap_or(input)),
    };
    if body == "0" {
        return Ok(TimeDelta::zero());
    }
    if body.is_empty() {
        return Err(invalid("empty duration"));
    }

    let mut consumed = 0;
    let mut nanos = 0.0;
    for caps in DURATION_PART.captures_iter(body) {
        let (Some(whole), Some(number), Some(unit)) = (caps.get(0), caps.get(1), caps.get(2))
        else {
            continue;
        };
        if whole.start() != consumed {
            return Err(invalid("unexpected characters"));
        }
        consumed = whole.end();

        let value: f64 = number
            .as_str()
            .parse()
            .map_err(|_| invalid("invalid number"))?;
        nanos += value * unit_nanos(unit.as_str());
    }

    if consumed != body.len() {
        return Err(invalid("missing or unknown unit"));
    }
    if !nanos.is_finite() || nanos > i64::MAX as f64 {
        return Err(invalid("duration out of range"));
    }

    let delta = TimeDelta::nanoseconds(nanos.round() as i64);
    Ok(if negative { -delta } else { delta })
}

/// Log retrieval criteria
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub container: Option<String>,
    pub since_time: Option<DateTime<Utc>>,
    /// Length of the window starting at `since_time` (or at the first line)
    pub duration: Option<TimeDelta>,
    pub tail_lines: Option<i64>,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl LogOptions {
    /// Validate raw request criteria. Empty values count as absent and
    /// non-positive tail counts are ignored.
    pub fn from_criteria(
        container: Option<&str>,
        duration: Option<&str>,
        since_time: Option<&str>,
        tail_lines: Option<&str>,
    ) -> Result<Self, LogError> {
        let mut opts = LogOptions {
            container: present(container).map(str::to_string),
            ..Default::default()
        };

        if let Some(duration) = present(duration) {
            opts.duration = Some(parse_duration(duration)?);
        }

        if let Some(since) = present(since_time) {
            let secs: i64 = since.parse().map_err(|e| LogError::InvalidSinceTime {
                input: since.to_string(),
                reason: format!("{}", e),
            })?;
            let time = DateTime::from_timestamp(secs, 0).ok_or_else(|| {
                LogError::InvalidSinceTime {
                    input: since.to_string(),
                    reason: "out of range".to_string(),
                }
            })?;
            opts.since_time = Some(time);
        }

        if let (Some(since), Some(window)) = (opts.since_time, opts.duration) {
            if since.checked_add_signed(window).is_none() {
                return Err(LogError::InvalidDuration {
                    input: present(duration).unwrap_or_default().to_string(),
                    reason: "window end is out of range".to_string(),
                });
            }
        }

        if let Some(tail) = present(tail_lines) {
            let lines: i64 = tail.parse().map_err(|e| LogError::InvalidTailLines {
                input: tail.to_string(),
                reason: format!("{}", e),
            })?;
            if lines > 0 {
                opts.tail_lines = Some(lines);
            }
        }

        Ok(opts)
    }

    /// Whether the read is limited by a time window
    pub fn is_bounded(&self) -> bool {
        self.duration.is_some()
    }

    /// What the log endpoint is asked for. A bounded read cannot let the
    /// server cut the tail, since the window end is only known locally.
    pub fn pod_log_request(&self) -> PodLogRequest {
        PodLogRequest {
            container: self.container.clone(),
            since_time: self.since_time,
            tail_lines: if self.is_bounded() {
                None
            } else {
                self.tail_lines
            },
            timestamps: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("2s").unwrap(), TimeDelta::seconds(2));
        assert_eq!(parse_duration("1h30m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration("1.5h").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_duration("300ms").unwrap(), TimeDelta::milliseconds(300));
        assert_eq!(parse_duration("10µs").unwrap(), TimeDelta::microseconds(10));
        assert_eq!(parse_duration("0").unwrap(), TimeDelta::zero());
        assert_eq!(parse_duration("-1m").unwrap(), TimeDelta::minutes(-1));
    }

    #[test]
    fn test_parse_duration_rejects_garbage() {
        for input in ["", "5", "abc", "1d", "1h 30m", "m5", "1h-2m"] {
            assert!(
                matches!(parse_duration(input), Err(LogError::InvalidDuration { .. })),
                "{} should be rejected",
                input
            );
        }
    }

    #[test]
    fn test_from_criteria() {
        let opts =
            LogOptions::from_criteria(Some("istio-proxy"), Some("10m"), Some("1700000000"), Some("50"))
                .unwrap();

        assert_eq!(opts.container.as_deref(), Some("istio-proxy"));
        assert_eq!(opts.duration, Some(TimeDelta::minutes(10)));
        assert_eq!(opts.since_time.map(|t| t.timestamp()), Some(1_700_000_000));
        assert_eq!(opts.tail_lines, Some(50));
    }

    #[test]
    fn test_from_criteria_ignores_empty_and_non_positive_values() {
        let opts = LogOptions::from_criteria(Some(""), None, Some(" "), Some("0")).unwrap();
        assert_eq!(opts, LogOptions::default());

        let opts = LogOptions::from_criteria(None, None, None, Some("-5")).unwrap();
        assert_eq!(opts.tail_lines, None);
    }

    #[test]
    fn test_from_criteria_validation_errors() {
        assert!(matches!(
            LogOptions::from_criteria(None, Some("soon"), None, None),
            Err(LogError::InvalidDuration { .. })
        ));
        assert!(matches!(
            LogOptions::from_criteria(None, None, Some("yesterday"), None),
            Err(LogError::InvalidSinceTime { .. })
        ));
        assert!(matches!(
            LogOptions::from_criteria(None, None, None, Some("ten")),
            Err(LogError::InvalidTailLines { .. })
        ));
    }

    #[test]
    fn test_window_past_the_end_of_time_is_rejected() {
        let err = LogOptions::from_criteria(None, Some("1h"), Some("8210266876799"), None)
            .unwrap_err();
        assert!(matches!(err, LogError::InvalidDuration { .. }));

        // The same start without a window is representable
        assert!(LogOptions::from_criteria(None, None, Some("8210266876799"), None).is_ok());
    }

    #[test]
    fn test_bounded_request_leaves_tail_to_the_client() {
        let unbounded = LogOptions {
            tail_lines: Some(100),
            ..Default::default()
        };
        let request = unbounded.pod_log_request();
        assert_eq!(request.tail_lines, Some(100));
        assert!(request.timestamps);

        let bounded = LogOptions {
            duration: Some(TimeDelta::seconds(30)),
            ..unbounded
        };
        assert_eq!(bounded.pod_log_request().tail_lines, None);
    }
}
