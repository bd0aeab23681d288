//! Cron expression subset used by recurring jobs.
//!
//! Recurring cadences are reduced to fixed intervals: the broker repeats on
//! an interval and overdue detection compares `now - last_run` against it.
//! Supported patterns: `*/N * * * *`, `M * * * *`, `M */N * * *`,
//! `M H * * *` (daily), `M H * * D` (weekly). Anything else that still has
//! the right field count conservatively maps to 24 hours.

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum CronError {
    #[error("Expected 5 or 6 fields, got {0}")]
    FieldCount(usize),

    #[error("Invalid {position} field: {value}")]
    InvalidField { position: &'static str, value: String },
}

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// One field of the subset grammar.
enum Field {
    Any,
    Step(u64),
    Value(u64),
    Other,
}

fn parse_field(raw: &str) -> Field {
    if raw == "*" {
        return Field::Any;
    }
    if let Some(step) = raw.strip_prefix("*/") {
        if let Ok(n) = step.parse::<u64>() {
            if n > 0 {
                return Field::Step(n);
            }
        }
        return Field::Other;
    }
    match raw.parse::<u64>() {
        Ok(n) => Field::Value(n),
        Err(_) => Field::Other,
    }
}

/// Split an expression, dropping the seconds field of 6-field expressions.
fn fields(expr: &str) -> Result<Vec<&str>, CronError> {
    let parts: Vec<&str> = expr.split_whitespace().collect();
    match parts.len() {
        5 => Ok(parts),
        6 => Ok(parts[1..].to_vec()),
        n => Err(CronError::FieldCount(n)),
    }
}

/// Validate an expression against the subset grammar.
pub fn validate(expr: &str) -> Result<(), CronError> {
    let parts = fields(expr)?;

    match parse_field(parts[0]) {
        Field::Value(m) if m > 59 => {
            return Err(CronError::InvalidField {
                position: "minute",
                value: parts[0].to_string(),
            })
        }
        Field::Other => {
            return Err(CronError::InvalidField {
                position: "minute",
                value: parts[0].to_string(),
            })
        }
        _ => {}
    }

    match parse_field(parts[1]) {
        Field::Value(h) if h > 23 => {
            return Err(CronError::InvalidField {
                position: "hour",
                value: parts[1].to_string(),
            })
        }
        Field::Other => {
            return Err(CronError::InvalidField {
                position: "hour",
                value: parts[1].to_string(),
            })
        }
        _ => {}
    }

    Ok(())
}

/// The nominal interval of an expression.
///
/// Unrecognized (but well-formed) patterns assume 24 hours, which only makes
/// overdue detection more conservative.
pub fn interval(expr: &str) -> Result<Duration, CronError> {
    validate(expr)?;
    let parts = fields(expr)?;

    let minute = parse_field(parts[0]);
    let hour = parse_field(parts[1]);
    let dom = parts[2];
    let month = parts[3];
    let dow = parts[4];

    let every = match (minute, hour) {
        // */N * * * * - every N minutes
        (Field::Step(n), Field::Any) => Duration::from_secs(n * 60),
        // M * * * * - hourly at minute M
        (Field::Value(_), Field::Any) => Duration::from_secs(60 * 60),
        // M */N * * * - every N hours
        (Field::Value(_), Field::Step(n)) => Duration::from_secs(n * 60 * 60),
        // M H ... - daily or weekly depending on the day-of-week field
        (Field::Value(_), Field::Value(_)) => {
            if dom == "*" && month == "*" && dow != "*" {
                7 * DAY
            } else {
                DAY
            }
        }
        _ => DAY,
    };

    Ok(every)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_n_minutes() {
        assert_eq!(interval("*/5 * * * *").unwrap(), Duration::from_secs(300));
        assert_eq!(interval("*/30 * * * *").unwrap(), Duration::from_secs(1800));
        assert_eq!(interval("*/15 * * * *").unwrap(), Duration::from_secs(900));
    }

    #[test]
    fn test_hourly() {
        assert_eq!(interval("0 * * * *").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_every_n_hours() {
        assert_eq!(
            interval("0 */6 * * *").unwrap(),
            Duration::from_secs(6 * 3600)
        );
    }

    #[test]
    fn test_daily() {
        assert_eq!(interval("0 0 * * *").unwrap(), DAY);
        assert_eq!(interval("30 4 * * *").unwrap(), DAY);
    }

    #[test]
    fn test_weekly() {
        assert_eq!(interval("0 3 * * 1").unwrap(), 7 * DAY);
    }

    #[test]
    fn test_six_field_expression() {
        assert_eq!(interval("0 */5 * * * *").unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn test_unrecognized_pattern_assumes_daily() {
        assert_eq!(interval("* * * * *").unwrap(), DAY);
        assert_eq!(interval("*/5 */2 * * *").unwrap(), DAY);
    }

    #[test]
    fn test_wrong_field_count_rejected() {
        assert_eq!(validate("* * * *"), Err(CronError::FieldCount(4)));
        assert_eq!(
            validate("* * * * * * *"),
            Err(CronError::FieldCount(7))
        );
        assert!(validate("").is_err());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(validate("61 * * * *").is_err());
        assert!(validate("0 25 * * *").is_err());
        assert!(validate("every-five * * * *").is_err());
    }
}
