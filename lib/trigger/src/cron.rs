//! Cron schedule derivation from high-level shorthands.
//!
//! Cron trigger nodes configure one of several shorthands (`every_day`,
//! `every_hour`, `every_week`, `every_month`, or a raw `cron` expression).
//! Derivation lowers the shorthand to the 6-field (seconds-resolution)
//! expression the external scheduler expects. All validation happens here,
//! before anything touches the scheduler.

use crate::error::CronError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Parses a strict `HH:MM:SS` time of day.
///
/// Any non-digit/non-colon character is rejected before scanning; each
/// component must be exactly two digits; bounds are 0–23 / 0–59 / 0–59.
///
/// # Errors
///
/// Returns an error describing the first violation.
pub fn parse_time_in_day(raw: &str) -> Result<(u8, u8, u8), CronError> {
    if raw.chars().any(|c| !c.is_ascii_digit() && c != ':') {
        return Err(CronError::InvalidTimeOfDay {
            value: raw.to_string(),
            reason: "contains characters other than digits and ':'".to_string(),
        });
    }

    let parts: Vec<&str> = raw.split(':').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.len() != 2) {
        return Err(CronError::InvalidTimeOfDay {
            value: raw.to_string(),
            reason: "expected HH:MM:SS with two digits per component".to_string(),
        });
    }

    let hour: u32 = parts[0].parse().map_err(|_| CronError::InvalidTimeOfDay {
        value: raw.to_string(),
        reason: "hour is not a number".to_string(),
    })?;
    let minute: u32 = parts[1].parse().map_err(|_| CronError::InvalidTimeOfDay {
        value: raw.to_string(),
        reason: "minute is not a number".to_string(),
    })?;
    let second: u32 = parts[2].parse().map_err(|_| CronError::InvalidTimeOfDay {
        value: raw.to_string(),
        reason: "second is not a number".to_string(),
    })?;

    check_range("hour", hour, 23)?;
    check_range("minute", minute, 59)?;
    check_range("second", second, 59)?;

    Ok((hour as u8, minute as u8, second as u8))
}

fn check_range(field: &'static str, value: u32, max: u32) -> Result<(), CronError> {
    if value > max {
        return Err(CronError::OutOfRange { field, value, max });
    }
    Ok(())
}

/// Hourly schedule position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HourSpec {
    /// Minute within the hour.
    #[serde(default)]
    pub minute: u32,
    /// Second within the minute.
    #[serde(default)]
    pub second: u32,
}

/// Weekly schedule position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekSpec {
    /// Day of week, 0 (Sunday) through 6.
    pub weekday: u32,
    /// Time of day, strict `HH:MM:SS`.
    pub time: String,
}

/// Monthly schedule position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthSpec {
    /// Day of month, 1 through 31.
    pub day: u32,
    /// Time of day, strict `HH:MM:SS`.
    pub time: String,
}

/// Cron trigger configuration decoded from a node's input fields.
///
/// Exactly one shorthand must be set; `timezone` is required.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CronTriggerConfig {
    /// Daily at a time of day.
    #[serde(default)]
    pub every_day: Option<String>,
    /// Hourly at a minute/second.
    #[serde(default)]
    pub every_hour: Option<HourSpec>,
    /// Weekly at a weekday and time.
    #[serde(default)]
    pub every_week: Option<WeekSpec>,
    /// Monthly at a day and time.
    #[serde(default)]
    pub every_month: Option<MonthSpec>,
    /// Raw 6-field cron expression.
    #[serde(default)]
    pub cron: Option<String>,
    /// Timezone the schedule is evaluated in.
    pub timezone: String,
}

impl CronTriggerConfig {
    /// Decodes the configuration from a node's input fields.
    ///
    /// # Errors
    ///
    /// Returns an error when required fields (notably `timezone`) are
    /// missing or mistyped.
    pub fn from_input_fields(fields: &Map<String, JsonValue>) -> Result<Self, CronError> {
        serde_json::from_value(JsonValue::Object(fields.clone())).map_err(|e| {
            CronError::InvalidConfig {
                reason: e.to_string(),
            }
        })
    }

    /// Derives the 6-field cron expression (`sec min hour dom mon dow`).
    ///
    /// # Errors
    ///
    /// Returns an error when no shorthand or more than one is configured,
    /// or when any component is malformed or out of range.
    pub fn expression(&self) -> Result<String, CronError> {
        let configured = [
            self.every_day.is_some(),
            self.every_hour.is_some(),
            self.every_week.is_some(),
            self.every_month.is_some(),
            self.cron.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if configured == 0 {
            return Err(CronError::MissingSchedule);
        }
        if configured > 1 {
            return Err(CronError::AmbiguousSchedule);
        }

        if let Some(time) = &self.every_day {
            let (hour, minute, second) = parse_time_in_day(time)?;
            return Ok(format!("{second} {minute} {hour} * * *"));
        }
        if let Some(spec) = &self.every_hour {
            check_range("minute", spec.minute, 59)?;
            check_range("second", spec.second, 59)?;
            return Ok(format!("{} {} * * * *", spec.second, spec.minute));
        }
        if let Some(spec) = &self.every_week {
            check_range("weekday", spec.weekday, 6)?;
            let (hour, minute, second) = parse_time_in_day(&spec.time)?;
            return Ok(format!("{second} {minute} {hour} * * {}", spec.weekday));
        }
        if let Some(spec) = &self.every_month {
            if spec.day < 1 || spec.day > 31 {
                return Err(CronError::OutOfRange {
                    field: "day",
                    value: spec.day,
                    max: 31,
                });
            }
            let (hour, minute, second) = parse_time_in_day(&spec.time)?;
            return Ok(format!("{second} {minute} {hour} {} * *", spec.day));
        }

        let expression = self.cron.as_deref().unwrap_or_default();
        validate_expression(expression)?;
        Ok(expression.to_string())
    }
}

/// Validates a raw 6-field cron expression.
fn validate_expression(expression: &str) -> Result<(), CronError> {
    let fields = expression.split_whitespace().count();
    if fields != 6 {
        return Err(CronError::InvalidExpression {
            expression: expression.to_string(),
            reason: format!("expected 6 fields, got {fields}"),
        });
    }
    Ok(())
}
