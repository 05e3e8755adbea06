//! Dynamic variables.
//!
//! Names starting with `$` that no scope defines resolve to generated values:
//! `{{$guid}}`, `{{$timestamp}}`, `{{$isoTimestamp}}` and `{{$randomInt}}`.
//! Arguments follow the name, separated by whitespace (`{{$timestamp -1 d}}`,
//! `{{$randomInt 1 100}}`).

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rand::Rng;
use uuid::Uuid;

/// Upper bound (inclusive) of `$randomInt` without arguments.
const DEFAULT_RANDOM_INT_MAX: i64 = 1000;

/// Resolves a dynamic variable reference such as `$guid` or `$randomInt 1 10`.
///
/// Returns `None` when the name is not a dynamic variable or its arguments
/// are invalid, so the caller can leave the marker untouched.
///
/// # Examples
/// ```
/// use rest_workbench::variables::system::resolve_dynamic_variable;
///
/// assert_eq!(resolve_dynamic_variable("$guid").unwrap().len(), 36);
/// assert!(resolve_dynamic_variable("$timestamp -1 d").is_some());
/// assert!(resolve_dynamic_variable("$unknown").is_none());
/// assert!(resolve_dynamic_variable("guid").is_none());
/// ```
pub fn resolve_dynamic_variable(reference: &str) -> Option<String> {
    let mut parts = reference.split_whitespace();
    let name = parts.next()?.strip_prefix('$')?;
    let args: Vec<&str> = parts.collect();

    let result = match name {
        "guid" => Ok(Uuid::new_v4().to_string()),
        "timestamp" => offset_now(&args).map(|t| t.timestamp().to_string()),
        "isoTimestamp" => {
            offset_now(&args).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        "randomInt" => random_int(&args),
        _ => return None,
    };

    match result {
        Ok(value) => Some(value),
        Err(reason) => {
            log::debug!("Dynamic variable '{}' not resolved: {}", reference, reason);
            None
        }
    }
}

/// Current time, shifted by an optional `[sign]number unit` offset.
///
/// Offsets outside the representable date range are an error.
fn offset_now(args: &[&str]) -> Result<DateTime<Utc>, String> {
    let now = Utc::now();
    match args {
        [] => Ok(now),
        [number, unit] => {
            let number: i64 = number
                .parse()
                .map_err(|_| format!("Invalid number: {}", number))?;
            let duration = match *unit {
                "s" => Duration::try_seconds(number),
                "m" => Duration::try_minutes(number),
                "h" => Duration::try_hours(number),
                "d" => Duration::try_days(number),
                other => return Err(format!("Invalid unit: {}. Use 's', 'm', 'h', or 'd'", other)),
            };
            duration
                .and_then(|duration| now.checked_add_signed(duration))
                .ok_or_else(|| format!("Offset out of range: {} {}", number, unit))
        }
        _ => Err("Offset requires number and unit (e.g., '-1 d' or '+2 h')".to_string()),
    }
}

fn random_int(args: &[&str]) -> Result<String, String> {
    let (min, max) = match args {
        [] => (0, DEFAULT_RANDOM_INT_MAX),
        [min, max] => (
            min.parse::<i64>()
                .map_err(|_| format!("Invalid min value: {}", min))?,
            max.parse::<i64>()
                .map_err(|_| format!("Invalid max value: {}", max))?,
        ),
        _ => return Err("randomInt takes no arguments or min and max".to_string()),
    };

    if min > max {
        return Err(format!("min ({}) cannot be greater than max ({})", min, max));
    }

    Ok(rand::thread_rng().gen_range(min..=max).to_string())
}
