//! Pure unit-conversion helpers for formatters and button values.
use super::Value;
use serde_json::json;

pub fn rads_to_deg(radians: f64) -> f64 {
    radians.to_degrees()
}

pub fn kelvin_to_fahrenheit(kelvin: f64) -> f64 {
    (kelvin - 273.15) * (9.0 / 5.0) + 32.0
}

pub fn kelvin_to_celsius(kelvin: f64) -> f64 {
    kelvin - 273.15
}

pub fn ms_to_knots(ms: f64) -> f64 {
    ms * 3600.0 / 1852.0
}

/// Map a compass angle in degrees onto the gauge's angle, whose zero points left.
pub fn deg_to_gauge(degrees: f64) -> f64 {
    let res = degrees + 90.0;
    if res > 360.0 {
        res - 360.0
    } else {
        res
    }
}

/// `H:MM` for a duration in seconds, `--:--` for non-positive values.
pub fn seconds_to_hours_minutes(seconds: f64) -> String {
    if !seconds.is_finite() || seconds <= 0.0 {
        return "--:--".to_string();
    }
    let total_minutes = (seconds / 60.0).floor() as u64;
    format!("{}:{:02}", total_minutes / 60, total_minutes % 60)
}

/// Numeric view of a bus value: numbers, numeric strings and booleans.
pub fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Loose truthiness used by switch states.
pub fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// `0` when the current value is truthy, otherwise `1`.
pub fn toggle(current: Option<&Value>) -> Value {
    if current.is_some_and(truthy) {
        json!(0)
    } else {
        json!(1)
    }
}
