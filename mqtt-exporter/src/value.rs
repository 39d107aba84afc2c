use std::borrow::Cow;

use serde_json::Value;
use thiserror::Error;

/// Errors from coercing an extracted value into an observation.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum CoercionError {
    /// The value was an array or an object.
    #[error("cannot coerce a JSON {0} into a number")]
    UnsupportedType(&'static str),

    /// The value was a scalar that is neither an on/off token nor a number.
    #[error("value '{0}' is not numeric")]
    NotNumeric(String),
}

/// Coerces an extracted scalar into a floating-point observation.
///
/// Rules are applied in order against the scalar's textual form, and the first one that applies
/// wins:
///
/// - `false` and `OFF` become `0`
/// - `true` and `ON` become `1`
/// - anything that parses as a floating-point number becomes that number
///
/// ## Errors
///
/// Returns [`CoercionError`] when no rule applies.
pub fn coerce_value(value: &Value) -> Result<f64, CoercionError> {
    let text: Cow<'_, str> = match value {
        Value::Bool(true) => Cow::Borrowed("true"),
        Value::Bool(false) => Cow::Borrowed("false"),
        Value::Number(n) => match n.as_f64() {
            Some(v) => return Ok(v),
            None => Cow::Owned(n.to_string()),
        },
        Value::String(s) => Cow::Borrowed(s.as_str()),
        Value::Null => return Err(CoercionError::NotNumeric("null".to_owned())),
        Value::Array(_) => return Err(CoercionError::UnsupportedType("array")),
        Value::Object(_) => return Err(CoercionError::UnsupportedType("object")),
    };

    match text.as_ref() {
        "false" | "OFF" => Ok(0.0),
        "true" | "ON" => Ok(1.0),
        other => other.parse::<f64>().map_err(|_| CoercionError::NotNumeric(other.to_owned())),
    }
}
