use serde_json::Value;

/// Returns `true` when `value` carries nothing usable.
///
/// `null`, `false`, numeric zero and the empty string count as empty. Such
/// values are never written to storage, and a waiter that receives one falls
/// back to its own dispatch.
pub fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(flag) => !flag,
        Value::Number(number) => number.as_f64().is_some_and(|n| n == 0.0),
        Value::String(text) => text.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}
