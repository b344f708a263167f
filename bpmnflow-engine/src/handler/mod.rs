pub mod context;
pub mod module;
pub mod names;

pub use context::HandlerContext;
pub use module::{EventDiagnostic, Handler, HandlerFuture, HandlerModule};
pub use names::canonical_handler_name;

use serde_json::Value;

/// Truthiness of a handler result, used by exclusive-gateway predicates.
/// Null, `false`, zero and the empty string are falsy; everything else is
/// truthy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
