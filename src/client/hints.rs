//! Annotations for JSON that matches no channel server record
//!
//! Generic streaming APIs have no fixed discriminant, so unrecognized
//! payloads are pretty-printed and then offered to each registered
//! [`FallbackHook`], which may add extra lines. Hooks never replace the
//! pretty-print and never touch session state.

use crate::client::console::{LineKind, OutputLine};
use serde_json::Value;

/// Extension point for opportunistic recognition of unrecognized payloads
pub trait FallbackHook: Send + Sync {
    /// Append annotation lines for `value`, if any apply
    fn annotate(&self, value: &Value, out: &mut Vec<OutputLine>);
}

/// Hints for streaming APIs that use `event`/`channel`/`seqnum` fields
///
/// Every matching pattern contributes a line; they are not exclusive.
#[derive(Debug, Default, Clone, Copy)]
pub struct StreamingApiHints;

impl FallbackHook for StreamingApiHints {
    fn annotate(&self, value: &Value, out: &mut Vec<OutputLine>) {
        let event = value.get("event").and_then(Value::as_str);
        let channel = value.get("channel");

        if event == Some("subscribed") {
            let name = match channel {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Null) | None => "unknown".to_string(),
                Some(other) => other.to_string(),
            };
            out.push(OutputLine::new(
                LineKind::Annotation,
                format!("✓ Subscribed to channel: {name}"),
            ));
        }

        if event == Some("updated") && channel.and_then(Value::as_str) == Some("heartbeat") {
            out.push(OutputLine::new(LineKind::Annotation, "💓 Heartbeat"));
        }

        if let Some(seqnum) = value.get("seqnum").filter(|v| is_truthy(v)) {
            let seqnum = match seqnum {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out.push(OutputLine::new(
                LineKind::Annotation,
                format!("📦 Message #{seqnum}"),
            ));
        }
    }
}

/// JSON truthiness: everything except null, false, zero and empty values
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
