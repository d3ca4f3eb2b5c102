//! Translation of a script's return values into an HTTP outcome.

use bytes::Bytes;
use mlua::Value;

/// Status used when the script returns none (or an unusable one).
pub const DEFAULT_STATUS: u16 = 200;

/// Content type used when the script returns fewer than three values.
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain; charset=utf-8";

/// The response a plugin asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status_code: u16,
    pub content_type: String,
    /// Raw bytes of the returned string; not required to be UTF-8.
    pub body: Bytes,
}

impl Default for ExecutionResult {
    fn default() -> Self {
        Self {
            status_code: DEFAULT_STATUS,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            body: Bytes::new(),
        }
    }
}

impl ExecutionResult {
    /// Interpret returned values positionally.
    ///
    /// ```text
    /// return                 -> 200, default type, ""
    /// return S               -> S,   default type, ""
    /// return S, B            -> S,   default type, B
    /// return S, C, B [, ...] -> S,   C,            B
    /// ```
    pub fn from_returns(values: &[Value]) -> Self {
        let mut result = Self::default();

        if let Some(first) = values.first() {
            result.status_code = status_code(first).unwrap_or(DEFAULT_STATUS);
        }

        match values {
            [_, body] => {
                if let Some(body) = bytes(body) {
                    result.body = body;
                }
            }
            [_, content_type, body, ..] => {
                if let Some(content_type) = bytes(content_type) {
                    result.content_type = String::from_utf8_lossy(&content_type).into_owned();
                }
                if let Some(body) = bytes(body) {
                    result.body = body;
                }
            }
            _ => {}
        }

        result
    }
}

fn status_code(value: &Value) -> Option<u16> {
    let code = match value {
        Value::Integer(i) => *i,
        Value::Number(n) if n.fract() == 0.0 => *n as i64,
        Value::String(s) => s.to_str().ok()?.trim().parse().ok()?,
        _ => return None,
    };
    u16::try_from(code)
        .ok()
        .filter(|code| (100..=999).contains(code))
}

fn bytes(value: &Value) -> Option<Bytes> {
    match value {
        Value::String(s) => Some(Bytes::copy_from_slice(&s.as_bytes())),
        Value::Integer(i) => Some(Bytes::from(i.to_string())),
        Value::Number(n) => Some(Bytes::from(n.to_string())),
        _ => None,
    }
}
