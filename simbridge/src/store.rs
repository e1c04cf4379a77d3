//! Server-side shared variable store.
//!
//! One store lives for the whole server process and is shared by every
//! connection, so values written by one driver session are visible to the
//! next.  Handles are cheap clones of the same table.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::info;

use crate::script::error::ScriptError;
use crate::script::expr::parse_literal;
use crate::script::value::Value;

/// Shared name → value table.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    vars: Arc<Mutex<HashMap<String, Value>>>,
}

impl SharedStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Value>> {
        self.vars.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, name: impl Into<String>, value: Value) {
        self.lock().insert(name.into(), value);
    }

    /// Current value of a variable, for embedders inspecting the store.
    pub fn get(&self, name: &str) -> Option<Value> {
        self.lock().get(name).cloned()
    }

    // ── Remote procedures ─────────────────────────────────────────────────────

    /// `set_shared_variable(name, value)`.
    ///
    /// The value's text (a string as-is, anything else rendered as a
    /// literal) is decoded with [`decode_value`] before storing.  Returns a
    /// confirmation string.
    pub fn set_shared_variable(&self, name: &Value, value: &Value) -> Result<Value, ScriptError> {
        let Value::Str(name) = name else {
            return Err(ScriptError::type_error(format!(
                "Variable name must be a string, got {}",
                name.type_name()
            )));
        };
        let text = match value {
            Value::Str(s) => s.clone(),
            other => other.repr(),
        };
        let decoded = decode_value(&text);
        info!(
            name = name.as_str(),
            value = decoded.repr().as_str(),
            kind = decoded.type_name(),
            "shared variable set"
        );
        let confirmation = format!("Variable '{name}' set to {}", decoded.repr());
        self.set(name.clone(), decoded);
        Ok(Value::Str(confirmation))
    }

    /// `get_shared_variable(name)`.
    pub fn get_shared_variable(&self, name: &Value) -> Result<Value, ScriptError> {
        let Value::Str(key) = name else {
            return Err(ScriptError::type_error(format!(
                "Variable name must be a string, got {}",
                name.type_name()
            )));
        };
        self.get(key).ok_or_else(|| {
            ScriptError::name(format!("Shared variable '{key}' not found on server."))
        })
    }
}

/// Decode stored text: JSON first, then a literal, else the raw string.
pub fn decode_value(text: &str) -> Value {
    if let Ok(json) = serde_json::from_str::<serde_json::Value>(text) {
        return from_json(json);
    }
    parse_literal(text).unwrap_or_else(|| Value::Str(text.to_string()))
}

fn from_json(json: serde_json::Value) -> Value {
    use serde_json::Value as Json;
    match json {
        Json::Null => Value::None,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s),
        Json::Array(items) => Value::List(items.into_iter().map(from_json).collect()),
        Json::Object(map) => Value::Dict(
            map.into_iter()
                .map(|(k, v)| (Value::Str(k), from_json(v)))
                .collect(),
        ),
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
