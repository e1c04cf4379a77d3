//! Runtime value type for driver scripts and server-side evaluation.
//!
//! Values mirror the literal forms the script grammar accepts: numbers,
//! strings, booleans, `None`, and list/tuple/dict containers.  The
//! [`repr`](Value::repr) rendering is the same literal syntax, which is
//! what travels back over the wire as a call result.

use std::cmp::Ordering;
use std::fmt;

use super::error::ScriptError;

/// Longest string (in bytes) or list a single operation may build.
pub const MAX_SEQUENCE_LEN: usize = 10_000_000;

/// A script runtime value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    /// Insertion-ordered key/value pairs.
    Dict(Vec<(Value, Value)>),
}

/// Numeric view of a value; `bool` counts as an integer.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(x) => x,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => f.write_str(&other.repr()),
        }
    }
}

fn fmt_float(x: f64) -> String {
    if x.is_nan() {
        "nan".into()
    } else if x.is_infinite() {
        if x > 0.0 { "inf".into() } else { "-inf".into() }
    } else if x.fract() == 0.0 && x.abs() < 1e16 {
        format!("{x:.1}")
    } else {
        format!("{x}")
    }
}

fn quote_str(s: &str) -> String {
    let quote = if s.contains('\'') && !s.contains('"') { '"' } else { '\'' };
    let mut out = String::with_capacity(s.len() + 2);
    out.push(quote);
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn join_repr(items: &[Value]) -> String {
    items.iter().map(Value::repr).collect::<Vec<_>>().join(", ")
}

fn unsupported(op: &str, a: &Value, b: &Value) -> ScriptError {
    ScriptError::type_error(format!(
        "unsupported operand type(s) for {op}: '{}' and '{}'",
        a.type_name(),
        b.type_name()
    ))
}

fn overflow() -> ScriptError {
    ScriptError::value("integer overflow")
}

impl Value {
    /// Literal rendering, e.g. `'text'`, `[1, 2.5]`, `{'k': None}`.
    pub fn repr(&self) -> String {
        match self {
            Value::None => "None".into(),
            Value::Bool(true) => "True".into(),
            Value::Bool(false) => "False".into(),
            Value::Int(n) => n.to_string(),
            Value::Float(x) => fmt_float(*x),
            Value::Str(s) => quote_str(s),
            Value::List(items) => format!("[{}]", join_repr(items)),
            Value::Tuple(items) if items.len() == 1 => format!("({},)", items[0].repr()),
            Value::Tuple(items) => format!("({})", join_repr(items)),
            Value::Dict(pairs) => {
                let body: Vec<String> = pairs
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k.repr(), v.repr()))
                    .collect();
                format!("{{{}}}", body.join(", "))
            }
        }
    }

    /// Truthiness: zero, empty and `None` are falsy.
    pub fn as_bool(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            Value::Float(x) => *x != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::List(items) | Value::Tuple(items) => !items.is_empty(),
            Value::Dict(pairs) => !pairs.is_empty(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
        }
    }

    fn number(&self) -> Option<Num> {
        match self {
            Value::Bool(b) => Some(Num::Int(i64::from(*b))),
            Value::Int(n) => Some(Num::Int(*n)),
            Value::Float(x) => Some(Num::Float(*x)),
            _ => None,
        }
    }

    /// Integer view (`bool` included), used for indices and counts.
    pub fn as_int(&self) -> Option<i64> {
        match self.number()? {
            Num::Int(n) => Some(n),
            Num::Float(_) => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        self.number().map(Num::as_f64)
    }

    /// Number of elements for strings and containers.
    pub fn length(&self) -> Option<usize> {
        match self {
            Value::Str(s) => Some(s.chars().count()),
            Value::List(items) | Value::Tuple(items) => Some(items.len()),
            Value::Dict(pairs) => Some(pairs.len()),
            _ => None,
        }
    }

    /// Elements visited by a `for` loop: characters, items, or dict keys.
    pub fn iter_items(&self) -> Result<Vec<Value>, ScriptError> {
        match self {
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            Value::List(items) | Value::Tuple(items) => Ok(items.clone()),
            Value::Dict(pairs) => Ok(pairs.iter().map(|(k, _)| k.clone()).collect()),
            other => Err(ScriptError::type_error(format!(
                "'{}' object is not iterable",
                other.type_name()
            ))),
        }
    }

    // ── Arithmetic ────────────────────────────────────────────────────────────

    fn numeric(
        &self,
        rhs: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
    ) -> Result<Value, ScriptError> {
        match (self.number(), rhs.number()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => int_op(a, b).map(Value::Int).ok_or_else(overflow),
            (Some(a), Some(b)) => Ok(Value::Float(float_op(a.as_f64(), b.as_f64()))),
            _ => Err(unsupported(op, self, rhs)),
        }
    }

    pub fn add(&self, rhs: &Value) -> Result<Value, ScriptError> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => {
                bounded_len(a.len().checked_add(b.len()))?;
                Ok(Value::Str(format!("{a}{b}")))
            }
            (Value::List(a), Value::List(b)) => {
                bounded_len(a.len().checked_add(b.len()))?;
                Ok(Value::List(a.iter().chain(b).cloned().collect()))
            }
            (Value::Tuple(a), Value::Tuple(b)) => {
                bounded_len(a.len().checked_add(b.len()))?;
                Ok(Value::Tuple(a.iter().chain(b).cloned().collect()))
            }
            _ => self.numeric(rhs, "+", i64::checked_add, |a, b| a + b),
        }
    }

    pub fn sub(&self, rhs: &Value) -> Result<Value, ScriptError> {
        self.numeric(rhs, "-", i64::checked_sub, |a, b| a - b)
    }

    pub fn mul(&self, rhs: &Value) -> Result<Value, ScriptError> {
        let count = |n: &Value| n.as_int().map(|n| n.max(0) as usize);
        match (self, rhs) {
            (Value::Str(s), n) | (n, Value::Str(s)) if count(n).is_some() => {
                let times = count(n).unwrap_or(0);
                bounded_len(s.len().checked_mul(times))?;
                Ok(Value::Str(s.repeat(times)))
            }
            (Value::List(items), n) | (n, Value::List(items)) if count(n).is_some() => {
                Ok(Value::List(repeat_items(items, count(n).unwrap_or(0))?))
            }
            (Value::Tuple(items), n) | (n, Value::Tuple(items)) if count(n).is_some() => {
                Ok(Value::Tuple(repeat_items(items, count(n).unwrap_or(0))?))
            }
            _ => self.numeric(rhs, "*", i64::checked_mul, |a, b| a * b),
        }
    }

    /// True division; always produces a float.
    pub fn div(&self, rhs: &Value) -> Result<Value, ScriptError> {
        match (self.number(), rhs.number()) {
            (Some(a), Some(b)) => {
                if b.as_f64() == 0.0 {
                    return Err(ScriptError::ZeroDivision("division by zero".into()));
                }
                Ok(Value::Float(a.as_f64() / b.as_f64()))
            }
            _ => Err(unsupported("/", self, rhs)),
        }
    }

    /// Floor division, rounding toward negative infinity.
    pub fn floor_div(&self, rhs: &Value) -> Result<Value, ScriptError> {
        match (self.number(), rhs.number()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => {
                if b == 0 {
                    return Err(ScriptError::ZeroDivision("integer division or modulo by zero".into()));
                }
                let q = a.checked_div(b).ok_or_else(overflow)?;
                if a % b != 0 && ((a < 0) != (b < 0)) {
                    Ok(Value::Int(q - 1))
                } else {
                    Ok(Value::Int(q))
                }
            }
            (Some(a), Some(b)) => {
                if b.as_f64() == 0.0 {
                    return Err(ScriptError::ZeroDivision("float floor division by zero".into()));
                }
                Ok(Value::Float((a.as_f64() / b.as_f64()).floor()))
            }
            _ => Err(unsupported("//", self, rhs)),
        }
    }

    /// Modulo; the result takes the sign of the divisor.
    pub fn rem(&self, rhs: &Value) -> Result<Value, ScriptError> {
        match (self.number(), rhs.number()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) => {
                if b == 0 {
                    return Err(ScriptError::ZeroDivision("integer division or modulo by zero".into()));
                }
                let r = a.checked_rem(b).ok_or_else(overflow)?;
                Ok(Value::Int(if r != 0 && ((r < 0) != (b < 0)) { r + b } else { r }))
            }
            (Some(a), Some(b)) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                if b == 0.0 {
                    return Err(ScriptError::ZeroDivision("float modulo".into()));
                }
                let r = a % b;
                Ok(Value::Float(if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r }))
            }
            _ => Err(unsupported("%", self, rhs)),
        }
    }

    pub fn pow(&self, rhs: &Value) -> Result<Value, ScriptError> {
        match (self.number(), rhs.number()) {
            (Some(Num::Int(a)), Some(Num::Int(b))) if b >= 0 => {
                let exp = u32::try_from(b).map_err(|_| overflow())?;
                a.checked_pow(exp).map(Value::Int).ok_or_else(overflow)
            }
            (Some(a), Some(b)) => {
                if a.as_f64() == 0.0 && b.as_f64() < 0.0 {
                    return Err(ScriptError::ZeroDivision(
                        "0.0 cannot be raised to a negative power".into(),
                    ));
                }
                Ok(Value::Float(a.as_f64().powf(b.as_f64())))
            }
            _ => Err(unsupported("** or pow()", self, rhs)),
        }
    }

    pub fn neg(&self) -> Result<Value, ScriptError> {
        match self.number() {
            Some(Num::Int(n)) => n.checked_neg().map(Value::Int).ok_or_else(overflow),
            Some(Num::Float(x)) => Ok(Value::Float(-x)),
            None => Err(ScriptError::type_error(format!(
                "bad operand type for unary -: '{}'",
                self.type_name()
            ))),
        }
    }

    pub fn pos(&self) -> Result<Value, ScriptError> {
        match self.number() {
            Some(Num::Int(n)) => Ok(Value::Int(n)),
            Some(Num::Float(x)) => Ok(Value::Float(x)),
            None => Err(ScriptError::type_error(format!(
                "bad operand type for unary +: '{}'",
                self.type_name()
            ))),
        }
    }

    // ── Comparison ────────────────────────────────────────────────────────────

    /// Equality with numeric promotion (`1 == 1.0 == True`).
    pub fn loose_eq(&self, rhs: &Value) -> bool {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::None, Value::None) => true,
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Dict(a), Value::Dict(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| dict_get(b, k).is_some_and(|w| v.loose_eq(w)))
            }
            _ => match (self.number(), rhs.number()) {
                (Some(Num::Int(a)), Some(Num::Int(b))) => a == b,
                (Some(a), Some(b)) => a.as_f64() == b.as_f64(),
                _ => false,
            },
        }
    }

    /// Ordering for `<`, `<=`, `>`, `>=`.  `None` when unordered (NaN).
    pub fn compare(&self, rhs: &Value, op: &str) -> Result<Option<Ordering>, ScriptError> {
        match (self, rhs) {
            (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
            (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
                for (x, y) in a.iter().zip(b) {
                    if !x.loose_eq(y) {
                        return x.compare(y, op);
                    }
                }
                Ok(Some(a.len().cmp(&b.len())))
            }
            _ => match (self.number(), rhs.number()) {
                (Some(Num::Int(a)), Some(Num::Int(b))) => Ok(Some(a.cmp(&b))),
                (Some(a), Some(b)) => Ok(a.as_f64().partial_cmp(&b.as_f64())),
                _ => Err(ScriptError::type_error(format!(
                    "'{op}' not supported between instances of '{}' and '{}'",
                    self.type_name(),
                    rhs.type_name()
                ))),
            },
        }
    }

    /// Membership test backing `in` / `not in`; `self` is the container.
    pub fn contains(&self, item: &Value) -> Result<bool, ScriptError> {
        match self {
            Value::Str(hay) => match item {
                Value::Str(needle) => Ok(hay.contains(needle.as_str())),
                other => Err(ScriptError::type_error(format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ))),
            },
            Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| v.loose_eq(item))),
            Value::Dict(pairs) => Ok(dict_get(pairs, item).is_some()),
            other => Err(ScriptError::type_error(format!(
                "argument of type '{}' is not iterable",
                other.type_name()
            ))),
        }
    }

    /// Subscript: sequence position (negative counts from the end) or dict key.
    pub fn index(&self, key: &Value) -> Result<Value, ScriptError> {
        if let Value::Dict(pairs) = self {
            return dict_get(pairs, key)
                .cloned()
                .ok_or_else(|| ScriptError::Key(key.repr()));
        }
        let len = match self {
            Value::Str(s) => s.chars().count(),
            Value::List(items) | Value::Tuple(items) => items.len(),
            other => {
                return Err(ScriptError::type_error(format!(
                    "'{}' object is not subscriptable",
                    other.type_name()
                )))
            }
        };
        let Some(raw) = key.as_int() else {
            return Err(ScriptError::type_error(format!(
                "{} indices must be integers, not {}",
                self.type_name(),
                key.type_name()
            )));
        };
        let pos = if raw < 0 { raw + len as i64 } else { raw };
        if pos < 0 || pos >= len as i64 {
            return Err(ScriptError::Index(format!("{} index out of range", self.type_name())));
        }
        let pos = pos as usize;
        Ok(match self {
            Value::Str(s) => Value::Str(s.chars().nth(pos).map(String::from).unwrap_or_default()),
            Value::List(items) | Value::Tuple(items) => items[pos].clone(),
            _ => Value::None,
        })
    }
}

/// Length check for concatenation and repetition results.
fn bounded_len(len: Option<usize>) -> Result<usize, ScriptError> {
    len.filter(|&n| n <= MAX_SEQUENCE_LEN).ok_or_else(|| {
        ScriptError::value(format!("sequence would exceed {MAX_SEQUENCE_LEN} elements"))
    })
}

fn repeat_items(items: &[Value], times: usize) -> Result<Vec<Value>, ScriptError> {
    let len = bounded_len(items.len().checked_mul(times))?;
    Ok(items.iter().cloned().cycle().take(len).collect())
}

fn dict_get<'a>(pairs: &'a [(Value, Value)], key: &Value) -> Option<&'a Value> {
    pairs.iter().find(|(k, _)| k.loose_eq(key)).map(|(_, v)| v)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
