//! Whitelisted built-in functions.
//!
//! Each function receives already-evaluated positional arguments and
//! returns `Result<Value, ScriptError>`.  Both the driver interpreter and
//! the server dispatcher fall back to [`call_builtin`] after their own
//! functions; nothing outside this table is callable.
//!
//! `time.sleep` and `random.uniform` are spelled with their module names so
//! simulation scripts that pace themselves or jitter parameters run as-is.

use std::cmp::Ordering;
use std::time::Duration;

use super::error::ScriptError;
use super::value::Value;

/// Upper bound on the length of a materialised `range()`.
pub const MAX_RANGE: i64 = 10_000_000;

/// Names [`call_builtin`] answers to.
pub const BUILTINS: &[&str] = &[
    "abs", "bool", "float", "int", "len", "list", "max", "min", "range", "repr", "round",
    "sorted", "str", "sum", "tuple", "type", "time.sleep", "random.uniform",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

/// Dispatch a built-in function call.
///
/// Returns `None` if the name is not a built-in (the caller decides what an
/// unknown name means).
pub fn call_builtin(name: &str, args: &[Value]) -> Option<Result<Value, ScriptError>> {
    if !is_builtin(name) {
        return None;
    }
    Some(dispatch(name, args))
}

fn dispatch(name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    Ok(match name {
        "len" => {
            let v = one(name, args)?;
            let n = v.length().ok_or_else(|| {
                ScriptError::type_error(format!("object of type '{}' has no len()", v.type_name()))
            })?;
            Value::Int(n as i64)
        }
        "str" => match args {
            [] => Value::Str(String::new()),
            _ => Value::Str(one(name, args)?.to_string()),
        },
        "repr" => Value::Str(one(name, args)?.repr()),
        "bool" => match args {
            [] => Value::Bool(false),
            _ => Value::Bool(one(name, args)?.as_bool()),
        },
        "int" => match args {
            [] => Value::Int(0),
            _ => to_int(one(name, args)?)?,
        },
        "float" => match args {
            [] => Value::Float(0.0),
            _ => to_float(one(name, args)?)?,
        },
        "type" => Value::Str(one(name, args)?.type_name().into()),
        "abs" => {
            let v = one(name, args)?;
            match v {
                Value::Float(x) => Value::Float(x.abs()),
                other => match other.as_int() {
                    Some(n) => Value::Int(n.checked_abs().ok_or_else(|| ScriptError::value("integer overflow"))?),
                    None => {
                        return Err(ScriptError::type_error(format!(
                            "bad operand type for abs(): '{}'",
                            other.type_name()
                        )))
                    }
                },
            }
        }
        "round" => round(name, args)?,
        "min" => extreme(name, args, Ordering::Less)?,
        "max" => extreme(name, args, Ordering::Greater)?,
        "sum" => {
            arity(name, args, 1, 2)?;
            let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
            for item in args[0].iter_items()? {
                total = total.add(&item)?;
            }
            total
        }
        "range" => range(name, args)?,
        "list" => match args {
            [] => Value::List(Vec::new()),
            _ => Value::List(one(name, args)?.iter_items()?),
        },
        "tuple" => match args {
            [] => Value::Tuple(Vec::new()),
            _ => Value::Tuple(one(name, args)?.iter_items()?),
        },
        "sorted" => {
            let mut items = one(name, args)?.iter_items()?;
            let mut failure = None;
            items.sort_by(|a, b| match a.compare(b, "<") {
                Ok(ord) => ord.unwrap_or(Ordering::Equal),
                Err(e) => {
                    failure.get_or_insert(e);
                    Ordering::Equal
                }
            });
            if let Some(e) = failure {
                return Err(e);
            }
            Value::List(items)
        }
        "time.sleep" => {
            let secs = number(name, one(name, args)?)?;
            let pause = Duration::try_from_secs_f64(secs)
                .map_err(|_| ScriptError::value("sleep length must be a non-negative number"))?;
            std::thread::sleep(pause);
            Value::None
        }
        "random.uniform" => {
            arity(name, args, 2, 2)?;
            let (a, b) = (number(name, &args[0])?, number(name, &args[1])?);
            Value::Float(a + (b - a) * rand::random::<f64>())
        }
        _ => return Err(ScriptError::undefined(name)),
    })
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn arity(name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if (min..=max).contains(&args.len()) {
        return Ok(());
    }
    let expected = if min == max {
        format!("exactly {min}")
    } else {
        format!("{min} to {max}")
    };
    Err(ScriptError::type_error(format!(
        "{name}() takes {expected} argument(s) ({} given)",
        args.len()
    )))
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, ScriptError> {
    arity(name, args, 1, 1)?;
    Ok(&args[0])
}

fn number(name: &str, v: &Value) -> Result<f64, ScriptError> {
    v.as_float().ok_or_else(|| {
        ScriptError::type_error(format!("{name}() needs a number, not '{}'", v.type_name()))
    })
}

fn to_int(v: &Value) -> Result<Value, ScriptError> {
    match v {
        Value::Str(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| ScriptError::value(format!("invalid literal for int() with base 10: {}", v.repr()))),
        Value::Float(x) if x.is_finite() => Ok(Value::Int(x.trunc() as i64)),
        Value::Float(x) => Err(ScriptError::value(format!("cannot convert float {x} to integer"))),
        other => other.as_int().map(Value::Int).ok_or_else(|| {
            ScriptError::type_error(format!(
                "int() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

fn to_float(v: &Value) -> Result<Value, ScriptError> {
    match v {
        Value::Str(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::Float)
            .map_err(|_| ScriptError::value(format!("could not convert string to float: {}", v.repr()))),
        other => other.as_float().map(Value::Float).ok_or_else(|| {
            ScriptError::type_error(format!(
                "float() argument must be a string or a number, not '{}'",
                other.type_name()
            ))
        }),
    }
}

/// Round half to even.
fn round_even(x: f64) -> f64 {
    let r = x.round();
    if (x - x.trunc()).abs() == 0.5 {
        2.0 * (x / 2.0).round()
    } else {
        r
    }
}

fn round(name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    arity(name, args, 1, 2)?;
    let x = args[0].as_float().ok_or_else(|| {
        ScriptError::type_error(format!("type {} doesn't define __round__", args[0].type_name()))
    })?;
    match args.get(1) {
        None | Some(Value::None) => match args[0] {
            Value::Int(n) => Ok(Value::Int(n)),
            _ if x.is_finite() => Ok(Value::Int(round_even(x) as i64)),
            _ => Err(ScriptError::value("cannot round a non-finite float")),
        },
        Some(digits) => {
            let n = digits
                .as_int()
                .ok_or_else(|| ScriptError::type_error("round() digits must be an integer"))?;
            if let Value::Int(i) = args[0] {
                if n >= 0 {
                    return Ok(Value::Int(i));
                }
            }
            let scale = 10f64.powi(n.clamp(-308, 308) as i32);
            Ok(Value::Float(round_even(x * scale) / scale))
        }
    }
}

fn extreme(name: &str, args: &[Value], want: Ordering) -> Result<Value, ScriptError> {
    let items = match args {
        [] => return Err(ScriptError::type_error(format!("{name} expected at least 1 argument, got 0"))),
        [single] => single.iter_items()?,
        many => many.to_vec(),
    };
    let mut iter = items.into_iter();
    let Some(mut best) = iter.next() else {
        return Err(ScriptError::value(format!("{name}() arg is an empty sequence")));
    };
    for item in iter {
        if item.compare(&best, if want == Ordering::Less { "<" } else { ">" })? == Some(want) {
            best = item;
        }
    }
    Ok(best)
}

fn range(name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    arity(name, args, 1, 3)?;
    let mut ints = Vec::with_capacity(args.len());
    for a in args {
        ints.push(a.as_int().ok_or_else(|| {
            ScriptError::type_error(format!("'{}' object cannot be interpreted as an integer", a.type_name()))
        })?);
    }
    let (start, stop, step) = match ints[..] {
        [stop] => (0, stop, 1),
        [start, stop] => (start, stop, 1),
        [start, stop, step] => (start, stop, step),
        _ => unreachable!("arity checked"),
    };
    if step == 0 {
        return Err(ScriptError::value("range() arg 3 must not be zero"));
    }
    let span = if step > 0 { stop.saturating_sub(start) } else { start.saturating_sub(stop) };
    let count = if span <= 0 { 0 } else { (span - 1) / step.saturating_abs() + 1 };
    if count > MAX_RANGE {
        return Err(ScriptError::value(format!("range() of {count} items exceeds limit {MAX_RANGE}")));
    }
    Ok(Value::List((0..count).map(|i| Value::Int(start + i * step)).collect()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
