//! Server-side command dispatch.
//!
//! A received message is trimmed and, if it starts with a call marker,
//! parsed with the script expression grammar and evaluated against the
//! shared store and the procedure [`Namespace`].  The reply is the result's
//! literal rendering, or an error envelope.  Anything else gets an empty
//! reply.

use std::collections::HashMap;
use std::fmt;

use tracing::{info, warn};

use crate::net::{Transport, TransportError, ERROR_PREFIX};
use crate::script::builtins::call_builtin;
use crate::script::error::ScriptError;
use crate::script::expr::{eval_str, EvalContext};
use crate::script::scanner::{CallScanner, DEFAULT_PREFIX};
use crate::script::value::Value;
use crate::store::SharedStore;

/// A namespace procedure: positional and keyword arguments in, value out.
pub type Procedure =
    Box<dyn FnMut(&[Value], &[(String, Value)]) -> Result<Value, ScriptError> + Send>;

// ── Namespace ─────────────────────────────────────────────────────────────────

/// Procedures and constants reachable as `<prefix><name>`.
#[derive(Default)]
pub struct Namespace {
    procedures: HashMap<String, Procedure>,
    constants: HashMap<String, Value>,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut procs: Vec<&String> = self.procedures.keys().collect();
        procs.sort();
        f.debug_struct("Namespace")
            .field("procedures", &procs)
            .field("constants", &self.constants)
            .finish()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self::default()
    }

    /// A namespace with the stock procedures installed.
    pub fn with_stock_procedures() -> Self {
        let mut ns = Namespace::new();
        ns.register("echo", |args, _kwargs| {
            Ok(match args {
                [] => Value::None,
                [one] => one.clone(),
                many => Value::Tuple(many.to_vec()),
            })
        });
        ns
    }

    pub fn register<F>(&mut self, name: impl Into<String>, procedure: F)
    where
        F: FnMut(&[Value], &[(String, Value)]) -> Result<Value, ScriptError> + Send + 'static,
    {
        self.procedures.insert(name.into(), Box::new(procedure));
    }

    pub fn define_constant(&mut self, name: impl Into<String>, value: Value) {
        self.constants.insert(name.into(), value);
    }

    pub fn constant(&self, name: &str) -> Option<Value> {
        self.constants.get(name).cloned()
    }

    pub fn call(
        &mut self,
        name: &str,
        args: &[Value],
        kwargs: &[(String, Value)],
    ) -> Result<Value, ScriptError> {
        match self.procedures.get_mut(name) {
            Some(procedure) => procedure(args, kwargs),
            None => Err(ScriptError::name(format!("namespace has no procedure '{name}'"))),
        }
    }
}

// ── Dispatcher ────────────────────────────────────────────────────────────────

/// Evaluates call messages against the store and namespace.
#[derive(Debug)]
pub struct Dispatcher {
    store: SharedStore,
    namespace: Namespace,
    scanner: CallScanner,
}

impl Dispatcher {
    pub fn new(store: SharedStore, namespace: Namespace) -> Self {
        Dispatcher {
            store,
            namespace,
            scanner: CallScanner::new(DEFAULT_PREFIX),
        }
    }

    /// Use a namespace prefix other than `FUN.`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.scanner = CallScanner::new(prefix);
        self
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    /// Produce the reply for one received message.
    pub fn handle(&mut self, message: &str) -> String {
        let command = message.trim();
        if !self.scanner.starts_with_call(command) {
            info!(command, "ignoring message without a call marker");
            return String::new();
        }
        match self.evaluate(command) {
            Ok(value) => {
                let reply = value.repr();
                info!(command, reply = reply.as_str(), "executed");
                reply
            }
            Err(err) => {
                warn!(command, error = %err, "execution failed");
                format!("{ERROR_PREFIX}\n{err}")
            }
        }
    }

    /// Evaluate one call expression.
    pub fn evaluate(&mut self, command: &str) -> Result<Value, ScriptError> {
        let mut scope = ServerScope {
            store: &self.store,
            namespace: &mut self.namespace,
            prefix: self.scanner.prefix(),
        };
        eval_str(command, &mut scope)
    }
}

/// Loopback: a dispatcher answers requests in-process.
impl Transport for Dispatcher {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        Ok(self.handle(request))
    }
}

/// Name resolution during server-side evaluation.
struct ServerScope<'a> {
    store: &'a SharedStore,
    namespace: &'a mut Namespace,
    prefix: &'a str,
}

impl EvalContext for ServerScope<'_> {
    fn get_var(&self, name: &str) -> Option<Value> {
        match name.strip_prefix(self.prefix) {
            Some(member) => self.namespace.constant(member),
            None => self.store.get(name),
        }
    }

    fn call_fn(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        if let Some(member) = name.strip_prefix(self.prefix) {
            return self.namespace.call(member, &args, &kwargs);
        }
        if !kwargs.is_empty() {
            return Err(ScriptError::type_error(format!("{name}() takes no keyword arguments")));
        }
        match (name, args.as_slice()) {
            ("set_shared_variable", [var, value]) => self.store.set_shared_variable(var, value),
            ("get_shared_variable", [var]) => self.store.get_shared_variable(var),
            ("set_shared_variable" | "get_shared_variable", _) => Err(ScriptError::type_error(format!(
                "{name}() got {} argument(s)",
                args.len()
            ))),
            ("print", _) => {
                let line: Vec<String> = args.iter().map(Value::to_string).collect();
                info!(output = line.join(" ").as_str(), "print");
                Ok(Value::None)
            }
            _ => call_builtin(name, &args).unwrap_or_else(|| Err(ScriptError::undefined(name))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
