//! Driver script interpreter.
//!
//! The [`Interpreter`] walks a parsed [`Stmt`] tree.  Before any local
//! evaluation, remote calls in a line are resolved through the
//! [`Transport`]; the substituted text is then evaluated with the local
//! bindings.  Every binding is mirrored to the server's shared store.
//!
//! Failures never stop a script.  Outside `try` bodies a failing statement
//! is logged and skipped; inside a `try` body it unwinds to the nearest
//! `try` (or to a loop nested in that body, which logs it).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{
    builtins::call_builtin,
    error::ScriptError,
    expr::{eval_expr, eval_str, parse_expr, EvalContext, Expr},
    scanner::CallScanner,
    stmt::{parse_script, AssignOp, Branch, Handler, Stmt, StmtKind},
    substitute::substitute,
    value::Value,
};
use crate::net::Transport;

/// Receives each output line as it is produced.
pub type OutputSink = Arc<dyn Fn(&str) + Send + Sync>;

// ── ControlFlow ───────────────────────────────────────────────────────────────

/// Non-error control-flow signals that unwind to the nearest loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlFlow {
    Break,
    Continue,
}

/// Outcome of executing a statement or block.
pub type Flow = Result<Option<ControlFlow>, ScriptError>;

// ── Interpreter ───────────────────────────────────────────────────────────────

pub struct Interpreter<T: Transport> {
    transport: T,
    scanner: CallScanner,
    locals: HashMap<String, Value>,
    /// Result lines and `print` output, in order.
    pub output: Vec<String>,
    /// Optional callback invoked for each output line.
    pub output_sink: Option<OutputSink>,
    /// Failures that were logged and recovered from: `(line, failure)`.
    pub failures: Vec<(usize, ScriptError)>,
    /// Number of enclosing `try` bodies.
    guard_depth: usize,
    loop_depth: usize,
    /// Failures currently being handled by `except` bodies.
    handling: Vec<ScriptError>,
}

impl<T: Transport> Interpreter<T> {
    pub fn new(transport: T) -> Self {
        Interpreter::with_scanner(transport, CallScanner::default())
    }

    pub fn with_scanner(transport: T, scanner: CallScanner) -> Self {
        Interpreter {
            transport,
            scanner,
            locals: HashMap::new(),
            output: Vec::new(),
            output_sink: None,
            failures: Vec::new(),
            guard_depth: 0,
            loop_depth: 0,
            handling: Vec::new(),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// A local binding.
    pub fn get_local(&self, name: &str) -> Option<&Value> {
        self.locals.get(name)
    }

    // ── Execution ─────────────────────────────────────────────────────────────

    /// Parse and run a whole script.
    pub fn run_script(&mut self, src: &str) {
        let stmts = parse_script(src);
        debug!(statements = stmts.len(), "script parsed");
        self.run(&stmts);
    }

    /// Run pre-parsed statements at top level.
    pub fn run(&mut self, stmts: &[Stmt]) {
        if let Err(err) = self.exec_block(stmts) {
            // only reachable when called from inside a guarded context
            warn!(error = %err, "script aborted");
        }
    }

    /// Execute a block, recovering failures according to the current guard.
    pub fn exec_block(&mut self, stmts: &[Stmt]) -> Flow {
        for stmt in stmts {
            match self.exec_stmt(stmt) {
                Ok(Some(cf)) => return Ok(Some(cf)),
                Ok(None) => {}
                Err(err) => self.recover(stmt.line, &stmt.text, err)?,
            }
        }
        Ok(None)
    }

    /// Log a failure and carry on, unless inside a `try` body.
    fn recover(&mut self, line: usize, text: &str, err: ScriptError) -> Result<(), ScriptError> {
        if self.guard_depth > 0 {
            return Err(err);
        }
        self.report(line, text, err);
        Ok(())
    }

    fn report(&mut self, line: usize, text: &str, err: ScriptError) {
        if err.is_remote() {
            warn!(line, text, error = %err, "server call failed");
        } else {
            warn!(line, text, error = %err, "statement failed");
        }
        self.failures.push((line, err));
    }

    /// Execute a single statement.
    pub fn exec_stmt(&mut self, stmt: &Stmt) -> Flow {
        info!("[Line {}] {}", stmt.line, stmt.text);
        match &stmt.kind {
            StmtKind::Assign { target, op, value } => {
                let rhs = self.eval_line(value)?;
                let value = match self.locals.get(target) {
                    _ if *op == AssignOp::Set => rhs,
                    Some(current) => op.apply(current, &rhs)?,
                    None => return Err(ScriptError::undefined(target)),
                };
                info!(name = target.as_str(), value = value.repr().as_str(), "bound");
                self.bind(target, value);
                Ok(None)
            }

            StmtKind::Expr(text) => {
                let value = self.eval_line(text)?;
                if value != Value::None {
                    info!(line = stmt.line, result = value.repr().as_str(), "evaluated");
                    self.emit(value.repr());
                }
                Ok(None)
            }

            StmtKind::If { branches, otherwise } => self.exec_if(stmt, branches, otherwise.as_deref()),

            StmtKind::For { var, iterable, body } => self.exec_for(stmt, var, iterable, body),

            StmtKind::While { cond, body } => self.exec_while(stmt, cond, body),

            StmtKind::Try {
                body,
                handlers,
                finally,
            } => self.exec_try(body, handlers, finally.as_deref()),

            StmtKind::With { expr, body } => {
                if let Err(err) = self.substitute_line(expr) {
                    self.recover(stmt.line, &stmt.text, err)?;
                    return Ok(None);
                }
                debug!(line = stmt.line, "with block runs without a context manager");
                self.exec_block(body)
            }

            StmtKind::Pass => Ok(None),

            StmtKind::Break | StmtKind::Continue if self.loop_depth == 0 => {
                Err(ScriptError::syntax(format!("'{}' outside loop", stmt.text)))
            }
            StmtKind::Break => Ok(Some(ControlFlow::Break)),
            StmtKind::Continue => Ok(Some(ControlFlow::Continue)),

            StmtKind::Raise(spec) => Err(self.raise(spec.as_deref())),

            StmtKind::Malformed(reason) => Err(ScriptError::syntax(reason.clone())),
        }
    }

    fn exec_if(&mut self, stmt: &Stmt, branches: &[Branch], otherwise: Option<&[Stmt]>) -> Flow {
        for branch in branches {
            match self.eval_line(&branch.cond) {
                Ok(v) if v.as_bool() => return self.exec_block(&branch.body),
                Ok(_) => {}
                Err(err) => self.recover(branch.line, &stmt.text, err)?,
            }
        }
        match otherwise {
            Some(body) => self.exec_block(body),
            None => Ok(None),
        }
    }

    fn exec_for(&mut self, stmt: &Stmt, var: &str, iterable: &str, body: &[Stmt]) -> Flow {
        let items = match self.eval_line(iterable).and_then(|v| v.iter_items()) {
            Ok(items) => items,
            Err(err) => {
                self.report(stmt.line, &stmt.text, err);
                return Ok(None);
            }
        };
        self.loop_depth += 1;
        for item in items {
            debug!(var, value = item.repr().as_str(), "loop iteration");
            self.bind(var, item);
            match self.exec_block(body) {
                Ok(Some(ControlFlow::Break)) => break,
                Ok(Some(ControlFlow::Continue) | None) => {}
                Err(err) => self.report(stmt.line, &stmt.text, err),
            }
        }
        self.loop_depth -= 1;
        Ok(None)
    }

    fn exec_while(&mut self, stmt: &Stmt, cond: &str, body: &[Stmt]) -> Flow {
        self.loop_depth += 1;
        loop {
            match self.eval_line(cond) {
                Ok(v) if v.as_bool() => {}
                Ok(_) => break,
                Err(err) => {
                    self.report(stmt.line, &stmt.text, err);
                    break;
                }
            }
            match self.exec_block(body) {
                Ok(Some(ControlFlow::Break)) => break,
                Ok(Some(ControlFlow::Continue) | None) => {}
                Err(err) => {
                    self.report(stmt.line, &stmt.text, err);
                    break;
                }
            }
        }
        self.loop_depth -= 1;
        Ok(None)
    }

    fn exec_try(&mut self, body: &[Stmt], handlers: &[Handler], finally: Option<&[Stmt]>) -> Flow {
        let outcome = self.guarded(|interp| interp.exec_block(body));
        let result = match outcome {
            Ok(cf) => Ok(cf),
            Err(err) => {
                info!(error = %err, "failure in try body");
                match handlers.iter().find(|h| h.catches(&err)) {
                    Some(handler) => {
                        if let Some(name) = &handler.binding {
                            self.bind(name, Value::Str(err.message().to_string()));
                        }
                        self.handling.push(err);
                        let flow = self.exec_block(&handler.body);
                        self.handling.pop();
                        flow
                    }
                    None if handlers.is_empty() => Ok(None),
                    None => Err(err),
                }
            }
        };

        let Some(finally) = finally else {
            return result;
        };
        match self.guarded(|interp| interp.exec_block(finally)) {
            Ok(Some(cf)) if matches!(result, Ok(None)) => Ok(Some(cf)),
            Ok(_) => result,
            Err(err) => {
                warn!(error = %err, "failure in finally body");
                self.failures.push((0, err));
                result
            }
        }
    }

    /// Run `f` as a `try` body: failures propagate instead of being logged.
    fn guarded<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.guard_depth += 1;
        let r = f(self);
        self.guard_depth -= 1;
        r
    }

    fn raise(&mut self, spec: Option<&str>) -> ScriptError {
        let Some(spec) = spec else {
            return self
                .handling
                .last()
                .cloned()
                .unwrap_or_else(|| ScriptError::raised("RuntimeError", "No active exception to re-raise"));
        };
        let text = match self.substitute_line(spec) {
            Ok(text) => text,
            Err(err) => return err,
        };
        match parse_expr(&text) {
            Ok(Expr::Var(kind)) => ScriptError::raised(kind, ""),
            Ok(Expr::Call { name, args, kwargs }) if kwargs.is_empty() => {
                let mut parts = Vec::with_capacity(args.len());
                for arg in &args {
                    match eval_expr(arg, self) {
                        Ok(v) => parts.push(v.to_string()),
                        Err(err) => return err,
                    }
                }
                ScriptError::raised(name, parts.join(", "))
            }
            Ok(_) => ScriptError::type_error("exceptions must be a name or a call"),
            Err(err) => err,
        }
    }

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn substitute_line(&mut self, text: &str) -> Result<String, ScriptError> {
        let substituted = substitute(&self.scanner, &mut self.transport, text)?;
        if substituted != text {
            debug!(original = text, substituted = substituted.as_str(), "remote calls resolved");
        }
        Ok(substituted)
    }

    /// Substitute remote calls, then evaluate locally.
    fn eval_line(&mut self, text: &str) -> Result<Value, ScriptError> {
        let substituted = self.substitute_line(text)?;
        eval_str(&substituted, self)
    }

    /// Bind locally and mirror to the server store.  Mirror failures are
    /// logged only.
    fn bind(&mut self, name: &str, value: Value) {
        let request = format!(
            "set_shared_variable({}, {})",
            Value::Str(name.to_string()).repr(),
            value.repr()
        );
        self.locals.insert(name.to_string(), value);
        match self.transport.call(&request) {
            Ok(reply) => debug!(name, reply = reply.trim(), "binding mirrored"),
            Err(err) => warn!(name, error = %err, "could not mirror binding to server"),
        }
    }

    fn emit(&mut self, line: String) {
        if let Some(sink) = &self.output_sink {
            sink(&line);
        }
        self.output.push(line);
    }
}

impl<T: Transport> EvalContext for Interpreter<T> {
    fn get_var(&self, name: &str) -> Option<Value> {
        self.locals.get(name).cloned()
    }

    fn call_fn(
        &mut self,
        name: &str,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> Result<Value, ScriptError> {
        if !kwargs.is_empty() {
            return Err(ScriptError::type_error(format!("{name}() takes no keyword arguments")));
        }
        if name == "print" {
            let line: Vec<String> = args.iter().map(Value::to_string).collect();
            self.emit(line.join(" "));
            return Ok(Value::None);
        }
        call_builtin(name, &args).unwrap_or_else(|| Err(ScriptError::undefined(name)))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Dispatcher, Namespace};
    use crate::store::SharedStore;
    use std::sync::Mutex;

    fn interp() -> Interpreter<Dispatcher> {
        let mut ns = Namespace::with_stock_procedures();
        ns.define_constant("GUI", Value::Int(1));
        ns.register("fail", |_, _| Err(ScriptError::value("simulated fault")));
        Interpreter::new(Dispatcher::new(SharedStore::new(), ns))
    }

    fn run(src: &str) -> Interpreter<Dispatcher> {
        let mut i = interp();
        i.run_script(src);
        i
    }

    fn local<T: Transport>(i: &Interpreter<T>, name: &str) -> Option<Value> {
        i.get_local(name).cloned()
    }

    /// Loopback that keeps a log of every request.
    struct Recorder {
        inner: Dispatcher,
        sent: Vec<String>,
    }

    impl Transport for Recorder {
        fn round_trip(&mut self, request: &str) -> Result<String, crate::net::TransportError> {
            self.sent.push(request.to_string());
            self.inner.round_trip(request)
        }
    }

    fn recorded(ns: Namespace, src: &str) -> Interpreter<Recorder> {
        let mut i = Interpreter::new(Recorder {
            inner: Dispatcher::new(SharedStore::new(), ns),
            sent: Vec::new(),
        });
        i.run_script(src);
        i
    }

    #[test]
    fn assignment_is_mirrored() {
        let i = run("a = 1\nb = a + 1\nFUN.echo(b)");
        let store = i.transport().store();
        assert_eq!(store.get("a"), Some(Value::Int(1)));
        assert_eq!(store.get("b"), Some(Value::Int(2)));
        assert_eq!(i.output, vec!["2"]);
        assert!(i.failures.is_empty());
    }

    #[test]
    fn remote_results_feed_local_evaluation() {
        let i = run("set_shared_variable('x', 5)\ny = get_shared_variable('x') * 2\nz = FUN.echo('a') + 'b'");
        assert_eq!(local(&i, "y"), Some(Value::Int(10)));
        assert_eq!(local(&i, "z"), Some(Value::Str("ab".into())));
    }

    #[test]
    fn failures_do_not_stop_the_script() {
        let i = run("a = undefined_name\nb = get_shared_variable('missing')\nc = 3");
        assert_eq!(local(&i, "c"), Some(Value::Int(3)));
        assert_eq!(i.failures.len(), 2);
        assert_eq!(i.failures[0].1.kind(), "NameError");
        assert_eq!(i.failures[1].1.kind(), "RemoteError");
    }

    #[test]
    fn augmented_assignment() {
        let i = run("n = 2\nn *= 5\nn -= 1");
        assert_eq!(local(&i, "n"), Some(Value::Int(9)));
        assert_eq!(i.transport().store().get("n"), Some(Value::Int(9)));
        let i = run("m += 1");
        assert_eq!(i.failures[0].1.kind(), "NameError");
    }

    #[test]
    fn if_elif_else() {
        let src = "x = 5\nif x < 3:\n    r = 'low'\nelif x < 10:\n    r = 'mid'\nelse:\n    r = 'high'";
        assert_eq!(local(&run(src), "r"), Some(Value::Str("mid".into())));
    }

    #[test]
    fn failing_condition_falls_through_to_next_branch() {
        let src = "if missing > 1:\n    r = 1\nelif True:\n    r = 2";
        let i = run(src);
        assert_eq!(local(&i, "r"), Some(Value::Int(2)));
        assert_eq!(i.failures.len(), 1);
    }

    #[test]
    fn for_loop_mirrors_variable_and_continues_after_failures() {
        let src = "total = 0\nfor i in [1, 0, 2]:\n    q = 10 / i\n    total += i\n";
        let i = run(src);
        assert_eq!(local(&i, "total"), Some(Value::Int(3)));
        assert_eq!(i.transport().store().get("i"), Some(Value::Int(2)));
        assert_eq!(i.failures.len(), 1);
    }

    #[test]
    fn for_over_bad_iterable_runs_zero_times() {
        let i = run("for i in 5:\n    hit = True\nafter = 1");
        assert_eq!(local(&i, "hit"), None);
        assert_eq!(local(&i, "after"), Some(Value::Int(1)));
        assert_eq!(i.failures[0].1.kind(), "TypeError");
    }

    #[test]
    fn while_with_break_and_continue() {
        let src = "n = 0\nodd = 0\nwhile True:\n    n += 1\n    if n > 6:\n        break\n    if n % 2 == 0:\n        continue\n    odd += 1";
        let i = run(src);
        assert_eq!(local(&i, "n"), Some(Value::Int(7)));
        assert_eq!(local(&i, "odd"), Some(Value::Int(3)));
    }

    #[test]
    fn while_ends_on_condition_failure() {
        let i = run("n = 0\nwhile FUN.fail():\n    n += 1\nafter = n");
        assert_eq!(local(&i, "after"), Some(Value::Int(0)));
        assert_eq!(i.failures.len(), 1);
    }

    #[test]
    fn try_except_finally() {
        let src = "try:\n    x = 1 / 0\n    skipped = True\nexcept ZeroDivisionError as e:\n    caught = e\nfinally:\n    done = True";
        let i = run(src);
        assert_eq!(local(&i, "skipped"), None);
        assert_eq!(local(&i, "caught"), Some(Value::Str("division by zero".into())));
        assert_eq!(local(&i, "done"), Some(Value::Bool(true)));
        assert!(i.failures.is_empty());
    }

    #[test]
    fn first_matching_handler_only() {
        let src = "try:\n    FUN.fail()\nexcept KeyError:\n    a = 1\nexcept RemoteError:\n    b = 1\nexcept:\n    c = 1";
        let i = run(src);
        assert_eq!(local(&i, "a"), None);
        assert_eq!(local(&i, "b"), Some(Value::Int(1)));
        assert_eq!(local(&i, "c"), None);
    }

    #[test]
    fn unmatched_failure_propagates_to_outer_try() {
        let src = "try:\n    try:\n        int('x')\n    except KeyError:\n        inner = 1\nexcept ValueError:\n    outer = 1";
        let i = run(src);
        assert_eq!(local(&i, "inner"), None);
        assert_eq!(local(&i, "outer"), Some(Value::Int(1)));
    }

    #[test]
    fn unmatched_failure_at_top_level_is_logged() {
        let i = run("try:\n    int('x')\nexcept KeyError:\n    pass\nafter = 1");
        assert_eq!(i.failures.len(), 1);
        assert_eq!(local(&i, "after"), Some(Value::Int(1)));
    }

    #[test]
    fn try_without_handlers_swallows() {
        let i = run("try:\n    1 / 0\nfinally:\n    f = 1");
        assert!(i.failures.is_empty());
        assert_eq!(local(&i, "f"), Some(Value::Int(1)));
    }

    #[test]
    fn raise_and_reraise() {
        let src = "try:\n    raise MotorFault('joint', 3)\nexcept Fault as e:\n    msg = e";
        assert_eq!(local(&run(src), "msg"), Some(Value::Str("joint, 3".into())));

        let src = "try:\n    try:\n        raise Custom\n    except:\n        raise\nexcept Custom:\n    outer = True";
        assert_eq!(local(&run(src), "outer"), Some(Value::Bool(true)));

        let i = run("raise");
        assert_eq!(i.failures[0].1.kind(), "RuntimeError");
    }

    #[test]
    fn loop_inside_try_recovers_its_own_body() {
        let src = "hits = 0\ntry:\n    for i in [1, 2]:\n        raise Boom\n    after = True\nexcept Boom:\n    caught = True";
        let i = run(src);
        assert_eq!(local(&i, "after"), Some(Value::Bool(true)));
        assert_eq!(local(&i, "caught"), None);
        assert_eq!(i.failures.len(), 2);
    }

    #[test]
    fn with_runs_body_and_skips_on_failure() {
        let i = run("with FUN.echo(1):\n    a = 1\nwith FUN.fail():\n    b = 1");
        assert_eq!(local(&i, "a"), Some(Value::Int(1)));
        assert_eq!(local(&i, "b"), None);
        assert_eq!(i.failures.len(), 1);
    }

    #[test]
    fn malformed_and_stray_statements_fail_in_place() {
        let i = run("elif x:\n    pass\nbreak\na = 1");
        assert_eq!(i.failures.len(), 2);
        assert!(i.failures.iter().all(|(_, e)| e.kind() == "SyntaxError"));
        assert_eq!(local(&i, "a"), Some(Value::Int(1)));
    }

    #[test]
    fn print_and_output_sink() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink_seen = Arc::clone(&seen);
        let mut i = interp();
        i.output_sink = Some(Arc::new(move |line: &str| {
            sink_seen.lock().unwrap().push(line.to_string());
        }));
        i.run_script("print('hello', 3)\n'text'\nNone");
        assert_eq!(i.output, vec!["hello 3", "'text'"]);
        assert_eq!(*seen.lock().unwrap(), i.output);
    }

    #[test]
    fn nested_remote_call_resolved_on_server() {
        let i = run("set_shared_variable('k', 4)\nv = FUN.echo(get_shared_variable('k'))");
        assert_eq!(local(&i, "v"), Some(Value::Int(4)));
    }

    #[test]
    fn true_if_skips_remaining_conditions() {
        let mut ns = Namespace::with_stock_procedures();
        ns.register("fail", |_, _| Err(ScriptError::value("simulated fault")));
        let src = "if True:\n    a = 1\nelif FUN.fail():\n    b = 1\nelse:\n    c = 1";
        let i = recorded(ns, src);
        assert_eq!(local(&i, "a"), Some(Value::Int(1)));
        assert_eq!(local(&i, "b"), None);
        assert_eq!(local(&i, "c"), None);
        assert!(i.failures.is_empty());
        assert!(!i.transport().sent.iter().any(|r| r.contains("FUN.fail")));
    }

    #[test]
    fn finally_runs_once_after_success() {
        let src = "runs = 0\ntry:\n    x = 1\nexcept:\n    handled = True\nfinally:\n    runs += 1";
        let i = run(src);
        assert_eq!(local(&i, "runs"), Some(Value::Int(1)));
        assert_eq!(local(&i, "handled"), None);
        assert!(i.failures.is_empty());
    }

    #[test]
    fn for_runs_once_per_item_and_mirrors_each_binding() {
        let ticks = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&ticks);
        let mut ns = Namespace::with_stock_procedures();
        ns.register("tick", move |args, _| {
            seen.lock().unwrap().push(args.to_vec());
            Ok(Value::None)
        });
        let i = recorded(ns, "for i in [1, 2, 3]:\n    FUN.tick(i)");
        assert_eq!(
            *ticks.lock().unwrap(),
            vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]]
        );
        let mirrors: Vec<&str> = i
            .transport()
            .sent
            .iter()
            .map(String::as_str)
            .filter(|r| r.starts_with("set_shared_variable"))
            .collect();
        assert_eq!(
            mirrors,
            vec![
                "set_shared_variable('i', 1)",
                "set_shared_variable('i', 2)",
                "set_shared_variable('i', 3)",
            ]
        );
    }

    #[test]
    fn oversized_repetition_fails_only_its_line() {
        let i = run("x = [0] * 2 ** 62\ny = 'ab' * 2");
        assert_eq!(i.failures.len(), 1);
        assert_eq!(i.failures[0].1.kind(), "ValueError");
        assert_eq!(local(&i, "x"), None);
        assert_eq!(local(&i, "y"), Some(Value::Str("abab".into())));
    }

    #[test]
    fn deeply_nested_line_fails_only_its_line() {
        let src = format!("z = {}1{}\nafter = 1", "(".repeat(4000), ")".repeat(4000));
        let i = run(&src);
        assert_eq!(i.failures.len(), 1);
        assert_eq!(i.failures[0].1.kind(), "SyntaxError");
        assert_eq!(local(&i, "after"), Some(Value::Int(1)));
    }

    #[test]
    fn pacing_builtins_run_locally() {
        let i = run("import time\nimport random\ntime.sleep(0)\nh = random.uniform(1.0, 2.0)");
        assert!(i.failures.is_empty(), "{:?}", i.failures);
        let Some(Value::Float(h)) = local(&i, "h") else {
            panic!("expected a float binding");
        };
        assert!((1.0..=2.0).contains(&h));
    }
}
