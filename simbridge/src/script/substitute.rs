//! Remote call substitution.
//!
//! Every complete call in a line is sent to the server and its span is
//! replaced with the whitespace-trimmed reply.  Calls are resolved left to
//! right; replies are spliced in by position and never scanned again, so
//! reply text that happens to contain a call marker stays literal.

use tracing::debug;

use super::error::ScriptError;
use super::scanner::CallScanner;
use crate::net::Transport;

/// Replace each remote call in `line` with the server's answer.
///
/// The first failing call aborts the whole line; no partially substituted
/// text is returned.
pub fn substitute<T>(scanner: &CallScanner, transport: &mut T, line: &str) -> Result<String, ScriptError>
where
    T: Transport + ?Sized,
{
    let calls = scanner.find_calls(line);
    if calls.is_empty() {
        return Ok(line.to_owned());
    }

    let mut out = String::with_capacity(line.len());
    let mut last = 0;
    for call in calls {
        out.push_str(&line[last..call.start]);
        let reply = transport.call(call.text)?;
        debug!(call = call.text, reply = reply.trim(), "substituted remote call");
        out.push_str(reply.trim());
        last = call.end;
    }
    out.push_str(&line[last..]);
    Ok(out)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::net::{TransportError, ERROR_PREFIX};

    /// Replies from a fixed script; records what was sent.
    struct Scripted {
        replies: Vec<String>,
        sent: Vec<String>,
    }

    impl Scripted {
        fn new(replies: &[&str]) -> Self {
            Scripted {
                replies: replies.iter().rev().map(|s| s.to_string()).collect(),
                sent: Vec::new(),
            }
        }
    }

    impl Transport for Scripted {
        fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
            self.sent.push(request.to_string());
            self.replies.pop().ok_or(TransportError::Closed)
        }
    }

    #[test]
    fn replaces_each_call_in_order() {
        let mut t = Scripted::new(&["1\n", " 2 "]);
        let out = substitute(&CallScanner::default(), &mut t, "x = FUN.a() + FUN.b(3)").unwrap();
        assert_eq!(out, "x = 1 + 2");
        assert_eq!(t.sent, vec!["FUN.a()", "FUN.b(3)"]);
    }

    #[test]
    fn reply_text_is_not_rescanned() {
        let mut t = Scripted::new(&["'FUN.x()'"]);
        let out = substitute(&CallScanner::default(), &mut t, "FUN.name()").unwrap();
        assert_eq!(out, "'FUN.x()'");
        assert_eq!(t.sent.len(), 1);
    }

    #[test]
    fn duplicate_calls_each_resolve_once() {
        let mut t = Scripted::new(&["5", "6"]);
        let out = substitute(&CallScanner::default(), &mut t, "FUN.t() - FUN.t()").unwrap();
        assert_eq!(out, "5 - 6");
    }

    #[test]
    fn lines_without_calls_skip_the_transport() {
        let mut t = Scripted::new(&[]);
        assert_eq!(substitute(&CallScanner::default(), &mut t, "y = 3").unwrap(), "y = 3");
        assert!(t.sent.is_empty());
    }

    #[test]
    fn error_envelope_aborts_line() {
        let envelope = format!("{ERROR_PREFIX}\nNameError: nope");
        let mut t = Scripted::new(&["1", envelope.as_str()]);
        let err = substitute(&CallScanner::default(), &mut t, "FUN.a() + FUN.b()").unwrap_err();
        assert_eq!(err.kind(), "RemoteError");
        assert!(err.message().contains("nope"));
    }

    #[test]
    fn transport_failure_is_a_connection_error() {
        let mut t = Scripted::new(&[]);
        let err = substitute(&CallScanner::default(), &mut t, "FUN.a()").unwrap_err();
        assert_eq!(err.kind(), "ConnectionError");
    }
}
