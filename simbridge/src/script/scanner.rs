//! Remote call detection.
//!
//! A remote call starts at one of three markers: the namespace prefix
//! (`FUN.` by default), `set_shared_variable(` or `get_shared_variable(`.
//! From the marker the scanner finds the next `(` and follows parenthesis
//! depth until it returns to zero; that whole span is the call text.
//! Parentheses inside string literals are counted like any other.

use aho_corasick::{AhoCorasick, AhoCorasickBuilder, MatchKind};

pub const DEFAULT_PREFIX: &str = "FUN.";
pub const SET_SHARED: &str = "set_shared_variable(";
pub const GET_SHARED: &str = "get_shared_variable(";

/// Which marker a call was found at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// `FUN.name(...)`: a procedure in the server's namespace.
    Namespace,
    /// `set_shared_variable(...)`
    StoreSet,
    /// `get_shared_variable(...)`
    StoreGet,
}

const KINDS: [CallKind; 3] = [CallKind::Namespace, CallKind::StoreSet, CallKind::StoreGet];

/// One complete call found in a line.  `start..end` is a byte range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemoteCall<'a> {
    pub kind: CallKind,
    pub start: usize,
    pub end: usize,
    pub text: &'a str,
}

/// Finds remote calls in script text.
#[derive(Debug, Clone)]
pub struct CallScanner {
    prefix: String,
    markers: AhoCorasick,
}

impl Default for CallScanner {
    fn default() -> Self {
        CallScanner::new(DEFAULT_PREFIX)
    }
}

impl CallScanner {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        // at a shared start position the namespace prefix wins
        let markers = AhoCorasickBuilder::new()
            .match_kind(MatchKind::LeftmostFirst)
            .build([prefix.as_str(), SET_SHARED, GET_SHARED]);
        CallScanner { prefix, markers }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether `text` begins with a call marker.
    pub fn starts_with_call(&self, text: &str) -> bool {
        text.starts_with(self.prefix.as_str()) || text.starts_with(SET_SHARED) || text.starts_with(GET_SHARED)
    }

    /// All complete, non-overlapping calls in `text`, left to right.
    ///
    /// A marker with no `(` after it, or whose parentheses never balance,
    /// is skipped and scanning resumes one byte past the marker, so calls
    /// nested inside an unterminated one are still found.
    pub fn find_calls<'a>(&self, text: &'a str) -> Vec<RemoteCall<'a>> {
        let bytes = text.as_bytes();
        let mut calls = Vec::new();
        let mut pos = 0;
        while pos < bytes.len() {
            let Some(m) = self.markers.find(&bytes[pos..]) else {
                break;
            };
            let start = pos + m.start();
            let kind = KINDS[m.pattern()];
            match balanced_end(bytes, start) {
                Some(end) => {
                    calls.push(RemoteCall {
                        kind,
                        start,
                        end,
                        text: &text[start..end],
                    });
                    pos = end;
                }
                None => pos = start + 1,
            }
        }
        calls
    }
}

/// End (exclusive) of the parenthesised group opened by the first `(` at or
/// after `from`.
fn balanced_end(bytes: &[u8], from: usize) -> Option<usize> {
    let open = from + bytes[from..].iter().position(|&b| b == b'(')?;
    let mut depth = 0usize;
    for (i, &b) in bytes[open..].iter().enumerate() {
        match b {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(open + i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(src: &str) -> Vec<String> {
        CallScanner::default()
            .find_calls(src)
            .into_iter()
            .map(|c| c.text.to_string())
            .collect()
    }

    #[test]
    fn finds_namespace_call_with_nested_parens() {
        assert_eq!(
            texts("x = FUN.loadURDF('a.urdf', (0, 0, 1))"),
            vec!["FUN.loadURDF('a.urdf', (0, 0, 1))"]
        );
    }

    #[test]
    fn finds_store_calls() {
        let scanner = CallScanner::default();
        let calls = scanner.find_calls("get_shared_variable('a') + set_shared_variable('b', 2)");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].kind, CallKind::StoreGet);
        assert_eq!(calls[0].text, "get_shared_variable('a')");
        assert_eq!(calls[1].kind, CallKind::StoreSet);
        assert_eq!(calls[1].start, 27);
    }

    #[test]
    fn nested_calls_are_part_of_the_outer_call() {
        assert_eq!(
            texts("FUN.a(FUN.b(1), get_shared_variable('x'))"),
            vec!["FUN.a(FUN.b(1), get_shared_variable('x'))"]
        );
    }

    #[test]
    fn prefix_without_paren_is_skipped() {
        assert!(texts("x = FUN.GUI").is_empty());
    }

    #[test]
    fn unterminated_call_yields_inner_complete_calls() {
        assert_eq!(texts("FUN.a(FUN.b(1)"), vec!["FUN.b(1)"]);
        assert!(texts("FUN.a((1)").is_empty());
    }

    #[test]
    fn no_calls() {
        assert!(texts("y = x * 2").is_empty());
        assert!(texts("").is_empty());
    }

    #[test]
    fn custom_prefix() {
        let scanner = CallScanner::new("SIM.");
        let calls = scanner.find_calls("SIM.step() ; FUN.step()");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].text, "SIM.step()");
        assert!(scanner.starts_with_call("SIM.x()"));
        assert!(!scanner.starts_with_call("print(1)"));
    }

    #[test]
    fn multibyte_text_around_calls() {
        let src = "s = 'é' + FUN.name('ü')";
        let calls = CallScanner::default().find_calls(src);
        assert_eq!(calls[0].text, "FUN.name('ü')");
        assert_eq!(&src[calls[0].start..calls[0].end], calls[0].text);
    }
}
