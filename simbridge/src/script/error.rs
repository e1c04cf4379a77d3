//! Failure kinds raised while running a script.
//!
//! Every failure carries a kind name (`NameError`, `RemoteError`, …) and a
//! message.  Kind names are what `except` clauses match against.

use thiserror::Error;

use crate::net::TransportError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScriptError {
    #[error("SyntaxError: {0}")]
    Syntax(String),
    #[error("NameError: {0}")]
    Name(String),
    #[error("TypeError: {0}")]
    Type(String),
    #[error("ValueError: {0}")]
    InvalidValue(String),
    #[error("ZeroDivisionError: {0}")]
    ZeroDivision(String),
    #[error("IndexError: {0}")]
    Index(String),
    #[error("KeyError: {0}")]
    Key(String),
    /// The server answered with an error envelope.
    #[error("RemoteError: {0}")]
    Remote(String),
    /// The transport failed: refused, reset, closed.
    #[error("ConnectionError: {0}")]
    Connection(String),
    /// Raised by a script's own `raise` statement.
    #[error("{kind}: {message}")]
    Raised { kind: String, message: String },
}

impl ScriptError {
    pub fn syntax(msg: impl Into<String>) -> Self {
        ScriptError::Syntax(msg.into())
    }

    pub fn name(msg: impl Into<String>) -> Self {
        ScriptError::Name(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        ScriptError::Type(msg.into())
    }

    pub fn value(msg: impl Into<String>) -> Self {
        ScriptError::InvalidValue(msg.into())
    }

    /// `NameError` for an unbound identifier.
    pub fn undefined(ident: &str) -> Self {
        ScriptError::Name(format!("name '{ident}' is not defined"))
    }

    pub fn raised(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ScriptError::Raised {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// The kind name used for display and `except` matching.
    pub fn kind(&self) -> &str {
        match self {
            ScriptError::Syntax(_) => "SyntaxError",
            ScriptError::Name(_) => "NameError",
            ScriptError::Type(_) => "TypeError",
            ScriptError::InvalidValue(_) => "ValueError",
            ScriptError::ZeroDivision(_) => "ZeroDivisionError",
            ScriptError::Index(_) => "IndexError",
            ScriptError::Key(_) => "KeyError",
            ScriptError::Remote(_) => "RemoteError",
            ScriptError::Connection(_) => "ConnectionError",
            ScriptError::Raised { kind, .. } => kind,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ScriptError::Syntax(m)
            | ScriptError::Name(m)
            | ScriptError::Type(m)
            | ScriptError::InvalidValue(m)
            | ScriptError::ZeroDivision(m)
            | ScriptError::Index(m)
            | ScriptError::Key(m)
            | ScriptError::Remote(m)
            | ScriptError::Connection(m) => m,
            ScriptError::Raised { message, .. } => message,
        }
    }

    /// Whether an `except <clause>` handler catches this failure.
    ///
    /// `Exception` catches everything; any other clause matches when its
    /// name occurs inside this failure's kind name.
    pub fn matches_clause(&self, clause: &str) -> bool {
        clause == "Exception" || self.kind().contains(clause)
    }

    /// True when the failure came from the transport rather than the script.
    pub fn is_remote(&self) -> bool {
        matches!(self, ScriptError::Remote(_) | ScriptError::Connection(_))
    }
}

impl From<TransportError> for ScriptError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Server(reply) => ScriptError::Remote(reply),
            other => ScriptError::Connection(other.to_string()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
