//! Driver script language.
//!
//! This module implements the script side of the bridge:
//!
//! - Remote call detection ([`scanner`]) and substitution ([`substitute`])
//! - Indentation blocks ([`block`]) and the statement tree ([`stmt`])
//! - A sandboxed expression grammar shared with the server ([`expr`])
//! - A tree-walking [`Interpreter`] with line-level failure recovery
//!
//! # Quick start
//!
//! ```rust
//! use simbridge::dispatch::{Dispatcher, Namespace};
//! use simbridge::script::Interpreter;
//! use simbridge::store::SharedStore;
//!
//! // an in-process dispatcher stands in for the TCP server
//! let server = Dispatcher::new(SharedStore::new(), Namespace::with_stock_procedures());
//! let mut interp = Interpreter::new(server);
//! interp.run_script("x = 6\nFUN.echo(x * 7)");
//! assert_eq!(interp.output, vec!["42"]);
//! ```

pub mod block;
pub mod builtins;
pub mod error;
pub mod expr;
pub mod interp;
pub mod scanner;
pub mod stmt;
pub mod substitute;
pub mod value;

// Re-exports for convenience.
pub use error::ScriptError;
pub use expr::EvalContext;
pub use interp::Interpreter;
pub use scanner::CallScanner;
pub use value::Value;
