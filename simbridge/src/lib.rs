//! Remote-call scripting bridge.
//!
//! A *driver* runs scripts whose lines may contain calls into a simulation
//! namespace (`FUN.move_to(1, 2)`).  Each call is shipped over TCP to a
//! *dispatcher*, which evaluates it against the namespace and a shared
//! variable store, and replies with the result text.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod net;
pub mod script;
pub mod server;
pub mod store;

pub use config::Config;
pub use dispatch::{Dispatcher, Namespace};
pub use net::{TcpTransport, Transport, TransportError};
pub use script::{Interpreter, ScriptError, Value};
pub use server::Server;
pub use store::SharedStore;
