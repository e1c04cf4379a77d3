//! Driver-side connection to the command server.
//!
//! The wire protocol is one request per write and one reply per read, each
//! at most [`MAX_FRAME`] bytes of UTF-8 text with no further framing.  A
//! reply that starts with [`ERROR_PREFIX`] is a server-side failure.
//!
//! [`TcpTransport`] is a blocking facade: it owns a current-thread tokio
//! runtime and drives the socket with `block_on`, so the interpreter can
//! stay synchronous and strictly one-call-at-a-time.

use std::io;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

/// Largest request or reply, in bytes.
pub const MAX_FRAME: usize = 8192;

/// Marker at the start of a failure reply.
pub const ERROR_PREFIX: &str = "ERROR executing command:";

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 65432;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("cannot connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("connection closed by server")]
    Closed,
    #[error("socket error: {0}")]
    Io(#[from] io::Error),
    /// The reply carried the error envelope; holds the full reply.
    #[error("{0}")]
    Server(String),
}

/// One request, one reply.
pub trait Transport {
    /// Send `request` and wait for the raw reply.
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError>;

    /// [`round_trip`](Transport::round_trip), mapping error-envelope replies
    /// to [`TransportError::Server`].
    fn call(&mut self, request: &str) -> Result<String, TransportError> {
        debug!(request, "sending remote call");
        let reply = self.round_trip(request)?;
        debug!(reply = reply.as_str(), "received reply");
        if reply.starts_with(ERROR_PREFIX) {
            return Err(TransportError::Server(reply));
        }
        Ok(reply)
    }
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        (**self).round_trip(request)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        (**self).round_trip(request)
    }
}

// ── TcpTransport ──────────────────────────────────────────────────────────────

/// A blocking TCP connection to the server.
pub struct TcpTransport {
    runtime: Runtime,
    /// `None` once closed or after a socket failure.
    stream: Option<TcpStream>,
    max_frame: usize,
    peer: String,
}

impl TcpTransport {
    /// Connect to `host:port`.  Fails immediately if nothing is listening.
    pub fn connect(host: &str, port: u16) -> Result<Self, TransportError> {
        let addr = format!("{host}:{port}");
        let runtime = Builder::new_current_thread().enable_io().enable_time().build()?;
        let stream = runtime
            .block_on(TcpStream::connect((host, port)))
            .map_err(|source| TransportError::Connect {
                addr: addr.clone(),
                source,
            })?;
        info!(peer = addr.as_str(), "connected to server");
        Ok(TcpTransport {
            runtime,
            stream: Some(stream),
            max_frame: MAX_FRAME,
            peer: addr,
        })
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame.max(1);
        self
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    /// Shut the connection down.  Idempotent.
    pub fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // the peer may already be gone
            let _ = self.runtime.block_on(stream.shutdown());
            info!(peer = self.peer.as_str(), "connection closed");
        }
    }
}

impl Transport for TcpTransport {
    fn round_trip(&mut self, request: &str) -> Result<String, TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Closed)?;
        let max_frame = self.max_frame;
        let result: Result<String, TransportError> = self.runtime.block_on(async {
            stream.write_all(request.as_bytes()).await?;
            let mut buf = vec![0u8; max_frame];
            let n = stream.read(&mut buf).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            Ok(String::from_utf8_lossy(&buf[..n]).into_owned())
        });
        if result.is_err() {
            // a broken socket stays broken
            self.stream = None;
        }
        result
    }
}

impl Drop for TcpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::thread;
    use tokio::net::TcpListener;

    /// Serve `replies` one per request on a background runtime; returns the
    /// port and a handle yielding the requests received.
    fn scripted_server(replies: Vec<&'static str>) -> (u16, thread::JoinHandle<Vec<String>>) {
        let (tx, rx) = mpsc::channel();
        let handle = thread::spawn(move || {
            let rt = Builder::new_current_thread().enable_all().build().unwrap();
            rt.block_on(async move {
                let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
                tx.send(listener.local_addr().unwrap().port()).unwrap();
                let (mut sock, _) = listener.accept().await.unwrap();
                let mut seen = Vec::new();
                for reply in replies {
                    let mut buf = [0u8; 256];
                    let n = sock.read(&mut buf).await.unwrap();
                    seen.push(String::from_utf8_lossy(&buf[..n]).into_owned());
                    sock.write_all(reply.as_bytes()).await.unwrap();
                }
                seen
            })
        });
        (rx.recv().unwrap(), handle)
    }

    #[test]
    fn round_trip_over_loopback() {
        let (port, server) = scripted_server(vec!["42"]);
        let mut t = TcpTransport::connect("127.0.0.1", port).unwrap();
        assert_eq!(t.call("FUN.answer()").unwrap(), "42");
        t.close();
        assert_eq!(server.join().unwrap(), vec!["FUN.answer()"]);
    }

    #[test]
    fn error_envelope_becomes_server_error() {
        let (port, server) = scripted_server(vec!["ERROR executing command:\nNameError: x"]);
        let mut t = TcpTransport::connect("127.0.0.1", port).unwrap();
        match t.call("FUN.x()") {
            Err(TransportError::Server(reply)) => assert!(reply.ends_with("NameError: x")),
            other => panic!("expected server error, got {other:?}"),
        }
        // envelope replies leave the connection usable
        assert!(t.is_open());
        server.join().unwrap();
    }

    #[test]
    fn closed_peer_fails_and_stays_failed() {
        let (port, server) = scripted_server(vec![]);
        let mut t = TcpTransport::connect("127.0.0.1", port).unwrap();
        server.join().unwrap();
        assert!(t.call("FUN.a()").is_err());
        assert!(!t.is_open());
        assert!(matches!(t.call("FUN.b()"), Err(TransportError::Closed)));
    }

    #[test]
    fn connect_refused() {
        // bind then drop to find a port with no listener
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let err = TcpTransport::connect("127.0.0.1", port).err().unwrap();
        assert!(matches!(err, TransportError::Connect { .. }));
        assert!(err.to_string().contains(&port.to_string()));
    }
}
