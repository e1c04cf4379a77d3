//! TCP command server.
//!
//! Connections are served one at a time on the accepting task; the next
//! client is accepted only after the current one disconnects.  The
//! [`Dispatcher`] (and so the shared store) outlives every connection.

use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tracing::{info, warn};

use crate::dispatch::Dispatcher;
use crate::net::MAX_FRAME;

pub struct Server {
    listener: TcpListener,
    dispatcher: Dispatcher,
    max_frame: usize,
}

impl Server {
    pub async fn bind(addr: impl ToSocketAddrs, dispatcher: Dispatcher) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "server listening");
        Ok(Server {
            listener,
            dispatcher,
            max_frame: MAX_FRAME,
        })
    }

    pub fn with_max_frame(mut self, max_frame: usize) -> Self {
        self.max_frame = max_frame.max(1);
        self
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Accept and serve connections until accepting itself fails.
    pub async fn run(&mut self) -> io::Result<()> {
        loop {
            self.serve_next().await?;
        }
    }

    /// Accept one client and serve it to completion.
    ///
    /// Socket errors on the client connection are logged, not returned.
    pub async fn serve_next(&mut self) -> io::Result<SocketAddr> {
        info!("waiting for a client connection");
        let (stream, peer) = self.listener.accept().await?;
        info!(%peer, "client connected");
        match serve_connection(stream, &mut self.dispatcher, self.max_frame).await {
            Ok(()) => info!(%peer, "client disconnected"),
            Err(err) => warn!(%peer, error = %err, "socket error, dropping client"),
        }
        Ok(peer)
    }
}

/// Serve one connection: read a message, dispatch it, write the reply,
/// until the peer closes.
pub async fn serve_connection(
    mut stream: TcpStream,
    dispatcher: &mut Dispatcher,
    max_frame: usize,
) -> io::Result<()> {
    let mut buf = vec![0u8; max_frame];
    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        let command = String::from_utf8_lossy(&buf[..n]);
        info!(command = command.trim(), "received command");
        let reply = dispatcher.handle(&command);
        let reply = truncate_frame(&reply, max_frame);
        stream.write_all(reply.as_bytes()).await?;
    }
}

/// Cut `reply` to at most `max` bytes on a character boundary, so one
/// reply never spills into the next read.
fn truncate_frame(reply: &str, max: usize) -> &str {
    if reply.len() <= max {
        return reply;
    }
    let mut end = max;
    while !reply.is_char_boundary(end) {
        end -= 1;
    }
    warn!(len = reply.len(), max, "reply truncated to frame size");
    &reply[..end]
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::Namespace;
    use crate::script::value::Value;
    use crate::store::SharedStore;

    async fn request(sock: &mut TcpStream, msg: &str) -> String {
        sock.write_all(msg.as_bytes()).await.unwrap();
        let mut buf = vec![0u8; MAX_FRAME];
        let n = sock.read(&mut buf).await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    async fn start() -> (Server, SocketAddr) {
        let dispatcher = Dispatcher::new(SharedStore::new(), Namespace::with_stock_procedures());
        let server = Server::bind("127.0.0.1:0", dispatcher).await.unwrap();
        let addr = server.local_addr().unwrap();
        (server, addr)
    }

    #[tokio::test]
    async fn serves_requests_in_order() {
        let (mut server, addr) = start().await;
        let client = tokio::spawn(async move {
            let mut sock = TcpStream::connect(addr).await.unwrap();
            let a = request(&mut sock, "set_shared_variable('n', 3)").await;
            let b = request(&mut sock, "FUN.echo(get_shared_variable('n') + 1)").await;
            (a, b)
        });
        server.serve_next().await.unwrap();
        let (a, b) = client.await.unwrap();
        assert_eq!(a, "\"Variable 'n' set to 3\"");
        assert_eq!(b, "4");
    }

    #[tokio::test]
    async fn store_survives_across_connections() {
        let (mut server, addr) = start().await;
        let first = tokio::spawn(async move {
            let mut sock = TcpStream::connect(addr).await.unwrap();
            request(&mut sock, "set_shared_variable('kept', 'yes')").await
        });
        server.serve_next().await.unwrap();
        first.await.unwrap();

        let second = tokio::spawn(async move {
            let mut sock = TcpStream::connect(addr).await.unwrap();
            request(&mut sock, "get_shared_variable('kept')").await
        });
        server.serve_next().await.unwrap();
        assert_eq!(second.await.unwrap(), "'yes'");
        assert_eq!(server.dispatcher().store().get("kept"), Some(Value::Str("yes".into())));
    }

    #[tokio::test]
    async fn failures_reply_with_envelope() {
        let (mut server, addr) = start().await;
        let client = tokio::spawn(async move {
            let mut sock = TcpStream::connect(addr).await.unwrap();
            request(&mut sock, "FUN.missing()").await
        });
        server.serve_next().await.unwrap();
        let reply = client.await.unwrap();
        assert!(reply.starts_with("ERROR executing command:\n"));
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_frame("abc", 8), "abc");
        assert_eq!(truncate_frame("abcdef", 4), "abcd");
        assert_eq!(truncate_frame("aé", 2), "a");
    }
}
