//! Driver and dispatcher talking over a real TCP socket.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};

use simbridge::dispatch::{Dispatcher, Namespace};
use simbridge::net::TcpTransport;
use simbridge::script::{Interpreter, Value};
use simbridge::server::Server;
use simbridge::store::SharedStore;

/// Serve exactly `clients` connections on an ephemeral port.
fn spawn_server(store: SharedStore, namespace: Namespace, clients: usize) -> (SocketAddr, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let dispatcher = Dispatcher::new(store, namespace);
            let mut server = Server::bind("127.0.0.1:0", dispatcher).await.unwrap();
            tx.send(server.local_addr().unwrap()).unwrap();
            for _ in 0..clients {
                server.serve_next().await.unwrap();
            }
        });
    });
    (rx.recv().unwrap(), handle)
}

fn connect(addr: SocketAddr) -> TcpTransport {
    TcpTransport::connect(&addr.ip().to_string(), addr.port()).unwrap()
}

#[test]
fn script_round_trips_through_server() {
    let store = SharedStore::new();
    let (addr, server) = spawn_server(store.clone(), Namespace::with_stock_procedures(), 1);

    let mut interp = Interpreter::new(connect(addr));
    interp.run_script("a = 1\nb = a + 1\nFUN.echo(b)");
    assert_eq!(interp.output, vec!["2"]);
    assert!(interp.failures.is_empty(), "{:?}", interp.failures);
    interp.transport_mut().close();
    server.join().unwrap();

    assert_eq!(store.get("a"), Some(Value::Int(1)));
    assert_eq!(store.get("b"), Some(Value::Int(2)));
}

#[test]
fn remote_failures_are_caught_and_loops_drive_calls() {
    let store = SharedStore::new();
    let mut ns = Namespace::with_stock_procedures();
    ns.register("square", |args, _| match args {
        [Value::Int(n)] => Ok(Value::Int(n * n)),
        _ => Err(simbridge::ScriptError::type_error("square() takes one int")),
    });
    let (addr, server) = spawn_server(store.clone(), ns, 1);

    let script = "\
total = 0
for i in range(4):
    total += FUN.square(i)
try:
    FUN.missing()
except RemoteError:
    print('caught')
print(total)
";
    let mut interp = Interpreter::new(connect(addr));
    interp.run_script(script);
    interp.transport_mut().close();
    server.join().unwrap();

    assert_eq!(interp.output, vec!["caught", "14"]);
    assert_eq!(store.get("total"), Some(Value::Int(14)));
}

#[test]
fn unguarded_failure_skips_only_its_line() {
    let (addr, server) = spawn_server(SharedStore::new(), Namespace::with_stock_procedures(), 1);

    let mut interp = Interpreter::new(connect(addr));
    interp.run_script("FUN.nothing_here()\nFUN.echo('still running')");
    interp.transport_mut().close();
    server.join().unwrap();

    assert_eq!(interp.failures.len(), 1);
    assert_eq!(interp.failures[0].0, 1);
    assert_eq!(interp.failures[0].1.kind(), "RemoteError");
    assert_eq!(interp.output, vec!["'still running'"]);
}
