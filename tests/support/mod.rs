// Minimal scripted LWP server for integration tests.
//
// Binds to a random port, accepts exactly one connection, and hands it to a
// caller-supplied async handler running on a background task. Adapted from
// the teacher's `MockWsServer` accept-loop-per-connection shape, swapped from
// WebSocket/JSON framing to raw LWP framing.

use std::future::Future;
use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lance_client::Header;

pub struct ScriptedServer {
    addr: SocketAddr,
    _task: tokio::task::JoinHandle<()>,
}

impl ScriptedServer {
    pub async fn start<F, Fut>(handler: F) -> Self
    where
        F: FnOnce(TcpStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local_addr");

        let task = tokio::spawn(async move {
            if let Ok((stream, _)) = listener.accept().await {
                handler(stream).await;
            }
        });

        ScriptedServer { addr, _task: task }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }
}

/// Read one full LWP frame (header + payload) from a raw stream.
pub async fn read_frame(stream: &mut TcpStream) -> (Header, Vec<u8>) {
    let mut header_buf = [0u8; lance_client::frame::HEADER_SIZE];
    stream.read_exact(&mut header_buf).await.expect("read header");
    let header = Header::decode(&header_buf).expect("decode header");

    let mut payload = vec![0u8; header.payload_length as usize];
    if !payload.is_empty() {
        stream.read_exact(&mut payload).await.expect("read payload");
    }
    (header, payload)
}

pub async fn write_frame(stream: &mut TcpStream, frame: &[u8]) {
    stream.write_all(frame).await.expect("write frame");
}
