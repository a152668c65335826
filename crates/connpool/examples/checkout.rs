//! Checkout/return cycle over real TCP.
//!
//! Starts a local echo server, implements a minimal single-address [`Pool`]
//! over [`TcpTransport`], and runs a few request cycles through it. The last
//! cycle hits a read deadline and the connection is discarded.
//!
//! # Running
//!
//! ```bash
//! cargo run -p connpool --example checkout
//! ```

// Allow common patterns in example code
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use connpool::{Checkout, Conn, ConnConfig, Pool, PoolError, TcpTransport, acquire, discard};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::Mutex;

/// Idle connections to one address, unbounded.
struct SingleAddrPool {
    addr: SocketAddr,
    idle: Mutex<Vec<Conn<TcpTransport>>>,
}

#[async_trait]
impl Pool for SingleAddrPool {
    type Transport = TcpTransport;
    type Error = PoolError;

    async fn get(&self) -> Result<Checkout<TcpTransport>, PoolError> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(Checkout {
                conn,
                is_new: false,
            });
        }
        let transport = TcpTransport::connect(self.addr)
            .await
            .map_err(PoolError::ConnectionCreation)?;
        Ok(Checkout {
            conn: Conn::new(transport),
            is_new: true,
        })
    }

    async fn put(&self, conn: Conn<TcpTransport>) -> Result<(), PoolError> {
        self.idle.lock().await.push(conn);
        Ok(())
    }

    async fn remove(&self, mut conn: Conn<TcpTransport>) -> Result<(), PoolError> {
        conn.close().await.map_err(PoolError::ConnectionClose)
    }
}

/// Echoes every line back, except `SLOW`, which it never answers.
async fn run_echo_server(listener: TcpListener) {
    loop {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            loop {
                let n = match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => return,
                    Ok(n) => n,
                };
                if buf[..n].starts_with(b"SLOW") {
                    continue;
                }
                if socket.write_all(&buf[..n]).await.is_err() {
                    return;
                }
            }
        });
    }
}

async fn round_trip(
    conn: &mut Conn<TcpTransport>,
    config: &ConnConfig,
    line: &[u8],
) -> io::Result<Vec<u8>> {
    conn.apply_timeouts(config)?;
    conn.write(line).await?;
    let mut buf = [0u8; 1024];
    let n = conn.read(&mut buf).await?;
    Ok(buf[..n].to_vec())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    tokio::spawn(run_echo_server(listener));

    let pool = SingleAddrPool {
        addr,
        idle: Mutex::new(Vec::new()),
    };
    let config = ConnConfig::new()
        .read_timeout(Duration::from_millis(500))
        .write_timeout(Duration::from_millis(500));
    config.validate()?;

    println!("=== connpool checkout example ===\n");

    for line in [&b"PING\n"[..], b"HELLO\n", b"SLOW\n"] {
        let (mut conn, is_new) = acquire(&pool).await?.into_parts();
        println!("checked out {} (new: {is_new})", conn.id());

        let result = round_trip(&mut conn, &config, line).await;
        match &result {
            Ok(reply) => println!("  reply: {:?}", String::from_utf8_lossy(reply)),
            Err(e) => println!("  failed: {e}"),
        }

        let released = conn
            .release(&pool, result.as_ref().err(), discard::on_broken_transport)
            .await?;
        println!("  released: {released:?}\n");
    }

    Ok(())
}
