//! TCP Accept Loop
//!
//! Accepts connections forever and hands each one to its own session task.
//! Sessions share nothing but the [`Store`] and the connection counters.

use crate::commands::CommandHandler;
use crate::connection::{handle_connection, ConnectionStats};
use crate::storage::Store;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error};

/// Accepts connections on `listener` until the task is dropped.
///
/// Accept errors are logged and the loop keeps going.
pub async fn run(
    listener: TcpListener,
    storage: Arc<Store>,
    stats: Arc<ConnectionStats>,
    max_bulk_len: usize,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }

                let handler = CommandHandler::new(Arc::clone(&storage));
                let stats = Arc::clone(&stats);

                tokio::spawn(handle_connection(
                    stream,
                    addr,
                    handler,
                    stats,
                    max_bulk_len,
                ));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parser::DEFAULT_MAX_BULK_LEN;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    async fn start() -> (std::net::SocketAddr, Arc<Store>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let storage = Arc::new(Store::new());
        tokio::spawn(run(
            listener,
            Arc::clone(&storage),
            Arc::new(ConnectionStats::new()),
            DEFAULT_MAX_BULK_LEN,
        ));
        (addr, storage)
    }

    async fn roundtrip(client: &mut TcpStream, request: &[u8], reply_len: usize) -> Vec<u8> {
        client.write_all(request).await.unwrap();
        let mut buf = vec![0u8; reply_len];
        tokio::time::timeout(Duration::from_secs(2), client.read_exact(&mut buf))
            .await
            .expect("timed out waiting for reply")
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_store_is_shared_between_connections() {
        let (addr, storage) = start().await;

        let mut writer = TcpStream::connect(addr).await.unwrap();
        let mut reader = TcpStream::connect(addr).await.unwrap();

        let reply = roundtrip(
            &mut writer,
            b"*3\r\n$3\r\nSET\r\n$5\r\ncolor\r\n$4\r\nblue\r\n",
            5,
        )
        .await;
        assert_eq!(reply, b"+OK\r\n");

        let reply = roundtrip(&mut reader, b"*2\r\n$3\r\nget\r\n$5\r\ncolor\r\n", 10).await;
        assert_eq!(reply, b"$4\r\nblue\r\n");
        assert_eq!(storage.len(), 1);
    }

    #[tokio::test]
    async fn test_idle_connection_does_not_block_others() {
        let (addr, _) = start().await;

        // Half a frame, never finished.
        let mut idle = TcpStream::connect(addr).await.unwrap();
        idle.write_all(b"*2\r\n$4\r\nECHO\r\n").await.unwrap();

        let mut active = TcpStream::connect(addr).await.unwrap();
        let reply = roundtrip(&mut active, b"*1\r\n$4\r\nPING\r\n", 7).await;
        assert_eq!(reply, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_unknown_then_valid_command() {
        let (addr, _) = start().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let advisory = b"+unsupported command 'FLUSHALL'\r\n";
        let reply = roundtrip(&mut client, b"*1\r\n$8\r\nFLUSHALL\r\n", advisory.len()).await;
        assert_eq!(reply, advisory);

        let reply = roundtrip(&mut client, b"*2\r\n$4\r\necho\r\n$2\r\nhi\r\n", 8).await;
        assert_eq!(reply, b"$2\r\nhi\r\n");
    }
}
