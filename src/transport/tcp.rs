//! TCP transport.
//!
//! On the testbed every node's serial line is exposed by a gateway host on
//! its own TCP port: `port_base + node id`.

use tokio::net::TcpStream;
use tracing::info;

use crate::error::{FleetError, Result};
use crate::frame::protocol::NodeId;

/// Default gateway host name
pub const DEFAULT_HOST: &str = "experiment";

/// Default first port of the gateway
pub const DEFAULT_PORT_BASE: u16 = 30000;

/// TCP port serving node `id`
///
/// # Errors
///
/// Returns error if `port_base + id` overflows the port range
pub fn node_port(port_base: u16, id: NodeId) -> Result<u16> {
    port_base.checked_add(id).ok_or_else(|| {
        FleetError::Protocol(format!("port {} + node {} is out of range", port_base, id))
    })
}

/// Connect to the gateway port of node `id`
///
/// # Errors
///
/// Returns error if the port is out of range or the connection fails
pub async fn connect_tcp(host: &str, port_base: u16, id: NodeId) -> Result<TcpStream> {
    let port = node_port(port_base, id)?;
    let stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;

    info!("Connected to node {} at {}:{}", id, host, port);
    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_node_port() {
        assert_eq!(node_port(DEFAULT_PORT_BASE, 101).unwrap(), 30101);
        assert!(node_port(65530, 10).is_err());
    }

    #[tokio::test]
    async fn test_connect_to_node_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let id: NodeId = 5;
        let port_base = port - id;

        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4];
            socket.read_exact(&mut buf).await.unwrap();
            buf
        });

        let mut stream = connect_tcp("127.0.0.1", port_base, id).await.unwrap();
        stream.write_all(&[0x80, 0xC2, 0x00, 0x00]).await.unwrap();

        assert_eq!(server.await.unwrap(), [0x80, 0xC2, 0x00, 0x00]);
    }

    #[tokio::test]
    async fn test_connect_refused() {
        // Bind then drop to get a port nobody listens on
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = connect_tcp("127.0.0.1", port - 1, 1).await;
        assert!(matches!(result, Err(FleetError::Io(_))));
    }
}
