//! # Transport Module
//!
//! Byte-stream links to the nodes.
//!
//! A session only needs a full-duplex byte stream, so any Tokio
//! `AsyncRead + AsyncWrite` type is a transport: serial ports, TCP sockets,
//! or in-memory duplex pipes in tests.

pub mod serial;
pub mod tcp;

#[cfg(test)]
pub mod mocks;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::{TransportConfig, TransportKind};
use crate::error::{FleetError, Result};
use crate::frame::protocol::NodeId;

/// Full-duplex byte stream to one node
pub trait Transport: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

impl<T> Transport for T where T: AsyncRead + AsyncWrite + Send + Unpin + 'static {}

/// Type-erased transport
pub type BoxedTransport = Box<dyn Transport>;

/// Open the transport of node `id` as described by the configuration
///
/// # Errors
///
/// Returns error if the node has no configured serial port or the
/// connection cannot be established
pub async fn connect(config: &TransportConfig, id: NodeId) -> Result<BoxedTransport> {
    match config.kind {
        TransportKind::Tcp => {
            let stream = tcp::connect_tcp(&config.host, config.port_base, id).await?;
            Ok(Box::new(stream))
        }
        TransportKind::Serial => {
            let entry = config
                .serial_ports
                .iter()
                .find(|entry| entry.id == id)
                .ok_or_else(|| FleetError::Serial(format!("no serial port configured for node {}", id)))?;
            let port = serial::open_serial(&entry.device, config.baud_rate)?;
            Ok(Box::new(port))
        }
    }
}
