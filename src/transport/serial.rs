//! Serial line transport.
//!
//! Nodes attached directly to the host are reached through a serial port at
//! 115,200 baud, 8N1, no flow control.

use tokio_serial::SerialPortBuilderExt;
use tracing::info;

use crate::error::{FleetError, Result};

/// Default node baud rate
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Open a serial port with the node line settings
///
/// Must be called from within a Tokio runtime.
///
/// # Arguments
///
/// * `path` - Device path (e.g., "/dev/ttyUSB0")
/// * `baud_rate` - Line speed
///
/// # Errors
///
/// Returns `FleetError::Serial` if the port cannot be opened
///
/// # Examples
///
/// ```no_run
/// use radio_fleet::transport::serial::{open_serial, DEFAULT_BAUD_RATE};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let port = open_serial("/dev/ttyUSB0", DEFAULT_BAUD_RATE)?;
///     Ok(())
/// }
/// ```
pub fn open_serial(path: &str, baud_rate: u32) -> Result<tokio_serial::SerialStream> {
    let port = tokio_serial::new(path, baud_rate)
        .data_bits(tokio_serial::DataBits::Eight)
        .parity(tokio_serial::Parity::None)
        .stop_bits(tokio_serial::StopBits::One)
        .flow_control(tokio_serial::FlowControl::None)
        .open_native_async()
        .map_err(|e| FleetError::Serial(format!("Failed to open {}: {}", path, e)))?;

    info!("Opened serial port {} at {} baud", path, baud_rate);
    Ok(port)
}
