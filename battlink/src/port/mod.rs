//! Port abstraction over the serial byte stream.
//!
//! The protocol layer never talks to a serial driver directly. It consumes a
//! [`Port`], which exposes what the framing protocol needs: write bytes, ask
//! how many bytes are waiting, read, and check whether the stream is open.
//!
//! ```text
//! TransferManager --> Session --> Link --> Port
//!                                          |-- NativePort (serialport)
//!                                          `-- MockPort   (tests)
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use battlink::port::Port;
//!
//! fn drain<P: Port>(port: &mut P) -> battlink::Result<Vec<u8>> {
//!     let mut buf = vec![0u8; port.bytes_available()?];
//!     let n = port.read(&mut buf)?;
//!     buf.truncate(n);
//!     Ok(buf)
//! }
//! ```

#[cfg(feature = "native")]
pub mod native;

#[cfg(test)]
pub(crate) mod mock;

use {
    crate::error::Result,
    std::{
        io::{Read, Write},
        time::Duration,
    },
};

/// Default baud rate of the device link.
pub const DEFAULT_BAUD: u32 = 115200;

/// Timeout applied to a single driver read or write.
pub const DRIVER_TIMEOUT: Duration = Duration::from_millis(50);

/// How to open a port.
///
/// The tester always speaks 8 data bits, no parity, one stop bit and no flow
/// control, so only the name and speed vary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyACM0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Per-call driver timeout. The link layer does its own deadline
    /// tracking on top of this.
    pub timeout: Duration,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: String::new(),
            baud_rate: DEFAULT_BAUD,
            timeout: DRIVER_TIMEOUT,
        }
    }
}

impl SerialConfig {
    /// Configuration for `port_name` at `baud_rate`.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            ..Default::default()
        }
    }

    /// Same settings, different port.
    #[must_use]
    pub fn for_port(&self, port_name: impl Into<String>) -> Self {
        Self {
            port_name: port_name.into(),
            ..self.clone()
        }
    }
}

/// A serial port as reported by the OS.
#[derive(Debug, Clone, Default)]
pub struct PortInfo {
    /// Port name/path.
    pub name: String,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial_number: Option<String>,
}

/// Byte stream to the device.
///
/// `read` and `write` come from [`Read`] and [`Write`]. Implementations should
/// make `read` return promptly when [`Port::bytes_available`] reports data.
pub trait Port: Read + Write + Send {
    /// Port name/path.
    fn name(&self) -> &str;

    /// Number of bytes waiting to be read.
    fn bytes_available(&mut self) -> Result<usize>;

    /// Whether the stream is still open.
    fn is_open(&self) -> bool;

    /// Discard anything buffered in either direction.
    fn clear_buffers(&mut self) -> Result<()>;

    /// Release the device. Further I/O fails and [`Port::is_open`] returns
    /// `false`. Closing twice is a no-op.
    fn close(&mut self) -> Result<()>;
}

/// Opens ports by name.
///
/// The transfer manager owns a connector and asks it for a fresh port at the
/// start of every operation.
pub trait Connector {
    /// The port type produced.
    type Port: Port;

    /// Open the port described by `config`.
    fn open(&mut self, config: &SerialConfig) -> Result<Self::Port>;
}

/// Lists the serial ports present on the host.
pub trait PortEnumerator {
    /// All ports the OS reports.
    fn list_ports() -> Result<Vec<PortInfo>>;
}

#[cfg(feature = "native")]
pub use native::{NativeConnector, NativePort, NativePortEnumerator};
