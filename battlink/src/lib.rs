//! # battlink
//!
//! Host side of the serial link to a battery-testing device.
//!
//! The device speaks a small binary framing protocol: every packet carries a
//! magic number, a command byte, a payload length and an XOR checksum. On top
//! of it the host
//!
//! - waits for the device handshake,
//! - downloads the list of result files and each file in 512-byte chunks,
//! - uploads test-plan configuration files the same way.
//!
//! ## Layers
//!
//! - [`protocol`]: packet and payload codecs (pure)
//! - [`link`]: bounded, cooperative I/O over a [`Port`]
//! - [`session`]: one protocol step at a time, with ACK/NACK
//! - [`transfer`]: whole operations with cleanup on failure
//!
//! ## Features
//!
//! - `native` (default): serial ports via the `serialport` crate
//! - `serde`: serialization support for reports and port listings
//!
//! ## Example
//!
//! ```rust,no_run
//! use battlink::{LogSink, TransferManager};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         let mut manager = TransferManager::native(LogSink);
//!         manager.set_output_dir("./received_files");
//!
//!         let report = manager.receive_results("/dev/ttyACM0")?;
//!         for path in &report.files {
//!             println!("saved {}", path.display());
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod events;
pub mod link;
pub mod port;
pub mod protocol;
pub mod session;
pub mod storage;
pub mod transfer;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker consulted by every polling wait.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications). Only the first
/// registration takes effect.
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(feature = "native")]
pub use {
    device::{auto_detect_port, detect_ports},
    port::{NativeConnector, NativePort, NativePortEnumerator},
};
pub use {
    device::{DetectedPort, DeviceKind, format_port_list, select_port},
    error::{Error, Result, ValidationError},
    events::{Completion, Event, EventSink, LogSink, Progress},
    link::{Link, YieldHook},
    port::{Connector, Port, PortEnumerator, PortInfo, SerialConfig},
    protocol::{Command, HandshakeInfo},
    session::{Session, SessionConfig},
    storage::OutputDir,
    transfer::{DownloadReport, PlanSettings, Stage, TransferManager, TransferState},
};
