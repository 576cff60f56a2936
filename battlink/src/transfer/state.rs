//! Mutable data of the operation in flight.

use std::fmt;

/// Where an operation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Stage {
    /// Nothing running.
    #[default]
    Idle,
    /// Opening the port.
    Connecting,
    /// Port open, waiting for the device greeting.
    AwaitingHandshake,
    /// Waiting for the list of result files.
    ReceivingFileList,
    /// Receiving file `index` (1-based) of `total`.
    ReceivingFile {
        /// 1-based file index.
        index: usize,
        /// Files announced.
        total: usize,
    },
    /// Uploading a plan configuration.
    SendingConfig,
    /// Operation over, port released.
    Closed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Connecting => f.write_str("connecting"),
            Self::AwaitingHandshake => f.write_str("awaiting handshake"),
            Self::ReceivingFileList => f.write_str("receiving file list"),
            Self::ReceivingFile { index, total } => write!(f, "receiving file {index}/{total}"),
            Self::SendingConfig => f.write_str("sending configuration"),
            Self::Closed => f.write_str("closed"),
        }
    }
}

/// Session data for one operation.
///
/// Owned by the transfer manager and lent to the protocol session for each
/// step. Reset at the start of every operation and after any failure.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferState {
    /// Current stage.
    pub stage: Stage,
    /// Last status line.
    pub status: String,
    /// Last progress percentage.
    pub progress: u8,
    /// Bytes transferred for the current file.
    pub bytes_done: u64,
    /// Bytes expected for the current file.
    pub total_bytes: u64,
    /// Next expected chunk number.
    pub chunk_index: u16,
    /// Whether a port is open.
    pub connected: bool,
    /// Bytes of the file being received.
    pub received: Vec<u8>,
}

impl TransferState {
    /// Clear all per-operation data. The status line is kept.
    pub fn reset(&mut self) {
        let status = std::mem::take(&mut self.status);
        *self = Self {
            status,
            ..Self::default()
        };
    }

    /// Prepare for a new file of `total` bytes.
    pub fn begin_file(&mut self, total: u64) {
        self.progress = 0;
        self.bytes_done = 0;
        self.total_bytes = total;
        self.chunk_index = 0;
        self.received.clear();
    }
}
