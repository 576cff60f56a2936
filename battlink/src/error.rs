//! Error types for battlink.

use std::io;
use thiserror::Error;

/// Result type for battlink operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for battlink operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The connection was closed while an operation was in progress.
    #[error("Connection closed: {0}")]
    Closed(String),

    /// An operation needs an open connection but none exists.
    #[error("Not connected to device")]
    NotConnected,

    /// Malformed packet: bad magic, short header or payload, bad layout.
    #[error("Framing error: {0}")]
    Framing(String),

    /// Payload checksum mismatch.
    #[error("{context} checksum mismatch: expected {expected:#04x}, got {actual:#04x}")]
    Integrity {
        /// What was being verified.
        context: String,
        /// Checksum carried in the header.
        expected: u8,
        /// Checksum computed over the received payload.
        actual: u8,
    },

    /// Unexpected command or out-of-order chunk.
    #[error("Sequence error: {0}")]
    Sequence(String),

    /// No data or acknowledgement within the allotted time.
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Rejected input, raised before any I/O takes place.
    #[error("Invalid settings: {0}")]
    Validation(#[from] ValidationError),

    /// A multi-file download stopped at one file.
    #[error("Failed at file {index}/{total} ({saved} saved): {source}")]
    FileTransfer {
        /// 1-based index of the file that failed.
        index: usize,
        /// Number of files announced by the device.
        total: usize,
        /// Number of files saved before the failure.
        saved: usize,
        /// Underlying cause.
        #[source]
        source: Box<Error>,
    },

    /// Output directory or file name problem.
    #[error("Storage error: {0}")]
    Storage(String),

    /// No serial port found.
    #[error("No serial port found")]
    DeviceNotFound,
}

impl Error {
    /// Unwrap a [`Error::FileTransfer`] to the error that caused it.
    pub fn root_cause(&self) -> &Error {
        match self {
            Self::FileTransfer { source, .. } => source.root_cause(),
            other => other,
        }
    }

    /// Whether this error was raised by input validation.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

/// Out-of-range configuration input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// No port name was given.
    #[error("no port selected")]
    EmptyPort,

    /// Plan slot outside 1-4.
    #[error("plan index {0} out of range (must be 1-4)")]
    PlanIndex(i32),

    /// Test current outside 1-500 mA.
    #[error("current {0} mA out of range (must be 1-500 mA)")]
    Current(i32),

    /// Sample rate outside 1-1000 minutes.
    #[error("sample rate {0} min out of range (must be 1-1000 minutes)")]
    SampleRate(i32),

    /// Duration outside 1-1000 hours.
    #[error("duration {0} h out of range (must be 1-1000 hours)")]
    Duration(i32),

    /// Minimum temperature outside -40..=85 °C.
    #[error("min temp {0} °C out of range (must be -40 to 85 °C)")]
    MinTemp(i32),

    /// Maximum temperature outside -40..=85 °C.
    #[error("max temp {0} °C out of range (must be -40 to 85 °C)")]
    MaxTemp(i32),

    /// Minimum temperature not below maximum.
    #[error("min temp {min} °C must be less than max temp {max} °C")]
    TempOrder {
        /// Requested minimum.
        min: i32,
        /// Requested maximum.
        max: i32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_file_transfer() {
        let err = Error::FileTransfer {
            index: 2,
            total: 3,
            saved: 1,
            source: Box::new(Error::Sequence("chunk".into())),
        };
        assert!(matches!(err.root_cause(), Error::Sequence(_)));
        assert!(err.to_string().contains("2/3"));
        assert!(err.to_string().contains("1 saved"));
    }

    #[test]
    fn test_integrity_message_shows_both_checksums() {
        let err = Error::Integrity {
            context: "Handshake".into(),
            expected: 0x1f,
            actual: 0x2a,
        };
        assert_eq!(
            err.to_string(),
            "Handshake checksum mismatch: expected 0x1f, got 0x2a"
        );
    }

    #[test]
    fn test_validation_from() {
        let err: Error = ValidationError::PlanIndex(5).into();
        assert!(err.is_validation());
    }
}
