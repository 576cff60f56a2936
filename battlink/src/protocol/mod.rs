//! Wire format of the tester link.
//!
//! [`frame`] owns the packet header and checksum, [`payload`] the layouts
//! carried inside packets. Both are pure; all I/O lives in
//! [`crate::link`] and [`crate::session`].

pub mod frame;
pub mod payload;

pub use frame::{Command, HEADER_LEN, Header, MAGIC};
pub use payload::{ChunkRecord, FileEntry, HandshakeInfo, MAX_CHUNK_SIZE};
