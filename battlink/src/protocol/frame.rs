//! Packet framing.
//!
//! Every exchange with the device is a packet made of a fixed 6-byte header
//! followed by a variable payload.
//!
//! ## Frame Format
//!
//! ```text
//! +--------+-----+--------+----------+---------------+
//! | Magic  | CMD | Length | Checksum |    Payload    |
//! +--------+-----+--------+----------+---------------+
//! | 2 bytes| 1   | 2 bytes| 1        |   variable    |
//! +--------+-----+--------+----------+---------------+
//! | 0xAA55 | cmd | LE u16 | XOR(pl)  |   payload     |
//! +--------+-----+--------+----------+---------------+
//! ```
//!
//! Multi-byte fields are little-endian. The checksum is the XOR of all payload
//! bytes, zero for an empty payload.

use {
    crate::error::{Error, Result},
    byteorder::{LittleEndian, WriteBytesExt},
    std::fmt,
};

/// Packet magic number.
pub const MAGIC: u16 = 0xAA55;

/// Size of the packet header in bytes.
pub const HEADER_LEN: usize = 6;

/// Packet command types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Device greeting, sent once per connection.
    Handshake = 0x01,
    /// List of files the device is about to send.
    FileList = 0x02,
    /// File info record or file chunk.
    FileData = 0x03,
    /// End of file marker.
    FileEnd = 0x04,
    /// Positive acknowledgement.
    Ack = 0x05,
    /// Negative acknowledgement.
    Nack = 0x06,
    /// Host request to push a configuration file.
    ConfigReq = 0x07,
}

impl TryFrom<u8> for Command {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0x01 => Ok(Self::Handshake),
            0x02 => Ok(Self::FileList),
            0x03 => Ok(Self::FileData),
            0x04 => Ok(Self::FileEnd),
            0x05 => Ok(Self::Ack),
            0x06 => Ok(Self::Nack),
            0x07 => Ok(Self::ConfigReq),
            other => Err(other),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "HANDSHAKE",
            Self::FileList => "FILE_LIST",
            Self::FileData => "FILE_DATA",
            Self::FileEnd => "FILE_END",
            Self::Ack => "ACK",
            Self::Nack => "NACK",
            Self::ConfigReq => "CONFIG_REQ",
        };
        f.write_str(name)
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Magic number as read from the wire.
    pub magic: u16,
    /// Raw command byte.
    pub command: u8,
    /// Payload length in bytes.
    pub length: u16,
    /// XOR checksum of the payload.
    pub checksum: u8,
}

impl Header {
    /// Whether the magic number matches [`MAGIC`].
    pub fn is_valid(&self) -> bool {
        self.magic == MAGIC
    }

    /// The command, if the byte is a known one.
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.command).ok()
    }

    /// Check whether this header carries the given command.
    pub fn is(&self, command: Command) -> bool {
        self.command == command as u8
    }

    /// Human readable command name, falling back to the raw byte.
    pub fn command_name(&self) -> String {
        match self.command() {
            Some(cmd) => cmd.to_string(),
            None => format!("0x{:02X}", self.command),
        }
    }
}

/// XOR-fold of all bytes.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter()
        .fold(0, |acc, b| acc ^ b)
}

/// Encode a complete packet.
///
/// Fails only when the payload does not fit the 16-bit length field.
pub fn encode(command: Command, payload: &[u8]) -> Result<Vec<u8>> {
    let length = u16::try_from(payload.len()).map_err(|_| {
        Error::Framing(format!(
            "{command} payload too large: {} bytes",
            payload.len()
        ))
    })?;

    let mut buf = Vec::with_capacity(HEADER_LEN + payload.len());
    buf.write_u16::<LittleEndian>(MAGIC)?;
    buf.push(command as u8);
    buf.write_u16::<LittleEndian>(length)?;
    buf.push(checksum(payload));
    buf.extend_from_slice(payload);

    Ok(buf)
}

/// Decode a packet header.
///
/// Returns `None` when fewer than [`HEADER_LEN`] bytes are given or the magic
/// number does not match.
pub fn decode_header(data: &[u8]) -> Option<Header> {
    if data.len() < HEADER_LEN {
        return None;
    }

    let header = Header {
        magic: u16::from_le_bytes([data[0], data[1]]),
        command: data[2],
        length: u16::from_le_bytes([data[3], data[4]]),
        checksum: data[5],
    };

    header
        .is_valid()
        .then_some(header)
}

/// Verify a payload against the checksum carried in its header.
pub fn verify(header: &Header, payload: &[u8], context: &str) -> Result<()> {
    let actual = checksum(payload);
    if actual == header.checksum {
        Ok(())
    } else {
        Err(Error::Integrity {
            context: context.to_string(),
            expected: header.checksum,
            actual,
        })
    }
}
