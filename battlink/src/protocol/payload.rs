//! Payload layouts carried inside packets.
//!
//! ```text
//! Handshake   : version(1) | timestamp(4, LE)
//! FileList    : count(1)   | name(64) x count
//! File info   : index(1)   | size(4, LE) | name(64)
//! File chunk  : number(2, LE) | size(2, LE) | data(size <= 512)
//! ACK / NACK  : (empty)
//! ```
//!
//! Name fields are fixed 64-byte, NUL-padded UTF-8.

use {
    crate::error::{Error, Result},
    byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt},
    std::io::Cursor,
};

/// Maximum data bytes carried by a single chunk.
pub const MAX_CHUNK_SIZE: usize = 512;

/// Width of a name field.
pub const NAME_FIELD_LEN: usize = 64;

/// Size of the chunk record prefix (number + size).
pub const CHUNK_PREFIX_LEN: usize = 4;

/// Size of the file info record.
pub const FILE_INFO_LEN: usize = 1 + 4 + NAME_FIELD_LEN;

/// Device greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandshakeInfo {
    /// Protocol version reported by the device.
    pub version: u8,
    /// Device timestamp.
    pub timestamp: u32,
}

impl HandshakeInfo {
    /// Parse a handshake payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(Error::Framing(format!(
                "handshake payload too short: {} bytes",
                data.len()
            )));
        }
        let mut cursor = Cursor::new(data);
        let version = cursor.read_u8()?;
        let timestamp = cursor.read_u32::<LittleEndian>()?;
        Ok(Self { version, timestamp })
    }

    /// Encode the handshake payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(5);
        buf.push(self.version);
        buf.extend_from_slice(&self.timestamp.to_le_bytes());
        buf
    }
}

/// Encode a name into a fixed, NUL-padded field, truncated to 64 bytes.
pub fn encode_name(name: &str) -> [u8; NAME_FIELD_LEN] {
    let mut field = [0u8; NAME_FIELD_LEN];
    let bytes = name.as_bytes();
    let len = bytes
        .len()
        .min(NAME_FIELD_LEN);
    field[..len].copy_from_slice(&bytes[..len]);
    field
}

/// Decode a name field: cut at the first NUL, then strip any path prefix.
pub fn decode_name(field: &[u8]) -> String {
    let end = field
        .iter()
        .position(|&b| b == 0)
        .unwrap_or(field.len());
    let name = String::from_utf8_lossy(&field[..end]);
    basename(&name).to_string()
}

/// Text after the last `/`.
pub fn basename(path: &str) -> &str {
    path.rsplit_once('/')
        .map_or(path, |(_, base)| base)
}

/// Parse a file list payload into basenames.
pub fn parse_file_list(data: &[u8]) -> Result<Vec<String>> {
    let (&count, names) = data
        .split_first()
        .ok_or_else(|| Error::Framing("empty file list payload".into()))?;

    let needed = usize::from(count) * NAME_FIELD_LEN;
    if names.len() < needed {
        return Err(Error::Framing(format!(
            "file list announces {count} names but carries only {} bytes",
            names.len()
        )));
    }

    Ok(names
        .chunks_exact(NAME_FIELD_LEN)
        .take(usize::from(count))
        .map(decode_name)
        .collect())
}

/// Encode a file list payload.
pub fn encode_file_list(names: &[&str]) -> Result<Vec<u8>> {
    let count = u8::try_from(names.len())
        .map_err(|_| Error::Framing(format!("too many files: {}", names.len())))?;
    let mut buf = Vec::with_capacity(1 + names.len() * NAME_FIELD_LEN);
    buf.push(count);
    for name in names {
        buf.extend_from_slice(&encode_name(name));
    }
    Ok(buf)
}

/// File info record announcing a file transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FileEntry {
    /// File index (plan slot when uploading).
    pub index: u8,
    /// Total file size in bytes.
    pub size: u32,
    /// File name (basename when decoded).
    pub name: String,
}

impl FileEntry {
    /// Parse a file info payload. The name is reduced to its basename.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < 5 {
            return Err(Error::Framing(format!(
                "file info payload too short: {} bytes",
                data.len()
            )));
        }
        let mut cursor = Cursor::new(data);
        let index = cursor.read_u8()?;
        let size = cursor.read_u32::<LittleEndian>()?;
        let name_end = data
            .len()
            .min(FILE_INFO_LEN);
        let name = decode_name(&data[5..name_end]);
        Ok(Self { index, size, name })
    }

    /// Encode the file info payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(FILE_INFO_LEN);
        buf.write_u8(self.index)?;
        buf.write_u32::<LittleEndian>(self.size)?;
        buf.extend_from_slice(&encode_name(&self.name));
        Ok(buf)
    }
}

/// One numbered slice of a chunked transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    /// 0-based chunk number.
    pub number: u16,
    /// Chunk data, at most [`MAX_CHUNK_SIZE`] bytes.
    pub data: Vec<u8>,
}

impl ChunkRecord {
    /// Declared size of the chunk data.
    #[allow(clippy::cast_possible_truncation)] // data never exceeds MAX_CHUNK_SIZE
    pub fn size(&self) -> u16 {
        self.data.len() as u16
    }

    /// Parse a chunk payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < CHUNK_PREFIX_LEN {
            return Err(Error::Framing(format!(
                "chunk payload too short: {} bytes",
                data.len()
            )));
        }
        let mut cursor = Cursor::new(data);
        let number = cursor.read_u16::<LittleEndian>()?;
        let size = usize::from(cursor.read_u16::<LittleEndian>()?);

        if size > MAX_CHUNK_SIZE {
            return Err(Error::Framing(format!(
                "chunk {number} declares {size} bytes (max {MAX_CHUNK_SIZE})"
            )));
        }
        let body = &data[CHUNK_PREFIX_LEN..];
        if body.len() < size {
            return Err(Error::Framing(format!(
                "chunk {number} declares {size} bytes but carries {}",
                body.len()
            )));
        }

        Ok(Self {
            number,
            data: body[..size].to_vec(),
        })
    }

    /// Encode the chunk payload.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.data.len() > MAX_CHUNK_SIZE {
            return Err(Error::Framing(format!(
                "chunk {} holds {} bytes (max {MAX_CHUNK_SIZE})",
                self.number,
                self.data.len()
            )));
        }
        let mut buf = Vec::with_capacity(CHUNK_PREFIX_LEN + self.data.len());
        buf.write_u16::<LittleEndian>(self.number)?;
        buf.write_u16::<LittleEndian>(self.size())?;
        buf.extend_from_slice(&self.data);
        Ok(buf)
    }
}

/// Split data into numbered chunks of at most [`MAX_CHUNK_SIZE`] bytes.
///
/// Chunk numbers wrap after 65535; the device never sees files that large.
#[allow(clippy::cast_possible_truncation)]
pub fn split_chunks(data: &[u8]) -> impl Iterator<Item = ChunkRecord> + '_ {
    data.chunks(MAX_CHUNK_SIZE)
        .enumerate()
        .map(|(i, chunk)| ChunkRecord {
            number: i as u16,
            data: chunk.to_vec(),
        })
}
