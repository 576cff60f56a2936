//! Scripted in-memory device used by the protocol and transfer tests.

use {
    crate::{
        error::{Error, Result},
        port::{Connector, Port, SerialConfig},
        protocol::frame::{self, Command, HEADER_LEN},
    },
    std::{
        collections::VecDeque,
        io::{Read, Write},
        sync::{Arc, Mutex},
    },
};

#[derive(Default)]
struct MockState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    open: bool,
    opens: usize,
    close_when_drained: bool,
}

/// Shared handle to the scripted device.
#[derive(Clone, Default)]
pub(crate) struct MockDevice {
    state: Arc<Mutex<MockState>>,
}

impl MockDevice {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Queue raw bytes for the host to read.
    pub(crate) fn push(&self, bytes: &[u8]) {
        self.state
            .lock()
            .unwrap()
            .incoming
            .extend(bytes);
    }

    /// Queue a well-formed packet.
    pub(crate) fn push_packet(&self, command: Command, payload: &[u8]) {
        self.push(&frame::encode(command, payload).unwrap());
    }

    /// Report the stream as closed once every queued byte was read.
    pub(crate) fn close_when_drained(&self) {
        self.state
            .lock()
            .unwrap()
            .close_when_drained = true;
    }

    /// Drop the connection from the device side.
    pub(crate) fn close(&self) {
        self.state
            .lock()
            .unwrap()
            .open = false;
    }

    /// Everything the host wrote.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.state
            .lock()
            .unwrap()
            .written
            .clone()
    }

    /// Packets the host wrote, as `(command byte, payload)`.
    pub(crate) fn sent_packets(&self) -> Vec<(u8, Vec<u8>)> {
        let written = self.written();
        let mut packets = Vec::new();
        let mut rest = written.as_slice();
        while let Some(header) = frame::decode_header(rest) {
            let end = HEADER_LEN + usize::from(header.length);
            packets.push((header.command, rest[HEADER_LEN..end].to_vec()));
            rest = &rest[end..];
        }
        assert!(rest.is_empty(), "trailing garbage in host output");
        packets
    }

    /// Command bytes the host wrote, in order.
    pub(crate) fn sent_commands(&self) -> Vec<u8> {
        self.sent_packets()
            .into_iter()
            .map(|(cmd, _)| cmd)
            .collect()
    }

    pub(crate) fn is_open(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .open
    }

    pub(crate) fn opens(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .opens
    }

    /// Open a port onto this device.
    pub(crate) fn port(&self) -> MockPort {
        let mut state = self
            .state
            .lock()
            .unwrap();
        state.open = true;
        state.opens += 1;
        MockPort {
            state: Arc::clone(&self.state),
            name: "mock0".to_string(),
        }
    }
}

pub(crate) struct MockPort {
    state: Arc<Mutex<MockState>>,
    name: String,
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        let n = buf
            .len()
            .min(state.incoming.len());
        for b in buf.iter_mut().take(n) {
            *b = state
                .incoming
                .pop_front()
                .unwrap();
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if !state.open {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "port closed",
            ));
        }
        state
            .written
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let mut state = self
            .state
            .lock()
            .unwrap();
        if state.incoming.is_empty() && state.close_when_drained {
            state.open = false;
        }
        Ok(state.incoming.len())
    }

    fn is_open(&self) -> bool {
        self.state
            .lock()
            .unwrap()
            .open
    }

    fn clear_buffers(&mut self) -> Result<()> {
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .open = false;
        Ok(())
    }
}

/// Connector handing out ports onto one [`MockDevice`].
pub(crate) struct MockConnector {
    pub(crate) device: MockDevice,
    pub(crate) fail: bool,
}

impl MockConnector {
    pub(crate) fn new(device: &MockDevice) -> Self {
        Self {
            device: device.clone(),
            fail: false,
        }
    }

    pub(crate) fn failing(device: &MockDevice) -> Self {
        Self {
            device: device.clone(),
            fail: true,
        }
    }
}

impl Connector for MockConnector {
    type Port = MockPort;

    fn open(&mut self, config: &SerialConfig) -> Result<MockPort> {
        if self.fail {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("no such port: {}", config.port_name),
            )));
        }
        Ok(self
            .device
            .port())
    }
}
