//! Protocol steps: handshake, file list, file receive, file send.
//!
//! A [`Session`] borrows the open [`Link`], the timeouts, the operation state
//! and the event sink for the duration of one or more steps. Each step is a
//! bounded exchange with ACK/NACK:
//!
//! ```text
//! Device                         Host
//!   |---- HANDSHAKE ------------->|
//!   |<--------------------- ACK --|   (NACK + keep waiting on a bad packet)
//!   |---- FILE_LIST ------------->|
//!   |<--------------------- ACK --|
//!   |---- FILE_DATA (info) ------>|
//!   |<--------------------- ACK --|
//!   |---- FILE_DATA (chunk 0) --->|
//!   |<--------------------- ACK --|
//!   |           ...               |
//! ```
//!
//! Uploads run the same file exchange with the roles swapped. Only the
//! handshake retries; every other step fails on the first bad packet.

use {
    crate::{
        error::{Error, Result},
        events::{EventSink, Progress},
        link::Link,
        port::Port,
        protocol::{
            frame::{self, Command, HEADER_LEN, Header},
            payload::{self, ChunkRecord, FileEntry, HandshakeInfo},
        },
        storage::OutputDir,
        transfer::state::TransferState,
    },
    log::{debug, info, trace, warn},
    std::{
        path::PathBuf,
        time::{Duration, Instant},
    },
};

/// Timeouts used by the protocol steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Overall budget for the device greeting.
    pub handshake_timeout: Duration,
    /// Sub-wait between handshake polls.
    pub handshake_poll: Duration,
    /// Window for reading one header or payload.
    pub read_timeout: Duration,
    /// Wait for an ACK after each upload packet.
    pub ack_timeout: Duration,
    /// Budget for handing one packet to the port.
    pub write_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_secs(30),
            handshake_poll: Duration::from_millis(100),
            read_timeout: Duration::from_secs(30),
            ack_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// One conversation with the device over an open link.
pub struct Session<'a, P: Port> {
    link: &'a mut Link<P>,
    config: &'a SessionConfig,
    state: &'a mut TransferState,
    events: &'a mut dyn EventSink,
}

impl<'a, P: Port> Session<'a, P> {
    /// Borrow everything a protocol step needs.
    pub fn new(
        link: &'a mut Link<P>,
        config: &'a SessionConfig,
        state: &'a mut TransferState,
        events: &'a mut dyn EventSink,
    ) -> Self {
        Self {
            link,
            config,
            state,
            events,
        }
    }

    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!("{message}");
        self.events
            .on_status(&message);
        self.state.status = message;
    }

    fn report_progress(&mut self, done: u64, total: u64) {
        let progress = Progress::new(done, total);
        self.state.progress = progress.percent;
        self.state.bytes_done = done;
        self.state.total_bytes = total;
        self.events
            .on_progress(progress);
    }

    fn closed(&self, what: &str) -> Error {
        Error::Closed(format!("{} closed while {what}", self.link.name()))
    }

    fn send_ack(&mut self) -> Result<()> {
        self.link
            .send_packet(Command::Ack, &[], self.config.write_timeout)
    }

    fn send_nack(&mut self) -> Result<()> {
        self.link
            .send_packet(Command::Nack, &[], self.config.write_timeout)
    }

    /// NACK the packet just read (best effort) and fail with `err`.
    fn reject<T>(&mut self, err: Error) -> Result<T> {
        if let Err(e) = self.send_nack() {
            debug!("Could not send NACK: {e}");
        }
        Err(err)
    }

    /// Read one packet header within the read window.
    fn read_header(&mut self) -> Result<Header> {
        let raw = self
            .link
            .read_exact(HEADER_LEN, self.config.read_timeout);
        trace!("Header bytes: {raw:02X?}");

        if raw.len() < HEADER_LEN {
            if !self.link.is_open() {
                return Err(self.closed("waiting for a packet"));
            }
            if raw.is_empty() {
                return Err(Error::Timeout(format!(
                    "no packet within {} ms",
                    self.config
                        .read_timeout
                        .as_millis()
                )));
            }
            return Err(Error::Framing(format!(
                "short header: {}/{HEADER_LEN} bytes",
                raw.len()
            )));
        }

        frame::decode_header(&raw)
            .ok_or_else(|| Error::Framing(format!("invalid magic in header {raw:02X?}")))
    }

    /// Read and verify the payload announced by `header`.
    fn read_payload(&mut self, header: &Header, context: &str) -> Result<Vec<u8>> {
        let len = usize::from(header.length);
        let data = self
            .link
            .read_exact(len, self.config.read_timeout);
        if data.len() < len {
            if !self.link.is_open() {
                return Err(self.closed(&format!("reading {context}")));
            }
            return Err(Error::Framing(format!(
                "short {context} payload: {}/{len} bytes",
                data.len()
            )));
        }
        frame::verify(header, &data, context)?;
        Ok(data)
    }

    /// Read a verified payload. Short or corrupt payloads are NACKed unless
    /// the stream is gone.
    fn read_checked(&mut self, header: &Header, context: &str) -> Result<Vec<u8>> {
        match self.read_payload(header, context) {
            Err(e @ Error::Closed(_)) => Err(e),
            Err(e) => self.reject(e),
            ok => ok,
        }
    }

    /// Read a header that must carry `command`. A missing, short or invalid
    /// header and any other command are NACKed unless the stream is gone.
    fn expect_header(&mut self, command: Command) -> Result<Header> {
        let header = match self.read_header() {
            Ok(header) => header,
            Err(e @ Error::Closed(_)) => return Err(e),
            Err(e) => return self.reject(e),
        };
        if header.is(command) {
            Ok(header)
        } else {
            let err = Error::Sequence(format!(
                "expected {command}, got {}",
                header.command_name()
            ));
            self.reject(err)
        }
    }

    /// Wait for an ACK to the packet just sent.
    fn wait_for_ack(&mut self, context: &str) -> Result<()> {
        if !self
            .link
            .wait_for_data(self.config.ack_timeout)
        {
            if !self.link.is_open() {
                return Err(self.closed(&format!("waiting for ACK to {context}")));
            }
            return Err(Error::Timeout(format!(
                "no ACK to {context} within {} ms",
                self.config
                    .ack_timeout
                    .as_millis()
            )));
        }

        let header = self.read_header()?;
        if header.length > 0 {
            // ACK/NACK carry no payload; drop whatever the device attached.
            let len = usize::from(header.length);
            let drained = self
                .link
                .read_exact(len, self.config.read_timeout);
            if drained.len() < len {
                debug!(
                    "{} payload cut short: drained {}/{len} bytes",
                    header.command_name(),
                    drained.len()
                );
            }
        }

        match header.command() {
            Some(Command::Ack) => Ok(()),
            Some(Command::Nack) => Err(Error::Sequence(format!("device rejected {context}"))),
            _ => Err(Error::Sequence(format!(
                "expected ACK to {context}, got {}",
                header.command_name()
            ))),
        }
    }

    /// Wait for the device greeting and acknowledge it.
    ///
    /// Invalid headers and other commands are skipped. A handshake with a bad
    /// checksum or short payload is NACKed and the wait continues until the
    /// overall handshake timeout. A closed stream fails immediately.
    pub fn wait_for_handshake(&mut self) -> Result<HandshakeInfo> {
        self.set_status("Waiting for device handshake...");
        let start = Instant::now();

        while start.elapsed() < self.config.handshake_timeout {
            if !self
                .link
                .wait_for_data(self.config.handshake_poll)
            {
                if !self.link.is_open() {
                    return Err(self.closed("waiting for handshake"));
                }
                continue;
            }

            let raw = self
                .link
                .read_exact(HEADER_LEN, self.config.read_timeout);
            if raw.len() < HEADER_LEN {
                if !self.link.is_open() {
                    return Err(self.closed("waiting for handshake"));
                }
                trace!("Partial header discarded: {raw:02X?}");
                continue;
            }

            let Some(header) = frame::decode_header(&raw) else {
                trace!("Invalid header discarded: {raw:02X?}");
                continue;
            };
            if !header.is(Command::Handshake) {
                debug!(
                    "Ignoring {} while waiting for handshake",
                    header.command_name()
                );
                continue;
            }

            let info = self
                .read_payload(&header, "handshake")
                .and_then(|data| HandshakeInfo::parse(&data));
            match info {
                Ok(info) => {
                    self.send_ack()?;
                    info!(
                        "Handshake OK: protocol version {}, device time {}",
                        info.version, info.timestamp
                    );
                    self.set_status(format!("Connected (protocol v{})", info.version));
                    return Ok(info);
                },
                Err(e @ Error::Closed(_)) => return Err(e),
                Err(e) => {
                    warn!("Bad handshake ({e}), sending NACK");
                    self.send_nack()?;
                },
            }
        }

        Err(Error::Timeout(format!(
            "no handshake within {} ms",
            self.config
                .handshake_timeout
                .as_millis()
        )))
    }

    /// Receive the list of result files, as basenames in device order.
    pub fn receive_file_list(&mut self) -> Result<Vec<String>> {
        self.set_status("Receiving file list...");

        let header = self.expect_header(Command::FileList)?;
        let data = self.read_checked(&header, "file list")?;
        let names = match payload::parse_file_list(&data) {
            Ok(names) => names,
            Err(e) => return self.reject(e),
        };
        self.send_ack()?;

        debug!("File list: {names:?}");
        self.set_status(format!("Found {} files", names.len()));
        Ok(names)
    }

    /// Receive one file and save it under `out`.
    ///
    /// Returns the path written.
    pub fn receive_file(&mut self, out: &OutputDir) -> Result<PathBuf> {
        let header = self.expect_header(Command::FileData)?;
        let data = self.read_checked(&header, "file info")?;
        let entry = match FileEntry::parse(&data) {
            Ok(entry) => entry,
            Err(e) => return self.reject(e),
        };
        self.send_ack()?;

        let total = u64::from(entry.size);
        self.set_status(format!("Receiving {} ({total} bytes)", entry.name));
        self.state
            .begin_file(total);

        while (self.state.received.len() as u64) < total {
            let header = self.expect_header(Command::FileData)?;
            let data = self.read_checked(&header, "file chunk")?;
            let chunk = match ChunkRecord::parse(&data) {
                Ok(chunk) => chunk,
                Err(e) => return self.reject(e),
            };

            let expected = self.state.chunk_index;
            if chunk.number != expected {
                return self.reject(Error::Sequence(format!(
                    "chunk {} out of order (expected {expected})",
                    chunk.number
                )));
            }
            let done = (self.state.received.len() + chunk.data.len()) as u64;
            if done > total {
                return self.reject(Error::Framing(format!(
                    "chunk {} overruns {}: {done}/{total} bytes",
                    chunk.number, entry.name
                )));
            }

            self.state
                .received
                .extend_from_slice(&chunk.data);
            self.send_ack()?;
            trace!("Chunk {} ({} bytes) accepted", chunk.number, chunk.data.len());

            self.state.chunk_index = expected.wrapping_add(1);
            self.report_progress(done, total);
        }
        if total == 0 {
            self.report_progress(0, 0);
        }

        let data = std::mem::take(&mut self.state.received);
        out.save(&entry.name, &data)
    }

    /// Send `data` to the device as `filename` for plan slot `plan_index`.
    pub fn send_file(&mut self, plan_index: u8, filename: &str, data: &[u8]) -> Result<()> {
        let size = u32::try_from(data.len())
            .map_err(|_| Error::Framing(format!("{filename} too large: {} bytes", data.len())))?;
        let info = FileEntry {
            index: plan_index,
            size,
            name: filename.to_string(),
        }
        .encode()?;

        self.set_status(format!("Sending {filename} ({size} bytes)"));
        self.link
            .send_packet(Command::FileData, &info, self.config.write_timeout)?;
        self.wait_for_ack("file info")?;

        let total = u64::from(size);
        self.state
            .begin_file(total);
        let mut sent = 0u64;

        for chunk in payload::split_chunks(data) {
            let packet = chunk.encode()?;
            self.link
                .send_packet(Command::FileData, &packet, self.config.write_timeout)?;
            self.wait_for_ack(&format!("chunk {}", chunk.number))?;

            sent += chunk.data.len() as u64;
            self.state.chunk_index = chunk.number.wrapping_add(1);
            self.report_progress(sent, total);
        }
        self.report_progress(total, total);

        info!("Sent {filename} ({size} bytes)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::{
            events::Event,
            port::mock::{MockDevice, MockPort},
        },
    };

    fn fast_config() -> SessionConfig {
        SessionConfig {
            handshake_timeout: Duration::from_millis(300),
            handshake_poll: Duration::from_millis(10),
            read_timeout: Duration::from_millis(100),
            ack_timeout: Duration::from_millis(100),
            write_timeout: Duration::from_millis(100),
        }
    }

    struct Harness {
        device: MockDevice,
        link: Link<MockPort>,
        config: SessionConfig,
        state: TransferState,
        events: Vec<Event>,
    }

    impl Harness {
        fn new() -> Self {
            let device = MockDevice::new();
            let link = Link::new(device.port()).with_tick(Duration::from_millis(1));
            Self {
                device,
                link,
                config: fast_config(),
                state: TransferState::default(),
                events: Vec::new(),
            }
        }

        fn session(&mut self) -> Session<'_, MockPort> {
            Session::new(
                &mut self.link,
                &self.config,
                &mut self.state,
                &mut self.events,
            )
        }

        fn percents(&self) -> Vec<u8> {
            self.events
                .iter()
                .filter_map(|e| match e {
                    Event::Progress(p) => Some(p.percent),
                    _ => None,
                })
                .collect()
        }
    }

    const ACK: u8 = Command::Ack as u8;
    const NACK: u8 = Command::Nack as u8;

    fn handshake_payload() -> Vec<u8> {
        HandshakeInfo {
            version: 1,
            timestamp: 1_000_000,
        }
        .encode()
    }

    fn corrupted(command: Command, payload: &[u8]) -> Vec<u8> {
        let mut packet = frame::encode(command, payload).unwrap();
        packet[5] ^= 0xFF;
        packet
    }

    fn chunk(number: u16, data: &[u8]) -> Vec<u8> {
        ChunkRecord {
            number,
            data: data.to_vec(),
        }
        .encode()
        .unwrap()
    }

    fn file_info(name: &str, size: u32) -> Vec<u8> {
        FileEntry {
            index: 1,
            size,
            name: name.to_string(),
        }
        .encode()
        .unwrap()
    }

    #[test]
    fn test_handshake_acknowledged() {
        let mut h = Harness::new();
        h.device
            .push_packet(Command::Handshake, &handshake_payload());

        let info = h
            .session()
            .wait_for_handshake()
            .unwrap();

        assert_eq!(info.version, 1);
        assert_eq!(info.timestamp, 1_000_000);
        assert_eq!(h.device.sent_commands(), vec![ACK]);
    }

    #[test]
    fn test_handshake_bad_checksum_nacks_then_times_out() {
        let mut h = Harness::new();
        h.device
            .push(&corrupted(Command::Handshake, &handshake_payload()));

        let err = h
            .session()
            .wait_for_handshake()
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_handshake_recovers_after_bad_packet() {
        let mut h = Harness::new();
        h.device
            .push(&corrupted(Command::Handshake, &handshake_payload()));
        h.device
            .push_packet(Command::Handshake, &handshake_payload());

        assert!(
            h.session()
                .wait_for_handshake()
                .is_ok()
        );
        assert_eq!(h.device.sent_commands(), vec![NACK, ACK]);
    }

    #[test]
    fn test_handshake_skips_noise_and_other_commands() {
        let mut h = Harness::new();
        h.device
            .push(&[0x00, 0x11, 0x22, 0x33, 0x44, 0x55]);
        h.device
            .push_packet(Command::Ack, &[]);
        h.device
            .push_packet(Command::Handshake, &handshake_payload());

        assert!(
            h.session()
                .wait_for_handshake()
                .is_ok()
        );
        assert_eq!(h.device.sent_commands(), vec![ACK]);
    }

    #[test]
    fn test_handshake_short_payload_nacked() {
        let mut h = Harness::new();
        h.device
            .push_packet(Command::Handshake, &[1, 2]);
        h.device
            .push_packet(Command::Handshake, &handshake_payload());

        assert!(
            h.session()
                .wait_for_handshake()
                .is_ok()
        );
        assert_eq!(h.device.sent_commands(), vec![NACK, ACK]);
    }

    #[test]
    fn test_handshake_fails_fast_when_closed() {
        let mut h = Harness::new();
        h.device
            .close_when_drained();

        let start = Instant::now();
        let err = h
            .session()
            .wait_for_handshake()
            .unwrap_err();

        assert!(matches!(err, Error::Closed(_)), "{err}");
        assert!(start.elapsed() < Duration::from_millis(250));
    }

    #[test]
    fn test_file_list_basenames() {
        let mut h = Harness::new();
        let list = payload::encode_file_list(&["/sd/log_ch1.csv", "/sd/log_ch2.csv"]).unwrap();
        h.device
            .push_packet(Command::FileList, &list);

        let names = h
            .session()
            .receive_file_list()
            .unwrap();

        assert_eq!(names, vec!["log_ch1.csv", "log_ch2.csv"]);
        assert_eq!(h.device.sent_commands(), vec![ACK]);
        assert_eq!(h.state.status, "Found 2 files");
    }

    #[test]
    fn test_file_list_wrong_command_nacked() {
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &[0]);

        let err = h
            .session()
            .receive_file_list()
            .unwrap_err();

        assert!(matches!(err, Error::Sequence(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_file_list_checksum_mismatch_nacked() {
        let mut h = Harness::new();
        let list = payload::encode_file_list(&["a.csv"]).unwrap();
        h.device
            .push(&corrupted(Command::FileList, &list));

        let err = h
            .session()
            .receive_file_list()
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_file_list_timeout() {
        let mut h = Harness::new();
        let err = h
            .session()
            .receive_file_list()
            .unwrap_err();
        assert!(matches!(err, Error::Timeout(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_file_list_bad_magic_nacked() {
        let mut h = Harness::new();
        h.device
            .push(&[0x12, 0x34, 0x02, 0x00, 0x00, 0x00]);
        let err = h
            .session()
            .receive_file_list()
            .unwrap_err();
        assert!(matches!(err, Error::Framing(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_file_list_short_payload_nacked() {
        let mut h = Harness::new();
        let list = payload::encode_file_list(&["a.csv"]).unwrap();
        let packet = frame::encode(Command::FileList, &list).unwrap();
        h.device
            .push(&packet[..20]);

        let err = h
            .session()
            .receive_file_list()
            .unwrap_err();

        assert!(matches!(err, Error::Framing(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_file_list_closed_not_nacked() {
        let mut h = Harness::new();
        h.device
            .close_when_drained();

        let err = h
            .session()
            .receive_file_list()
            .unwrap_err();

        assert!(matches!(err, Error::Closed(_)), "{err}");
        assert!(
            h.device
                .written()
                .is_empty()
        );
    }

    #[test]
    fn test_receive_file_in_two_chunks() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let content: Vec<u8> = (0..1000u32)
            .map(|i| (i % 251) as u8)
            .collect();

        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("/sd/log_ch1.csv", 1000));
        h.device
            .push_packet(Command::FileData, &chunk(0, &content[..512]));
        h.device
            .push_packet(Command::FileData, &chunk(1, &content[512..]));

        let path = h
            .session()
            .receive_file(&out)
            .unwrap();

        assert_eq!(path, tmp.path().join("log_ch1.csv"));
        assert_eq!(std::fs::read(&path).unwrap(), content);
        assert_eq!(h.percents(), vec![51, 100]);
        assert_eq!(h.device.sent_commands(), vec![ACK, ACK, ACK]);
        assert_eq!(h.state.bytes_done, 1000);
        assert!(
            h.state
                .received
                .is_empty()
        );
    }

    #[test]
    fn test_receive_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("empty.csv", 0));

        let path = h
            .session()
            .receive_file(&out)
            .unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"");
        assert_eq!(h.percents(), vec![100]);
    }

    #[test]
    fn test_receive_file_out_of_order_chunk() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("log.csv", 20));
        h.device
            .push_packet(Command::FileData, &chunk(1, &[0u8; 10]));

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Sequence(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![ACK, NACK]);
        assert!(!tmp.path().join("log.csv").exists());
    }

    #[test]
    fn test_receive_file_chunk_overrun() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("log.csv", 4));
        h.device
            .push_packet(Command::FileData, &chunk(0, &[0u8; 8]));

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Framing(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![ACK, NACK]);
    }

    #[test]
    fn test_receive_file_bad_magic_nacked() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push(&[0x12, 0x34, 0x03, 0x00, 0x00, 0x00]);

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Framing(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
    }

    #[test]
    fn test_receive_file_info_checksum_mismatch_nacked() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push(&corrupted(Command::FileData, &file_info("log.csv", 10)));

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }), "{err}");
        assert_eq!(h.device.sent_commands(), vec![NACK]);
        assert!(!tmp.path().join("log.csv").exists());
    }

    #[test]
    fn test_receive_file_chunk_checksum_mismatch_nacked() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("log.csv", 10));
        h.device
            .push(&corrupted(Command::FileData, &chunk(0, &[3u8; 10])));

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Integrity { .. }), "{err}");
        assert_eq!(h.device.sent_commands(), vec![ACK, NACK]);
        assert!(!tmp.path().join("log.csv").exists());
    }

    #[test]
    fn test_receive_file_unexpected_command_nacked() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("log.csv", 10));
        h.device
            .push_packet(Command::Ack, &[]);

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Sequence(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![ACK, NACK]);
        assert!(!tmp.path().join("log.csv").exists());
    }

    #[test]
    fn test_receive_file_short_chunk_nacked() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("log.csv", 10));
        let packet = frame::encode(Command::FileData, &chunk(0, &[3u8; 10])).unwrap();
        h.device
            .push(&packet[..HEADER_LEN + 6]);

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Framing(_)), "{err}");
        assert_eq!(h.device.sent_commands(), vec![ACK, NACK]);
        assert!(!tmp.path().join("log.csv").exists());
    }

    #[test]
    fn test_receive_file_stream_closed_mid_file() {
        let tmp = tempfile::tempdir().unwrap();
        let out = OutputDir::new(tmp.path());
        let mut h = Harness::new();
        h.device
            .push_packet(Command::FileData, &file_info("log.csv", 600));
        h.device
            .push_packet(Command::FileData, &chunk(0, &[7u8; 512]));
        h.device
            .close_when_drained();

        let err = h
            .session()
            .receive_file(&out)
            .unwrap_err();

        assert!(matches!(err, Error::Closed(_)), "{err}");
        assert!(!tmp.path().join("log.csv").exists());
    }

    #[test]
    fn test_send_file_chunks_and_acks() {
        let data: Vec<u8> = (0..600u32)
            .map(|i| i as u8)
            .collect();
        let mut h = Harness::new();
        for _ in 0..3 {
            h.device
                .push_packet(Command::Ack, &[]);
        }

        h.session()
            .send_file(2, "setting_2.csv", &data)
            .unwrap();

        let packets = h.device.sent_packets();
        assert_eq!(packets.len(), 3);
        assert!(
            packets
                .iter()
                .all(|(cmd, _)| *cmd == Command::FileData as u8)
        );

        let info = FileEntry::parse(&packets[0].1).unwrap();
        assert_eq!(info.index, 2);
        assert_eq!(info.size, 600);
        assert_eq!(info.name, "setting_2.csv");

        let first = ChunkRecord::parse(&packets[1].1).unwrap();
        let second = ChunkRecord::parse(&packets[2].1).unwrap();
        assert_eq!((first.number, first.size()), (0, 512));
        assert_eq!((second.number, second.size()), (1, 88));
        assert_eq!([first.data, second.data].concat(), data);

        assert_eq!(h.percents(), vec![85, 100, 100]);
    }

    #[test]
    fn test_send_file_without_ack_times_out() {
        let mut h = Harness::new();
        let err = h
            .session()
            .send_file(1, "setting_1.csv", b"abc")
            .unwrap_err();

        assert!(matches!(err, Error::Timeout(_)), "{err}");
        assert_eq!(h.device.sent_packets().len(), 1);
    }

    #[test]
    fn test_send_file_nack_aborts() {
        let mut h = Harness::new();
        h.device
            .push_packet(Command::Ack, &[]);
        h.device
            .push_packet(Command::Nack, &[]);

        let err = h
            .session()
            .send_file(1, "setting_1.csv", b"abc")
            .unwrap_err();

        assert!(matches!(err, Error::Sequence(_)), "{err}");
        assert_eq!(h.device.sent_packets().len(), 2);
    }

    #[test]
    fn test_ack_payload_is_drained() {
        let mut h = Harness::new();
        h.device
            .push_packet(Command::Ack, &[0xEE, 0xEE]);
        h.device
            .push_packet(Command::Ack, &[]);

        h.session()
            .send_file(1, "setting_1.csv", b"abc")
            .unwrap();
        assert_eq!(h.device.sent_packets().len(), 2);
    }

    #[test]
    fn test_ack_with_truncated_payload_still_counts() {
        let mut h = Harness::new();
        h.device
            .push_packet(Command::Ack, &[]);
        // Header announces two payload bytes that never arrive.
        h.device
            .push(&[0x55, 0xAA, 0x05, 0x02, 0x00, 0x00]);

        h.session()
            .send_file(1, "setting_1.csv", b"abc")
            .unwrap();
        assert_eq!(h.device.sent_packets().len(), 2);
        assert_eq!(h.state.progress, 100);
    }
}
