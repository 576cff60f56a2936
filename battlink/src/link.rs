//! Bounded, cooperative I/O over a [`Port`].
//!
//! Every wait in the protocol goes through a [`Link`]. Waits are polling loops
//! with a short tick; between ticks the link runs the optional yield hook (so
//! an event-loop host can pump its own messages) and checks the interrupt
//! checker registered with [`crate::set_interrupt_checker`]. An interrupt
//! closes the port, so whatever wait is in flight sees a closed stream and
//! returns early.
//!
//! Nothing here retries: short reads and expired waits are reported to the
//! caller, which decides what they mean.

use {
    crate::{
        error::{Error, Result},
        port::Port,
        protocol::frame::{self, Command},
    },
    log::{debug, trace, warn},
    std::{
        io::ErrorKind,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    },
};

/// Callback run on every polling tick.
pub type YieldHook = Arc<dyn Fn() + Send + Sync>;

/// Default polling tick.
pub const DEFAULT_TICK: Duration = Duration::from_millis(10);

/// Transport adapter owning the open port.
pub struct Link<P: Port> {
    port: P,
    tick: Duration,
    yield_hook: Option<YieldHook>,
}

impl<P: Port> Link<P> {
    /// Wrap an open port.
    pub fn new(port: P) -> Self {
        Self {
            port,
            tick: DEFAULT_TICK,
            yield_hook: None,
        }
    }

    /// Set the polling tick.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Install a hook run between polling ticks.
    #[must_use]
    pub fn with_yield_hook(mut self, hook: Option<YieldHook>) -> Self {
        self.yield_hook = hook;
        self
    }

    /// Get a reference to the underlying port.
    pub fn port(&self) -> &P {
        &self.port
    }

    /// Get a mutable reference to the underlying port.
    pub fn port_mut(&mut self) -> &mut P {
        &mut self.port
    }

    /// Consume the link and return the underlying port.
    pub fn into_port(self) -> P {
        self.port
    }

    /// Port name.
    pub fn name(&self) -> &str {
        self.port
            .name()
    }

    /// Whether the stream is still open.
    pub fn is_open(&self) -> bool {
        self.port
            .is_open()
    }

    /// Close the port.
    pub fn close(&mut self) -> Result<()> {
        self.port
            .close()
    }

    /// Run the yield hook and honor a pending interrupt.
    fn yield_now(&mut self) {
        if let Some(hook) = &self.yield_hook {
            hook();
        }
        if crate::is_interrupted_requested() && self.port.is_open() {
            warn!("Interrupt requested, closing {}", self.port.name());
            if let Err(e) = self.port.close() {
                debug!("Close after interrupt failed: {e}");
            }
        }
    }

    /// Bytes waiting, treating a driver error as a closed stream.
    fn available(&mut self) -> usize {
        match self.port.bytes_available() {
            Ok(n) => n,
            Err(e) => {
                debug!("Port error on {}: {e}", self.port.name());
                if let Err(e) = self.port.close() {
                    debug!("Close after port error failed: {e}");
                }
                0
            },
        }
    }

    /// Wait until data is available.
    ///
    /// Returns `false` when the timeout elapses or the stream closes.
    pub fn wait_for_data(&mut self, timeout: Duration) -> bool {
        let start = Instant::now();

        loop {
            self.yield_now();
            if !self.port.is_open() {
                return false;
            }
            if self.available() > 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            thread::sleep(self.tick);
        }
    }

    /// Read up to `n` bytes within `timeout`.
    ///
    /// The result is shorter than `n` when the timeout elapses or the stream
    /// closes first; callers must check the length.
    pub fn read_exact(&mut self, n: usize, timeout: Duration) -> Vec<u8> {
        let mut data = Vec::with_capacity(n);
        let start = Instant::now();

        while data.len() < n {
            self.yield_now();
            if !self.port.is_open() {
                trace!("Stream closed during read ({}/{n} bytes)", data.len());
                break;
            }

            let available = self.available();
            let mut progressed = false;
            if available > 0 {
                let mut buf = vec![0u8; available.min(n - data.len())];
                match self.port.read(&mut buf) {
                    Ok(got) => {
                        data.extend_from_slice(&buf[..got]);
                        progressed = got > 0;
                    },
                    Err(e)
                        if matches!(
                            e.kind(),
                            ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                        ) => {},
                    Err(e) => {
                        debug!("Read error on {}: {e}", self.port.name());
                        break;
                    },
                }
            }

            if data.len() >= n || start.elapsed() >= timeout {
                break;
            }
            if !progressed {
                thread::sleep(self.tick);
            }
        }

        data
    }

    /// Write all bytes and flush within `timeout`.
    pub fn write_all(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        let start = Instant::now();
        let mut offset = 0;

        while offset < bytes.len() {
            if !self.port.is_open() {
                return Err(Error::Closed(format!(
                    "{} closed during write",
                    self.port.name()
                )));
            }

            match self.port.write(&bytes[offset..]) {
                Ok(n) => offset += n,
                Err(e)
                    if matches!(
                        e.kind(),
                        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                    ) => {},
                Err(e) => return Err(Error::Io(e)),
            }

            if offset < bytes.len() {
                if start.elapsed() >= timeout {
                    return Err(Error::Timeout(format!(
                        "write stalled after {offset}/{} bytes",
                        bytes.len()
                    )));
                }
                self.yield_now();
                thread::sleep(self.tick);
            }
        }

        self.port
            .flush()?;
        Ok(())
    }

    /// Encode and send one packet.
    pub fn send_packet(&mut self, command: Command, payload: &[u8], timeout: Duration) -> Result<()> {
        let packet = frame::encode(command, payload)?;
        trace!("Sending {command}: {} bytes", packet.len());
        self.write_all(&packet, timeout)
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::port::mock::MockDevice,
        std::sync::atomic::{AtomicUsize, Ordering},
    };

    const SHORT: Duration = Duration::from_millis(50);

    fn link(device: &MockDevice) -> Link<crate::port::mock::MockPort> {
        Link::new(device.port()).with_tick(Duration::from_millis(1))
    }

    #[test]
    fn test_wait_for_data_ready() {
        let device = MockDevice::new();
        device.push(&[0x01]);
        assert!(link(&device).wait_for_data(SHORT));
    }

    #[test]
    fn test_wait_for_data_times_out() {
        let device = MockDevice::new();
        let start = Instant::now();
        assert!(!link(&device).wait_for_data(SHORT));
        assert!(start.elapsed() >= SHORT);
    }

    #[test]
    fn test_wait_for_data_closed_returns_immediately() {
        let device = MockDevice::new();
        let mut link = link(&device);
        device.close();
        let start = Instant::now();
        assert!(!link.wait_for_data(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_read_exact_full() {
        let device = MockDevice::new();
        device.push(&[1, 2, 3, 4, 5, 6, 7]);
        let mut link = link(&device);
        assert_eq!(link.read_exact(6, SHORT), vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(link.read_exact(1, SHORT), vec![7]);
    }

    #[test]
    fn test_read_exact_short_on_timeout() {
        let device = MockDevice::new();
        device.push(&[1, 2]);
        assert_eq!(link(&device).read_exact(6, SHORT), vec![1, 2]);
    }

    #[test]
    fn test_yield_hook_runs_each_tick_and_can_close() {
        let device = MockDevice::new();
        let ticks = Arc::new(AtomicUsize::new(0));
        let hook: YieldHook = {
            let ticks = Arc::clone(&ticks);
            let device = device.clone();
            Arc::new(move || {
                if ticks.fetch_add(1, Ordering::SeqCst) == 3 {
                    device.close();
                }
            })
        };

        let mut link = link(&device).with_yield_hook(Some(hook));
        let start = Instant::now();
        let data = link.read_exact(6, Duration::from_secs(5));

        assert!(data.is_empty());
        assert!(!link.is_open());
        assert!(ticks.load(Ordering::SeqCst) >= 4);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_send_packet_writes_frame() {
        let device = MockDevice::new();
        let mut link = link(&device);
        link.send_packet(Command::Ack, &[], SHORT)
            .unwrap();
        assert_eq!(device.written(), vec![0x55, 0xAA, 0x05, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_write_on_closed_port_fails() {
        let device = MockDevice::new();
        let mut link = link(&device);
        link.close()
            .unwrap();
        assert!(matches!(
            link.send_packet(Command::Ack, &[], SHORT),
            Err(Error::Closed(_))
        ));
    }
}
