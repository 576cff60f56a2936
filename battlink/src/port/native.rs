//! Native serial port backed by the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        port::{Connector, Port, PortEnumerator, PortInfo, SerialConfig},
    },
    log::{debug, trace},
    serialport::{ClearBuffer, SerialPort, SerialPortType},
    std::io::{self, Read, Write},
};

/// An open OS serial device. Dropping the inner handle closes it.
pub struct NativePort {
    inner: Option<Box<dyn SerialPort>>,
    name: String,
}

impl NativePort {
    /// Open `config.port_name` as 8N1 without flow control.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let inner = serialport::new(&config.port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(config.timeout)
            .open()?;

        debug!("Opened {} at {} baud", config.port_name, config.baud_rate);
        Ok(Self {
            inner: Some(inner),
            name: config.port_name.clone(),
        })
    }

    fn handle(&mut self) -> io::Result<&mut Box<dyn SerialPort>> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
    }
}

impl Port for NativePort {
    fn name(&self) -> &str {
        &self.name
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let waiting = self.handle()?.bytes_to_read()?;
        Ok(waiting as usize)
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    fn clear_buffers(&mut self) -> Result<()> {
        if let Some(inner) = self.inner.as_mut() {
            inner.clear(ClearBuffer::All)?;
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if self.inner.take().is_some() {
            trace!("Closed {}", self.name);
        }
        Ok(())
    }
}

impl Read for NativePort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.handle()?.read(buf)
    }
}

impl Write for NativePort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.handle()?.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.handle()?.flush()
    }
}

/// Opens [`NativePort`]s with stale input discarded.
#[derive(Debug, Default, Clone, Copy)]
pub struct NativeConnector;

impl Connector for NativeConnector {
    type Port = NativePort;

    fn open(&mut self, config: &SerialConfig) -> Result<NativePort> {
        let mut port = NativePort::open(config)?;
        port.clear_buffers()?;
        Ok(port)
    }
}

/// Enumerates OS serial ports.
pub struct NativePortEnumerator;

impl PortEnumerator for NativePortEnumerator {
    fn list_ports() -> Result<Vec<PortInfo>> {
        let ports = serialport::available_ports().map_err(Error::Serial)?;
        Ok(ports.into_iter().map(port_info).collect())
    }
}

fn port_info(port: serialport::SerialPortInfo) -> PortInfo {
    match port.port_type {
        SerialPortType::UsbPort(usb) => PortInfo {
            name: port.port_name,
            vid: Some(usb.vid),
            pid: Some(usb.pid),
            manufacturer: usb.manufacturer,
            product: usb.product,
            serial_number: usb.serial_number,
        },
        _ => PortInfo {
            name: port.port_name,
            ..PortInfo::default()
        },
    }
}
