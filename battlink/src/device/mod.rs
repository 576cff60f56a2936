//! Serial port discovery and classification.
//!
//! The tester enumerates as a USB CDC device, either through its own USB
//! stack or behind a USB-UART bridge. Ports are classified by VID/PID so the
//! front end can pick the most likely candidate.

use {
    crate::{
        error::{Error, Result},
        port::PortInfo,
    },
    log::{info, trace},
};

/// Known USB device kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DeviceKind {
    /// Microcontroller with native USB CDC (Espressif, Raspberry Pi RP2040, STM32).
    NativeCdc,
    /// CH340/CH341 USB-to-Serial converter.
    Ch340,
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// FTDI FT232/FT2232/FT4232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Anything else.
    Unknown,
}

/// VID with an optional PID allow-list (empty matches every PID).
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x303A, &[], DeviceKind::NativeCdc),
    (0x2E8A, &[], DeviceKind::NativeCdc),
    (0x0483, &[0x5740], DeviceKind::NativeCdc),
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71], DeviceKind::Cp210x),
    (0x0403, &[0x6001, 0x6010, 0x6011, 0x6014, 0x6015], DeviceKind::Ftdi),
    (0x067B, &[0x2303, 0x23A3], DeviceKind::Prolific),
];

impl DeviceKind {
    /// Classify a VID/PID pair.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        KNOWN_USB_DEVICES
            .iter()
            .find(|(known_vid, pids, _)| vid == *known_vid && (pids.is_empty() || pids.contains(&pid)))
            .map_or(Self::Unknown, |(_, _, kind)| *kind)
    }

    /// Human-readable name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::NativeCdc => "USB CDC",
            Self::Ch340 => "CH340/CH341",
            Self::Cp210x => "CP210x",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::Unknown => "Unknown",
        }
    }

    /// Whether the kind was recognized.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Auto-selection rank, lower is better.
    fn rank(self) -> u8 {
        match self {
            Self::NativeCdc => 0,
            Self::Ch340 | Self::Cp210x => 1,
            Self::Ftdi | Self::Prolific => 2,
            Self::Unknown => 3,
        }
    }
}

/// Enumerated port with its classification.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyACM0" or "COM3").
    pub name: String,
    /// Classified device kind.
    pub device: DeviceKind,
    /// USB vendor ID (if available).
    pub vid: Option<u16>,
    /// USB product ID (if available).
    pub pid: Option<u16>,
    /// Manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl From<PortInfo> for DetectedPort {
    fn from(info: PortInfo) -> Self {
        let device = match (info.vid, info.pid) {
            (Some(vid), Some(pid)) => DeviceKind::from_vid_pid(vid, pid),
            _ => DeviceKind::Unknown,
        };
        trace!("Port {}: {:?} ({:?}/{:?})", info.name, device, info.vid, info.pid);
        Self {
            name: info.name,
            device,
            vid: info.vid,
            pid: info.pid,
            manufacturer: info.manufacturer,
            product: info.product,
            serial: info.serial_number,
        }
    }
}

impl DetectedPort {
    /// Whether this port matches a remembered VID/PID.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == Some(vid) && self.pid == Some(pid)
    }
}

/// Enumerate serial ports on this machine.
#[cfg(feature = "native")]
pub fn detect_ports() -> Result<Vec<DetectedPort>> {
    use crate::port::{NativePortEnumerator, PortEnumerator};

    Ok(NativePortEnumerator::list_ports()?
        .into_iter()
        .map(DetectedPort::from)
        .collect())
}

/// Pick the most likely tester port: native CDC first, then common bridges,
/// then the first port listed.
pub fn select_port(ports: &[DetectedPort]) -> Option<&DetectedPort> {
    ports
        .iter()
        .enumerate()
        .min_by_key(|(i, p)| (p.device.rank(), *i))
        .map(|(_, p)| p)
}

/// Auto-detect a single port.
#[cfg(feature = "native")]
pub fn auto_detect_port() -> Result<DetectedPort> {
    let ports = detect_ports()?;
    let port = select_port(&ports).ok_or(Error::DeviceNotFound)?;
    if port.device.is_known() {
        info!("Auto-detected {} device: {}", port.device.name(), port.name);
    } else {
        info!("Using first available port: {}", port.name);
    }
    Ok(port.clone())
}

/// Format ports for display, one line each.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    ports
        .iter()
        .map(|port| {
            let device_info = if port.device.is_known() {
                format!(" [{}]", port.device.name())
            } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
                format!(" [VID:{vid:04X} PID:{pid:04X}]")
            } else {
                String::new()
            };
            let product_info = port
                .product
                .as_ref()
                .map(|p| format!(" - {p}"))
                .unwrap_or_default();
            format!("{}{device_info}{product_info}", port.name)
        })
        .collect()
}
