//! Configuration file support for battlink.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BATTLINK_*)
//! 3. Local config file (./battlink.toml)
//! 4. Global config file (~/.config/battlink/config.toml)
//!
//! `--config PATH` replaces both files.

use {
    battlink::SessionConfig,
    directories::ProjectDirs,
    log::{debug, info, warn},
    serde::{Deserialize, Serialize},
    std::{
        fs,
        path::{Path, PathBuf},
        time::Duration,
    },
};

/// Name of the local configuration file.
pub const LOCAL_CONFIG: &str = "battlink.toml";

/// USB device identification for port matching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsbDevice {
    /// USB Vendor ID.
    pub vid: u16,
    /// USB Product ID.
    pub pid: u16,
}

impl UsbDevice {
    /// Check if this device matches the given USB info.
    pub fn matches(&self, vid: u16, pid: u16) -> bool {
        self.vid == vid && self.pid == pid
    }
}

/// Connection configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Preferred serial port (e.g., "/dev/ttyACM0" or "COM3").
    pub serial: Option<String>,
    /// Default baud rate.
    pub baud: Option<u32>,
}

/// Transfer settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Where received files are written.
    pub output_dir: Option<PathBuf>,
    /// Overall wait for the device handshake.
    pub handshake_timeout_ms: Option<u64>,
    /// Window for reading one packet.
    pub read_timeout_ms: Option<u64>,
    /// Wait for an ACK while uploading.
    pub ack_timeout_ms: Option<u64>,
    /// Budget for writing one packet.
    pub write_timeout_ms: Option<u64>,
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Connection settings.
    #[serde(default)]
    pub connection: ConnectionConfig,
    /// Remembered USB devices for auto-detection.
    #[serde(default)]
    pub usb_device: Vec<UsbDevice>,
    /// Transfer settings.
    #[serde(default)]
    pub transfer: TransferConfig,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse TOML config {}: {e}", path.display());
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {e}", path.display());
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "battlink").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one; set values in `other` win.
    fn merge(&mut self, other: Self) {
        if other.connection.serial.is_some() {
            self.connection.serial = other.connection.serial;
        }
        if other.connection.baud.is_some() {
            self.connection.baud = other.connection.baud;
        }
        for device in other.usb_device {
            if !self.usb_device.contains(&device) {
                self.usb_device.push(device);
            }
        }

        let t = other.transfer;
        if t.output_dir.is_some() {
            self.transfer.output_dir = t.output_dir;
        }
        if t.handshake_timeout_ms.is_some() {
            self.transfer.handshake_timeout_ms = t.handshake_timeout_ms;
        }
        if t.read_timeout_ms.is_some() {
            self.transfer.read_timeout_ms = t.read_timeout_ms;
        }
        if t.ack_timeout_ms.is_some() {
            self.transfer.ack_timeout_ms = t.ack_timeout_ms;
        }
        if t.write_timeout_ms.is_some() {
            self.transfer.write_timeout_ms = t.write_timeout_ms;
        }
    }

    /// Whether `vid`/`pid` was remembered.
    pub fn is_remembered(&self, vid: u16, pid: u16) -> bool {
        self.usb_device
            .iter()
            .any(|d| d.matches(vid, pid))
    }

    /// Protocol timeouts with configured overrides applied.
    pub fn session_config(&self) -> SessionConfig {
        let mut session = SessionConfig::default();
        let t = &self.transfer;
        if let Some(ms) = t.handshake_timeout_ms {
            session.handshake_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = t.read_timeout_ms {
            session.read_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = t.ack_timeout_ms {
            session.ack_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = t.write_timeout_ms {
            session.write_timeout = Duration::from_millis(ms);
        }
        session
    }

    /// Save USB device for future auto-detection.
    ///
    /// Written to the local file when one exists, else to the global file.
    pub fn remember_usb_device(&mut self, vid: u16, pid: u16) -> anyhow::Result<()> {
        let device = UsbDevice { vid, pid };
        if self.usb_device.contains(&device) {
            return Ok(());
        }

        let path = if Path::new(LOCAL_CONFIG).exists() {
            PathBuf::from(LOCAL_CONFIG)
        } else if let Some(global_dir) = Self::global_config_dir() {
            fs::create_dir_all(&global_dir)?;
            global_dir.join("config.toml")
        } else {
            PathBuf::from(LOCAL_CONFIG)
        };

        Self::append_device(&path, device.clone())?;
        self.usb_device.push(device);
        info!("Saved USB device to {}", path.display());
        Ok(())
    }

    /// Add `device` to the file at `path`, keeping its other settings.
    fn append_device(path: &Path, device: UsbDevice) -> anyhow::Result<()> {
        let mut on_disk = Self::load_from_file(path).unwrap_or_default();
        if !on_disk.usb_device.contains(&device) {
            on_disk.usb_device.push(device);
        }
        fs::write(path, toml::to_string_pretty(&on_disk)?)?;
        Ok(())
    }
}
