//! Interactive serial port selection.
//!
//! Order of precedence: `--port` / `BATTLINK_PORT`, the configured port, then
//! enumeration. Recognized and remembered devices are offered first; with
//! several candidates the user picks one, unless `--non-interactive` is set.

use {
    crate::{CliError, config::Config},
    anyhow::Result,
    battlink::{DetectedPort, PortInfo, detect_ports, select_port},
    console::style,
    dialoguer::{Confirm, Error as DialoguerError, Select, theme::ColorfulTheme},
    log::{debug, error, info},
    std::io::IsTerminal,
};

/// Options for serial port selection.
#[derive(Debug, Clone, Default)]
pub struct SerialOptions {
    /// Explicit port specified via CLI.
    pub port: Option<String>,
    /// Non-interactive mode (fail instead of prompting).
    pub non_interactive: bool,
}

/// Result of port selection including whether it was a known device.
pub struct SelectedPort {
    /// The selected port info.
    pub port: DetectedPort,
    /// Whether this port matched a known or remembered device.
    pub is_known: bool,
}

fn usage_err(message: &str) -> anyhow::Error {
    CliError::Usage(message.to_string()).into()
}

fn cancelled() -> anyhow::Error {
    CliError::Cancelled("Port selection cancelled".to_string()).into()
}

/// Check if a port is a recognized bridge or a remembered device.
fn is_known_device(port: &DetectedPort, config: &Config) -> bool {
    port.device
        .is_known()
        || matches!((port.vid, port.pid), (Some(vid), Some(pid)) if config.is_remembered(vid, pid))
}

/// Narrow the enumerated ports to the ones worth offering.
fn candidates(ports: Vec<DetectedPort>, config: &Config) -> Vec<DetectedPort> {
    let known: Vec<DetectedPort> = ports
        .iter()
        .filter(|p| is_known_device(p, config))
        .cloned()
        .collect();
    if known.is_empty() { ports } else { known }
}

/// Pick without prompting: only an unambiguous candidate is accepted.
fn select_non_interactive(ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    match ports.len() {
        0 => Err(usage_err("No serial ports available")),
        1 => {
            let port = ports
                .into_iter()
                .next()
                .ok_or_else(|| usage_err("No serial ports available"))?;
            Ok(SelectedPort {
                is_known: is_known_device(&port, config),
                port,
            })
        },
        n => Err(usage_err(&format!(
            "Found multiple ports ({n}); pass --port to choose one"
        ))),
    }
}

/// Select a serial port interactively or automatically.
pub fn select_serial_port(options: &SerialOptions, config: &Config) -> Result<SelectedPort> {
    if let Some(port_name) = &options.port {
        return Ok(find_port_by_name(port_name));
    }

    if let Some(port_name) = &config.connection.serial {
        debug!("Using port from config: {port_name}");
        return Ok(find_port_by_name(port_name));
    }

    let ports = detect_ports().unwrap_or_else(|e| {
        debug!("Port enumeration failed: {e}");
        Vec::new()
    });
    if ports.is_empty() {
        return Err(usage_err("No serial ports found"));
    }

    let mut ports = candidates(ports, config);
    if options.non_interactive {
        return select_non_interactive(ports, config);
    }

    if ports.len() == 1 {
        let port = ports.remove(0);
        let is_known = is_known_device(&port, config);
        if is_known {
            info!("Auto-selected port: {} [{}]", port.name, port.device.name());
            return Ok(SelectedPort { port, is_known });
        }
        ensure_interactive_terminal()?;
        return confirm_single_port(port);
    }

    ensure_interactive_terminal()?;
    select_port_interactive(ports, config)
}

fn ensure_interactive_terminal() -> Result<()> {
    if std::io::stdin().is_terminal() && std::io::stderr().is_terminal() {
        Ok(())
    } else {
        Err(usage_err(
            "Interactive port selection requires a terminal; pass --port",
        ))
    }
}

fn map_prompt_error(err: DialoguerError) -> anyhow::Error {
    match err {
        DialoguerError::IO(io_err) => {
            if io_err.kind() == std::io::ErrorKind::Interrupted {
                cancelled()
            } else {
                usage_err("Port prompt failed")
            }
        },
    }
}

/// Find a port by name, or describe an unlisted one.
fn find_port_by_name(name: &str) -> SelectedPort {
    let ports = detect_ports().unwrap_or_default();

    let found = ports
        .iter()
        .find(|p| p.name == name)
        .or_else(|| {
            ports
                .iter()
                .find(|p| p.name.eq_ignore_ascii_case(name))
        });
    if let Some(port) = found {
        return SelectedPort {
            port: port.clone(),
            is_known: port.device.is_known(),
        };
    }

    debug!("{name} is not enumerated; opening it as given");
    SelectedPort {
        port: DetectedPort::from(PortInfo {
            name: name.to_string(),
            ..PortInfo::default()
        }),
        is_known: false,
    }
}

fn port_label(port: &DetectedPort, config: &Config) -> String {
    let name = if is_known_device(port, config) {
        style(&port.name)
            .bold()
            .to_string()
    } else {
        port.name.clone()
    };
    let device_info = if port.device.is_known() {
        format!(" [{}]", style(port.device.name()).yellow())
    } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
        format!(" ({vid:04X}:{pid:04X})")
    } else {
        String::new()
    };
    let product = port
        .product
        .as_ref()
        .map(|p| format!(" - {}", style(p).dim()))
        .unwrap_or_default();
    format!("{name}{device_info}{product}")
}

/// Interactive port selection.
fn select_port_interactive(mut ports: Vec<DetectedPort>, config: &Config) -> Result<SelectedPort> {
    eprintln!(
        "{} Detected {} serial ports",
        style("ℹ").blue(),
        ports.len()
    );

    // Best guess first.
    if let Some(best) = select_port(&ports).map(|p| p.name.clone()) {
        ports.sort_by_key(|p| p.name != best);
    }

    let term_width = usize::from(console::Term::stderr().size().1);
    let max_item_width = term_width.saturating_sub(4);
    let labels: Vec<String> = ports
        .iter()
        .map(|p| console::truncate_str(&port_label(p, config), max_item_width, "\u{2026}").into_owned())
        .collect();

    let selection = Select::with_theme(&ColorfulTheme::default())
        .with_prompt("Select the tester port")
        .items(&labels)
        .default(0)
        .interact_opt()
        .map_err(map_prompt_error)?;

    let index = selection.ok_or_else(cancelled)?;
    let port = ports
        .into_iter()
        .nth(index)
        .ok_or_else(|| anyhow::anyhow!("Invalid port index: {index}"))?;
    Ok(SelectedPort {
        is_known: is_known_device(&port, config),
        port,
    })
}

/// Confirm use of a single unrecognized port.
fn confirm_single_port(port: DetectedPort) -> Result<SelectedPort> {
    let product_info = port
        .product
        .as_ref()
        .map(|p| format!(" - {p}"))
        .unwrap_or_default();

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("Use {}{product_info}?", port.name))
        .default(true)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        Ok(SelectedPort {
            port,
            is_known: false,
        })
    } else {
        Err(cancelled())
    }
}

/// Offer to remember an unrecognized USB device.
pub fn ask_remember_port(port: &DetectedPort, config: &mut Config) -> Result<()> {
    let (Some(vid), Some(pid)) = (port.vid, port.pid) else {
        return Ok(());
    };
    if config.is_remembered(vid, pid) {
        return Ok(());
    }

    let confirmed = Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt("Remember this device for next time?")
        .default(false)
        .interact_opt()
        .map_err(map_prompt_error)?
        .unwrap_or(false);

    if confirmed {
        if let Err(e) = config.remember_usb_device(vid, pid) {
            error!("Failed to save port configuration: {e}");
        }
    }
    Ok(())
}
