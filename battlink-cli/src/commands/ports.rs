//! Port listing and received-file listing.

use {
    crate::{commands::resolve_output_dir, config::Config},
    anyhow::{Context, Result},
    battlink::{DetectedPort, OutputDir, detect_ports, select_port},
    console::style,
    std::path::PathBuf,
};

fn port_json(port: &DetectedPort, config: &Config) -> serde_json::Value {
    serde_json::json!({
        "name": port.name,
        "device": port.device.name(),
        "known": port.device.is_known(),
        "remembered": matches!((port.vid, port.pid), (Some(v), Some(p)) if config.is_remembered(v, p)),
        "vid": port.vid,
        "pid": port.pid,
        "manufacturer": port.manufacturer,
        "product": port.product,
        "serial": port.serial,
    })
}

/// List ports command implementation.
pub(crate) fn cmd_list_ports(config: &Config, json: bool) -> Result<()> {
    let detected = detect_ports().unwrap_or_else(|e| {
        log::debug!("Port enumeration failed: {e}");
        Vec::new()
    });

    if json {
        let ports: Vec<serde_json::Value> = detected
            .iter()
            .map(|p| port_json(p, config))
            .collect();
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "ports": ports,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    eprintln!(
        "{}",
        style("Available serial ports:")
            .bold()
            .underlined()
    );

    if detected.is_empty() {
        eprintln!("  {}", style("No serial ports found").dim());
        return Ok(());
    }

    for port in &detected {
        let device_type = if port.device.is_known() {
            format!(" [{}]", style(port.device.name()).yellow())
        } else {
            String::new()
        };
        let vid_pid = if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" ({vid:04X}:{pid:04X})")
        } else {
            String::new()
        };
        let product = port
            .product
            .as_deref()
            .map(|p| format!(" - {}", style(p).dim()))
            .unwrap_or_default();

        eprintln!(
            "  {} {}{device_type}{vid_pid}{product}",
            style("•").green(),
            style(&port.name).cyan()
        );
    }

    if let Some(best) = select_port(&detected) {
        eprintln!(
            "\n{} Auto-detected: {}",
            style("→").green().bold(),
            style(&best.name).cyan().bold()
        );
    }

    Ok(())
}

/// Received files command implementation.
pub(crate) fn cmd_files(config: &Config, output_dir: Option<&PathBuf>, json: bool) -> Result<()> {
    let dir = resolve_output_dir(output_dir, config);
    let files = OutputDir::new(&dir)
        .received_files()
        .with_context(|| format!("Cannot list {}", dir.display()))?;

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "output_dir": dir,
                "files": files,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if files.is_empty() {
        eprintln!(
            "{}",
            style(format!("No result files in {}", dir.display())).dim()
        );
    } else {
        eprintln!(
            "{}",
            style(format!("Result files in {}:", dir.display()))
                .bold()
                .underlined()
        );
        for name in &files {
            println!("{name}");
        }
    }
    Ok(())
}
