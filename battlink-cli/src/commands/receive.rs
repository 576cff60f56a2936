//! Result download command implementation.

use {
    crate::{
        Cli, CliError,
        commands::{build_manager, resolve_output_dir},
        config::Config,
        get_port, was_interrupted,
    },
    anyhow::Result,
    console::style,
    std::path::PathBuf,
};

/// Receive command implementation.
pub(crate) fn cmd_receive(
    cli: &Cli,
    config: &mut Config,
    output_dir: Option<&PathBuf>,
    json: bool,
) -> Result<()> {
    let dir = resolve_output_dir(output_dir, config);
    let port = get_port(cli, config)?;
    let chatty = !cli.quiet && !json;

    if chatty {
        eprintln!(
            "{} Using port {} at {} baud",
            style("🔌").cyan(),
            style(&port).bold(),
            crate::baud_rate(cli, config)
        );
        eprintln!(
            "{} Start the transfer on the tester...",
            style("⏳").yellow()
        );
    }

    let mut manager = build_manager(cli, config, &dir, json);
    let report = match manager.receive_results(&port) {
        Ok(report) => report,
        Err(_) if was_interrupted() => {
            return Err(CliError::Cancelled("Transfer interrupted".to_string()).into());
        },
        Err(e) => return Err(e.into()),
    };

    if json {
        let output = serde_json::json!({
            "ok": true,
            "data": {
                "handshake": report.handshake,
                "output_dir": dir,
                "files": report.files,
            }
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if chatty {
        for path in &report.files {
            eprintln!("    {} {}", style("•").dim(), path.display());
        }
        eprintln!(
            "\n{} Received {} files into {}",
            style("🎉").green().bold(),
            report.files.len(),
            dir.display()
        );
    }
    Ok(())
}
