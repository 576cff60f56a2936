//! Plan upload command implementation.

use {
    crate::{
        Cli, CliError, commands::build_manager, commands::resolve_output_dir, config::Config,
        get_port, was_interrupted,
    },
    anyhow::Result,
    battlink::PlanSettings,
    clap::Args,
    console::style,
};

/// Test plan values.
#[derive(Args, Debug, Clone)]
pub(crate) struct PlanArgs {
    /// Plan slot (1-4).
    #[arg(long)]
    plan: i32,

    /// Test current in mA (1-500).
    #[arg(long)]
    current: i32,

    /// Sample interval in minutes (1-1000).
    #[arg(long)]
    sample_rate: i32,

    /// Test duration in hours (1-1000).
    #[arg(long)]
    duration: i32,

    /// Lower temperature limit in °C (-40 to 85).
    #[arg(long, allow_negative_numbers = true)]
    min_temp: i32,

    /// Upper temperature limit in °C (-40 to 85, above --min-temp).
    #[arg(long, allow_negative_numbers = true)]
    max_temp: i32,
}

impl PlanArgs {
    pub(crate) fn settings(&self) -> PlanSettings {
        PlanSettings {
            plan_index: self.plan,
            current_ma: self.current,
            sample_rate_min: self.sample_rate,
            duration_hr: self.duration,
            min_temp_c: self.min_temp,
            max_temp_c: self.max_temp,
        }
    }
}

/// Send command implementation.
pub(crate) fn cmd_send(cli: &Cli, config: &mut Config, args: &PlanArgs) -> Result<()> {
    let settings = args.settings();
    // Reject bad input before any port is selected or opened.
    settings
        .validate()
        .map_err(battlink::Error::from)?;

    let port = get_port(cli, config)?;
    if !cli.quiet {
        eprintln!(
            "{} Uploading plan {} to {}",
            style("📤").cyan(),
            settings.plan_index,
            style(&port).bold()
        );
    }

    let dir = resolve_output_dir(None, config);
    let mut manager = build_manager(cli, config, &dir, false);
    match manager.send_settings(&port, &settings) {
        Ok(()) => {},
        Err(_) if was_interrupted() => {
            return Err(CliError::Cancelled("Upload interrupted".to_string()).into());
        },
        Err(e) => return Err(e.into()),
    }

    if !cli.quiet {
        eprintln!(
            "{} Plan {} updated",
            style("✓").green().bold(),
            settings.plan_index
        );
    }
    Ok(())
}
