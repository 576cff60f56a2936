//! battlink CLI - download results from and configure serial battery testers.
//!
//! ## Features
//!
//! - Receive all result files after a test run
//! - Upload a test plan to one of the four plan slots
//! - Interactive serial port selection with remembered devices
//! - Shell completion generation
//! - Environment variable and config file support

use {
    anyhow::Result,
    clap::{Parser, Subcommand},
    clap_complete::Shell,
    console::style,
    env_logger::Env,
    log::debug,
    std::{
        env,
        path::PathBuf,
        sync::atomic::{AtomicBool, Ordering},
    },
};

mod commands;
mod config;
mod progress;
mod serial;

use {
    commands::{
        completions::cmd_completions,
        ports::{cmd_files, cmd_list_ports},
        receive::cmd_receive,
        send::{PlanArgs, cmd_send},
    },
    config::Config,
    serial::{SerialOptions, ask_remember_port, select_serial_port},
};

/// Whether stderr is a terminal (set once at startup).
static STDERR_IS_TTY: AtomicBool = AtomicBool::new(true);

/// Set by the Ctrl-C handler.
static INTERRUPTED: AtomicBool = AtomicBool::new(false);

/// Check if animations should be used (TTY and colors enabled).
pub(crate) fn use_fancy_output() -> bool {
    STDERR_IS_TTY.load(Ordering::Relaxed) && console::colors_enabled_stderr()
}

/// Whether Ctrl-C was pressed.
pub(crate) fn was_interrupted() -> bool {
    INTERRUPTED.load(Ordering::Relaxed)
}

/// Errors that map to a specific exit code.
#[derive(Debug, thiserror::Error)]
pub(crate) enum CliError {
    /// Bad invocation or missing setup; exit code 2.
    #[error("{0}")]
    Usage(String),
    /// Stopped by the user; exit code 130.
    #[error("{0}")]
    Cancelled(String),
}

/// battlink - host tool for serial battery testers.
///
/// Environment variables:
///   BATTLINK_PORT              - Default serial port
///   BATTLINK_BAUD              - Default baud rate (default: 115200)
///   BATTLINK_NON_INTERACTIVE   - Non-interactive mode (disable prompts)
#[derive(Parser)]
#[command(name = "battlink")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(after_help = "Examples:\n  battlink -p /dev/ttyACM0 receive\n  battlink send --plan 2 \
                        --current 250 --sample-rate 1 --duration 3 --min-temp -20 --max-temp 30")]
pub(crate) struct Cli {
    /// Serial port to use (auto-detected if not specified).
    #[arg(short, long, global = true, env = "BATTLINK_PORT")]
    port: Option<String>,

    /// Baud rate [default: 115200].
    #[arg(short, long, global = true, env = "BATTLINK_BAUD")]
    baud: Option<u32>,

    /// Verbose output level (-v, -vv for increasing detail).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress non-essential output).
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Non-interactive mode (fail instead of prompting).
    #[arg(long, global = true, env = "BATTLINK_NON_INTERACTIVE")]
    non_interactive: bool,

    /// Path to a configuration file.
    #[arg(long = "config", global = true, value_name = "PATH")]
    config_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Wait for the tester and download all result files.
    Receive {
        /// Directory for received files [default: ./received_files].
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Output the result as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Upload a test plan.
    Send(PlanArgs),

    /// List available serial ports.
    ListPorts {
        /// Output port list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// List result files already received.
    Files {
        /// Directory to inspect [default: ./received_files].
        #[arg(short, long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Output the list as JSON to stdout.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell type for completions.
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Baud rate from flags, environment or config.
pub(crate) fn baud_rate(cli: &Cli, config: &Config) -> u32 {
    cli.baud
        .or(config.connection.baud)
        .unwrap_or(battlink::port::DEFAULT_BAUD)
}

/// Get serial port from CLI args, config or interactive selection.
pub(crate) fn get_port(cli: &Cli, config: &mut Config) -> Result<String> {
    let options = SerialOptions {
        port: cli.port.clone(),
        non_interactive: cli.non_interactive,
    };

    let selected = select_serial_port(&options, config)?;

    if !selected.is_known && !cli.non_interactive && cli.port.is_none() {
        ask_remember_port(&selected.port, config)?;
    }

    Ok(selected.port.name)
}

fn init_logging(cli: &Cli) {
    let log_level = if cli.quiet {
        "warn"
    } else {
        match cli.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level))
        .format_target(cli.verbose >= 2)
        .format_timestamp(if cli.verbose >= 2 {
            Some(env_logger::TimestampPrecision::Millis)
        } else {
            None
        })
        .init();
}

fn install_interrupt_handler() {
    let installed = ctrlc::set_handler(|| {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            // Second Ctrl-C: stop waiting for the transfer to wind down.
            std::process::exit(130);
        }
        eprintln!("\nInterrupted, closing port...");
    });
    if let Err(e) = installed {
        debug!("Could not install Ctrl-C handler: {e}");
    }
    battlink::set_interrupt_checker(was_interrupted);
}

/// Map an error to the process exit code.
fn exit_code(err: &anyhow::Error) -> i32 {
    if let Some(cli_err) = err.downcast_ref::<CliError>() {
        return match cli_err {
            CliError::Usage(_) => 2,
            CliError::Cancelled(_) => 130,
        };
    }
    if was_interrupted() {
        return 130;
    }
    match err.downcast_ref::<battlink::Error>() {
        Some(e) if e.is_validation() => 2,
        _ => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Commands::Completions { shell } = &cli.command {
        cmd_completions(*shell);
        return Ok(());
    }

    let mut config = if let Some(ref path) = cli.config_path {
        Config::load_from_path(path)
    } else {
        Config::load()
    };

    match &cli.command {
        Commands::Receive { output_dir, json } => {
            cmd_receive(cli, &mut config, output_dir.as_ref(), *json)
        },
        Commands::Send(args) => cmd_send(cli, &mut config, args),
        Commands::ListPorts { json } => cmd_list_ports(&config, *json),
        Commands::Files { output_dir, json } => cmd_files(&config, output_dir.as_ref(), *json),
        Commands::Completions { .. } => Ok(()),
    }
}

fn main() {
    let stderr_is_tty = console::Term::stderr().is_term();
    STDERR_IS_TTY.store(stderr_is_tty, Ordering::Relaxed);
    if env::var("NO_COLOR").is_ok() || !stderr_is_tty {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let cli = Cli::parse();
    init_logging(&cli);
    debug!(
        "battlink v{} (verbose level: {})",
        env!("CARGO_PKG_VERSION"),
        cli.verbose
    );
    install_interrupt_handler();

    if let Err(err) = run(&cli) {
        eprintln!("{} {err:#}", style("Error:").red().bold());
        std::process::exit(exit_code(&err));
    }
}

#[cfg(test)]
mod tests {
    use {super::*, battlink::ValidationError, clap::CommandFactory};

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(exit_code(&CliError::Usage("x".into()).into()), 2);
        assert_eq!(exit_code(&CliError::Cancelled("x".into()).into()), 130);
        assert_eq!(
            exit_code(&battlink::Error::Validation(ValidationError::PlanIndex(0)).into()),
            2
        );
        assert_eq!(exit_code(&battlink::Error::NotConnected.into()), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("boom")), 1);
    }

    #[test]
    fn test_send_accepts_negative_temperatures() {
        let cli = Cli::try_parse_from([
            "battlink",
            "send",
            "--plan",
            "2",
            "--current",
            "250",
            "--sample-rate",
            "1",
            "--duration",
            "3",
            "--min-temp",
            "-20",
            "--max-temp",
            "30",
        ])
        .unwrap();
        match cli.command {
            Commands::Send(args) => {
                let plan = args.settings();
                assert_eq!(plan.min_temp_c, -20);
                assert_eq!(plan.plan_index, 2);
            },
            _ => panic!("expected send"),
        }
    }

    #[test]
    fn test_baud_precedence() {
        let mut config = Config::default();
        let cli = Cli::try_parse_from(["battlink", "list-ports"]).unwrap();
        assert_eq!(baud_rate(&cli, &config), 115200);

        config.connection.baud = Some(57600);
        assert_eq!(baud_rate(&cli, &config), 57600);

        let cli = Cli::try_parse_from(["battlink", "-b", "9600", "list-ports"]).unwrap();
        assert_eq!(baud_rate(&cli, &config), 9600);
    }
}
