//! Command implementations.
//!
//! Each subcommand is implemented in its own module for clean separation.

pub(crate) mod completions;
pub(crate) mod ports;
pub(crate) mod receive;
pub(crate) mod send;

use {
    crate::{Cli, baud_rate, config::Config, progress::TerminalSink, use_fancy_output},
    battlink::{NativeConnector, OutputDir, TransferManager, storage::DEFAULT_OUTPUT_DIR},
    std::path::{Path, PathBuf},
};

/// Output directory from the flag, the config, or the default.
pub(crate) fn resolve_output_dir(flag: Option<&PathBuf>, config: &Config) -> PathBuf {
    flag.cloned()
        .or_else(|| {
            config
                .transfer
                .output_dir
                .clone()
        })
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
}

/// Transfer manager configured from flags and config.
pub(crate) fn build_manager(
    cli: &Cli,
    config: &Config,
    output_dir: &Path,
    silent: bool,
) -> TransferManager<NativeConnector, TerminalSink> {
    TransferManager::native(TerminalSink::new(cli.quiet || silent, use_fancy_output()))
        .with_baud_rate(baud_rate(cli, config))
        .with_session_config(config.session_config())
        .with_output_dir(OutputDir::new(output_dir))
}
