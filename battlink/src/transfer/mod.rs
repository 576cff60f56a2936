//! Operation sequencing: full download and plan upload.
//!
//! A [`TransferManager`] owns the connector, the open link (if any), the
//! operation state and the event sink. Each public operation runs to
//! completion or failure; on failure the port is closed, the state reset, the
//! error published as status and error event, and returned to the caller.
//!
//! ```text
//! download: Idle -> Connecting -> AwaitingHandshake -> ReceivingFileList
//!                -> ReceivingFile(1/N) ... ReceivingFile(N/N) -> Closed
//! upload:   Idle -> Connecting -> SendingConfig -> Closed
//! ```

pub mod settings;
pub mod state;

use {
    crate::{
        error::{Error, Result, ValidationError},
        events::{Completion, EventSink, LogSink},
        link::{DEFAULT_TICK, Link, YieldHook},
        port::{Connector, SerialConfig},
        protocol::payload::HandshakeInfo,
        session::{Session, SessionConfig},
        storage::OutputDir,
    },
    log::{debug, error, info},
    std::{path::PathBuf, time::Duration},
};

pub use {
    settings::PlanSettings,
    state::{Stage, TransferState},
};

/// Result of a successful download.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DownloadReport {
    /// Device greeting.
    pub handshake: HandshakeInfo,
    /// Saved files, in device order.
    pub files: Vec<PathBuf>,
}

/// Drives downloads and uploads over ports opened by a [`Connector`].
pub struct TransferManager<C: Connector, E: EventSink = LogSink> {
    connector: C,
    serial: SerialConfig,
    session: SessionConfig,
    output: OutputDir,
    tick: Duration,
    yield_hook: Option<YieldHook>,
    link: Option<Link<C::Port>>,
    state: TransferState,
    events: E,
}

impl<C: Connector, E: EventSink> TransferManager<C, E> {
    /// Create a manager with default timeouts and output directory.
    pub fn new(connector: C, events: E) -> Self {
        Self {
            connector,
            serial: SerialConfig::default(),
            session: SessionConfig::default(),
            output: OutputDir::default(),
            tick: DEFAULT_TICK,
            yield_hook: None,
            link: None,
            state: TransferState::default(),
            events,
        }
    }

    /// Set the baud rate used for every port opened.
    #[must_use]
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.serial.baud_rate = baud_rate;
        self
    }

    /// Replace the protocol timeouts.
    #[must_use]
    pub fn with_session_config(mut self, config: SessionConfig) -> Self {
        self.session = config;
        self
    }

    /// Replace the output directory.
    #[must_use]
    pub fn with_output_dir(mut self, output: OutputDir) -> Self {
        self.output = output;
        self
    }

    /// Set the polling tick of every link opened.
    #[must_use]
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Run `hook` between polling ticks of every link opened.
    #[must_use]
    pub fn with_yield_hook(mut self, hook: YieldHook) -> Self {
        self.yield_hook = Some(hook);
        self
    }

    /// Change the output directory for later downloads.
    pub fn set_output_dir(&mut self, path: impl Into<PathBuf>) {
        self.output = OutputDir::new(path);
    }

    /// Current output directory.
    pub fn output_dir(&self) -> &OutputDir {
        &self.output
    }

    /// Result files already present in the output directory.
    pub fn received_files(&self) -> Result<Vec<String>> {
        self.output
            .received_files()
    }

    /// State of the current or last operation.
    pub fn state(&self) -> &TransferState {
        &self.state
    }

    /// The event sink.
    pub fn events(&self) -> &E {
        &self.events
    }

    /// Mutable access to the event sink.
    pub fn events_mut(&mut self) -> &mut E {
        &mut self.events
    }

    /// Whether a port is open.
    pub fn is_connected(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(Link::is_open)
    }

    fn set_status(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.events
            .on_status(&message);
        self.state.status = message;
    }

    /// Publish an input error without touching the connection.
    fn reject(&mut self, err: ValidationError) -> Error {
        let err = Error::Validation(err);
        let message = err.to_string();
        self.events
            .on_error(&message);
        self.state.status = message;
        err
    }

    /// Uniform failure cleanup.
    fn fail(&mut self, err: Error) -> Error {
        error!("{err}");
        self.disconnect();
        self.state
            .reset();
        let message = err.to_string();
        self.events
            .on_error(&message);
        self.state.status = message;
        err
    }

    /// Open `port_name`, closing any previous connection first.
    pub fn connect(&mut self, port_name: &str) -> Result<()> {
        if port_name
            .trim()
            .is_empty()
        {
            return Err(self.reject(ValidationError::EmptyPort));
        }

        self.disconnect();
        self.state
            .reset();
        self.state.stage = Stage::Connecting;
        self.set_status(format!("Connecting to {port_name}..."));

        let config = self.serial.for_port(port_name);
        match self
            .connector
            .open(&config)
        {
            Ok(port) => {
                let link = Link::new(port)
                    .with_tick(self.tick)
                    .with_yield_hook(self.yield_hook.clone());
                self.link = Some(link);
                self.state.connected = true;
                info!("Connected to {port_name} at {} baud", config.baud_rate);
                self.set_status(format!("Connected to {port_name}"));
                Ok(())
            },
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Close the port if one is open.
    pub fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Err(e) = link.close() {
                debug!("Error closing {}: {e}", link.name());
            }
            info!("Disconnected from {}", link.name());
        }
        self.state.connected = false;
    }

    /// Download every announced file over the open connection.
    pub fn start_download(&mut self) -> Result<DownloadReport> {
        match self.download() {
            Ok(report) => {
                self.disconnect();
                self.state.stage = Stage::Closed;
                self.set_status(format!("Received {} files", report.files.len()));
                self.events
                    .on_complete(&Completion::Download {
                        files: report.files.len(),
                    });
                Ok(report)
            },
            Err(e) => Err(self.fail(e)),
        }
    }

    fn download(&mut self) -> Result<DownloadReport> {
        let link = self
            .link
            .as_mut()
            .ok_or(Error::NotConnected)?;

        self.state.stage = Stage::AwaitingHandshake;
        let handshake =
            Session::new(link, &self.session, &mut self.state, &mut self.events).wait_for_handshake()?;

        self.state.stage = Stage::ReceivingFileList;
        let names =
            Session::new(link, &self.session, &mut self.state, &mut self.events).receive_file_list()?;
        if names.is_empty() {
            return Err(Error::Sequence("No files to receive".into()));
        }

        let total = names.len();
        let mut files = Vec::with_capacity(total);
        for (i, name) in names.iter().enumerate() {
            let index = i + 1;
            self.state.stage = Stage::ReceivingFile { index, total };
            debug!("File {index}/{total}: {name}");

            let saved = files.len();
            let path = Session::new(link, &self.session, &mut self.state, &mut self.events)
                .receive_file(&self.output)
                .map_err(|source| Error::FileTransfer {
                    index,
                    total,
                    saved,
                    source: Box::new(source),
                })?;
            files.push(path);
        }

        Ok(DownloadReport { handshake, files })
    }

    /// Connect to `port_name` and download every result file.
    pub fn receive_results(&mut self, port_name: &str) -> Result<DownloadReport> {
        self.connect(port_name)?;
        self.start_download()
    }

    /// Upload a plan configuration to the device on `port_name`.
    ///
    /// Input is validated before the port is touched.
    pub fn send_settings(&mut self, port_name: &str, settings: &PlanSettings) -> Result<()> {
        if port_name
            .trim()
            .is_empty()
        {
            return Err(self.reject(ValidationError::EmptyPort));
        }
        if let Err(e) = settings.validate() {
            return Err(self.reject(e));
        }

        self.connect(port_name)?;
        match self.upload(settings) {
            Ok(()) => {
                self.disconnect();
                self.state.stage = Stage::Closed;
                self.set_status(format!("Plan {} updated", settings.plan_index));
                self.events
                    .on_complete(&Completion::Upload {
                        plan: settings.plan_byte(),
                    });
                Ok(())
            },
            Err(e) => Err(self.fail(e)),
        }
    }

    fn upload(&mut self, settings: &PlanSettings) -> Result<()> {
        let link = self
            .link
            .as_mut()
            .ok_or(Error::NotConnected)?;

        self.state.stage = Stage::SendingConfig;
        let csv = settings.to_csv();
        Session::new(link, &self.session, &mut self.state, &mut self.events).send_file(
            settings.plan_byte(),
            &settings.filename(),
            csv.as_bytes(),
        )
    }
}

#[cfg(feature = "native")]
impl<E: EventSink> TransferManager<crate::port::NativeConnector, E> {
    /// Manager opening real serial ports.
    pub fn native(events: E) -> Self {
        Self::new(crate::port::NativeConnector, events)
    }
}

impl<C: Connector, E: EventSink> Drop for TransferManager<C, E> {
    fn drop(&mut self) {
        self.disconnect();
    }
}
