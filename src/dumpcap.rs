//! The `Dumpcap` facade: one-shot queries and long-running sessions.

use std::fmt;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, BufReader};
use tracing::debug;

use crate::args::{list_devices_args, Arguments, DeviceArgument, Mode};
use crate::config::DumpcapConfig;
use crate::devices::{parse_capabilities, parse_device_list, Device};
use crate::error::Result;
use crate::process::{Command, Launcher, OsLauncher};
use crate::protocol::codec::wait_for_success;
use crate::protocol::lines::StatisticsReader;
use crate::session::{Capture, FrameDecoder, Session, Statistics};

/// Returned by [`Dumpcap::version_string`] when the version is unavailable.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Entry point for running dumpcap.
///
/// Long-running sessions are started with [`Dumpcap::new_capture`] and
/// [`Dumpcap::new_statistics`] and must be created inside a tokio runtime.
#[derive(Clone)]
pub struct Dumpcap {
    config: DumpcapConfig,
    launcher: Arc<dyn Launcher>,
}

impl Default for Dumpcap {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dumpcap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dumpcap").field("config", &self.config).finish()
    }
}

impl Dumpcap {
    /// Use `dumpcap` from `PATH`.
    pub fn new() -> Self {
        Self::with_config(DumpcapConfig::default())
    }

    /// Honor `DUMPCAP_EXECUTABLE` and `DUMPCAP_PIPE_NAME`.
    pub fn from_env() -> Self {
        Self::with_config(DumpcapConfig::from_env())
    }

    pub fn with_config(config: DumpcapConfig) -> Self {
        Self::with_launcher(config, Arc::new(OsLauncher))
    }

    /// Run commands through `launcher` instead of spawning real processes.
    pub fn with_launcher(config: DumpcapConfig, launcher: Arc<dyn Launcher>) -> Self {
        Self { config, launcher }
    }

    pub fn config(&self) -> &DumpcapConfig {
        &self.config
    }

    fn command(&self, args: &[String]) -> Box<dyn Command> {
        debug!(program = %self.config.executable, ?args, "running dumpcap");
        self.launcher.command(&self.config.executable, args)
    }

    /// Command line for a mode that reports over the sync pipe.
    fn child_invocation(&self, args: &Arguments, mode: Mode) -> Vec<String> {
        args.invocation(mode, Some(&self.config.pipe_name))
    }

    /// The first line `dumpcap -v` prints.
    pub async fn version(&self) -> Result<String> {
        let args = Arguments::default().invocation(Mode::Version, None);
        let out = self.command(&args).output().await?;
        let text = String::from_utf8_lossy(&out);
        Ok(text.lines().next().unwrap_or_default().to_string())
    }

    /// Like [`Dumpcap::version`], but [`UNKNOWN_VERSION`] on any error.
    pub async fn version_string(&self) -> String {
        match self.version().await {
            Ok(version) => version,
            Err(e) => {
                debug!(error = %e, "could not query dumpcap version");
                UNKNOWN_VERSION.to_string()
            }
        }
    }

    /// All devices dumpcap can capture on.
    ///
    /// With `capabilities` set, dumpcap is queried once more per device to
    /// fill in its link layers, without entering monitor mode. Otherwise
    /// `can_rf_mon` and `llts` are left empty.
    pub async fn devices(&self, capabilities: bool) -> Result<Vec<Device>> {
        let out = self.command(&list_devices_args()).output().await?;
        let mut devices = parse_device_list(&String::from_utf8_lossy(&out))?;

        if capabilities {
            for dev in &mut devices {
                self.capabilities(dev, false).await?;
            }
        }
        Ok(devices)
    }

    /// Query `dev` for its link layers and monitor mode support, storing
    /// the results in `dev`.
    ///
    /// With `monitor_mode` set dumpcap puts the device into monitor mode,
    /// which may drop all of its active connections.
    pub async fn capabilities(&self, dev: &mut Device, monitor_mode: bool) -> Result<()> {
        let args = Arguments {
            device_args: vec![DeviceArgument {
                enable_monitor_mode: monitor_mode,
                ..DeviceArgument::new(dev.name.clone())
            }],
            ..Arguments::default()
        };

        let mut child = self.command(&self.child_invocation(&args, Mode::ListLayers));
        let mut stdout = child.stdout_pipe()?;
        let mut stderr = child.stderr_pipe()?;
        child.start()?;

        wait_for_success(&mut stderr).await?;

        let mut out = String::new();
        stdout.read_to_string(&mut out).await?;
        child.wait().await?;

        let (can_rf_mon, llts) = parse_capabilities(&out)?;
        dev.can_rf_mon = can_rf_mon;
        dev.llts = llts;
        Ok(())
    }

    /// Start capturing according to `args`. dumpcap runs until it meets a
    /// stop condition, is killed, or its pipe is closed.
    pub fn new_capture(&self, args: Arguments) -> Result<Capture> {
        let mut child = self.command(&self.child_invocation(&args, Mode::Capture));
        let stderr = child.stderr_pipe()?;
        Session::launch(child, FrameDecoder::new(stderr))
    }

    /// Start reporting per-device packet counts, roughly once a second,
    /// until the session is closed.
    pub fn new_statistics(&self) -> Result<Statistics> {
        let args = Arguments::default();
        let mut child = self.command(&self.child_invocation(&args, Mode::Statistics));
        let stdout = child.stdout_pipe()?;
        Session::launch(child, StatisticsReader::new(BufReader::new(stdout)))
    }
}
