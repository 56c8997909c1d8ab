//! In-memory stand-in for the dumpcap executable.
//!
//! The mock looks at the mode flag in its arguments the way dumpcap does
//! and writes canned output to `tokio::io::duplex` pipes from a writer
//! task. `Behavior` selects the failure to simulate.

use std::io;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt, DuplexStream};
use tokio::task::JoinHandle;

use crate::error::{DumpcapError, Result};
use crate::process::{Command, Launcher, Pipe};
use crate::protocol::codec::{encode_error, encode_frame};
use crate::protocol::{MessageType, PipeMessage};

pub(crate) const VERSION_OUTPUT: &str = "Dumpcap (Wireshark) 4.2.2 (Git v4.2.2 packaged as 4.2.2-1)\n\
                                         \n\
                                         Copyright 1998-2024 Gerald Combs and contributors.\n";

pub(crate) const INTERFACES_OUTPUT: &str = "1. em1\t\t\t0\t\tnetwork\n\
                                            2. lo\t\tLoopback\t0\t127.0.0.1,::1\tloopback\n";

pub(crate) const LAYERS_OUTPUT: &str = "1\n1\tEN10MB\tEthernet\n143\tDOCSIS\tDOCSIS\n";

const STATISTICS_LINE: &[u8] = b"devX\t123\t456\n";
const PIPE_CAPACITY: usize = 1024;

/// What the mock process should do besides its normal output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum Behavior {
    #[default]
    Normal,
    /// The executable cannot be started.
    FailStart,
    /// Report an error and exit with status 1.
    FailExit,
    /// Reject the capture filter.
    BadFilter,
    /// Write output the decoders must reject.
    IllegalOutput,
    /// Capture forever, counting packets, until the pipe is closed.
    Endless,
    /// Exit after one message while another process keeps stderr open.
    LingeringPipe,
}

/// Creates `MockCommand`s and remembers their arguments.
#[derive(Debug, Clone, Default)]
pub(crate) struct MockLauncher {
    behavior: Behavior,
    invocations: Arc<Mutex<Vec<Vec<String>>>>,
}

impl MockLauncher {
    pub(crate) fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    /// Arguments of every command created so far.
    pub(crate) fn invocations(&self) -> Vec<Vec<String>> {
        self.invocations.lock().unwrap().clone()
    }
}

impl Launcher for MockLauncher {
    fn command(&self, _program: &str, args: &[String]) -> Box<dyn Command> {
        self.invocations.lock().unwrap().push(args.to_vec());
        Box::new(MockCommand::new(args, self.behavior))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Capture,
    ListDevices,
    ListLayers,
    Statistics,
    Version,
}

impl Mode {
    fn from_args(args: &[String]) -> Self {
        let has = |flag: &str| args.iter().any(|a| a == flag);
        if has("-v") {
            Mode::Version
        } else if has("-D") {
            Mode::ListDevices
        } else if has("-L") {
            Mode::ListLayers
        } else if has("-S") {
            Mode::Statistics
        } else {
            Mode::Capture
        }
    }
}

type Sink = Box<dyn AsyncWrite + Send + Unpin>;

pub(crate) struct MockCommand {
    mode: Mode,
    behavior: Behavior,
    stdout: Option<DuplexStream>,
    stderr: Option<DuplexStream>,
    writer: Option<JoinHandle<()>>,
    started: bool,
    killed: bool,
}

impl MockCommand {
    fn new(args: &[String], behavior: Behavior) -> Self {
        Self {
            mode: Mode::from_args(args),
            behavior,
            stdout: None,
            stderr: None,
            writer: None,
            started: false,
            killed: false,
        }
    }

    fn start_error() -> DumpcapError {
        DumpcapError::Start {
            program: "dumpcap".to_string(),
            source: io::Error::new(io::ErrorKind::NotFound, "no such file or directory"),
        }
    }

    fn pipe(slot: &mut Option<DuplexStream>, started: bool, name: &'static str) -> Result<Pipe> {
        if started || slot.is_some() {
            return Err(DumpcapError::PipeUnavailable(name));
        }
        let (reader, writer) = tokio::io::duplex(PIPE_CAPACITY);
        *slot = Some(writer);
        Ok(Box::new(reader))
    }
}

fn sink(stream: Option<DuplexStream>) -> Sink {
    match stream {
        Some(stream) => Box::new(stream),
        None => Box::new(tokio::io::sink()),
    }
}

fn frame(msg: PipeMessage) -> Vec<u8> {
    msg.to_frame().unwrap()
}

async fn write_output(mode: Mode, behavior: Behavior, mut stdout: Sink, mut stderr: Sink) -> io::Result<()> {
    match (mode, behavior) {
        (Mode::Statistics, Behavior::IllegalOutput) => stdout.write_all(b"foobar\n").await,
        (Mode::Statistics, _) => loop {
            stdout.write_all(STATISTICS_LINE).await?;
        },
        (Mode::ListLayers, Behavior::FailExit) => {
            stderr.write_all(&encode_error("The capture session could not be initiated", "").unwrap()).await
        }
        (Mode::ListLayers, _) => {
            stderr.write_all(&frame(PipeMessage::text(MessageType::Success, ""))).await?;
            stdout.write_all(LAYERS_OUTPUT.as_bytes()).await
        }
        (Mode::Capture, Behavior::BadFilter) => {
            stderr
                .write_all(&frame(PipeMessage::text(MessageType::BadFilter, "Not so much")))
                .await
        }
        (Mode::Capture, Behavior::IllegalOutput) => {
            let mut payload = b"lots".to_vec();
            payload.push(0);
            let frame = encode_frame(MessageType::PACKET_COUNT, &payload).unwrap();
            stderr.write_all(&frame).await
        }
        (Mode::Capture, Behavior::FailExit) => {
            stderr.write_all(&encode_error("You don't have permission", "to capture").unwrap()).await
        }
        (Mode::Capture, Behavior::Endless) => {
            let mut count = 0;
            loop {
                count += 1;
                stderr.write_all(&frame(PipeMessage::packet_count(count))).await?;
            }
        }
        (Mode::Capture, Behavior::LingeringPipe) => {
            stderr.write_all(&frame(PipeMessage::text(MessageType::File, "x"))).await?;
            tokio::spawn(async move {
                let _held = stderr;
                std::future::pending::<()>().await
            });
            Ok(())
        }
        (Mode::Capture, _) => {
            stderr.write_all(&frame(PipeMessage::text(MessageType::File, "foobar"))).await?;
            stderr.write_all(&frame(PipeMessage::packet_count(123))).await?;
            stderr.write_all(&frame(PipeMessage::drop_count(456))).await
        }
        (Mode::ListDevices | Mode::Version, _) => Ok(()),
    }
}

#[async_trait]
impl Command for MockCommand {
    fn stdout_pipe(&mut self) -> Result<Pipe> {
        Self::pipe(&mut self.stdout, self.started, "stdout")
    }

    fn stderr_pipe(&mut self) -> Result<Pipe> {
        Self::pipe(&mut self.stderr, self.started, "stderr")
    }

    fn start(&mut self) -> Result<()> {
        if self.behavior == Behavior::FailStart {
            // Dropping the writers ends any pipes already handed out.
            self.stdout = None;
            self.stderr = None;
            return Err(Self::start_error());
        }
        let stdout = sink(self.stdout.take());
        let stderr = sink(self.stderr.take());
        let (mode, behavior) = (self.mode, self.behavior);

        self.writer = Some(tokio::spawn(async move {
            // A closed pipe just ends the output.
            let _ = write_output(mode, behavior, stdout, stderr).await;
        }));
        self.started = true;
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        if !self.started {
            return Err(DumpcapError::NotStarted);
        }
        if let Some(writer) = self.writer.take() {
            let _ = writer.await;
        }
        if self.killed {
            return Err(DumpcapError::Exit { code: None });
        }
        if self.behavior == Behavior::FailExit {
            return Err(DumpcapError::Exit { code: Some(1) });
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        if !self.started {
            return Err(DumpcapError::NotStarted);
        }
        if let Some(writer) = self.writer.as_ref().filter(|w| !w.is_finished()) {
            writer.abort();
            self.killed = true;
        }
        Ok(())
    }

    async fn output(self: Box<Self>) -> Result<Vec<u8>> {
        match self.behavior {
            Behavior::FailStart => return Err(Self::start_error()),
            Behavior::FailExit => return Err(DumpcapError::Exit { code: Some(1) }),
            _ => {}
        }
        let out = match (self.mode, self.behavior) {
            (Mode::Version, _) => VERSION_OUTPUT,
            (Mode::ListDevices, Behavior::IllegalOutput) => "1. em1\t\t\t300\t\tnetwork\n",
            (Mode::ListDevices, _) => INTERFACES_OUTPUT,
            _ => "",
        };
        Ok(out.as_bytes().to_vec())
    }
}
