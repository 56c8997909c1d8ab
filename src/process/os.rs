//! `Command` backed by a real child process.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{ready, Context, Poll};

use async_trait::async_trait;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::process::{Child, ChildStderr, ChildStdout};
use tokio::sync::oneshot;
use tracing::debug;

use super::{Command, Launcher, Pipe};
use crate::error::{DumpcapError, Result};

/// Launches programs as real child processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsLauncher;

impl Launcher for OsLauncher {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn Command> {
        Box::new(OsCommand::new(program, args))
    }
}

/// A child process driven through `tokio::process`.
///
/// Streams that were not requested through `stdout_pipe`/`stderr_pipe`
/// are discarded. The child is killed if this value is dropped while it
/// is still running.
pub struct OsCommand {
    program: String,
    command: tokio::process::Command,
    child: Option<Child>,
    stdout_tx: Option<oneshot::Sender<ChildStdout>>,
    stderr_tx: Option<oneshot::Sender<ChildStderr>>,
}

impl OsCommand {
    pub fn new(program: &str, args: &[String]) -> Self {
        let mut command = tokio::process::Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);

        Self {
            program: program.to_string(),
            command,
            child: None,
            stdout_tx: None,
            stderr_tx: None,
        }
    }

    /// The child's process id while it is running.
    pub fn id(&self) -> Option<u32> {
        self.child.as_ref().and_then(Child::id)
    }
}

#[async_trait]
impl Command for OsCommand {
    fn stdout_pipe(&mut self) -> Result<Pipe> {
        if self.child.is_some() || self.stdout_tx.is_some() {
            return Err(DumpcapError::PipeUnavailable("stdout"));
        }
        let (tx, rx) = oneshot::channel();
        self.stdout_tx = Some(tx);
        self.command.stdout(Stdio::piped());
        Ok(Box::new(PendingPipe::Waiting(rx)))
    }

    fn stderr_pipe(&mut self) -> Result<Pipe> {
        if self.child.is_some() || self.stderr_tx.is_some() {
            return Err(DumpcapError::PipeUnavailable("stderr"));
        }
        let (tx, rx) = oneshot::channel();
        self.stderr_tx = Some(tx);
        self.command.stderr(Stdio::piped());
        Ok(Box::new(PendingPipe::Waiting(rx)))
    }

    fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(DumpcapError::AlreadyStarted);
        }
        if self.stdout_tx.is_none() {
            self.command.stdout(Stdio::null());
        }
        if self.stderr_tx.is_none() {
            self.command.stderr(Stdio::null());
        }

        let mut child = match self.command.spawn() {
            Ok(child) => child,
            Err(source) => {
                // Pending pipes observe end-of-stream once their sender is gone.
                self.stdout_tx = None;
                self.stderr_tx = None;
                return Err(DumpcapError::Start {
                    program: self.program.clone(),
                    source,
                });
            }
        };
        debug!(program = %self.program, pid = ?child.id(), "started child process");

        if let (Some(tx), Some(stdout)) = (self.stdout_tx.take(), child.stdout.take()) {
            let _ = tx.send(stdout);
        }
        if let (Some(tx), Some(stderr)) = (self.stderr_tx.take(), child.stderr.take()) {
            let _ = tx.send(stderr);
        }

        self.child = Some(child);
        Ok(())
    }

    async fn wait(&mut self) -> Result<()> {
        let child = self.child.as_mut().ok_or(DumpcapError::NotStarted)?;
        let status = child.wait().await?;
        debug!(program = %self.program, %status, "child process exited");
        if !status.success() {
            return Err(DumpcapError::Exit {
                code: status.code(),
            });
        }
        Ok(())
    }

    fn kill(&mut self) -> Result<()> {
        let child = self.child.as_mut().ok_or(DumpcapError::NotStarted)?;
        match child.start_kill() {
            Ok(()) => Ok(()),
            // Already reaped.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn output(self: Box<Self>) -> Result<Vec<u8>> {
        if self.child.is_some() {
            return Err(DumpcapError::AlreadyStarted);
        }
        let mut this = *self;
        let output = this
            .command
            .output()
            .await
            .map_err(|source| DumpcapError::Start {
                program: this.program.clone(),
                source,
            })?;
        if !output.status.success() {
            return Err(DumpcapError::Exit {
                code: output.status.code(),
            });
        }
        Ok(output.stdout)
    }
}

/// A pipe handed out before the child exists.
///
/// Reads park until `start` delivers the real stream; if the process
/// never starts the pipe reads as empty.
enum PendingPipe<R> {
    Waiting(oneshot::Receiver<R>),
    Open(R),
    Gone,
}

impl<R: AsyncRead + Unpin> AsyncRead for PendingPipe<R> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        loop {
            match &mut *self {
                PendingPipe::Waiting(rx) => match ready!(Pin::new(rx).poll(cx)) {
                    Ok(stream) => *self = PendingPipe::Open(stream),
                    Err(_) => *self = PendingPipe::Gone,
                },
                PendingPipe::Open(stream) => return Pin::new(stream).poll_read(cx, buf),
                PendingPipe::Gone => return Poll::Ready(Ok(())),
            }
        }
    }
}
