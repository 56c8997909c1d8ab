//! External process abstraction.
//!
//! Sessions never touch `tokio::process` directly. They go through the
//! `Command` trait, which tests replace with an in-memory process.

mod os;

pub use os::{OsCommand, OsLauncher};

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::Result;

/// A readable end of one of the child's output streams.
pub type Pipe = Box<dyn AsyncRead + Send + Unpin>;

/// A single invocation of an external program.
///
/// Pipes must be requested before `start`. `wait` and `output` are the
/// only operations that block until the program has finished.
#[async_trait]
pub trait Command: Send {
    /// Take the child's stdout. Must be called before `start`.
    fn stdout_pipe(&mut self) -> Result<Pipe>;

    /// Take the child's stderr. Must be called before `start`.
    fn stderr_pipe(&mut self) -> Result<Pipe>;

    /// Launch the program without waiting for it to finish.
    fn start(&mut self) -> Result<()>;

    /// Wait for the program to exit. Fails on a non-zero exit status or
    /// if the program was killed.
    async fn wait(&mut self) -> Result<()>;

    /// Ask the program to terminate immediately. Safe to call after it
    /// already exited.
    fn kill(&mut self) -> Result<()>;

    /// Run the program to completion and return everything it wrote to
    /// stdout.
    async fn output(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Creates `Command`s for a program and its arguments.
pub trait Launcher: Send + Sync {
    fn command(&self, program: &str, args: &[String]) -> Box<dyn Command>;
}
