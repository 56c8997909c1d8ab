//! Long-running dumpcap invocations.
//!
//! A session owns the child process and a single decoder task that turns
//! one of the child's pipes into items. Items are handed to the caller one
//! at a time through a bounded channel. The channel is closed when the
//! decoder task ends, and the task's result is the session's terminal
//! error.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::BufReader;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{DecodeError, DumpcapError, Result};
use crate::process::{Command, Pipe};
use crate::protocol::codec::read_message;
use crate::protocol::lines::StatisticsReader;
use crate::protocol::{DeviceStatistics, PipeMessage};

/// A dumpcap process capturing live traffic, reporting sync-pipe messages.
pub type Capture = Session<PipeMessage>;

/// A dumpcap process periodically reporting per-device packet counts.
pub type Statistics = Session<DeviceStatistics>;

/// Source of session items.
#[async_trait]
pub(crate) trait Decoder: Send + 'static {
    type Item: Send + 'static;

    /// Decode the next item. `DecodeError::EndOfStream` stops the session
    /// without error.
    async fn next_item(&mut self) -> Result<Self::Item, DecodeError>;
}

/// Decodes sync-pipe frames.
pub(crate) struct FrameDecoder {
    pipe: Pipe,
}

impl FrameDecoder {
    pub(crate) fn new(pipe: Pipe) -> Self {
        Self { pipe }
    }
}

#[async_trait]
impl Decoder for FrameDecoder {
    type Item = PipeMessage;

    async fn next_item(&mut self) -> Result<PipeMessage, DecodeError> {
        read_message(&mut self.pipe).await
    }
}

#[async_trait]
impl Decoder for StatisticsReader<BufReader<Pipe>> {
    type Item = DeviceStatistics;

    async fn next_item(&mut self) -> Result<DeviceStatistics, DecodeError> {
        self.next().await
    }
}

/// Closes a session's pipe from anywhere, e.g. a signal handler.
#[derive(Debug, Clone)]
pub struct PipeCloser(Arc<watch::Sender<bool>>);

impl PipeCloser {
    /// Stop reading from dumpcap. Safe to call more than once.
    pub fn close(&self) {
        if !self.0.send_replace(true) {
            debug!("closing dumpcap pipe");
        }
    }
}

/// A running dumpcap process and the task decoding its output.
///
/// Receive with [`Session::recv`] until it returns `None`, then call
/// [`Session::wait`] to learn whether dumpcap and the decoder finished
/// cleanly. Dropping a session stops the decoder and kills the process.
pub struct Session<T> {
    child: Box<dyn Command>,
    items: mpsc::Receiver<T>,
    closer: PipeCloser,
    quit: watch::Sender<bool>,
    decoder: JoinHandle<Result<()>>,
}

impl<T: Send + 'static> Session<T> {
    /// Start `child` and decode its output with `decoder`.
    ///
    /// The pipe read by `decoder` must have been taken from `child` before
    /// this call. If the process fails to start no task is spawned. Must be
    /// called from within a tokio runtime.
    pub(crate) fn launch<D>(mut child: Box<dyn Command>, decoder: D) -> Result<Self>
    where
        D: Decoder<Item = T>,
    {
        child.start()?;

        let (tx, items) = mpsc::channel(1);
        let (closed_tx, closed_rx) = watch::channel(false);
        let (quit, quit_rx) = watch::channel(false);
        let decoder = tokio::spawn(decode(decoder, tx, closed_rx, quit_rx));

        Ok(Self {
            child,
            items,
            closer: PipeCloser(Arc::new(closed_tx)),
            quit,
            decoder,
        })
    }

    /// The next decoded item, or `None` once the decoder has stopped.
    pub async fn recv(&mut self) -> Option<T> {
        self.items.recv().await
    }

    /// Kill the dumpcap process. The decoder keeps running until the pipe
    /// ends or is closed.
    pub fn kill(&mut self) -> Result<()> {
        self.child.kill()
    }

    /// Close the pipe dumpcap reports on, which makes it quit.
    ///
    /// An item that is being read or handed over is dropped.
    pub fn close(&self) {
        self.closer.close();
    }

    /// A handle that can close the pipe while the session is borrowed
    /// elsewhere.
    pub fn closer(&self) -> PipeCloser {
        self.closer.clone()
    }

    /// Wait for dumpcap to exit, then stop the decoder.
    ///
    /// Output still buffered in the pipe is decoded, but a pipe that stays
    /// open after dumpcap exited is abandoned. Returns `Ok` only if dumpcap
    /// exited successfully and the decoder did not fail. A failed exit is
    /// reported before any decoder error.
    pub async fn wait(mut self) -> Result<()> {
        let exited = self.child.wait().await;
        self.quit.send_replace(true);

        let decoded = match (&mut self.decoder).await {
            Ok(result) => result,
            Err(e) => Err(DumpcapError::DecoderPanicked(e.to_string())),
        };

        exited?;
        decoded
    }
}

/// Resolves once `latch` is set or its sender is gone.
async fn tripped(latch: &mut watch::Receiver<bool>) {
    let _ = latch.wait_for(|set| *set).await;
}

async fn decode<D: Decoder>(
    mut decoder: D,
    items: mpsc::Sender<D::Item>,
    mut closed: watch::Receiver<bool>,
    mut quit: watch::Receiver<bool>,
) -> Result<()> {
    debug!("decoder started");

    let result = loop {
        // Once dumpcap has exited, a pipe still held open by someone else
        // must not keep the decoder alive.
        let next = tokio::select! {
            biased;
            _ = tripped(&mut closed) => break Ok(()),
            next = decoder.next_item() => next,
            _ = tripped(&mut quit) => break Ok(()),
        };

        let item = match next {
            Ok(item) => item,
            Err(e) if e.is_end_of_stream() => break Ok(()),
            Err(e) => break Err(DumpcapError::Decode(e)),
        };

        tokio::select! {
            biased;
            _ = tripped(&mut closed) => break Ok(()),
            _ = tripped(&mut quit) => break Ok(()),
            sent = items.send(item) => {
                // Receiver gone with the session.
                if sent.is_err() {
                    break Ok(());
                }
            }
        }
    };

    match &result {
        Ok(()) => debug!("decoder stopped"),
        Err(e) => warn!(error = %e, "decoder stopped"),
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::process::Launcher;
    use crate::protocol::MessageType;
    use crate::testing::{Behavior, MockLauncher};

    fn capture(behavior: Behavior) -> Result<Capture> {
        let mut child = MockLauncher::new(behavior).command("dumpcap", &["-Z".into(), "none".into()]);
        let pipe = child.stderr_pipe()?;
        Session::launch(child, FrameDecoder::new(pipe))
    }

    fn statistics(behavior: Behavior) -> Result<Statistics> {
        let mut child = MockLauncher::new(behavior).command("dumpcap", &["-S".into()]);
        let pipe = child.stdout_pipe()?;
        Session::launch(child, StatisticsReader::new(BufReader::new(pipe)))
    }

    mod capture_tests {
        use super::*;

        #[tokio::test]
        async fn test_messages_in_order() {
            let mut session = capture(Behavior::Normal).unwrap();

            let msg = session.recv().await.unwrap();
            assert_eq!(msg.kind, MessageType::File);
            assert_eq!(msg.text, "foobar");

            let msg = session.recv().await.unwrap();
            assert_eq!(msg.kind, MessageType::PacketCount);
            assert_eq!(msg.packet_count, 123);

            let msg = session.recv().await.unwrap();
            assert_eq!(msg.kind, MessageType::DropCount);
            assert_eq!(msg.drop_count, 456);

            assert!(session.recv().await.is_none());
            session.wait().await.unwrap();
        }

        #[tokio::test]
        async fn test_bad_filter() {
            let mut session = capture(Behavior::BadFilter).unwrap();

            let msg = session.recv().await.unwrap();
            assert_eq!(msg.kind, MessageType::BadFilter);
            assert_eq!(msg.text, "Not so much");

            assert!(session.recv().await.is_none());
            session.wait().await.unwrap();
        }

        #[tokio::test]
        async fn test_decode_error_is_terminal() {
            let mut session = capture(Behavior::IllegalOutput).unwrap();

            assert!(session.recv().await.is_none());
            let err = session.wait().await.unwrap_err();
            assert!(matches!(
                err,
                DumpcapError::Decode(DecodeError::InvalidCount { .. })
            ));
        }

        #[tokio::test]
        async fn test_start_failure_is_synchronous() {
            let err = capture(Behavior::FailStart).err().unwrap();
            assert!(matches!(err, DumpcapError::Start { .. }));
        }

        #[tokio::test]
        async fn test_exit_failure_wins() {
            let mut session = capture(Behavior::FailExit).unwrap();
            while session.recv().await.is_some() {}

            let err = session.wait().await.unwrap_err();
            assert!(matches!(err, DumpcapError::Exit { code: Some(1) }));
        }

        #[tokio::test]
        async fn test_close_stops_endless_capture() {
            let mut session = capture(Behavior::Endless).unwrap();

            for expected in 1..=3 {
                let msg = session.recv().await.unwrap();
                assert_eq!(msg.packet_count, expected);
            }
            session.close();

            let drained = tokio::time::timeout(Duration::from_secs(5), async {
                while session.recv().await.is_some() {}
            })
            .await;
            assert!(drained.is_ok());
            session.wait().await.unwrap();
        }

        #[tokio::test]
        async fn test_wait_without_draining() {
            // The decoder is blocked handing over a message nobody receives.
            let session = capture(Behavior::Normal).unwrap();
            tokio::time::timeout(Duration::from_secs(5), session.wait())
                .await
                .unwrap()
                .unwrap();
        }

        #[tokio::test]
        async fn test_wait_returns_while_pipe_is_held_open() {
            let mut session = capture(Behavior::LingeringPipe).unwrap();

            let msg = session.recv().await.unwrap();
            assert_eq!(msg.kind, MessageType::File);
            assert_eq!(msg.text, "x");

            tokio::time::timeout(Duration::from_secs(5), session.wait())
                .await
                .unwrap()
                .unwrap();
        }

        #[cfg(unix)]
        #[tokio::test]
        async fn test_wait_ignores_grandchild_holding_stderr() {
            use crate::process::OsCommand;

            // The background sleep inherits stderr and outlives the shell.
            let script = r"printf 'F\0\0\1x' >&2; (sleep 10 &)";
            let mut child: Box<dyn Command> =
                Box::new(OsCommand::new("sh", &["-c".to_string(), script.to_string()]));
            let pipe = child.stderr_pipe().unwrap();
            let mut session = Session::launch(child, FrameDecoder::new(pipe)).unwrap();

            let msg = session.recv().await.unwrap();
            assert_eq!(msg.kind, MessageType::File);
            assert_eq!(msg.text, "x");

            tokio::time::timeout(Duration::from_secs(5), session.wait())
                .await
                .unwrap()
                .unwrap();
        }

        #[tokio::test]
        async fn test_kill_then_close() {
            let mut session = capture(Behavior::Endless).unwrap();
            assert!(session.recv().await.is_some());

            session.kill().unwrap();
            session.closer().close();
            while session.recv().await.is_some() {}

            let err = session.wait().await.unwrap_err();
            assert!(matches!(err, DumpcapError::Exit { code: None }));
        }
    }

    mod statistics_tests {
        use super::*;

        #[tokio::test]
        async fn test_lines_until_closed() {
            let mut session = statistics(Behavior::Normal).unwrap();

            for _ in 0..5 {
                let stats = session.recv().await.unwrap();
                assert_eq!(stats.name, "devX");
                assert_eq!(stats.packet_count, 123);
                assert_eq!(stats.drop_count, 456);
            }

            session.close();
            while session.recv().await.is_some() {}
            session.wait().await.unwrap();
        }

        #[tokio::test]
        async fn test_illegal_line() {
            let mut session = statistics(Behavior::IllegalOutput).unwrap();

            assert!(session.recv().await.is_none());
            let err = session.wait().await.unwrap_err();
            assert!(matches!(
                err,
                DumpcapError::Decode(DecodeError::FieldCount { count: 1, .. })
            ));
        }

        #[tokio::test]
        async fn test_close_is_idempotent() {
            let mut session = statistics(Behavior::Normal).unwrap();
            let closer = session.closer();
            closer.close();
            closer.close();
            session.close();

            while session.recv().await.is_some() {}
            session.wait().await.unwrap();
        }
    }
}
