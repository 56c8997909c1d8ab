use std::io;
use std::num::ParseIntError;

use thiserror::Error;

use crate::protocol::MessageType;

/// Errors raised while decoding dumpcap's output streams.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// The stream ended cleanly on a frame or line boundary.
    #[error("end of stream")]
    EndOfStream,

    #[error("stream truncated while reading {what}")]
    Truncated { what: &'static str },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("invalid {kind} payload {text:?}: {source}")]
    InvalidCount {
        kind: MessageType,
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("malformed error message: {0}")]
    MalformedError(Box<DecodeError>),

    #[error("payload of {0} bytes does not fit a frame")]
    FrameTooLarge(usize),

    #[error("expected 3 tab-separated fields, got {count} in {line:?}")]
    FieldCount { count: usize, line: String },

    #[error("invalid {field} in {line:?}: {source}")]
    InvalidField {
        field: &'static str,
        line: String,
        #[source]
        source: ParseIntError,
    },
}

impl DecodeError {
    /// True if the stream simply ran out, which is how a helper signals
    /// that it is done writing.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, DecodeError::EndOfStream)
    }
}

#[derive(Error, Debug)]
pub enum DumpcapError {
    #[error("failed to start {program}: {source}")]
    Start {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("dumpcap exited unsuccessfully ({})", describe_exit(.code))]
    Exit { code: Option<i32> },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("protocol error: {0}")]
    Decode(#[from] DecodeError),

    #[error("unexpected message from dumpcap: {kind} {text:?}")]
    UnexpectedMessage { kind: MessageType, text: String },

    #[error("illegal output from dumpcap: {0:?}")]
    IllegalOutput(String),

    #[error("invalid number {text:?} in dumpcap output: {source}")]
    InvalidNumber {
        text: String,
        #[source]
        source: ParseIntError,
    },

    #[error("process has not been started")]
    NotStarted,

    #[error("process has already been started")]
    AlreadyStarted,

    #[error("{0} pipe is not available")]
    PipeUnavailable(&'static str),

    #[error("decoder task failed: {0}")]
    DecoderPanicked(String),

    #[error("invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

pub type Result<T, E = DumpcapError> = std::result::Result<T, E>;
