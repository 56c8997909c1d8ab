//! dumpcap's sync-pipe protocol.
//!
//! dumpcap reports progress to its parent over a pipe using small framed
//! messages (see `codec`). The statistics mode instead writes plain
//! tab-separated lines to stdout (see `lines`).

pub mod codec;
pub mod lines;

use std::fmt;

/// Message types dumpcap may send, with their fixed header codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// At least one of the given capture filters is invalid.
    BadFilter,
    /// Absolute number of packets dropped.
    DropCount,
    /// A general error, made of a primary and a secondary text.
    Err,
    /// dumpcap started writing to a new file.
    File,
    /// Number of packets written to the current file.
    PacketCount,
    /// Request to quit.
    Quit,
    /// The requested operation succeeded.
    Success,
    /// Any header code not listed above.
    Unknown(u8),
}

impl MessageType {
    pub const BAD_FILTER: u8 = 66;
    pub const DROP_COUNT: u8 = 68;
    pub const ERR: u8 = 69;
    pub const FILE: u8 = 70;
    pub const PACKET_COUNT: u8 = 80;
    pub const QUIT: u8 = 81;
    pub const SUCCESS: u8 = 83;

    /// Map a header code to its message type.
    pub fn from_u8(value: u8) -> Self {
        match value {
            Self::BAD_FILTER => Self::BadFilter,
            Self::DROP_COUNT => Self::DropCount,
            Self::ERR => Self::Err,
            Self::FILE => Self::File,
            Self::PACKET_COUNT => Self::PacketCount,
            Self::QUIT => Self::Quit,
            Self::SUCCESS => Self::Success,
            other => Self::Unknown(other),
        }
    }

    /// The header code for this message type.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::BadFilter => Self::BAD_FILTER,
            Self::DropCount => Self::DROP_COUNT,
            Self::Err => Self::ERR,
            Self::File => Self::FILE,
            Self::PacketCount => Self::PACKET_COUNT,
            Self::Quit => Self::QUIT,
            Self::Success => Self::SUCCESS,
            Self::Unknown(code) => code,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadFilter => write!(f, "BAD_FILTER"),
            Self::DropCount => write!(f, "DROP_COUNT"),
            Self::Err => write!(f, "ERR"),
            Self::File => write!(f, "FILE"),
            Self::PacketCount => write!(f, "PACKET_COUNT"),
            Self::Quit => write!(f, "QUIT"),
            Self::Success => write!(f, "SUCCESS"),
            Self::Unknown(code) => write!(f, "UNKNOWN({})", code),
        }
    }
}

/// A decoded sync-pipe message.
///
/// `text` carries the payload text for every type (the file name for
/// `File`, the concatenated primary and secondary text for `Err`). The
/// counters are only filled for `PacketCount` and `DropCount`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipeMessage {
    pub kind: MessageType,
    pub text: String,
    pub packet_count: u64,
    pub drop_count: u64,
}

impl PipeMessage {
    /// A message whose payload is plain text.
    pub fn text(kind: MessageType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            packet_count: 0,
            drop_count: 0,
        }
    }

    pub fn packet_count(count: u64) -> Self {
        Self {
            kind: MessageType::PacketCount,
            text: count.to_string(),
            packet_count: count,
            drop_count: 0,
        }
    }

    pub fn drop_count(count: u64) -> Self {
        Self {
            kind: MessageType::DropCount,
            text: count.to_string(),
            packet_count: 0,
            drop_count: count,
        }
    }

    /// True for the message types dumpcap uses to report failures.
    pub fn is_error(&self) -> bool {
        matches!(self.kind, MessageType::Err | MessageType::BadFilter)
    }
}

impl fmt::Display for PipeMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageType::PacketCount => write!(f, "[{}] {}", self.kind, self.packet_count),
            MessageType::DropCount => write!(f, "[{}] {}", self.kind, self.drop_count),
            _ => write!(f, "[{}] {}", self.kind, self.text),
        }
    }
}

/// One line of per-device statistics as reported by `dumpcap -S`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceStatistics {
    /// The device reported on
    pub name: String,
    /// Packets seen on the device so far
    pub packet_count: u64,
    /// Packets dropped so far
    pub drop_count: u64,
}

impl fmt::Display for DeviceStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.name, self.packet_count, self.drop_count)
    }
}
