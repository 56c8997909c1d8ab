//! Line decoder for `dumpcap -S` output.
//!
//! Each line is `name\tpackets\tdrops`, with both counters cumulative.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::DeviceStatistics;
use crate::error::DecodeError;

/// Parse one statistics line (without its line terminator).
pub fn parse_statistics_line(line: &str) -> Result<DeviceStatistics, DecodeError> {
    let fields: Vec<&str> = line.splitn(3, '\t').collect();
    if fields.len() != 3 {
        return Err(DecodeError::FieldCount {
            count: fields.len(),
            line: line.to_string(),
        });
    }

    let count = |field: &'static str, value: &str| {
        value.parse::<u64>().map_err(|source| DecodeError::InvalidField {
            field,
            line: line.to_string(),
            source,
        })
    };

    Ok(DeviceStatistics {
        name: fields[0].to_string(),
        packet_count: count("packet count", fields[1])?,
        drop_count: count("drop count", fields[2])?,
    })
}

/// Reads `DeviceStatistics` from a buffered stream, one per line.
pub struct StatisticsReader<R> {
    lines: Lines<R>,
}

impl<R: AsyncBufRead + Unpin> StatisticsReader<R> {
    pub fn new(input: R) -> Self {
        Self {
            lines: input.lines(),
        }
    }

    /// Read the next line; a clean end of input is `DecodeError::EndOfStream`.
    pub async fn next(&mut self) -> Result<DeviceStatistics, DecodeError> {
        match self.lines.next_line().await? {
            Some(line) => parse_statistics_line(&line),
            None => Err(DecodeError::EndOfStream),
        }
    }
}
