//! Run Wireshark's `dumpcap` and decode what it reports.
//!
//! dumpcap does the actual packet capture. This crate builds its command
//! line, supervises the process and turns its sync-pipe messages and
//! statistics lines into typed values.
//!
//! ```no_run
//! use dumpcap::{Arguments, DeviceArgument, Dumpcap};
//!
//! # async fn run() -> dumpcap::Result<()> {
//! let dumpcap = Dumpcap::from_env();
//! let mut capture = dumpcap.new_capture(Arguments {
//!     file_name: "/tmp/eth0.pcapng".to_string(),
//!     stop_on_duration: 10,
//!     device_args: vec![DeviceArgument::new("eth0")],
//!     ..Arguments::default()
//! })?;
//!
//! while let Some(msg) = capture.recv().await {
//!     println!("{}", msg);
//! }
//! capture.wait().await
//! # }
//! ```

pub mod args;
pub mod config;
pub mod devices;
pub mod dumpcap;
pub mod error;
pub mod process;
pub mod protocol;
pub mod session;

#[cfg(test)]
mod testing;

pub use args::{Arguments, DeviceArgument, FileFormat};
pub use config::DumpcapConfig;
pub use devices::{Device, DeviceType, LinkLayerType};
pub use dumpcap::{Dumpcap, UNKNOWN_VERSION};
pub use error::{DecodeError, DumpcapError, Result};
pub use protocol::{DeviceStatistics, MessageType, PipeMessage};
pub use session::{Capture, PipeCloser, Session, Statistics};
