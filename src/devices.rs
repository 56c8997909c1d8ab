//! Capture devices as reported by `dumpcap -D -M` and `dumpcap -L`.

use std::fmt;

use regex::Regex;

use crate::error::{DumpcapError, Result};

/// One record of `dumpcap -D -M` output.
const DEVICE_LIST_PATTERN: &str = concat!(
    r"(?m)^",
    r"(\d+)\. ",              // device number
    r"([^\t]+)\t",            // device name
    r"([^\t]*)\t",            // vendor name
    r"([^\t]*)\t",            // friendly name
    r"(\d+)\t",               // interface type
    r"([a-fA-F0-9\.:,]*)\t",  // known addresses
    r"(\w+)",                 // "loopback" or "network"
    r"$",
);

/// Device types as reported by dumpcap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceType {
    #[default]
    Wired,
    Airpcap,
    Pipe,
    Stdin,
    Bluetooth,
    Wireless,
    Dialup,
    Usb,
    Virtual,
    Unknown(u8),
}

impl DeviceType {
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Wired,
            1 => Self::Airpcap,
            2 => Self::Pipe,
            3 => Self::Stdin,
            4 => Self::Bluetooth,
            5 => Self::Wireless,
            6 => Self::Dialup,
            7 => Self::Usb,
            8 => Self::Virtual,
            other => Self::Unknown(other),
        }
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wired => write!(f, "WIRED"),
            Self::Airpcap => write!(f, "AIRPCAP"),
            Self::Pipe => write!(f, "PIPE"),
            Self::Stdin => write!(f, "STDIN"),
            Self::Bluetooth => write!(f, "BLUETOOTH"),
            Self::Wireless => write!(f, "WIRELESS"),
            Self::Dialup => write!(f, "DIALUP"),
            Self::Usb => write!(f, "USB"),
            Self::Virtual => write!(f, "VIRTUAL"),
            Self::Unknown(_) => write!(f, "UNKNOWN"),
        }
    }
}

/// A link layer a device can capture on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkLayerType {
    pub dlt: u32,
    pub name: String,
    pub description: String,
}

impl fmt::Display for LinkLayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// An interface capable of capturing network traffic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Device {
    pub dev_type: DeviceType,
    /// The system-wide name, e.g. "eth0"
    pub name: String,
    /// dumpcap's index for the device
    pub number: u32,
    pub vendor_name: String,
    pub friendly_name: String,
    /// Addresses the device is currently bound to
    pub addresses: Vec<String>,
    pub loopback: bool,
    /// Supports monitor mode; only filled by a capabilities query
    pub can_rf_mon: bool,
    /// Supported link layers; only filled by a capabilities query
    pub llts: Vec<LinkLayerType>,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

fn parse_number<T: std::str::FromStr<Err = std::num::ParseIntError>>(text: &str) -> Result<T> {
    text.parse::<T>().map_err(|source| DumpcapError::InvalidNumber {
        text: text.to_string(),
        source,
    })
}

/// Parse the complete output of `dumpcap -D -M`.
pub fn parse_device_list(output: &str) -> Result<Vec<Device>> {
    let re = Regex::new(DEVICE_LIST_PATTERN)?;

    re.captures_iter(output)
        .map(|caps| -> Result<Device> {
            let field = |i: usize| caps.get(i).map_or("", |m| m.as_str());
            let addresses = field(6);

            Ok(Device {
                number: parse_number(field(1))?,
                name: field(2).to_string(),
                vendor_name: field(3).to_string(),
                friendly_name: field(4).to_string(),
                dev_type: DeviceType::from_u8(parse_number(field(5))?),
                addresses: if addresses.is_empty() {
                    Vec::new()
                } else {
                    addresses.split(',').map(str::to_string).collect()
                },
                loopback: field(7) == "loopback",
                ..Device::default()
            })
        })
        .collect()
}

/// Parse the stdout of `dumpcap -L`: a line holding "1" if monitor mode is
/// supported, followed by `DLT\tName\tDescription` lines.
pub fn parse_capabilities(output: &str) -> Result<(bool, Vec<LinkLayerType>)> {
    let mut lines = output.lines();
    let Some(first) = lines.next() else {
        return Ok((false, Vec::new()));
    };
    let can_rf_mon = first == "1";

    let llts = lines
        .map(|line| -> Result<LinkLayerType> {
            let cols: Vec<&str> = line.splitn(3, '\t').collect();
            if cols.len() != 3 {
                return Err(DumpcapError::IllegalOutput(line.to_string()));
            }
            Ok(LinkLayerType {
                dlt: parse_number(cols[0])?,
                name: cols[1].to_string(),
                description: cols[2].to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((can_rf_mon, llts))
}
