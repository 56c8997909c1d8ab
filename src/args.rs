//! Command-line construction for dumpcap.

/// dumpcap flags
mod flags {
    pub const AUTO_STOP: &str = "-a";
    pub const BUFFERED_BYTES: &str = "-C";
    pub const BUFFERED_PACKETS: &str = "-N";
    pub const CAPTURE_FILTER: &str = "-f";
    pub const DISABLE_PROMISCUOUS: &str = "-p";
    pub const ENABLE_GROUP_ACCESS: &str = "-g";
    pub const ENABLE_MONITOR_MODE: &str = "-I";
    pub const FILE: &str = "-w";
    pub const INTERFACE: &str = "-i";
    pub const KERNEL_BUFFER_SIZE: &str = "-B";
    pub const LINK_LAYER_TYPE: &str = "-y";
    pub const MACHINE_READABLE: &str = "-M";
    pub const PACKET_COUNT: &str = "-c";
    pub const PIPE_OUTPUT: &str = "-Z";
    pub const RING_BUFFER: &str = "-b";
    pub const SNAPLEN: &str = "-s";
    pub const USE_PCAP: &str = "-P";
    pub const USE_PCAPNG: &str = "-n";
    pub const USE_THREADS: &str = "-t";
    pub const WIFI_CHANNEL: &str = "-k";

    pub const DURATION: &str = "duration";
    pub const FILES: &str = "files";
    pub const FILESIZE: &str = "filesize";
}

/// What dumpcap is asked to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Mode {
    /// Capture traffic; dumpcap has no flag for this, it is the default.
    Capture,
    ListDevices,
    ListLayers,
    Statistics,
    Version,
}

impl Mode {
    fn flag(self) -> Option<&'static str> {
        match self {
            Mode::Capture => None,
            Mode::ListDevices => Some("-D"),
            Mode::ListLayers => Some("-L"),
            Mode::Statistics => Some("-S"),
            Mode::Version => Some("-v"),
        }
    }
}

/// File format dumpcap writes by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FileFormat {
    /// Let dumpcap decide
    #[default]
    Default,
    Pcap,
    PcapNg,
}

/// Options for a single capture device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceArgument {
    /// The name of the interface; unnamed devices are skipped
    pub name: String,
    /// Packet filter in libpcap filter syntax
    pub capture_filter: String,
    pub disable_promiscuous_mode: bool,
    /// Capture in monitor mode, if available. The device may lose all connections.
    pub enable_monitor_mode: bool,
    /// Size of kernel buffer in MiB
    pub kernel_buffer_size: u64,
    pub link_layer_type: String,
    pub snapshot_length: u64,
    /// Given as "<freq>,[<type>]"
    pub wifi_channel: String,
}

impl DeviceArgument {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// Global options for a dumpcap invocation.
///
/// Zero, empty and `false` values are left out of the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    /// Maximum number of bytes buffered within dumpcap
    pub buffered_bytes: u64,
    /// Maximum number of packets buffered within dumpcap
    pub buffered_packets: u64,
    /// Default packet filter for all devices
    pub capture_filter: String,
    /// Device specific options. dumpcap always writes pcapng for more than one device.
    pub device_args: Vec<DeviceArgument>,
    pub disable_promiscuous_mode: bool,
    /// Group read access on the output file(s)
    pub enable_group_access: bool,
    pub enable_monitor_mode: bool,
    pub file_format: FileFormat,
    pub file_name: String,
    /// Default size of kernel buffer in MiB
    pub kernel_buffer_size: u64,
    pub link_layer_type: String,
    pub snapshot_length: u64,
    /// Stop after this number of seconds
    pub stop_on_duration: u64,
    /// Stop after this number of files
    pub stop_on_files: u64,
    /// Stop after this number of KB written
    pub stop_on_filesize: u64,
    pub stop_on_packet_count: u64,
    /// Switch to the next file after this number of seconds
    pub switch_on_duration: u64,
    /// Ring buffer of this many files
    pub switch_on_files: u64,
    /// Switch to the next file after this number of KB written
    pub switch_on_filesize: u64,
    /// One capture thread per interface
    pub use_threads: bool,
    pub wifi_channel: String,
}

/// Accumulates flags, skipping unset values.
struct ArgList(Vec<String>);

impl ArgList {
    fn flag(&mut self, set: bool, flag: &str) {
        if set {
            self.0.push(flag.to_string());
        }
    }

    fn int(&mut self, value: u64, flag: &str) {
        if value != 0 {
            self.0.push(flag.to_string());
            self.0.push(value.to_string());
        }
    }

    fn prefixed_int(&mut self, value: u64, flag: &str, prefix: &str) {
        if value != 0 {
            self.0.push(flag.to_string());
            self.0.push(format!("{}:{}", prefix, value));
        }
    }

    fn string(&mut self, value: &str, flag: &str) {
        if !value.is_empty() {
            self.0.push(flag.to_string());
            self.0.push(value.to_string());
        }
    }
}

impl Arguments {
    /// Serialize the options into dumpcap flags.
    ///
    /// ```
    /// use dumpcap::{Arguments, DeviceArgument};
    ///
    /// let args = Arguments {
    ///     stop_on_duration: 60,
    ///     device_args: vec![DeviceArgument::new("eth0")],
    ///     ..Arguments::default()
    /// };
    /// assert_eq!(args.build_args(), ["-a", "duration:60", "-i", "eth0"]);
    /// ```
    pub fn build_args(&self) -> Vec<String> {
        let mut r = ArgList(Vec::new());

        // Global and default options first
        r.int(self.buffered_bytes, flags::BUFFERED_BYTES);
        r.int(self.buffered_packets, flags::BUFFERED_PACKETS);
        r.string(&self.capture_filter, flags::CAPTURE_FILTER);
        r.flag(self.disable_promiscuous_mode, flags::DISABLE_PROMISCUOUS);
        r.flag(self.enable_group_access, flags::ENABLE_GROUP_ACCESS);
        r.flag(self.enable_monitor_mode, flags::ENABLE_MONITOR_MODE);
        match self.file_format {
            FileFormat::Pcap => r.0.push(flags::USE_PCAP.to_string()),
            FileFormat::PcapNg => r.0.push(flags::USE_PCAPNG.to_string()),
            FileFormat::Default => {}
        }
        r.string(&self.file_name, flags::FILE);
        r.int(self.kernel_buffer_size, flags::KERNEL_BUFFER_SIZE);
        r.string(&self.link_layer_type, flags::LINK_LAYER_TYPE);
        r.int(self.snapshot_length, flags::SNAPLEN);
        r.prefixed_int(self.stop_on_duration, flags::AUTO_STOP, flags::DURATION);
        r.prefixed_int(self.stop_on_files, flags::AUTO_STOP, flags::FILES);
        r.prefixed_int(self.stop_on_filesize, flags::AUTO_STOP, flags::FILESIZE);
        r.int(self.stop_on_packet_count, flags::PACKET_COUNT);
        r.prefixed_int(self.switch_on_duration, flags::RING_BUFFER, flags::DURATION);
        r.prefixed_int(self.switch_on_files, flags::RING_BUFFER, flags::FILES);
        r.prefixed_int(self.switch_on_filesize, flags::RING_BUFFER, flags::FILESIZE);
        r.flag(self.use_threads, flags::USE_THREADS);
        r.string(&self.wifi_channel, flags::WIFI_CHANNEL);

        // Device options apply to the preceding -i
        for dev in self.device_args.iter().filter(|d| !d.name.is_empty()) {
            r.string(&dev.name, flags::INTERFACE);
            r.string(&dev.capture_filter, flags::CAPTURE_FILTER);
            r.flag(dev.disable_promiscuous_mode, flags::DISABLE_PROMISCUOUS);
            r.flag(dev.enable_monitor_mode, flags::ENABLE_MONITOR_MODE);
            r.int(dev.kernel_buffer_size, flags::KERNEL_BUFFER_SIZE);
            r.string(&dev.link_layer_type, flags::LINK_LAYER_TYPE);
            r.int(dev.snapshot_length, flags::SNAPLEN);
            r.string(&dev.wifi_channel, flags::WIFI_CHANNEL);
        }

        r.0
    }

    /// The full command line for `mode`. With `sync_pipe` set, dumpcap is
    /// forced into child mode and reports over that sync-pipe token.
    pub(crate) fn invocation(&self, mode: Mode, sync_pipe: Option<&str>) -> Vec<String> {
        let mut r = ArgList(Vec::new());

        if let Some(flag) = mode.flag() {
            r.0.push(flag.to_string());
        }
        if let Some(pipe_name) = sync_pipe {
            r.string(pipe_name, flags::PIPE_OUTPUT);
        }
        r.0.extend(self.build_args());
        r.0
    }
}

/// Arguments for `dumpcap -M -D`.
pub(crate) fn list_devices_args() -> Vec<String> {
    vec![
        flags::MACHINE_READABLE.to_string(),
        Mode::ListDevices.flag().unwrap_or_default().to_string(),
    ]
}
