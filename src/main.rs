//! dumpcapctl - drive dumpcap from the command line.

use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dumpcap::{Arguments, DeviceArgument, Dumpcap, DumpcapConfig, FileFormat, PipeCloser};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "dumpcapctl")]
#[command(about = "Run dumpcap captures and report its progress")]
struct Cli {
    /// Path to the dumpcap executable (overrides DUMPCAP_EXECUTABLE)
    #[arg(long, global = true)]
    dumpcap: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the dumpcap version
    Version,
    /// List capture devices
    Devices {
        /// Also query supported link layers and monitor mode
        #[arg(short, long)]
        capabilities: bool,
    },
    /// Print per-device packet counts
    Stats {
        /// Stop after this many seconds
        #[arg(short, long)]
        seconds: Option<u64>,
    },
    /// Capture traffic, printing what dumpcap reports
    Capture {
        /// Interface to capture on (repeatable)
        #[arg(short, long = "interface", required = true)]
        interfaces: Vec<String>,
        /// Output file
        #[arg(short = 'w', long)]
        file: Option<String>,
        /// Capture filter for all interfaces
        #[arg(short, long)]
        filter: Option<String>,
        /// Stop after this many seconds
        #[arg(long)]
        duration: Option<u64>,
        /// Switch to a new file after this many seconds
        #[arg(long)]
        switch_duration: Option<u64>,
        /// Write pcap instead of pcapng
        #[arg(long)]
        pcap: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = DumpcapConfig::from_env();
    if let Some(path) = cli.dumpcap {
        config = config.with_executable(path);
    }
    let dumpcap = Dumpcap::with_config(config);

    match run(&dumpcap, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(dumpcap: &Dumpcap, command: Commands) -> Result<()> {
    match command {
        Commands::Version => {
            let version = dumpcap.version().await.context("Failed to query dumpcap version")?;
            println!("{}", version);
        }
        Commands::Devices { capabilities } => {
            let devices = dumpcap
                .devices(capabilities)
                .await
                .context("Failed to list devices")?;
            for dev in devices {
                let addresses = dev.addresses.join(",");
                println!("{}. {} [{}] {}", dev.number, dev.name, dev.dev_type, addresses);
                if capabilities {
                    let llts: Vec<String> = dev.llts.iter().map(ToString::to_string).collect();
                    println!("   monitor mode: {}, link layers: {}", dev.can_rf_mon, llts.join(" "));
                }
            }
        }
        Commands::Stats { seconds } => {
            let mut stats = dumpcap.new_statistics().context("Failed to start dumpcap")?;
            close_on_signal(stats.closer(), seconds.map(Duration::from_secs));

            while let Some(line) = stats.recv().await {
                println!("{}", line);
            }
            stats.wait().await.context("dumpcap statistics failed")?;
        }
        Commands::Capture {
            interfaces,
            file,
            filter,
            duration,
            switch_duration,
            pcap,
        } => {
            let args = Arguments {
                capture_filter: filter.unwrap_or_default(),
                device_args: interfaces.into_iter().map(DeviceArgument::new).collect(),
                file_format: if pcap { FileFormat::Pcap } else { FileFormat::Default },
                file_name: file.unwrap_or_default(),
                stop_on_duration: duration.unwrap_or_default(),
                switch_on_duration: switch_duration.unwrap_or_default(),
                ..Arguments::default()
            };

            let mut capture = dumpcap.new_capture(args).context("Failed to start dumpcap")?;
            close_on_signal(capture.closer(), None);

            while let Some(msg) = capture.recv().await {
                if msg.is_error() {
                    tracing::error!("{}", msg);
                } else {
                    println!("{}", msg);
                }
            }
            capture.wait().await.context("dumpcap capture failed")?;
        }
    }
    Ok(())
}

/// Close the session's pipe on Ctrl-C, or once `timeout` has passed.
fn close_on_signal(closer: PipeCloser, timeout: Option<Duration>) {
    tokio::spawn(async move {
        let elapsed = async {
            match timeout {
                Some(timeout) => tokio::time::sleep(timeout).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(e) = result {
                    tracing::error!("Failed to listen for Ctrl-C: {}", e);
                    return;
                }
                tracing::info!("Received Ctrl-C, stopping dumpcap");
            }
            _ = elapsed => {
                tracing::info!("Time is up, stopping dumpcap");
            }
        }

        closer.close();
    });
}
