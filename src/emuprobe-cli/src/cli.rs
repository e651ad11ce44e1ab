//! CLI argument definitions for emuprobe

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "emuprobe")]
#[command(about = "Read, write and freeze named values in a running emulator", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Where emulator memory comes from. Unset values fall back to the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct DriverArgs {
    /// Emulator host for the UDP driver
    #[arg(long, env = "EMUPROBE_HOST")]
    pub host: Option<String>,

    /// Emulator UDP port
    #[arg(long, env = "EMUPROBE_PORT")]
    pub port: Option<u16>,

    /// Milliseconds a read waits for its response
    #[arg(long, env = "EMUPROBE_TIMEOUT_MS")]
    pub timeout_ms: Option<u64>,

    /// Read a shared-memory file instead of talking UDP
    #[arg(long, value_name = "FILE", env = "EMUPROBE_SHM")]
    pub shm: Option<PathBuf>,

    /// Emulator address of the first byte of the shared-memory file
    #[arg(long, default_value = "0", requires = "shm")]
    pub base: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Configure default settings
    #[command(visible_alias = "c")]
    Configure {
        /// Default emulator host
        #[arg(long)]
        host: Option<String>,

        /// Default emulator UDP port
        #[arg(long)]
        port: Option<u16>,

        /// Default read timeout in milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Default mapper for `watch`
        #[arg(long)]
        mapper: Option<PathBuf>,

        /// Show current configuration
        #[arg(long)]
        show: bool,
    },

    /// Hex dump raw memory
    Read {
        /// Address (hex with 0x prefix, or decimal)
        address: String,

        /// Number of bytes to read
        length: u32,

        #[command(flatten)]
        driver: DriverArgs,
    },

    /// Write raw bytes
    Write {
        /// Address (hex with 0x prefix, or decimal)
        address: String,

        /// Bytes as hex, space separated (e.g. "0a ff 10")
        bytes: String,

        #[command(flatten)]
        driver: DriverArgs,
    },

    /// Load a mapper and print every change as it happens
    #[command(visible_alias = "w")]
    Watch {
        /// Mapper file (.json, .yaml); uses the configured mapper if omitted
        mapper: Option<PathBuf>,

        /// Freeze a property for the whole session (path=value, repeatable)
        #[arg(long, value_name = "PATH=VALUE")]
        freeze: Vec<String>,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        driver: DriverArgs,
    },

    /// Print the current value of one property
    Get {
        /// Mapper file (.json, .yaml)
        mapper: PathBuf,

        /// Property path (e.g. "player.name")
        path: String,

        /// Print the full property as JSON
        #[arg(long)]
        json: bool,

        #[command(flatten)]
        driver: DriverArgs,
    },

    /// Write a value through one property
    Set {
        /// Mapper file (.json, .yaml)
        mapper: PathBuf,

        /// Property path (e.g. "bag.money")
        path: String,

        /// New value; JSON, a 0x-hex number or a bare string
        value: String,

        #[command(flatten)]
        driver: DriverArgs,
    },
}
