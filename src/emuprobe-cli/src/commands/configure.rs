//! Configuration command handlers
//!
//! Handles the `configure` subcommand for setting up emuprobe defaults.

use crate::config::Config;
use anyhow::Result;
use std::path::PathBuf;

/// Settings the `configure` command can change
#[derive(Debug, Default)]
pub struct ConfigUpdate {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub timeout_ms: Option<u64>,
    pub mapper: Option<PathBuf>,
}

impl ConfigUpdate {
    fn is_empty(&self) -> bool {
        self.host.is_none() && self.port.is_none() && self.timeout_ms.is_none() && self.mapper.is_none()
    }

    fn apply(self, config: &mut Config) {
        if let Some(host) = self.host {
            config.udp.host = host;
        }
        if let Some(port) = self.port {
            config.udp.port = port;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.udp.timeout_ms = timeout_ms;
        }
        if let Some(mapper) = self.mapper {
            config.mapper = Some(mapper);
        }
    }
}

/// Handle the configure command
pub fn handle(update: ConfigUpdate, show: bool) -> Result<()> {
    let mut config = Config::load()?;

    if show {
        show_config(&config);
        return Ok(());
    }

    if update.is_empty() {
        show_usage();
        return Ok(());
    }

    update.apply(&mut config);
    let path = config.save()?;
    show_config(&config);
    println!("Config saved to: {}", path.display());

    Ok(())
}

/// Display current configuration
fn show_config(config: &Config) {
    println!("Emulator: {}:{}", config.udp.host, config.udp.port);
    println!("Read timeout: {} ms", config.udp.timeout_ms);
    match &config.mapper {
        Some(mapper) => println!("Mapper: {}", mapper.display()),
        None => println!("No default mapper configured"),
    }

    if let Ok(path) = Config::config_path() {
        println!("Config file: {}", path.display());
    }
}

/// Show usage help for the configure command
fn show_usage() {
    println!("Usage: emuprobe configure [--host HOST] [--port PORT] [--timeout-ms MS] [--mapper FILE]");
    println!("   or: emuprobe configure --show");
    println!();
    println!("Note: the emulator's network commands must be enabled (RetroArch:");
    println!("      network_cmd_enable = true, default port 55355).");
}
