//! Command handlers

pub mod configure;
pub mod memory;
pub mod session;

use crate::cli::DriverArgs;
use crate::config::Config;

use anyhow::{Context, Result};
use emuprobe::numbers::parse_number;
use emuprobe::{Driver, SharedMemoryConfig, SharedMemoryDriver, UdpDriver, UdpDriverConfig};
use serde_json::Value;

/// Parse a hex or decimal address string
pub fn parse_address(address: &str) -> Result<u32> {
    let value = parse_number(address).with_context(|| format!("Invalid address: {}", address))?;
    u32::try_from(value).with_context(|| format!("Address {} does not fit in 32 bits", address))
}

/// Parse a value typed on the command line.
///
/// `0x` hex becomes a number, anything that parses as JSON is taken as JSON
/// and the rest is a plain string.
pub fn parse_value(text: &str) -> Value {
    if let Some(n) = text.strip_prefix("0x").and_then(|_| parse_number(text)) {
        return Value::from(n);
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Split a `path=value` freeze argument
pub fn parse_assignment(text: &str) -> Result<(String, Value)> {
    let (path, value) = text
        .split_once('=')
        .with_context(|| format!("Expected PATH=VALUE, got '{}'", text))?;
    Ok((path.trim().to_string(), parse_value(value.trim())))
}

/// UDP settings from the config file with command-line overrides applied
pub fn udp_config(args: &DriverArgs, config: &Config) -> UdpDriverConfig {
    let mut udp = config.udp.clone();
    if let Some(host) = &args.host {
        udp.host = host.clone();
    }
    if let Some(port) = args.port {
        udp.port = port;
    }
    if let Some(timeout_ms) = args.timeout_ms {
        udp.timeout_ms = timeout_ms;
    }
    udp
}

/// Build the driver selected by the arguments
pub fn build_driver(args: &DriverArgs) -> Result<Box<dyn Driver>> {
    let config = Config::load()?;
    if let Some(path) = &args.shm {
        let base = parse_address(&args.base)?;
        return Ok(Box::new(SharedMemoryDriver::new(SharedMemoryConfig::new(path, base))));
    }
    Ok(Box::new(UdpDriver::new(udp_config(args, &config))))
}

/// Format bytes as a hex dump, 16 per line, with an ASCII column
pub fn hex_dump(address: u32, data: &[u8]) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, chunk) in data.chunks(16).enumerate() {
        let mut line = format!("{:08x}  ", address as usize + i * 16);
        for j in 0..16 {
            match chunk.get(j) {
                Some(byte) => line.push_str(&format!("{:02x} ", byte)),
                None => line.push_str("   "),
            }
            if j == 7 {
                line.push(' ');
            }
        }
        line.push_str(" |");
        for byte in chunk {
            let c = *byte as char;
            if c.is_ascii_graphic() || c == ' ' {
                line.push(c);
            } else {
                line.push('.');
            }
        }
        line.push('|');
        lines.push(line);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_address() {
        assert_eq!(parse_address("0xD158").unwrap(), 0xD158);
        assert_eq!(parse_address("53592").unwrap(), 53592);
        assert!(parse_address("0x1_0000_0000").is_err());
        assert!(parse_address("0x100000000").is_err());
        assert!(parse_address("d158").is_err());
    }

    #[test]
    fn test_parse_value() {
        assert_eq!(parse_value("999999"), json!(999999));
        assert_eq!(parse_value("0xFF"), json!(255));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("Female"), json!("Female"));
        assert_eq!(parse_value("\"007\""), json!("007"));
    }

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("player.money = 999999").unwrap(),
            ("player.money".to_string(), json!(999999))
        );
        assert_eq!(
            parse_assignment("player.name=RED").unwrap(),
            ("player.name".to_string(), json!("RED"))
        );
        assert!(parse_assignment("player.money").is_err());
    }

    #[test]
    fn test_udp_overrides() {
        let args = DriverArgs {
            port: Some(55400),
            ..DriverArgs::default()
        };
        let udp = udp_config(&args, &Config::default());
        assert_eq!(udp.port, 55400);
        assert_eq!(udp.host, "127.0.0.1");
        assert_eq!(udp.timeout_ms, 64);
    }

    #[test]
    fn test_hex_dump() {
        let data: Vec<u8> = (0x41..0x41 + 18).collect();
        let lines = hex_dump(0xD150, &data);
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("0000d150  41 42 43 44 45 46 47 48  49 4a"));
        assert!(lines[0].ends_with("|ABCDEFGHIJKLMNOP|"));
        assert!(lines[1].starts_with("0000d160  51 52 "));
        assert!(lines[1].ends_with("|QR|"));
    }
}
