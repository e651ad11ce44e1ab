//! Raw memory command handlers
//!
//! `read` and `write` talk to the driver directly, without a mapper.

use super::{build_driver, hex_dump, parse_address};
use crate::cli::DriverArgs;

use anyhow::{Context, Result};
use emuprobe::numbers::parse_hex_bytes;
use emuprobe::ReadRange;

/// Handle the Read command
///
/// Reads bytes from the emulator and displays them as a hex dump.
pub async fn handle_read(args: &DriverArgs, address: &str, length: u32) -> Result<()> {
    let addr = parse_address(address)?;
    let mut driver = build_driver(args)?;
    driver
        .establish_connection()
        .await
        .with_context(|| format!("Failed to connect ({})", driver.name()))?;

    let result = driver.read_bytes(&[ReadRange::new(addr, length)]).await;
    driver.disconnect().await?;
    let blocks = result.with_context(|| format!("Failed to read {} bytes at {:#x}", length, addr))?;

    println!("Reading {} bytes at {:#x}:", length, addr);
    for block in &blocks {
        for line in hex_dump(block.start, &block.data) {
            println!("{}", line);
        }
    }

    Ok(())
}

/// Handle the Write command
pub async fn handle_write(args: &DriverArgs, address: &str, bytes: &str) -> Result<()> {
    let addr = parse_address(address)?;
    let data = parse_hex_bytes(bytes).with_context(|| format!("Invalid hex bytes: {}", bytes))?;

    let mut driver = build_driver(args)?;
    driver
        .establish_connection()
        .await
        .with_context(|| format!("Failed to connect ({})", driver.name()))?;

    println!("Writing {} bytes to {:#x}:", data.len(), addr);
    println!("  {}", hex::encode(&data));

    let result = driver.write_bytes(addr, &data).await;
    driver.disconnect().await?;
    result.context("Write failed")?;
    println!("Write sent");

    Ok(())
}
