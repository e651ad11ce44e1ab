//! Mapper-driven command handlers
//!
//! `watch`, `get` and `set` load a mapper into an [`Instance`] and work
//! through its properties.

use super::{build_driver, parse_assignment, parse_value};
use crate::cli::DriverArgs;
use crate::config::Config;

use anyhow::{anyhow, bail, Context, Result};
use emuprobe::{Instance, InstanceEvent, InstanceHandle, Mapper, NoopHooks, PropertyChange};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

async fn load_instance(mapper: &Path, driver: &DriverArgs) -> Result<Instance> {
    let mapper = Mapper::from_path(mapper)
        .with_context(|| format!("Failed to load mapper {}", mapper.display()))?;
    let driver = build_driver(driver)?;
    Instance::load(mapper, driver, Box::new(NoopHooks::new()))
        .await
        .context("Failed to start session")
}

fn format_change(change: &PropertyChange) -> String {
    let mut line = format!("{} = {}", change.path, change.value);
    if change.frozen {
        line.push_str(" [frozen]");
    }
    line
}

/// Handle the Watch command
///
/// Ticks until Ctrl-C, printing every batch of changed properties.
pub async fn handle_watch(
    mapper: Option<PathBuf>,
    freeze: &[String],
    json: bool,
    driver: &DriverArgs,
) -> Result<()> {
    let mapper = match mapper {
        Some(path) => path,
        None => Config::load()?
            .mapper
            .context("No mapper given. Pass one or set a default with 'emuprobe configure --mapper FILE'")?,
    };
    let assignments = freeze
        .iter()
        .map(|text| parse_assignment(text))
        .collect::<Result<Vec<_>>>()?;

    let mut instance = load_instance(&mapper, driver).await?;
    if let Some(metadata) = instance.metadata() {
        println!("{} ({})", metadata.game_name, metadata.platform);
    }
    let mut events = instance.subscribe();

    // Freezes need bytes to hold, so read once before applying them
    if !assignments.is_empty() {
        instance.tick().await?;
    }
    for (path, value) in &assignments {
        instance
            .write_value(path, value, true)
            .await
            .with_context(|| format!("Failed to freeze {}", path))?;
    }

    let handle = InstanceHandle::spawn(instance);

    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break Ok(()),
            event = events.recv() => match event {
                Ok(InstanceEvent::PropertiesChanged(changes)) => {
                    if let Err(e) = changes.iter().try_for_each(|change| print_change(change, json)) {
                        break Err(e);
                    }
                }
                Ok(InstanceEvent::MapperLoaded(_)) => {}
                Ok(InstanceEvent::InstanceReset) => {
                    break Err(anyhow!("Session reset, see the log for the cause"));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch fell behind, events dropped");
                }
                Err(RecvError::Closed) => break Ok(()),
            },
        }
    };

    handle.unload().await;
    result
}

fn print_change(change: &PropertyChange, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(change)?);
    } else {
        println!("{}", format_change(change));
    }
    Ok(())
}

/// Handle the Get command
pub async fn handle_get(mapper: &Path, path: &str, json: bool, driver: &DriverArgs) -> Result<()> {
    let mut instance = load_instance(mapper, driver).await?;
    let result = get_property(&mut instance, path, json).await;
    instance.unload().await?;
    result
}

async fn get_property(instance: &mut Instance, path: &str, json: bool) -> Result<()> {
    instance.tick().await?;
    let Some(property) = instance.property(path) else {
        bail!("Unknown property: {}", path);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&property.snapshot())?);
    } else {
        println!("{}", property.value());
    }
    Ok(())
}

/// Handle the Set command
pub async fn handle_set(mapper: &Path, path: &str, value: &str, driver: &DriverArgs) -> Result<()> {
    let value = parse_value(value);
    let mut instance = load_instance(mapper, driver).await?;
    let result = set_property(&mut instance, path, &value).await;
    instance.unload().await?;
    result
}

async fn set_property(instance: &mut Instance, path: &str, value: &serde_json::Value) -> Result<()> {
    // Strings and bit fields merge into the bytes already there
    instance.tick().await?;
    instance
        .write_value(path, value, false)
        .await
        .with_context(|| format!("Failed to write {}", path))?;
    println!("{} <- {}", path, value);
    Ok(())
}
