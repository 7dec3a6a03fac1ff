//! Command bus access: enqueue, list commands, read published state.

use super::run_files;
use anyhow::{Context, Result};
use concord_journal::CommandBus;
use concord_types::{CommandStatus, Payload};
use std::path::Path;

/// Append a pending command to the bus and print its id
pub fn enqueue(config_path: &Path, target: &str, action: &str, payload: &str) -> Result<()> {
    let payload: Payload =
        serde_json::from_str(payload).with_context(|| format!("Invalid JSON payload: {payload}"))?;
    let (_, bus_path) = run_files(config_path)?;

    let id = concord_journal::enqueue_command(&bus_path, target, action, payload)
        .with_context(|| format!("Failed to write command bus {:?}", bus_path))?;
    tracing::info!(command = %id, target, action, "Command enqueued");
    println!("{}", id);
    Ok(())
}

pub fn list_commands(config_path: &Path, status: Option<CommandStatus>, json: bool) -> Result<()> {
    let (_, bus_path) = run_files(config_path)?;
    let bus = CommandBus::load(&bus_path)
        .with_context(|| format!("Failed to read command bus {:?}", bus_path))?;

    let commands: Vec<_> = bus
        .commands
        .iter()
        .filter(|c| status.map_or(true, |s| c.status == s))
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&commands)?);
        return Ok(());
    }

    if commands.is_empty() {
        println!("No commands");
        return Ok(());
    }
    for command in commands {
        let error = command
            .error_message
            .as_deref()
            .map(|e| format!(" ({})", e))
            .unwrap_or_default();
        println!(
            "{} {:<7} {}.{} {}{}",
            command.id.short(),
            command.status,
            command.target,
            command.action,
            command.payload,
            error
        );
    }
    Ok(())
}

pub fn show_state(config_path: &Path, name: Option<&str>, json: bool) -> Result<()> {
    let (_, bus_path) = run_files(config_path)?;
    let bus = CommandBus::load(&bus_path)
        .with_context(|| format!("Failed to read command bus {:?}", bus_path))?;

    let states: Vec<_> = match name {
        Some(name) => {
            let published = bus
                .states
                .get(name)
                .with_context(|| format!("No published state for concept '{name}'"))?;
            vec![(name, published)]
        }
        None => bus.states.iter().map(|(n, s)| (n.as_str(), s)).collect(),
    };

    if json {
        let map: serde_json::Map<String, serde_json::Value> = states
            .iter()
            .map(|(n, s)| Ok((n.to_string(), serde_json::to_value(s)?)))
            .collect::<Result<_, serde_json::Error>>()?;
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    if states.is_empty() {
        println!("No published state");
    }
    for (name, published) in states {
        println!(
            "{} (published {})",
            name,
            published.published_at.format("%Y-%m-%d %H:%M:%S")
        );
        println!("{}", serde_json::to_string_pretty(&published.state)?);
    }
    Ok(())
}
