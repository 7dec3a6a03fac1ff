//! Journal inspection: summary counts and causal traces.

use super::run_files;
use anyhow::{Context, Result};
use concord_journal::Journal;
use concord_kernel::ChainLink;
use concord_types::EventId;
use serde::Serialize;
use std::path::Path;

fn load_journal(config_path: &Path) -> Result<Journal> {
    let (journal_path, _) = run_files(config_path)?;
    Journal::load(&journal_path)
        .with_context(|| format!("Failed to read journal {:?}", journal_path))
}

pub fn inspect(config_path: &Path, json: bool) -> Result<()> {
    let journal = load_journal(config_path)?;
    let summary = journal.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!(
            "Journal: {} concepts, {} synchronizations, {} actions, {} events, {} failures",
            summary.concepts,
            summary.synchronizations,
            summary.actions,
            summary.events,
            summary.failures
        );
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum TraceStep<'a> {
    Event {
        id: String,
        name: &'a str,
        source: Option<&'a str>,
        status: String,
    },
    Action {
        id: String,
        action: &'a str,
        concept: Option<&'a str>,
        sync: Option<&'a str>,
        root: bool,
    },
}

pub fn trace(config_path: &Path, event: &str, json: bool) -> Result<()> {
    let event_id: EventId = event
        .parse()
        .with_context(|| format!("Invalid event id: {event}"))?;
    let journal = load_journal(config_path)?;
    let chain = journal
        .trace(event_id)
        .with_context(|| format!("Failed to trace event {event}"))?;

    let steps: Vec<TraceStep> = chain
        .iter()
        .map(|link| match link {
            ChainLink::Event(e) => TraceStep::Event {
                id: e.id().to_string(),
                name: e.name(),
                source: journal.concept_name(e.source()),
                status: e.status().to_string(),
            },
            ChainLink::Action(a) => TraceStep::Action {
                id: a.id.to_string(),
                action: &a.action,
                concept: journal.concept_name(a.concept),
                sync: a.sync.as_deref(),
                root: a.is_root(),
            },
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&steps)?);
        return Ok(());
    }

    for (depth, step) in steps.iter().enumerate() {
        let indent = "  ".repeat(depth);
        match step {
            TraceStep::Event {
                name,
                source,
                status,
                ..
            } => println!("{indent}event {} from {} [{}]", name, source.unwrap_or("?"), status),
            TraceStep::Action {
                action,
                concept,
                sync,
                root,
                ..
            } => {
                let via = match (root, sync) {
                    (true, _) => " (external)".to_string(),
                    (false, Some(sync)) => format!(" via {sync}"),
                    (false, None) => String::new(),
                };
                println!("{indent}action {}.{}{}", concept.unwrap_or("?"), action, via);
            }
        }
    }
    Ok(())
}
