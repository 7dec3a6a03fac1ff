//! Validate a synchronization rule file without running it.

use anyhow::{Context, Result};
use concord_kernel::RuleSet;
use std::path::Path;

pub fn check_rules(file: &Path, json: bool) -> Result<()> {
    let rules =
        RuleSet::from_file(file).with_context(|| format!("Failed to load rules from {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&rules)?);
        return Ok(());
    }

    println!("{} synchronization(s)", rules.synchronizations.len());
    for rule in &rules.synchronizations {
        let condition = if rule.condition.is_some() { " [where]" } else { "" };
        println!(
            "- {}: {}.{}{} -> {} action(s)",
            rule.name,
            rule.when.source,
            rule.when.event,
            condition,
            rule.then.len()
        );
        for then in &rule.then {
            println!("    {}.{}", then.target, then.action);
        }
    }
    Ok(())
}
