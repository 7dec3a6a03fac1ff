//! Scripted scenarios
//!
//! A scenario is an ordered list of steps played against a runner:
//!
//! ```yaml
//! - type: dispatch
//!   target: Counter
//!   action: increment
//!   payload: { by: 5 }
//! - type: wait
//!   ticks: 2
//! - type: assert_state
//!   target: Counter
//!   expected: { value: 7 }
//! ```

use crate::error::RunnerError;
use crate::runner::Runner;
use concord_types::{Payload, State};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("Failed to read scenario file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse YAML scenario: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON scenario: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scenario file must be .yaml, .yml or .json: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Step {step}: concept '{target}' not found")]
    UnknownConcept { step: usize, target: String },

    #[error("State mismatch for {target}. Expected {key}={expected}, got {actual}")]
    StateMismatch {
        target: String,
        key: String,
        expected: Payload,
        actual: Payload,
    },

    #[error("Step {step} failed: {source}")]
    Runner {
        step: usize,
        #[source]
        source: RunnerError,
    },
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScenarioStep {
    Dispatch {
        target: String,
        action: String,
        #[serde(default)]
        payload: Payload,
    },
    /// Run propagation rounds with no external action
    Wait {
        #[serde(default = "default_wait_ticks")]
        ticks: u64,
    },
    /// Every expected key must equal the concept's current value
    AssertState {
        target: String,
        #[serde(alias = "expected_state")]
        expected: State,
    },
}

fn default_wait_ticks() -> u64 {
    1
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scenario {
    pub steps: Vec<ScenarioStep>,
}

impl Scenario {
    pub fn from_yaml(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json(text: &str) -> Result<Self, ScenarioError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load by extension: `.yaml`/`.yml` or `.json`
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        let extension = path.extension().and_then(|e| e.to_str());
        match extension {
            Some("yaml" | "yml") => Self::from_yaml(&std::fs::read_to_string(path)?),
            Some("json") => Self::from_json(&std::fs::read_to_string(path)?),
            _ => Err(ScenarioError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Play every step in order, stopping at the first failure
    pub fn play(&self, runner: &mut Runner) -> Result<(), ScenarioError> {
        runner.start();
        for (index, step) in self.steps.iter().enumerate() {
            let step_number = index + 1;
            play_step(runner, step_number, step)?;
        }
        info!(steps = self.steps.len(), "Scenario completed");
        Ok(())
    }
}

fn play_step(
    runner: &mut Runner,
    step: usize,
    current: &ScenarioStep,
) -> Result<(), ScenarioError> {
    let runner_error = |source| ScenarioError::Runner { step, source };
    match current {
        ScenarioStep::Dispatch {
            target,
            action,
            payload,
        } => {
            let id = runner
                .concept_id(target)
                .ok_or_else(|| ScenarioError::UnknownConcept {
                    step,
                    target: target.clone(),
                })?;
            info!(step, target = %target, action = %action, "Scenario: dispatching");
            runner
                .dispatch(id, action, payload.clone())
                .map_err(runner_error)?;
        }
        ScenarioStep::Wait { ticks } => {
            info!(step, ticks, "Scenario: waiting");
            for _ in 0..*ticks {
                runner.tick().map_err(runner_error)?;
            }
        }
        ScenarioStep::AssertState { target, expected } => {
            let concept =
                runner
                    .concept_by_name(target)
                    .ok_or_else(|| ScenarioError::UnknownConcept {
                        step,
                        target: target.clone(),
                    })?;
            let current = concept.snapshot();
            for (key, value) in expected {
                let actual = current.get(key).cloned().unwrap_or(Payload::Null);
                if &actual != value {
                    return Err(ScenarioError::StateMismatch {
                        target: target.clone(),
                        key: key.clone(),
                        expected: value.clone(),
                        actual,
                    });
                }
            }
            info!(step, target = %target, "Scenario: assertion passed");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concept::Concept;
    use serde_json::json;

    const SCENARIO: &str = r#"
- type: dispatch
  target: Counter
  action: increment
  payload: { by: 5 }
- type: wait
- type: assert_state
  target: Counter
  expected: { value: 5 }
"#;

    fn runner() -> Runner {
        let mut runner = Runner::new();
        runner.register_concept(
            Concept::builder("Counter")
                .field("value", 0)
                .action("increment", |ctx, payload| {
                    let by = payload.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
                    let value = ctx.get::<i64>("value").unwrap_or(0) + by;
                    ctx.set("value", value)
                })
                .build(),
        );
        runner
    }

    #[test]
    fn test_parse_steps() {
        let scenario = Scenario::from_yaml(SCENARIO).unwrap();
        assert_eq!(scenario.steps.len(), 3);
        assert_eq!(scenario.steps[1], ScenarioStep::Wait { ticks: 1 });
    }

    #[test]
    fn test_play_passes() {
        let mut runner = runner();
        Scenario::from_yaml(SCENARIO).unwrap().play(&mut runner).unwrap();
        assert_eq!(runner.tick_count(), 2);
    }

    #[test]
    fn test_assertion_mismatch() {
        let scenario = Scenario::from_json(
            r#"[{"type": "assert_state", "target": "Counter", "expected_state": {"value": 1}}]"#,
        )
        .unwrap();
        let err = scenario.play(&mut runner()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "State mismatch for Counter. Expected value=1, got 0"
        );
    }

    #[test]
    fn test_unknown_target() {
        let scenario = Scenario::from_json(
            r#"[{"type": "dispatch", "target": "Ghost", "action": "boo"}]"#,
        )
        .unwrap();
        let err = scenario.play(&mut runner()).unwrap_err();
        assert!(matches!(err, ScenarioError::UnknownConcept { step: 1, .. }));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = Scenario::from_file("steps.toml").unwrap_err();
        assert!(matches!(err, ScenarioError::UnsupportedFormat(_)));
    }
}
