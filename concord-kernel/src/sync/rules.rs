//! Loading synchronizations from YAML rule files
//!
//! ```yaml
//! synchronizations:
//!   - name: LogIncrement
//!     when: { source: Counter, event: Incremented }
//!     where:
//!       gt: [ { event: value }, { literal: 0 } ]
//!     then:
//!       - target: Logger
//!         action: log
//!         payload: { msg: "Counter changed", val: event.value }
//! ```
//!
//! Concepts are referenced by name and bound when the rule fires, so a rule
//! file can be loaded before the concepts it mentions are registered.

use super::{ActionInvocation, EventPattern, Expr, FieldSource, PayloadMapper, Synchronization};
use concord_types::Payload;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors from reading a rule file
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Failed to read rule file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse rule file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// Top-level rule file document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub synchronizations: Vec<RuleSpec>,
}

/// One declared rule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default = "default_rule_name")]
    pub name: String,
    pub when: WhenSpec,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub condition: Option<Expr>,
    #[serde(default)]
    pub then: Vec<ThenSpec>,
}

fn default_rule_name() -> String {
    "UnnamedSync".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhenSpec {
    pub source: String,
    pub event: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThenSpec {
    pub target: String,
    pub action: String,
    /// Field values; strings of the form `event.<path>` copy from the
    /// triggering event
    #[serde(default)]
    pub payload: serde_json::Map<String, Payload>,
}

impl RuleSet {
    pub fn from_yaml(text: &str) -> Result<Self, RuleError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Build runtime synchronizations, in file order
    pub fn into_synchronizations(self) -> Vec<Synchronization> {
        self.synchronizations
            .into_iter()
            .map(RuleSpec::into_synchronization)
            .collect()
    }
}

impl RuleSpec {
    pub fn into_synchronization(self) -> Synchronization {
        let mut sync = Synchronization::new(
            self.name,
            EventPattern::new(self.when.source, self.when.event),
        );
        if let Some(expr) = self.condition {
            sync = sync.with_condition(expr);
        }
        for then in self.then {
            let fields = then
                .payload
                .into_iter()
                .map(|(key, value)| (key, FieldSource::parse(value)))
                .collect();
            sync = sync.invoke(ActionInvocation::new(
                then.target,
                then.action,
                PayloadMapper::Fields(fields),
            ));
        }
        sync
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::ConceptRef;
    use concord_types::{ConceptId, Event, GlobalState};
    use serde_json::json;

    const RULES: &str = r#"
synchronizations:
  - name: LogIncrement
    when: { source: Counter, event: Incremented }
    where:
      gt: [ { event: value }, { literal: 0 } ]
    then:
      - target: Logger
        action: log
        payload: { msg: "Counter changed", val: event.value }
  - when: { source: Logger, event: Logged }
"#;

    #[test]
    fn test_parse_rule_file() {
        let rules = RuleSet::from_yaml(RULES).unwrap();
        assert_eq!(rules.synchronizations.len(), 2);
        assert_eq!(rules.synchronizations[0].name, "LogIncrement");
        assert!(rules.synchronizations[0].condition.is_some());
        assert_eq!(rules.synchronizations[1].name, "UnnamedSync");
        assert!(rules.synchronizations[1].then.is_empty());
    }

    #[test]
    fn test_rules_become_name_bound_synchronizations() {
        let syncs = RuleSet::from_yaml(RULES).unwrap().into_synchronizations();
        let sync = &syncs[0];
        assert_eq!(sync.pattern().source, ConceptRef::Name("Counter".into()));

        let counter = ConceptId::new();
        let mut state = GlobalState::new();
        state.insert(counter, "Counter", Default::default());

        let event = Event::new("Incremented", json!({"value": 2}), counter);
        assert!(sync.evaluate(&event, &state));
        let zero = Event::new("Incremented", json!({"value": 0}), counter);
        assert!(!sync.evaluate(&zero, &state));

        let invocation = &sync.execute(&event)[0];
        assert_eq!(invocation.target, ConceptRef::Name("Logger".into()));
        assert_eq!(
            invocation.payload_for(&event),
            json!({"msg": "Counter changed", "val": 2})
        );
    }

    #[test]
    fn test_missing_file() {
        let err = RuleSet::from_file("/nonexistent/rules.yml").unwrap_err();
        assert!(matches!(err, RuleError::Read(_)));
    }

    #[test]
    fn test_malformed_yaml() {
        let err = RuleSet::from_yaml("synchronizations: [ { when: 3 } ]").unwrap_err();
        assert!(matches!(err, RuleError::Parse(_)));
    }
}
