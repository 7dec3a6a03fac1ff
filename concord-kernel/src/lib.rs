//! Concord Kernel - Reactive dispatch for independently owned state machines
//!
//! This crate provides the orchestration core of concord. It includes:
//!
//! - **Concepts**: state machines exposing named actions and emitting events
//! - **Synchronizations**: declarative `when / where / then` rules, built in
//!   code or loaded from YAML rule files
//! - **Invariants**: properties checked against the global state after every tick
//! - **Runner**: breadth-first event propagation with a depth cap, snapshot
//!   history and replay
//! - **Causal log**: the record of every action and event, plus the command
//!   bus an external actor uses to drive a run
//! - **Shadow runner** and **scenario player** for comparing and scripting runs
//!
//! ## Architecture
//!
//! Concepts never call each other. An action mutates its own concept's state
//! and emits events; the runner matches events against synchronizations and
//! dispatches the resulting actions, stamping every new event with the id of
//! the action that produced it. Every event therefore traces back to one
//! externally dispatched action.
//!
//! ## Example
//!
//! ```rust
//! use concord_kernel::{
//!     ActionInvocation, Concept, EventPattern, PayloadMapper, Runner, RunnerConfig,
//!     Synchronization,
//! };
//! use serde_json::json;
//!
//! let mut runner = Runner::with_config(RunnerConfig { max_depth: 2, ..Default::default() });
//! let counter = runner.register_concept(
//!     Concept::builder("Counter")
//!         .field("value", 0)
//!         .action("increment", |ctx, payload| {
//!             let by = payload["by"].as_i64().unwrap_or(1);
//!             let value = ctx.get::<i64>("value").unwrap_or(0) + by;
//!             ctx.set("value", value)?;
//!             ctx.emit("Incremented", json!({ "value": value }))?;
//!             Ok(())
//!         })
//!         .build(),
//! );
//! runner
//!     .register(
//!         Synchronization::new("Loop", EventPattern::new("Counter", "Incremented"))
//!             .invoke(ActionInvocation::new(
//!                 "Counter",
//!                 "increment",
//!                 PayloadMapper::empty().literal("by", 1),
//!             )),
//!     )
//!     .unwrap();
//!
//! runner.dispatch(counter, "increment", json!({ "by": 5 })).unwrap();
//! assert_eq!(runner.global_state().lookup("Counter.value"), Some(&json!(7)));
//! ```

pub mod concept;
pub mod config;
pub mod error;
pub mod invariant;
pub mod log;
pub mod runner;
pub mod scenario;
pub mod shadow;
pub mod sync;

pub use concept::{Concept, ConceptBuilder, ConceptContext};
pub use config::{Config, ConfigError, ControlConfig, JournalConfig, RunnerConfig};
pub use error::{ConceptError, Result, RunnerError};
pub use invariant::Invariant;
pub use log::{
    causal_chain, CausalLog, ChainError, ChainLink, ConceptRecord, LogError, MemoryLog,
    PublishedState, SyncRecord,
};
pub use runner::{
    ControlOptions, ControlReport, Diagnostic, DiagnosticKind, Registration, Runner, Severity,
    StopHandle,
};
pub use scenario::{Scenario, ScenarioError, ScenarioStep};
pub use shadow::{ShadowRunner, StateDiff};
pub use sync::{
    ActionInvocation, ConceptRef, Condition, EventPattern, Expr, FieldSource, PayloadMapper,
    RuleError, RuleSet, RuleSpec, Synchronization,
};

pub use concord_types as types;
