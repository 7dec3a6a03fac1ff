//! The runner: registry, propagation, history and replay
//!
//! A tick starts with one action (external dispatch) or none ([`Runner::tick`])
//! and propagates the resulting events breadth-first:
//!
//! 1. Pending events from every concept are drained into the queue.
//! 2. The queue is taken as a batch; each event is recorded, matched
//!    against every synchronization using a fresh snapshot, and each
//!    matching invocation is dispatched. New events go to the next batch.
//! 3. Batches repeat until the queue is empty or `max_depth` rounds have
//!    run, at which point the remaining events are dropped.
//! 4. The tick counter advances, a snapshot is appended to the history,
//!    the causal log is saved and invariants are checked.

pub mod control;
pub mod diagnostics;
pub mod registry;

pub use control::{ControlOptions, ControlReport, StopHandle};
pub use diagnostics::{Diagnostic, DiagnosticKind, Severity};
pub use registry::ConceptArena;

use crate::concept::Concept;
use crate::config::RunnerConfig;
use crate::error::{Result, RunnerError};
use crate::invariant::Invariant;
use crate::log::{CausalLog, LogError};
use crate::sync::{ActionInvocation, Synchronization};
use concord_types::{ActionRecord, ConceptId, Event, GlobalState, Payload, SyncId};
use tracing::{debug, error, info, warn};

/// Anything that can be registered with a runner
pub enum Registration {
    Concept(Concept),
    Synchronization(Synchronization),
    Invariant(Invariant),
}

impl From<Concept> for Registration {
    fn from(concept: Concept) -> Self {
        Registration::Concept(concept)
    }
}

impl From<Synchronization> for Registration {
    fn from(sync: Synchronization) -> Self {
        Registration::Synchronization(sync)
    }
}

impl From<Invariant> for Registration {
    fn from(invariant: Invariant) -> Self {
        Registration::Invariant(invariant)
    }
}

/// Single-threaded event propagation engine
pub struct Runner {
    config: RunnerConfig,
    concepts: ConceptArena,
    syncs: Vec<Synchronization>,
    invariants: Vec<Invariant>,
    queue: Vec<Event>,
    history: Vec<GlobalState>,
    tick_count: u64,
    log: Option<Box<dyn CausalLog>>,
    diagnostics: Vec<Diagnostic>,
    halted: Option<String>,
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self::with_config(RunnerConfig::default())
    }

    pub fn with_config(config: RunnerConfig) -> Self {
        Self {
            config,
            concepts: ConceptArena::new(),
            syncs: Vec::new(),
            invariants: Vec::new(),
            queue: Vec::new(),
            history: Vec::new(),
            tick_count: 0,
            log: None,
            diagnostics: Vec::new(),
            halted: None,
        }
    }

    /// Attach a causal log. Pass an `Arc` to keep a handle for inspection.
    pub fn with_log(mut self, log: impl CausalLog + 'static) -> Self {
        self.log = Some(Box::new(log));
        self
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn log(&self) -> Option<&dyn CausalLog> {
        self.log.as_deref()
    }

    // ---------------------------------------------------------------------
    // Registration
    // ---------------------------------------------------------------------

    /// Register a concept, synchronization or invariant
    pub fn register(&mut self, entity: impl Into<Registration>) -> Result<()> {
        match entity.into() {
            Registration::Concept(concept) => {
                self.register_concept(concept);
            }
            Registration::Synchronization(sync) => {
                self.register_synchronization(sync)?;
            }
            Registration::Invariant(invariant) => self.register_invariant(invariant),
        }
        Ok(())
    }

    pub fn register_concept(&mut self, concept: Concept) -> ConceptId {
        let name = concept.name().to_string();
        let state = concept.snapshot();
        let id = self.concepts.insert(concept);
        debug!(concept = %name, id = %id.short(), "Registered concept");
        self.write_log("record_concept", |log| log.record_concept(id, &name, &state));
        id
    }

    /// Register a synchronization
    ///
    /// With `strict_rules`, every concept it mentions must already be
    /// registered; otherwise references are bound when the rule fires.
    pub fn register_synchronization(&mut self, sync: Synchronization) -> Result<SyncId> {
        if self.config.strict_rules {
            if let Some(target) = sync
                .references()
                .find(|r| self.concepts.resolve(r).is_none())
            {
                return Err(RunnerError::UnresolvedReference {
                    sync: sync.name().to_string(),
                    target: target.to_string(),
                });
            }
        }
        let id = sync.id();
        let name = sync.name().to_string();
        debug!(sync = %name, "Registered synchronization");
        self.write_log("record_synchronization", |log| {
            log.record_synchronization(id, &name)
        });
        self.syncs.push(sync);
        Ok(id)
    }

    pub fn register_invariant(&mut self, invariant: Invariant) {
        debug!(invariant = invariant.name(), "Registered invariant");
        self.invariants.push(invariant);
    }

    /// Remove every synchronization, e.g. before loading a new rule set
    pub fn clear_synchronizations(&mut self) {
        info!("Cleared {} synchronization(s)", self.syncs.len());
        self.syncs.clear();
    }

    /// `(sync name, reference)` for every rule mentioning an unknown concept
    pub fn unresolved_references(&self) -> Vec<(String, String)> {
        self.syncs
            .iter()
            .flat_map(|sync| {
                sync.references()
                    .filter(|r| self.concepts.resolve(r).is_none())
                    .map(move |r| (sync.name().to_string(), r.to_string()))
            })
            .collect()
    }

    // ---------------------------------------------------------------------
    // Driving
    // ---------------------------------------------------------------------

    /// Record the genesis snapshot as `history[0]`
    ///
    /// Called implicitly by the first dispatch or tick; calling it again
    /// has no effect.
    pub fn start(&mut self) {
        if self.history.is_empty() {
            self.history.push(self.concepts.snapshot());
            info!(concepts = self.concepts.len(), "Runner started");
        }
    }

    /// Dispatch an action from outside the kernel and propagate its effects
    ///
    /// Errors from the action itself are returned; nothing is propagated and
    /// no tick is recorded in that case.
    pub fn dispatch(&mut self, concept: ConceptId, action: &str, payload: Payload) -> Result<()> {
        self.ensure_running()?;
        self.start();

        let name = self
            .concepts
            .get(concept)
            .map(|c| c.name().to_string())
            .ok_or_else(|| RunnerError::UnknownConcept(concept.to_string()))?;
        let record = ActionRecord::root(action, concept);
        info!(concept = %name, action, "Dispatching external action");
        self.write_log("record_action", |log| log.record_action(&record));

        let target = self
            .concepts
            .get_mut(concept)
            .ok_or_else(|| RunnerError::UnknownConcept(concept.to_string()))?;
        if let Err(err) = target.dispatch(action, payload) {
            // Events emitted before the failure are discarded; state changes stay
            target.collect_events();
            warn!(concept = %name, action, error = %err, "External action failed");
            return Err(err.into());
        }
        let emitted = target.collect_events();
        self.queue
            .extend(emitted.into_iter().map(|event| event.caused_by(record.id)));

        self.propagate();
        self.finish_tick()
    }

    /// [`dispatch`](Self::dispatch) to a concept looked up by name
    pub fn dispatch_by_name(
        &mut self,
        concept: &str,
        action: &str,
        payload: Payload,
    ) -> Result<()> {
        let id = self
            .concepts
            .id_by_name(concept)
            .ok_or_else(|| RunnerError::UnknownConcept(concept.to_string()))?;
        self.dispatch(id, action, payload)
    }

    /// Run one propagation round with no external action
    ///
    /// Delivers events that concepts emitted out of band since the last tick.
    pub fn tick(&mut self) -> Result<()> {
        self.ensure_running()?;
        self.start();
        self.propagate();
        self.finish_tick()
    }

    /// Restore every concept to `history[tick]` and truncate the history
    /// after it
    pub fn replay(&mut self, tick: u64) -> Result<()> {
        self.start();
        let latest = self.history.len() as u64 - 1;
        let Some(target) = usize::try_from(tick)
            .ok()
            .and_then(|index| self.history.get(index))
            .cloned()
        else {
            return Err(RunnerError::InvalidTick {
                requested: tick,
                latest,
            });
        };

        for (id, snapshot) in target.iter() {
            if let Some(concept) = self.concepts.get_mut(*id) {
                concept.restore(&snapshot.state);
            }
        }
        for concept in self.concepts.iter_mut() {
            concept.collect_events();
        }
        self.history.truncate(tick as usize + 1);
        self.tick_count = tick;
        self.queue.clear();
        if let Some(invariant) = self.halted.take() {
            info!(invariant = %invariant, "Cleared halt");
        }
        info!(tick, "Replayed to tick {}", tick);
        Ok(())
    }

    fn ensure_running(&self) -> Result<()> {
        match &self.halted {
            Some(invariant) => Err(RunnerError::Halted(invariant.clone())),
            None => Ok(()),
        }
    }

    // ---------------------------------------------------------------------
    // Propagation
    // ---------------------------------------------------------------------

    fn propagate(&mut self) {
        for concept in self.concepts.iter_mut() {
            self.queue.extend(concept.collect_events());
        }

        let mut depth = 0;
        while !self.queue.is_empty() {
            if depth >= self.config.max_depth {
                let dropped = self.queue.len();
                warn!(
                    depth,
                    dropped, "Max propagation depth reached; dropping queued events"
                );
                self.queue.clear();
                self.push_diagnostic(DiagnosticKind::DepthCapExceeded { depth, dropped });
                break;
            }

            let batch = std::mem::take(&mut self.queue);
            debug!(depth, events = batch.len(), "Propagation round");
            for event in batch {
                self.handle_event(event);
            }
            depth += 1;
        }
    }

    fn handle_event(&mut self, event: Event) {
        debug!(event = %event, "Processing event");
        self.write_log("record_event", |log| log.record_event(&event));

        let global = self.concepts.snapshot();
        let matched: Vec<(String, Vec<ActionInvocation>)> = self
            .syncs
            .iter()
            .filter(|sync| sync.evaluate(&event, &global))
            .map(|sync| (sync.name().to_string(), sync.execute(&event).to_vec()))
            .collect();

        for (sync, invocations) in matched {
            debug!(sync = %sync, event = event.name(), "Synchronization matched");
            for invocation in invocations {
                self.invoke(&sync, &invocation, &event);
            }
        }
    }

    fn invoke(&mut self, sync: &str, invocation: &ActionInvocation, event: &Event) {
        let Some(target) = self.concepts.resolve(&invocation.target) else {
            warn!(
                sync,
                target = %invocation.target,
                action = %invocation.action,
                "Synchronization targets unknown concept; skipping"
            );
            self.push_diagnostic(DiagnosticKind::UnresolvedTarget {
                sync: sync.to_string(),
                target: invocation.target.to_string(),
                action: invocation.action.clone(),
            });
            return;
        };

        let payload = invocation.payload_for(event);
        let record = ActionRecord::triggered(&invocation.action, target, event.id(), sync);
        debug!(sync, action = %invocation.action, id = %record.id.short(), "Invoking action");
        self.write_log("record_action", |log| log.record_action(&record));

        let Some(concept) = self.concepts.get_mut(target) else {
            return;
        };
        match concept.dispatch(&invocation.action, payload) {
            Ok(()) => {
                let emitted = concept.collect_events();
                self.queue
                    .extend(emitted.into_iter().map(|e| e.caused_by(record.id)));
            }
            Err(err) => {
                concept.collect_events();
                warn!(
                    sync,
                    concept = concept.name(),
                    action = %invocation.action,
                    error = %err,
                    "Action failed; emitting failure event"
                );
                self.queue.push(Event::failure(event, target, err.to_string()));
            }
        }
    }

    fn finish_tick(&mut self) -> Result<()> {
        self.tick_count += 1;
        let snapshot = self.concepts.snapshot();
        let violation = self
            .invariants
            .iter()
            .find(|invariant| !invariant.check(&snapshot))
            .map(|invariant| {
                (
                    invariant.name().to_string(),
                    invariant.description().map(String::from),
                )
            });
        self.history.push(snapshot);
        self.write_log("save", |log| log.save());
        info!(tick = self.tick_count, "Tick complete");

        if let Some((name, description)) = violation {
            error!(invariant = %name, tick = self.tick_count, "Invariant violated; halting");
            self.halted = Some(name.clone());
            return Err(RunnerError::InvariantViolated { name, description });
        }
        Ok(())
    }

    /// Run a log write, reporting (never propagating) its failure
    fn write_log(
        &mut self,
        operation: &str,
        write: impl FnOnce(&dyn CausalLog) -> std::result::Result<(), LogError>,
    ) {
        let Some(log) = self.log.as_deref() else {
            return;
        };
        if let Err(err) = write(log) {
            error!(operation, error = %err, "Causal log write failed");
            self.push_diagnostic(DiagnosticKind::LogWriteFailed {
                operation: operation.to_string(),
                message: err.to_string(),
            });
        }
    }

    /// Record a diagnostic, dropping the oldest beyond `max_diagnostics`
    pub(crate) fn push_diagnostic(&mut self, kind: DiagnosticKind) {
        let cap = self.config.max_diagnostics;
        if cap == 0 {
            return;
        }
        if self.diagnostics.len() >= cap {
            let excess = self.diagnostics.len() + 1 - cap;
            self.diagnostics.drain(..excess);
        }
        self.diagnostics.push(Diagnostic::new(self.tick_count, kind));
    }

    // ---------------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------------

    pub fn concept(&self, id: ConceptId) -> Option<&Concept> {
        self.concepts.get(id)
    }

    /// Mutable access, e.g. to emit out-of-band events before a [`tick`](Self::tick)
    pub fn concept_mut(&mut self, id: ConceptId) -> Option<&mut Concept> {
        self.concepts.get_mut(id)
    }

    pub fn concept_by_name(&self, name: &str) -> Option<&Concept> {
        self.concepts.id_by_name(name).and_then(|id| self.concepts.get(id))
    }

    pub fn concept_id(&self, name: &str) -> Option<ConceptId> {
        self.concepts.id_by_name(name)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.iter()
    }

    pub fn synchronizations(&self) -> &[Synchronization] {
        &self.syncs
    }

    /// Deep copy of every concept's current state
    pub fn global_state(&self) -> GlobalState {
        self.concepts.snapshot()
    }

    /// `history[i]` is the state at the end of tick `i`
    pub fn history(&self) -> &[GlobalState] {
        &self.history
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    /// Name of the invariant that halted the run, if any
    pub fn halted(&self) -> Option<&str> {
        self.halted.as_deref()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConceptError;
    use crate::log::MemoryLog;
    use crate::sync::{EventPattern, PayloadMapper};
    use concord_types::CausalRef;
    use serde_json::json;
    use std::sync::Arc;

    fn counter() -> Concept {
        Concept::builder("Counter")
            .field("value", 0)
            .action("increment", |ctx, payload| {
                let by = payload.get("by").and_then(|v| v.as_i64()).unwrap_or(1);
                let value = ctx.get::<i64>("value").unwrap_or(0) + by;
                ctx.set("value", value)?;
                ctx.emit("Incremented", json!({ "value": value }))?;
                Ok(())
            })
            .action("fail", |ctx, _| {
                ctx.emit("Partial", json!({}))?;
                Err(ConceptError::failed("refused"))
            })
            .build()
    }

    fn value(runner: &Runner) -> i64 {
        runner
            .global_state()
            .lookup("Counter.value")
            .and_then(|v| v.as_i64())
            .unwrap()
    }

    #[test]
    fn test_dispatch_records_root_action_and_event() {
        let log = Arc::new(MemoryLog::new());
        let mut runner = Runner::new().with_log(log.clone());
        let id = runner.register_concept(counter());

        runner.dispatch(id, "increment", json!({"by": 2})).unwrap();

        assert_eq!(value(&runner), 2);
        assert_eq!(runner.tick_count(), 1);
        assert_eq!(runner.history().len(), 2);

        let actions = log.actions();
        assert_eq!(actions.len(), 1);
        assert!(actions[0].is_root());
        let events = log.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].causal_parent(), Some(CausalRef::Action(actions[0].id)));
        assert_eq!(log.concepts().len(), 1);
        assert_eq!(log.save_count(), 1);
    }

    #[test]
    fn test_failed_external_action_is_returned() {
        let mut runner = Runner::new();
        let id = runner.register_concept(counter());

        let err = runner.dispatch(id, "fail", json!({})).unwrap_err();
        assert_eq!(err.to_string(), "refused");
        assert_eq!(runner.tick_count(), 0);
        assert!(!runner.concept(id).unwrap().has_pending_events());

        let err = runner.dispatch_by_name("Nobody", "increment", json!({})).unwrap_err();
        assert!(matches!(err, RunnerError::UnknownConcept(_)));
    }

    #[test]
    fn test_unresolved_target_is_skipped_with_diagnostic() {
        let mut runner = Runner::new();
        let id = runner.register_concept(counter());
        runner
            .register(
                Synchronization::new("ToGhost", EventPattern::new(id, "Incremented"))
                    .invoke(ActionInvocation::new("Ghost", "boo", PayloadMapper::empty())),
            )
            .unwrap();
        assert_eq!(
            runner.unresolved_references(),
            vec![("ToGhost".to_string(), "Ghost".to_string())]
        );

        runner.dispatch(id, "increment", json!({})).unwrap();
        let diagnostics = runner.take_diagnostics();
        assert_eq!(diagnostics.len(), 1);
        assert!(matches!(
            &diagnostics[0].kind,
            DiagnosticKind::UnresolvedTarget { target, .. } if target == "Ghost"
        ));
        assert!(runner.diagnostics().is_empty());
    }

    #[test]
    fn test_strict_rules_reject_unknown_references() {
        let mut runner = Runner::with_config(RunnerConfig {
            strict_rules: true,
            ..RunnerConfig::default()
        });
        runner.register_concept(counter());
        let err = runner
            .register_synchronization(
                Synchronization::new("Loose", EventPattern::new("Counter", "Incremented"))
                    .invoke(ActionInvocation::new("Ghost", "boo", PayloadMapper::empty())),
            )
            .unwrap_err();
        assert!(matches!(err, RunnerError::UnresolvedReference { ref target, .. } if target == "Ghost"));
        assert!(runner.synchronizations().is_empty());
    }

    #[test]
    fn test_invariant_violation_halts_until_replay() {
        let mut runner = Runner::new();
        let id = runner.register_concept(counter());
        runner
            .register(
                Invariant::new("small", |s| {
                    s.lookup("Counter.value").and_then(|v| v.as_i64()).unwrap_or(0) < 3
                })
                .with_description("Counter.value < 3"),
            )
            .unwrap();

        runner.dispatch(id, "increment", json!({"by": 1})).unwrap();
        let err = runner.dispatch(id, "increment", json!({"by": 5})).unwrap_err();
        assert_eq!(err.to_string(), "Invariant Violation: small (Counter.value < 3)");
        assert_eq!(runner.halted(), Some("small"));
        assert!(matches!(
            runner.dispatch(id, "increment", json!({})),
            Err(RunnerError::Halted(_))
        ));

        runner.replay(1).unwrap();
        assert_eq!(runner.halted(), None);
        assert_eq!(value(&runner), 1);
        runner.dispatch(id, "increment", json!({"by": 1})).unwrap();
    }

    #[test]
    fn test_replay_out_of_range() {
        let mut runner = Runner::new();
        runner.register_concept(counter());
        let err = runner.replay(3).unwrap_err();
        assert!(matches!(err, RunnerError::InvalidTick { requested: 3, latest: 0 }));
    }

    #[test]
    fn test_tick_delivers_out_of_band_events() {
        let mut runner = Runner::new();
        let id = runner.register_concept(counter());
        let logger = runner.register_concept(
            Concept::builder("Logger")
                .field("count", 0)
                .action("log", |ctx, _| {
                    let count = ctx.get::<i64>("count").unwrap_or(0) + 1;
                    ctx.set("count", count)
                })
                .build(),
        );
        runner
            .register(
                Synchronization::new("Log", EventPattern::new("Counter", "Poked"))
                    .invoke(ActionInvocation::new(logger, "log", PayloadMapper::empty())),
            )
            .unwrap();

        runner
            .concept_mut(id)
            .unwrap()
            .emit("Poked", json!({}), None)
            .unwrap();
        runner.tick().unwrap();

        assert_eq!(runner.global_state().lookup("Logger.count"), Some(&json!(1)));
        assert_eq!(runner.tick_count(), 1);
    }

    #[test]
    fn test_diagnostics_keep_only_the_newest() {
        let mut runner = Runner::with_config(RunnerConfig {
            max_depth: 1,
            max_diagnostics: 2,
            ..RunnerConfig::default()
        });
        let id = runner.register_concept(counter());
        runner
            .register(
                Synchronization::new("Loop", EventPattern::new("Counter", "Incremented")).invoke(
                    ActionInvocation::new("Counter", "increment", PayloadMapper::empty()),
                ),
            )
            .unwrap();

        for _ in 0..3 {
            runner.dispatch(id, "increment", json!({})).unwrap();
        }

        let ticks: Vec<u64> = runner.diagnostics().iter().map(|d| d.tick).collect();
        assert_eq!(ticks, vec![1, 2]);
        assert!(runner.diagnostics().iter().all(Diagnostic::is_depth_cap));
    }

    #[test]
    fn test_log_failures_never_stop_the_runner() {
        let log = Arc::new(MemoryLog::new());
        log.fail_saves(true);
        let mut runner = Runner::new().with_log(log.clone());
        let id = runner.register_concept(counter());

        runner.dispatch(id, "increment", json!({})).unwrap();
        assert_eq!(value(&runner), 1);
        assert!(runner.diagnostics().iter().any(|d| matches!(
            &d.kind,
            DiagnosticKind::LogWriteFailed { operation, .. } if operation == "save"
        )));
    }
}
