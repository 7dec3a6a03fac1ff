//! External control: publish state, execute commands from the bus
//!
//! An outside actor (a script, the `concord` CLI, an agent) drives the
//! runner through its causal log: it reads the published concept states
//! and enqueues commands, and the control loop executes those commands one
//! dispatch at a time.

use super::{DiagnosticKind, Runner};
use crate::config::ControlConfig;
use crate::error::{Result, RunnerError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Cloneable flag that ends a control loop after the current tick
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct ControlOptions {
    pub max_ticks: u64,
    pub poll_interval: Duration,
    pub stop: StopHandle,
}

impl Default for ControlOptions {
    fn default() -> Self {
        Self::from(&ControlConfig::default())
    }
}

impl From<&ControlConfig> for ControlOptions {
    fn from(config: &ControlConfig) -> Self {
        Self {
            max_ticks: config.max_ticks,
            poll_interval: config.poll_interval(),
            stop: StopHandle::new(),
        }
    }
}

/// Totals for one control loop run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlReport {
    pub ticks: u64,
    pub executed: usize,
    pub failed: usize,
}

impl Runner {
    /// Publish every concept's current state to the log
    pub fn publish_all_states(&mut self) {
        let states: Vec<_> = self
            .concepts
            .iter()
            .map(|concept| (concept.name().to_string(), concept.snapshot()))
            .collect();
        for (name, state) in &states {
            self.write_log("publish_state", |log| log.publish_state(name, state));
        }
        self.write_log("flush_published", |log| log.flush_published());
    }

    /// Execute every pending command, oldest first
    ///
    /// Returns `(executed, failed)`. A failing command is marked `error` and
    /// the rest still run; an invariant violation marks the command and
    /// ends the batch with the error.
    pub fn poll_and_execute_commands(&mut self) -> Result<(usize, usize)> {
        let pending = match self.log.as_deref().map(|log| log.pending_commands()) {
            None => return Ok((0, 0)),
            Some(Ok(pending)) => pending,
            Some(Err(err)) => {
                warn!(error = %err, "Failed to read command bus");
                self.push_diagnostic(DiagnosticKind::LogWriteFailed {
                    operation: "pending_commands".into(),
                    message: err.to_string(),
                });
                return Ok((0, 0));
            }
        };

        let (mut executed, mut failed) = (0, 0);
        for command in pending {
            info!(
                command = %command.id.short(),
                target = %command.target,
                action = %command.action,
                "Executing command"
            );
            let outcome =
                self.dispatch_by_name(&command.target, &command.action, command.payload.clone());
            let id = command.id;
            match outcome {
                Ok(()) => {
                    executed += 1;
                    self.write_log("mark_command_done", |log| log.mark_command_done(id, None));
                }
                Err(err @ RunnerError::InvariantViolated { .. }) => {
                    let message = err.to_string();
                    self.write_log("mark_command_done", |log| {
                        log.mark_command_done(id, Some(message))
                    });
                    return Err(err);
                }
                Err(err) => {
                    failed += 1;
                    warn!(command = %id.short(), error = %err, "Command failed");
                    let message = err.to_string();
                    self.write_log("mark_command_done", |log| {
                        log.mark_command_done(id, Some(message))
                    });
                }
            }
        }
        Ok((executed, failed))
    }

    /// Let an outside actor drive the run through the command bus
    ///
    /// Each tick publishes all states, executes pending commands and calls
    /// `hook` with the loop tick. Sleeps for the poll interval when no
    /// command was found. Stops after `max_ticks` or when the stop handle
    /// fires.
    pub fn run_with_external_control(
        &mut self,
        options: &ControlOptions,
        mut hook: Option<&mut dyn FnMut(&mut Runner, u64)>,
    ) -> Result<ControlReport> {
        let mut report = ControlReport::default();
        self.start();
        info!(max_ticks = options.max_ticks, "Starting external control loop");

        while report.ticks < options.max_ticks && !options.stop.is_stopped() {
            self.publish_all_states();
            let (executed, failed) = self.poll_and_execute_commands()?;
            report.executed += executed;
            report.failed += failed;

            if let Some(hook) = hook.as_deref_mut() {
                hook(self, report.ticks);
            }
            report.ticks += 1;

            if executed + failed == 0 && !options.poll_interval.is_zero() {
                std::thread::sleep(options.poll_interval);
            }
        }

        self.publish_all_states();
        info!(
            ticks = report.ticks,
            executed = report.executed,
            failed = report.failed,
            "External control loop finished"
        );
        Ok(report)
    }
}
