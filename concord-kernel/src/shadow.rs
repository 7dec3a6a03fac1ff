//! Shadow execution: run a candidate alongside the primary and diff states
//!
//! Both runners receive the same external actions. After every dispatch the
//! state of every concept is compared by name; disagreements are recorded
//! but never reconciled.

use crate::error::Result;
use crate::runner::Runner;
use concord_types::{Payload, State};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

/// One concept whose state differs between the primary and the shadow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StateDiff {
    /// Primary runner's tick count after the dispatch
    pub tick: u64,
    pub concept: String,
    /// `None` when the concept doesn't exist on that side
    pub primary: Option<State>,
    pub shadow: Option<State>,
}

pub struct ShadowRunner {
    primary: Runner,
    shadow: Runner,
    diffs: Vec<StateDiff>,
}

impl ShadowRunner {
    pub fn new(primary: Runner, shadow: Runner) -> Self {
        Self {
            primary,
            shadow,
            diffs: Vec::new(),
        }
    }

    pub fn primary(&self) -> &Runner {
        &self.primary
    }

    pub fn primary_mut(&mut self) -> &mut Runner {
        &mut self.primary
    }

    pub fn shadow(&self) -> &Runner {
        &self.shadow
    }

    pub fn shadow_mut(&mut self) -> &mut Runner {
        &mut self.shadow
    }

    /// Every diff recorded so far
    pub fn diffs(&self) -> &[StateDiff] {
        &self.diffs
    }

    /// Dispatch to both runners and return the diffs this dispatch produced
    ///
    /// A primary failure is returned before the shadow runs. A shadow
    /// failure is logged and the comparison still happens.
    pub fn dispatch(
        &mut self,
        concept: &str,
        action: &str,
        payload: Payload,
    ) -> Result<Vec<StateDiff>> {
        self.primary.dispatch_by_name(concept, action, payload.clone())?;
        if let Err(err) = self.shadow.dispatch_by_name(concept, action, payload) {
            warn!(concept, action, error = %err, "Shadow dispatch failed");
        }

        let diffs = self.compare();
        for diff in &diffs {
            warn!(concept = %diff.concept, tick = diff.tick, "Shadow state diverged");
        }
        self.diffs.extend(diffs.iter().cloned());
        Ok(diffs)
    }

    fn compare(&self) -> Vec<StateDiff> {
        let primary = self.primary.global_state();
        let shadow = self.shadow.global_state();
        let names: BTreeSet<&str> = primary
            .by_names()
            .chain(shadow.by_names())
            .map(|(name, _)| name)
            .collect();

        names
            .into_iter()
            .filter_map(|name| {
                let ours = primary.by_name(name);
                let theirs = shadow.by_name(name);
                (ours != theirs).then(|| StateDiff {
                    tick: self.primary.tick_count(),
                    concept: name.to_string(),
                    primary: ours.cloned(),
                    shadow: theirs.cloned(),
                })
            })
            .collect()
    }
}
