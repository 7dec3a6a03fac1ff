//! Property tests for snapshots, replay and causal chains

use concord_kernel::{
    causal_chain, ActionInvocation, ChainLink, Concept, EventPattern, MemoryLog, PayloadMapper,
    Runner, RunnerConfig, Synchronization,
};
use proptest::prelude::*;
use serde_json::json;
use std::sync::Arc;

fn accumulator() -> Concept {
    Concept::builder("Acc")
        .field("total", 0)
        .field("history", json!([]))
        .action("add", |ctx, payload| {
            let n = payload["n"].as_i64().unwrap_or(0);
            let total = ctx.get::<i64>("total").unwrap_or(0) + n;
            let mut history = ctx.get::<Vec<i64>>("history").unwrap_or_default();
            history.push(n);
            ctx.set("total", total)?;
            ctx.set("history", history)?;
            ctx.emit("Added", json!({ "n": n }))?;
            Ok(())
        })
        .build()
}

proptest! {
    #[test]
    fn snapshot_restore_round_trips(values in prop::collection::vec(-1000i64..1000, 0..20)) {
        let mut concept = accumulator();
        let mut snapshots = Vec::new();
        for n in &values {
            snapshots.push(concept.snapshot());
            concept.dispatch("add", json!({ "n": n })).unwrap();
        }
        let last = concept.snapshot();

        for snapshot in &snapshots {
            concept.restore(snapshot);
            prop_assert_eq!(&concept.snapshot(), snapshot);
        }
        concept.restore(&last);
        prop_assert_eq!(concept.snapshot(), last);
    }

    #[test]
    fn replay_then_redispatch_is_deterministic(
        values in prop::collection::vec(-50i64..50, 1..10),
        pick in any::<prop::sample::Index>(),
    ) {
        let mut runner = Runner::new();
        let id = runner.register_concept(accumulator());
        for n in &values {
            runner.dispatch(id, "add", json!({ "n": n })).unwrap();
        }
        let original = runner.history().to_vec();

        let tick = pick.index(values.len());
        runner.replay(tick as u64).unwrap();
        prop_assert_eq!(runner.global_state(), original[tick].clone());

        for n in &values[tick..] {
            runner.dispatch(id, "add", json!({ "n": n })).unwrap();
        }
        prop_assert_eq!(runner.history(), &original[..]);
    }

    #[test]
    fn causal_chains_are_bounded_and_rooted(depth in 1usize..6, start in 0i64..10) {
        let log = Arc::new(MemoryLog::new());
        let mut runner = Runner::with_config(RunnerConfig { max_depth: depth, ..RunnerConfig::default() })
            .with_log(log.clone());
        let id = runner.register_concept(accumulator());
        runner.register(
            Synchronization::new("Again", EventPattern::new("Acc", "Added"))
                .invoke(ActionInvocation::new("Acc", "add", PayloadMapper::empty().from_event("n", "n"))),
        ).unwrap();

        runner.dispatch(id, "add", json!({ "n": start })).unwrap();

        let events = log.events();
        let actions = log.actions();
        prop_assert_eq!(events.len(), depth);
        for event in &events {
            let chain = causal_chain(&events, &actions, event.id()).unwrap();
            prop_assert!(chain.len() <= 2 * depth);
            let rooted = matches!(chain.last(), Some(ChainLink::Action(a)) if a.is_root());
            prop_assert!(rooted);
        }
    }
}
