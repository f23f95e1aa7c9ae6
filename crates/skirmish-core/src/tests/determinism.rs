//! Determinism tests.
//!
//! A session's outcomes depend only on the engine seed, the session id, the
//! clock and the submitted actions.

use super::helpers::*;
use crate::action::{ActionRequest, ActionResult};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::participant::ParticipantId;
use crate::rng::SeededRandom;
use crate::session::SessionStatus;

/// Runs a 2v2 brawl where everyone attacks the lowest-id enemy still standing.
fn run_brawl(seed: u64) -> (Vec<String>, Vec<f32>) {
    let config = EngineConfig {
        seed,
        ..EngineConfig::default()
    };
    let rig = rig(config);
    let session = start_session(
        &rig,
        vec![fighter(1, 1), fighter(2, 1), fighter(3, 2), fighter(4, 2)],
    );

    let mut results = Vec::new();
    for _ in 0..40 {
        let snapshot = rig.engine.snapshot(session).unwrap();
        if snapshot.status() != SessionStatus::Active {
            break;
        }
        let Some(actor) = snapshot
            .eligible_actors()
            .into_iter()
            .find(|id| !snapshot.has_acted(*id))
        else {
            break;
        };
        let team = snapshot.participant(actor).unwrap().team;
        let Some(target) = snapshot
            .participants()
            .find(|p| p.in_play() && p.team != team)
            .map(|p| p.id)
        else {
            break;
        };

        rig.clock.advance(1_500);
        let request = ActionRequest::attack(actor, target).at(rig.clock.now_ms());
        let result: ActionResult = rig.engine.submit(session, &request).unwrap();
        results.push(serde_json::to_string(&result).unwrap());
    }

    let snapshot = rig.engine.snapshot(session).unwrap();
    let health = snapshot.participants().map(|p| p.stats.health).collect();
    (results, health)
}

#[test]
fn same_seed_same_battle() {
    let (a_results, a_health) = run_brawl(42);
    let (b_results, b_health) = run_brawl(42);
    assert!(!a_results.is_empty());
    assert_eq!(a_results, b_results);
    assert_eq!(a_health, b_health);
}

#[test]
fn different_seeds_diverge() {
    let (a, _) = run_brawl(1);
    let (b, _) = run_brawl(2);
    assert_ne!(a, b);
}

#[test]
fn wait_and_defend_are_reproducible() {
    for request in [
        ActionRequest::wait(ParticipantId::new(1)),
        ActionRequest::defend(ParticipantId::new(1)),
    ] {
        let run = || {
            let rig = PipelineRig::new();
            let mut session = active_session(vec![fighter(1, 1), fighter(2, 2)]);
            let now = START_MS + 1_000;
            let request = request.clone().at(now);
            let r = rig.resolve(&mut session, &request, now, &mut SeededRandom::new(7));
            (r.result, session.participant(ParticipantId::new(1)).cloned())
        };
        let (first, first_actor) = run();
        let (second, second_actor) = run();
        assert!(first.success);
        assert_eq!(first, second);
        assert_eq!(first_actor, second_actor);
    }
}
