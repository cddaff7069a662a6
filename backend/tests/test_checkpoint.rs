//! Checkpoint Tests - Save/Load Environment State
//!
//! Critical invariants tested:
//! - Determinism: a restored environment produces identical subsequent ticks
//! - Consistency: restored cells and robots agree on every assignment
//! - Config matching: state from a different config is rejected

use formation_simulator_core_rs::environment::{
    Environment, EnvironmentConfig, RobotSpawn, ScatterConfig, SimulationError,
};
use formation_simulator_core_rs::{Renderable, RobotId};

// ============================================================================
// Test Helpers
// ============================================================================

fn test_config() -> EnvironmentConfig {
    EnvironmentConfig {
        robots: vec![RobotSpawn::at(-3.0, 2.0), RobotSpawn::at(4.0, -1.0)],
        scatter: Some(ScatterConfig {
            count: 4,
            width: 8.0,
            height: 8.0,
        }),
        rng_seed: 42,
        max_steps: Some(300),
        ..Default::default()
    }
}

fn run_steps(env: &mut Environment, n: usize) {
    for _ in 0..n {
        env.tick();
    }
}

// ============================================================================
// Round Trip
// ============================================================================

#[test]
fn test_save_load_preserves_state() {
    let mut env = Environment::new(test_config()).unwrap();
    run_steps(&mut env, 6);

    let json = env.save_state().unwrap();
    let restored = Environment::load_state(test_config(), &json).unwrap();

    assert_eq!(restored.step_count(), 6);
    assert_eq!(restored.frame(), env.frame());
    assert_eq!(restored.q_count(), env.q_count());
    assert_eq!(restored.rng_state(), env.rng_state());
    assert_eq!(restored.total_messages(), env.total_messages());
    assert_eq!(restored.queued_messages(), env.queued_messages());
    assert_eq!(restored.pending_auctions(), env.pending_auctions());
    assert_eq!(restored.error_log(), env.error_log());
    assert_eq!(restored.event_log().len(), env.event_log().len());
}

#[test]
fn test_restored_environment_ticks_identically() {
    let mut original = Environment::new(test_config()).unwrap();
    run_steps(&mut original, 3);

    let json = original.save_state().unwrap();
    let mut restored = Environment::load_state(test_config(), &json).unwrap();

    for _ in 0..40 {
        let a = original.tick();
        let b = restored.tick();
        assert_eq!(a, b);
    }

    assert_eq!(original.frame(), restored.frame());
    assert_eq!(original.message_log(), restored.message_log());
    assert_eq!(original.distance_log(), restored.distance_log());
}

#[test]
fn test_restored_ids_continue() {
    let mut env = Environment::new(test_config()).unwrap();
    run_steps(&mut env, 2);
    env.remove_robot(RobotId(5)).unwrap();

    let json = env.save_state().unwrap();
    let mut restored = Environment::load_state(test_config(), &json).unwrap();

    assert!(restored.get_robot(RobotId(5)).is_none());
    assert_eq!(restored.add_robot(0.0, 0.0, 0.0, 0.0).unwrap(), RobotId(6));
}

// ============================================================================
// Rejection
// ============================================================================

#[test]
fn test_config_mismatch_is_rejected() {
    let mut env = Environment::new(test_config()).unwrap();
    run_steps(&mut env, 2);
    let json = env.save_state().unwrap();

    let other = EnvironmentConfig {
        max_speed: 0.25,
        ..test_config()
    };
    let result = Environment::load_state(other, &json);

    assert!(matches!(result, Err(SimulationError::ConfigMismatch { .. })));
}

#[test]
fn test_malformed_json_is_rejected() {
    let result = Environment::load_state(test_config(), "{\"current_step\": 3");
    assert!(matches!(result, Err(SimulationError::SerializationError(_))));
}

#[test]
fn test_tampered_assignment_is_rejected() {
    let mut env = Environment::new(test_config()).unwrap();
    run_steps(&mut env, 2);

    let mut snapshot = env.snapshot().unwrap();
    let occupied = snapshot
        .robots
        .iter()
        .position(|r| r.cell.is_some())
        .expect("a robot holds a cell after two ticks");
    snapshot.robots[occupied].cell = None;

    let result = Environment::from_snapshot(test_config(), snapshot);
    assert!(matches!(result, Err(SimulationError::StateValidationError(_))));
}
