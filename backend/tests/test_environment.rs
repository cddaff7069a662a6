//! Environment Integration Tests
//!
//! Exercises the tick loop end to end: growth, insertion and push auctions,
//! message ordering, convergence, formation swaps and the step horizon.

use formation_simulator_core_rs::environment::{
    Environment, EnvironmentConfig, RobotSpawn, ScatterConfig, SimulationError,
};
use formation_simulator_core_rs::{
    Address, AuctionError, AuctionPolicy, CellId, Closure, Event, Formation, FormationShape,
    PacketKind, Payload, Renderable, RobotId,
};
use proptest::prelude::*;

// ============================================================================
// Test Helpers
// ============================================================================

fn env_with(robots: &[(f64, f64)]) -> Environment {
    Environment::new(EnvironmentConfig {
        robots: robots.iter().map(|&(x, y)| RobotSpawn::at(x, y)).collect(),
        max_steps: Some(500),
        ..Default::default()
    })
    .unwrap()
}

/// One fixed cell at the origin and no growth
fn single_cell_env(robots: &[(f64, f64)]) -> Environment {
    Environment::new(EnvironmentConfig {
        initial_cells: 1,
        auto_grow: false,
        robots: robots.iter().map(|&(x, y)| RobotSpawn::at(x, y)).collect(),
        max_steps: Some(500),
        ..Default::default()
    })
    .unwrap()
}

fn run_to_end(env: &mut Environment) {
    while env.step() {}
}

fn assert_bidirectional(env: &Environment) {
    for cell in env.cells() {
        if let Some(occupant) = cell.occupant() {
            let robot = env.get_robot(occupant).expect("occupant is registered");
            assert_eq!(robot.cell(), Some(cell.id()));
        }
    }
    for robot in env.robots() {
        if let Some(cell) = robot.cell() {
            assert_eq!(env.cell(cell).unwrap().occupant(), Some(robot.id()));
        }
    }
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn test_invalid_config_is_rejected() {
    let result = Environment::new(EnvironmentConfig {
        max_speed: 0.0,
        ..Default::default()
    });
    assert!(matches!(result, Err(SimulationError::InvalidConfig(_))));

    let result = Environment::new(EnvironmentConfig {
        formation: Formation::new(0, FormationShape::Line, -1.0),
        ..Default::default()
    });
    assert!(matches!(result, Err(SimulationError::InvalidConfig(_))));
}

#[test]
fn test_non_finite_robot_pose_is_rejected() {
    let mut env = env_with(&[]);
    let result = env.add_robot(f64::NAN, 0.0, 0.0, 0.0);

    assert!(matches!(result, Err(SimulationError::InvalidPose(_))));
    assert_eq!(env.n_robots(), 0);
}

// ============================================================================
// Registry Scenarios
// ============================================================================

#[test]
fn test_remove_robot_occupying_cell() {
    let mut env = env_with(&[(0.0, 0.0)]);
    env.step();

    let cell = env.get_cell(0).unwrap().id();
    assert_eq!(env.cell(cell).unwrap().occupant(), Some(RobotId(0)));

    let removed = env.remove_robot(RobotId(0)).unwrap();
    assert_eq!(removed.id(), RobotId(0));
    assert_eq!(env.cell(cell).unwrap().occupant(), None);
    assert!(env.get_robot(RobotId(0)).is_none());
    assert!(env.pending_auctions().contains(&cell));
}

#[test]
fn test_remove_occupied_cell_frees_robot_for_next_tick() {
    let mut env = env_with(&[(-0.5, 0.0), (0.5, 0.0)]);
    env.step();
    let cell = env.get_robot(RobotId(0)).unwrap().cell().unwrap();

    let freed = env.remove_cell(cell).unwrap();

    assert_eq!(freed, Some(RobotId(0)));
    assert!(env.cell(cell).is_none());
    assert_eq!(env.n_cells(), 1);
    assert_eq!(env.n_robots(), 2);
    assert!(env.get_robot(RobotId(0)).unwrap().is_free());
    assert_bidirectional(&env);

    env.step();
    assert_eq!(env.n_cells(), 2);
    assert_eq!(env.n_free_robots(), 0);
    assert!(env.get_robot(RobotId(0)).unwrap().cell().is_some());
    assert_bidirectional(&env);
}

#[test]
fn test_remove_unknown_robot_fails_without_change() {
    let mut env = env_with(&[(0.0, 0.0)]);
    let result = env.remove_robot(RobotId(9));

    assert!(matches!(result, Err(SimulationError::Registry(_))));
    assert_eq!(env.n_robots(), 1);
}

// ============================================================================
// Auctions
// ============================================================================

#[test]
fn test_nearer_robot_wins_insertion() {
    // Robot 0 at distance 5.0, robot 1 at distance 1.0
    let mut env = single_cell_env(&[(5.0, 0.0), (0.0, 1.0)]);
    let result = env.tick();

    assert_eq!(result.settled_insertions, 1);
    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(RobotId(1)));
    assert!(env.get_robot(RobotId(0)).unwrap().is_free());

    let settled = env.event_log().events_of_type("InsertionSettled");
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].robot(), Some(RobotId(1)));
}

#[test]
fn test_equal_scores_go_to_lowest_id() {
    let mut env = single_cell_env(&[(-2.0, 0.0), (2.0, 0.0)]);
    env.tick();

    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(RobotId(0)));
}

#[test]
fn test_closer_free_robot_pushes_occupant() {
    let mut env = single_cell_env(&[(3.0, 0.0)]);
    env.tick();
    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(RobotId(0)));

    let challenger = env.add_robot(0.2, 0.0, 0.0, 0.0).unwrap();
    let result = env.tick();

    assert_eq!(result.settled_pushes, 1);
    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(challenger));
    assert!(env.get_robot(RobotId(0)).unwrap().is_free());
    assert_eq!(env.event_log().events_of_type("PushSettled").len(), 1);
    assert_bidirectional(&env);
}

#[test]
fn test_settle_rejects_occupied_cell() {
    let mut env = single_cell_env(&[(0.0, 0.0), (4.0, 0.0)]);
    env.tick();
    let cell = env.get_cell(0).unwrap().id();

    let result = env.settle_insertion_auction(cell, RobotId(1));
    assert!(matches!(result, Err(SimulationError::Auction(_))));
    assert_eq!(env.cell(cell).unwrap().occupant(), Some(RobotId(0)));

    let result = env.settle_push_auction(cell, RobotId(0));
    assert!(matches!(result, Err(SimulationError::Auction(_))));
    assert_eq!(env.cell(cell).unwrap().occupant(), Some(RobotId(0)));
}

#[test]
fn test_push_into_empty_cell_is_rejected() {
    let mut env = single_cell_env(&[(1.0, 0.0)]);
    let cell = env.get_cell(0).unwrap().id();

    let err = env.settle_push_auction(cell, RobotId(0)).unwrap_err();

    assert!(matches!(
        err,
        SimulationError::Auction(AuctionError::CellEmpty(c)) if c == cell
    ));
    assert_eq!(err.to_string(), format!("{} has no occupant to push", cell));
    assert!(env.get_robot(RobotId(0)).unwrap().is_free());
}

#[test]
fn test_push_uses_proximity_under_zero_weights() {
    let mut env = Environment::new(EnvironmentConfig {
        initial_cells: 1,
        auto_grow: false,
        auction_policy: AuctionPolicy::Weighted {
            distance_weight: 0.0,
            hop_weight: 0.0,
        },
        robots: vec![RobotSpawn::at(20.0, 0.0), RobotSpawn::at(0.1, 0.0)],
        max_steps: Some(50),
        ..Default::default()
    })
    .unwrap();

    // All insertion bids tie, so robot 0 wins the cell first
    let result = env.tick();

    assert_eq!(result.settled_insertions, 1);
    assert_eq!(result.settled_pushes, 1);
    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(RobotId(1)));
    assert!(env.get_robot(RobotId(0)).unwrap().is_free());

    env.tick();
    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(RobotId(1)));
    assert_bidirectional(&env);
}

#[test]
fn test_same_inputs_same_assignments() {
    let config = EnvironmentConfig {
        scatter: Some(ScatterConfig {
            count: 8,
            width: 10.0,
            height: 6.0,
        }),
        max_steps: Some(400),
        ..Default::default()
    };

    let mut a = Environment::new(config.clone()).unwrap();
    let mut b = Environment::new(config).unwrap();
    run_to_end(&mut a);
    run_to_end(&mut b);

    assert_eq!(a.step_count(), b.step_count());
    assert_eq!(a.frame(), b.frame());
    assert_eq!(a.message_log(), b.message_log());
    assert_eq!(a.error_log(), b.error_log());
}

// ============================================================================
// Growth and Convergence
// ============================================================================

#[test]
fn test_every_robot_gets_a_cell() {
    let mut env = env_with(&[(-3.0, 1.0), (0.0, -2.0), (4.0, 0.5), (1.0, 3.0)]);
    run_to_end(&mut env);

    assert!(env.quiescence());
    assert_eq!(env.n_cells(), 4);
    assert_eq!(env.n_free_robots(), 0);
    assert!(env.topology().verify().is_empty());
    assert_bidirectional(&env);
}

#[test]
fn test_quiescent_exactly_after_fifth_quiet_step() {
    let mut env = env_with(&[(0.0, 0.0)]);

    for expected in 1..=4 {
        assert!(env.step(), "still active after step {}", expected);
        assert_eq!(env.q_count(), expected);
        assert!(!env.quiescence());
    }

    assert!(!env.step());
    assert_eq!(env.q_count(), 5);
    assert!(env.quiescence());
    assert_eq!(env.event_log().events_of_type("Quiescent").len(), 1);
}

#[test]
fn test_high_error_tick_resets_streak() {
    let mut env = env_with(&[(0.0, 0.0)]);
    run_to_end(&mut env);
    assert!(env.quiescence());

    env.add_robot(10.0, 0.0, 0.0, 0.0).unwrap();
    let result = env.tick();

    assert!(result.error > 0.1);
    assert_eq!(env.q_count(), 0);
    assert!(!env.quiescence());
}

#[test]
fn test_insertion_growth_keeps_topology_consistent() {
    let mut env = Environment::new(EnvironmentConfig {
        use_insertion: true,
        robots: vec![
            RobotSpawn::at(-4.0, 0.0),
            RobotSpawn::at(4.0, 0.0),
            RobotSpawn::at(0.0, 0.0),
            RobotSpawn::at(0.5, 2.0),
        ],
        max_steps: Some(500),
        ..Default::default()
    })
    .unwrap();
    run_to_end(&mut env);

    assert!(env.quiescence());
    assert_eq!(env.n_cells(), 4);
    assert!(!env.event_log().events_of_type("CellInserted").is_empty());
    assert!(env.topology().verify().is_empty());
}

#[test]
fn test_max_cells_caps_growth() {
    let mut env = Environment::new(EnvironmentConfig {
        max_cells: Some(2),
        robots: vec![
            RobotSpawn::at(-1.0, 0.0),
            RobotSpawn::at(0.0, 0.0),
            RobotSpawn::at(1.0, 0.0),
        ],
        max_steps: Some(20),
        ..Default::default()
    })
    .unwrap();
    env.step();

    assert_eq!(env.n_cells(), 2);
    assert_eq!(env.n_free_robots(), 1);
}

// ============================================================================
// Messaging
// ============================================================================

#[test]
fn test_packets_delivered_in_send_order() {
    let mut env = env_with(&[(0.0, 0.0), (1.0, 0.0)]);
    for (from, body) in [(RobotId(1), "first"), (RobotId(0), "second")] {
        env.send_msg(
            Some(Payload::Text {
                body: body.to_string(),
            }),
            Address::Robot(RobotId(0)),
            Address::Robot(from),
            PacketKind::Heartbeat,
        )
        .unwrap();
    }

    let result = env.tick();
    assert_eq!(result.delivered, 2);

    let log = env.message_log();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].from, Address::Robot(RobotId(1)));
    assert_eq!(log[1].from, Address::Robot(RobotId(0)));
    assert_eq!(env.total_messages(), 2);
}

#[test]
fn test_packets_raised_in_tick_wait_for_next() {
    let mut env = env_with(&[(0.0, 0.0)]);

    let first = env.tick();
    assert_eq!(first.delivered, 0);
    assert!(env.queued_messages() > 0);

    let second = env.tick();
    assert!(second.delivered > 0);
    let kinds: Vec<PacketKind> = env.message_log().iter().map(|m| m.kind).collect();
    assert!(kinds.contains(&PacketKind::InsertionAssignment));
    assert_eq!(
        env.get_robot(RobotId(0)).unwrap().acknowledged_cell(),
        env.get_robot(RobotId(0)).unwrap().cell()
    );
}

#[test]
fn test_packets_for_unknown_robots_are_forwarded() {
    let mut env = env_with(&[(0.0, 0.0)]);
    for to in [RobotId(7), RobotId(0), RobotId(8)] {
        env.send_msg(None, Address::Robot(to), Address::Environment, PacketKind::Heartbeat)
            .unwrap();
    }

    assert_eq!(env.forward_packets(), 2);
    assert_eq!(env.queued_messages(), 1);

    let forwarded = env.take_forwarded();
    let targets: Vec<Address> = forwarded.iter().map(|p| p.to()).collect();
    assert_eq!(
        targets,
        vec![Address::Robot(RobotId(7)), Address::Robot(RobotId(8))]
    );

    let mut parent = env_with(&[]);
    assert_eq!(parent.accept(forwarded).unwrap(), 2);
    assert_eq!(parent.queued_messages(), 2);
}

#[test]
fn test_delivery_forwards_unknown_recipient() {
    let mut env = env_with(&[(0.0, 0.0)]);
    env.send_msg(
        None,
        Address::Robot(RobotId(42)),
        Address::Environment,
        PacketKind::Heartbeat,
    )
    .unwrap();

    env.tick();
    let forwarded = env.take_forwarded();

    assert_eq!(forwarded.len(), 1);
    assert_eq!(forwarded[0].to(), Address::Robot(RobotId(42)));
}

// ============================================================================
// Formations
// ============================================================================

#[test]
fn test_change_formation_to_ring() {
    let mut env = env_with(&[(-1.5, 0.0), (-0.5, 0.0), (0.5, 0.0), (1.5, 0.0)]);
    run_to_end(&mut env);
    assert!(env.quiescence());

    env.change_formation(Formation::new(1, FormationShape::Circle, 1.0))
        .unwrap();

    assert_eq!(env.topology().closure(), Closure::Ring);
    assert!(env.topology().verify().is_empty());
    let head = env.topology().head().unwrap();
    assert_eq!(env.cell(head).unwrap().left(), env.topology().tail());
    assert!(!env.quiescence());

    run_to_end(&mut env);
    assert!(env.quiescence());
    assert_eq!(env.formation().id(), 1);
    assert!(env.robots().all(|r| r.formation_id() == Some(1)));
    assert_bidirectional(&env);
}

#[test]
fn test_invalid_formation_leaves_state_unchanged() {
    let mut env = env_with(&[(0.0, 0.0)]);
    env.step();

    let result = env.change_formation(Formation::new(3, FormationShape::Circle, 0.0));
    assert!(matches!(result, Err(SimulationError::Formation(_))));
    assert_eq!(env.formation().id(), 0);
    assert_eq!(env.topology().closure(), Closure::Chain);
}

#[test]
fn test_form_from_click_seeds_nearest_robot() {
    let mut env = Environment::new(EnvironmentConfig {
        auto_grow: false,
        robots: vec![RobotSpawn::at(0.0, 0.0), RobotSpawn::at(5.0, 4.0)],
        ..Default::default()
    })
    .unwrap();
    assert_eq!(env.n_cells(), 0);

    let id = env.form_from_click(5.0, 5.0).unwrap();

    assert_eq!(id, 1);
    assert_eq!(env.formation().id(), 1);
    assert_eq!(env.n_cells(), 1);
    assert_eq!(env.get_cell(0).unwrap().occupant(), Some(RobotId(1)));
    let origin = env.formation_manager().origin();
    assert_eq!((origin.x, origin.y), (5.0, 5.0));
    assert!(env
        .event_log()
        .events()
        .iter()
        .any(|e| matches!(e, Event::FormationChanged { formation_id: 1, .. })));
}

// ============================================================================
// Step Horizon and Reset
// ============================================================================

#[test]
fn test_max_steps_ends_run() {
    let mut env = Environment::new(EnvironmentConfig {
        robots: vec![RobotSpawn::at(0.0, 0.0), RobotSpawn::at(30.0, 0.0)],
        max_steps: Some(3),
        ..Default::default()
    })
    .unwrap();

    assert!(env.step());
    assert!(env.step());
    assert!(!env.step());
    assert_eq!(env.step_count(), 3);

    let result = env.tick();
    assert!(!result.active);
    assert_eq!(env.step_count(), 3);
    assert_eq!(env.error_log().len(), 3);
}

#[test]
fn test_clear_resets_to_empty() {
    let mut env = env_with(&[(0.0, 0.0), (2.0, 0.0)]);
    run_to_end(&mut env);

    env.clear();

    assert_eq!(env.step_count(), 0);
    assert_eq!(env.n_cells(), 0);
    assert_eq!(env.n_robots(), 0);
    assert!(env.message_log().is_empty());
    assert!(!env.quiescence());

    let id = env.add_robot(0.0, 0.0, 0.0, 0.0).unwrap();
    assert_eq!(id, RobotId(2));
}

// ============================================================================
// Properties
// ============================================================================

#[derive(Debug, Clone)]
enum EnvOp {
    AddRobot { x: f64, y: f64 },
    /// Index into the registered robots (mod count)
    RemoveRobot { index: usize },
    AddCell,
    /// Index into the cells (mod count)
    RemoveCell { index: usize },
    ChangeFormation { ring: bool, spacing: f64 },
    Click { x: f64, y: f64 },
    Tick,
}

fn env_op_strategy() -> impl Strategy<Value = EnvOp> {
    prop_oneof![
        3 => (-10.0..10.0f64, -10.0..10.0f64).prop_map(|(x, y)| EnvOp::AddRobot { x, y }),
        1 => any::<usize>().prop_map(|index| EnvOp::RemoveRobot { index }),
        1 => Just(EnvOp::AddCell),
        1 => any::<usize>().prop_map(|index| EnvOp::RemoveCell { index }),
        1 => (any::<bool>(), 0.5..3.0f64)
            .prop_map(|(ring, spacing)| EnvOp::ChangeFormation { ring, spacing }),
        1 => (-10.0..10.0f64, -10.0..10.0f64).prop_map(|(x, y)| EnvOp::Click { x, y }),
        4 => Just(EnvOp::Tick),
    ]
}

fn apply_env_op(env: &mut Environment, op: &EnvOp) {
    match *op {
        EnvOp::AddRobot { x, y } => {
            env.add_robot(x, y, 0.0, 0.0).unwrap();
        }
        EnvOp::RemoveRobot { index } => {
            let ids: Vec<RobotId> = env.robots().map(|r| r.id()).collect();
            if !ids.is_empty() {
                env.remove_robot(ids[index % ids.len()]).unwrap();
            }
        }
        EnvOp::AddCell => {
            // Capacity errors leave the environment unchanged
            let _ = env.add_cell(None);
        }
        EnvOp::RemoveCell { index } => {
            let ids: Vec<CellId> = env.cells().iter().map(|c| c.id()).collect();
            if !ids.is_empty() {
                env.remove_cell(ids[index % ids.len()]).unwrap();
            }
        }
        EnvOp::ChangeFormation { ring, spacing } => {
            let id = env.formation_manager().next_formation_id();
            let shape = if ring {
                FormationShape::Circle
            } else {
                FormationShape::Line
            };
            env.change_formation(Formation::new(id, shape, spacing)).unwrap();
        }
        EnvOp::Click { x, y } => {
            env.form_from_click(x, y).unwrap();
        }
        EnvOp::Tick => {
            env.tick();
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: any operation sequence keeps links mutual and every robot
    /// in at most one cell, mirrored by that cell
    #[test]
    fn prop_operations_keep_occupancy_consistent(
        use_insertion in any::<bool>(),
        max_cells in prop::option::of(1usize..6),
        ops in prop::collection::vec(env_op_strategy(), 1..60)
    ) {
        let mut env = Environment::new(EnvironmentConfig {
            use_insertion,
            max_cells,
            robots: vec![RobotSpawn::at(0.0, 0.0), RobotSpawn::at(2.0, 1.0)],
            ..Default::default()
        })
        .unwrap();

        for op in &ops {
            apply_env_op(&mut env, op);

            prop_assert!(env.topology().verify().is_empty(), "{:?}", env.topology().verify());
            assert_bidirectional(&env);

            let mut holders = std::collections::BTreeMap::new();
            for cell in env.cells() {
                if let Some(occupant) = cell.occupant() {
                    prop_assert!(holders.insert(occupant, cell.id()).is_none());
                }
            }
        }

        prop_assert!(env
            .event_log()
            .events_of_type("CellExcised")
            .is_empty());
    }
}
