// Corrupted state must be excised by the end-of-tick sweep, leaving a
// consistent topology and a steppable environment.

use crate::environment::engine::{Environment, EnvironmentConfig, RobotSpawn};
use crate::models::{CellId, Direction, Event, RobotId};

fn settled_chain() -> Environment {
    let mut env = Environment::new(EnvironmentConfig {
        robots: vec![
            RobotSpawn::at(-1.0, 0.0),
            RobotSpawn::at(0.0, 0.0),
            RobotSpawn::at(1.0, 0.0),
        ],
        ..Default::default()
    })
    .unwrap();
    env.step();
    assert_eq!(env.n_cells(), 3);
    assert_eq!(env.n_free_robots(), 0);
    env
}

fn assert_consistent(env: &Environment) {
    assert!(env.topology().verify().is_empty());
    for cell in env.topology().cells() {
        if let Some(occupant) = cell.occupant() {
            assert_eq!(env.get_robot(occupant).unwrap().cell(), Some(cell.id()));
        }
    }
    for robot in env.robots() {
        if let Some(cell) = robot.cell() {
            assert_eq!(env.cell(cell).unwrap().occupant(), Some(robot.id()));
        }
    }
}

#[test]
fn test_broken_link_is_excised() {
    let mut env = settled_chain();
    let order = env.topology().ordered();
    let (middle, last) = (order[1], order[2]);
    let last_occupant = env.cell(last).unwrap().occupant().unwrap();

    env.topology_mut()
        .get_mut(middle)
        .unwrap()
        .set_neighbor(Direction::Right, None);

    let result = env.tick();

    assert_eq!(result.excised, 1);
    assert_eq!(env.n_cells(), 2);
    assert!(env.cell(last).is_none());
    assert!(env.get_robot(last_occupant).unwrap().is_free());
    assert_eq!(env.event_log().events_of_type("CellExcised").len(), 1);
    assert_consistent(&env);

    // The freed robot gets a new cell on the next tick
    env.step();
    assert_eq!(env.n_cells(), 3);
    assert_eq!(env.n_free_robots(), 0);
    assert_consistent(&env);
}

#[test]
fn test_one_sided_assignment_is_repaired() {
    let mut env = settled_chain();
    let cell = env.get_cell(0).unwrap().id();
    let occupant = env.get_cell(0).unwrap().occupant().unwrap();

    env.registry_mut()
        .get_robot_mut(occupant)
        .unwrap()
        .set_cell(None);

    env.step();

    let excised: Vec<CellId> = env
        .event_log()
        .events_of_type("CellExcised")
        .iter()
        .filter_map(|e| e.cell())
        .collect();
    assert_eq!(excised, vec![cell]);
    assert_consistent(&env);
}

#[test]
fn test_dangling_robot_assignment_is_freed() {
    let mut env = settled_chain();
    let robot = RobotId(0);

    env.registry_mut()
        .get_robot_mut(robot)
        .unwrap()
        .set_cell(Some(CellId(99)));

    env.step();

    // Freed by the sweep; the cell that still names it is excised
    assert_consistent(&env);
    assert!(env
        .event_log()
        .events()
        .iter()
        .any(|e| matches!(e, Event::CellExcised { .. })));
}
