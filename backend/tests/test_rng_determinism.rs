//! Tests for deterministic RNG
//!
//! Same seed MUST produce the same sequence: scattered robot placements and
//! checkpoint resumes depend on it.

use formation_simulator_core_rs::RngManager;

#[test]
fn test_rng_new_with_seed() {
    let rng = RngManager::new(12345);
    assert_eq!(rng.get_state(), 12345);
}

#[test]
fn test_rng_next_deterministic() {
    let mut rng1 = RngManager::new(12345);
    let mut rng2 = RngManager::new(12345);

    for _ in 0..100 {
        assert_eq!(rng1.next_u64(), rng2.next_u64(), "RNG not deterministic!");
    }
}

#[test]
fn test_rng_different_seeds_different_sequences() {
    let mut rng1 = RngManager::new(12345);
    let mut rng2 = RngManager::new(54321);

    assert_ne!(
        rng1.next_u64(),
        rng2.next_u64(),
        "Different seeds should produce different values"
    );
}

#[test]
fn test_uniform_stays_in_bounds() {
    let mut rng = RngManager::new(7);

    for _ in 0..500 {
        let x = rng.uniform(-2.5, 2.5);
        assert!((-2.5..2.5).contains(&x), "Value {} out of range", x);
    }
}

#[test]
fn test_index_single_slot() {
    let mut rng = RngManager::new(12345);
    assert_eq!(rng.index(1), 0);
}

#[test]
fn test_state_resume_continues_sequence() {
    let mut rng = RngManager::new(99999);
    rng.next_u64();
    rng.next_u64();

    let mut resumed = RngManager::new(rng.get_state());
    for _ in 0..20 {
        assert_eq!(rng.next_u64(), resumed.next_u64());
    }
}
