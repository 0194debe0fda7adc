//! Crash-window tests for the atomic update protocol.
//!
//! Each test stops an update just before one protocol step, drops every
//! handle as a dead process would, reopens the store and checks that the
//! name holds exactly the old or exactly the new value.

use std::io;

use shelf_config::testing::TestEnvironment;
use shelf_store::{Shelf, StoreError, StoreOptions, SwapMode, UpdateStep, Value};

fn crash() -> StoreError {
    StoreError::Io(io::Error::new(io::ErrorKind::Other, "simulated crash"))
}

/// Update `counter` 10 -> 11, crashing before `at`; return the value after reopen
fn crash_before(options: &StoreOptions, at: UpdateStep) -> i64 {
    {
        let shelf = Shelf::open(options).unwrap();
        shelf.put("counter", 10i64).unwrap();

        let mut counter = shelf.open_value::<i64>("counter").unwrap();
        let err = counter
            .commit_observed(11, |step| if step == at { Err(crash()) } else { Ok(()) })
            .unwrap_err();
        assert!(err.to_string().contains("simulated crash"));
    }

    let shelf = Shelf::open(options).unwrap();
    assert_eq!(shelf.names(), vec!["counter".to_string()], "leftovers after {}", at);
    assert!(!shelf.directory().exists("counter-tmp"), "temp survived {}", at);
    match shelf.get("counter").unwrap() {
        Value::Integer(v) => v,
        other => panic!("counter changed kind: {:?}", other),
    }
}

fn expected_after(at: UpdateStep) -> i64 {
    if at > UpdateStep::Swap {
        11
    } else {
        10
    }
}

fn check_every_step(mode: SwapMode) {
    for at in UpdateStep::ALL {
        let env = TestEnvironment::new().unwrap();
        let options = StoreOptions::new(&env.store_root).swap_mode(mode);
        assert_eq!(crash_before(&options, at), expected_after(at), "crash before {}", at);
    }
}

#[test]
fn test_crash_at_every_step() {
    check_every_step(SwapMode::Auto);
}

#[test]
fn test_crash_at_every_step_journaled() {
    check_every_step(SwapMode::Journaled);
}

#[test]
fn test_update_works_after_recovery() {
    let env = TestEnvironment::new().unwrap();
    let options = StoreOptions::new(&env.store_root);
    assert_eq!(crash_before(&options, UpdateStep::ReclaimOld), 11);

    let shelf = Shelf::open(&options).unwrap();
    let mut counter = shelf.open_value::<i64>("counter").unwrap();
    let next = counter.plus(1).unwrap();
    counter.commit(next).unwrap();
    assert_eq!(shelf.get("counter").unwrap(), Value::Integer(12));
}

#[test]
fn test_leftover_temp_without_sweep_is_replaced_by_next_update() {
    let env = TestEnvironment::new().unwrap();
    let options = StoreOptions::new(&env.store_root).sweep_on_open(false);
    {
        let shelf = Shelf::open(&options).unwrap();
        shelf.put("n", 1i64).unwrap();
        let mut n = shelf.open_value::<i64>("n").unwrap();
        let _ = n.commit_observed(2, |step| {
            if step == UpdateStep::Swap {
                Err(crash())
            } else {
                Ok(())
            }
        });
    }

    let shelf = Shelf::open(&options).unwrap();
    assert!(shelf.directory().exists("n-tmp"));
    assert_eq!(shelf.get("n").unwrap(), Value::Integer(1));

    // Step 2 erases the stale candidate and retries
    shelf.put("n", 3i64).unwrap();
    assert_eq!(shelf.get("n").unwrap(), Value::Integer(3));
    assert!(!shelf.directory().exists("n-tmp"));
}

#[test]
fn test_uncommitted_temp_survives_crash_until_sweep() {
    let env = TestEnvironment::new().unwrap();
    let options = StoreOptions::new(&env.store_root).sweep_on_open(false);
    {
        let shelf = Shelf::open(&options).unwrap();
        shelf.put("counter", 10i64).unwrap();
        let mut counter = shelf.open_value::<i64>("counter").unwrap();
        let err = counter
            .commit_observed(11, |step| {
                if step == UpdateStep::WriteTemp {
                    Err(crash())
                } else {
                    Ok(())
                }
            })
            .unwrap_err();
        assert!(err.to_string().contains("simulated crash"));
    }

    // Created but never written: still on disk after the "crash"
    let shelf = Shelf::open(&options).unwrap();
    assert!(shelf.directory().exists("counter-tmp"));
    assert_eq!(shelf.get("counter").unwrap(), Value::Integer(10));

    let report = shelf.sweep().unwrap();
    assert_eq!(report.reclaimed, vec!["counter-tmp".to_string()]);
    assert!(report.corrupt.is_empty());
    drop(shelf);

    let shelf = Shelf::open(&StoreOptions::new(&env.store_root)).unwrap();
    let mut counter = shelf.open_value::<i64>("counter").unwrap();
    counter.commit(11).unwrap();
    assert_eq!(shelf.get("counter").unwrap(), Value::Integer(11));
    assert_eq!(shelf.names(), vec!["counter".to_string()]);
}

#[test]
fn test_proxy_cache_follows_durable_state() {
    let env = TestEnvironment::new().unwrap();
    let shelf = Shelf::open(&StoreOptions::new(&env.store_root)).unwrap();
    shelf.put("v", 1.0f64).unwrap();

    let mut before_swap = shelf.open_value::<f64>("v").unwrap();
    let _ = before_swap.commit_observed(2.0, |step| {
        if step == UpdateStep::Swap {
            Err(crash())
        } else {
            Ok(())
        }
    });
    assert_eq!(*before_swap.value(), 1.0);

    let mut after_swap = shelf.open_value::<f64>("v").unwrap();
    let _ = after_swap.commit_observed(3.0, |step| {
        if step == UpdateStep::Rebind {
            Err(crash())
        } else {
            Ok(())
        }
    });
    assert_eq!(*after_swap.value(), 3.0);
    assert_eq!(shelf.get("v").unwrap(), Value::Float(3.0));
}
