//! Deadlock detection on mutually waiting tasks.

use std::sync::{Arc, Mutex};

use interleave_rs::{run_test, Configuration, TaskHandle, TestError};

type HandleCell = Arc<Mutex<Option<TaskHandle<()>>>>;

/// Two tasks each wait for the other's completion; the scheduler must
/// report a deadlock within a single iteration.
#[test]
fn mutual_join_is_reported_as_deadlock() {
    let first_cell: HandleCell = Arc::new(Mutex::new(None));
    let second_cell: HandleCell = Arc::new(Mutex::new(None));

    let body_first = Arc::clone(&first_cell);
    let body_second = Arc::clone(&second_cell);
    let config = Configuration {
        iterations: 1,
        seed: 1,
        ..Configuration::default()
    };

    let report = run_test(config, move |ctx| {
        *body_first.lock().unwrap() = None;
        *body_second.lock().unwrap() = None;

        let first = {
            let peer = Arc::clone(&body_second);
            ctx.spawn_named("first", move |ctx| loop {
                let taken = peer.lock().unwrap().take();
                match taken {
                    Some(handle) => {
                        ctx.join(handle);
                        break;
                    }
                    None => ctx.yield_now(),
                }
            })
        };
        *body_first.lock().unwrap() = Some(first.clone());

        let second = {
            let peer = Arc::clone(&body_first);
            ctx.spawn_named("second", move |ctx| loop {
                let taken = peer.lock().unwrap().take();
                match taken {
                    Some(handle) => {
                        ctx.join(handle);
                        break;
                    }
                    None => ctx.yield_now(),
                }
            })
        };
        *body_second.lock().unwrap() = Some(second.clone());

        ctx.join(first);
        ctx.join(second);
    })
    .expect("configuration is valid");

    let failure = report.failure.expect("deadlock must be detected");
    match &failure.error {
        TestError::Deadlock { blocked } => {
            // Root plus both children end up blocked forever.
            assert_eq!(blocked.len(), 3, "blocked set: {blocked:?}");
        }
        other => panic!("expected deadlock, got {other}"),
    }
}
