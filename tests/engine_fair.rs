//! Fair-wrapper guarantees against a starving peer.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use interleave_rs::{run_test, Configuration, StrategyKind};

/// A repeatedly yielding task must still run to completion when paired
/// with a busy-spinning peer, provided the fair wrapper is active over an
/// unfair base strategy.
#[test]
fn yielding_task_completes_against_busy_peer() {
    let done = Arc::new(AtomicBool::new(false));
    let yields_survived = Arc::new(AtomicU32::new(0));

    let body_done = Arc::clone(&done);
    let body_yields = Arc::clone(&yields_survived);
    let config = Configuration {
        iterations: 20,
        seed: 5,
        strategy: StrategyKind::Pct { change_points: 2 },
        fairness: true,
        fairness_threshold: 8,
        ..Configuration::default()
    };

    let report = run_test(config, move |ctx| {
        body_done.store(false, Ordering::SeqCst);
        body_yields.store(0, Ordering::SeqCst);

        let yielder = {
            let done = Arc::clone(&body_done);
            let yields = Arc::clone(&body_yields);
            ctx.spawn_named("yielder", move |ctx| {
                for _ in 0..10 {
                    ctx.yield_now();
                    yields.fetch_add(1, Ordering::SeqCst);
                }
                done.store(true, Ordering::SeqCst);
            })
        };
        let busy = {
            let done = Arc::clone(&body_done);
            ctx.spawn_named("busy", move |ctx| {
                while !done.load(Ordering::SeqCst) {
                    ctx.yield_now();
                }
            })
        };
        ctx.wait_all(vec![yielder, busy]);
        ctx.assert(
            body_yields.load(Ordering::SeqCst) == 10,
            "yielder must be rescheduled after every yield",
        );
    })
    .expect("configuration is valid");

    assert!(!report.found_bug(), "failure: {:?}", report.failure);
    assert_eq!(report.passed, 20, "every iteration must complete fairly");
    assert_eq!(report.bound_reached, 0);
}
