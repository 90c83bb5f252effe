//! Interleaving enumeration under the PCT strategy.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use interleave_rs::{run_test, Configuration, StepBound, StrategyKind};

/// Two tasks each log `>X`, elapse a scheduler-chosen delay, then log `<X`.
/// All six legal orderings of the four events must surface within the
/// iteration budget.
#[test]
fn pct_reaches_all_six_orderings() {
    let log: Arc<Mutex<Vec<&'static str>>> = Arc::new(Mutex::new(Vec::new()));
    let orderings: Arc<Mutex<BTreeSet<Vec<&'static str>>>> =
        Arc::new(Mutex::new(BTreeSet::new()));

    let body_log = Arc::clone(&log);
    let body_orderings = Arc::clone(&orderings);
    let config = Configuration {
        iterations: 1000,
        seed: 13,
        strategy: StrategyKind::Pct { change_points: 3 },
        max_steps: StepBound {
            soft: 100,
            hard: 1_000,
        },
        ..Configuration::default()
    };

    let report = run_test(config, move |ctx| {
        body_log.lock().unwrap().clear();
        let foo = {
            let log = Arc::clone(&body_log);
            ctx.spawn_named("foo", move |ctx| {
                log.lock().unwrap().push(">foo");
                ctx.delay(1);
                log.lock().unwrap().push("<foo");
            })
        };
        let bar = {
            let log = Arc::clone(&body_log);
            ctx.spawn_named("bar", move |ctx| {
                log.lock().unwrap().push(">bar");
                ctx.delay(1);
                log.lock().unwrap().push("<bar");
            })
        };
        ctx.wait_all(vec![foo, bar]);
        let snapshot = body_log.lock().unwrap().clone();
        body_orderings.lock().unwrap().insert(snapshot);
    })
    .expect("configuration is valid");

    assert!(!report.found_bug(), "body has no assertion to violate");
    let seen = orderings.lock().unwrap();
    assert_eq!(
        seen.len(),
        6,
        "expected all 6 legal orderings, saw {:?}",
        *seen
    );
    for ordering in seen.iter() {
        let pos =
            |tag: &str| ordering.iter().position(|e| *e == tag).expect("event logged");
        assert!(pos(">foo") < pos("<foo"));
        assert!(pos(">bar") < pos("<bar"));
    }
}
