//! Property: identical seeds reproduce identical runs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use proptest::prelude::*;

use interleave_rs::{run_test, Configuration, TestReport};

fn run_once(seed: u64) -> TestReport {
    let cell = Arc::new(AtomicU32::new(0));
    let config = Configuration {
        iterations: 4,
        seed,
        ..Configuration::default()
    };
    run_test(config, move |ctx| {
        cell.store(0, Ordering::SeqCst);
        let writer = {
            let cell = Arc::clone(&cell);
            ctx.spawn(move |_| cell.store(3, Ordering::SeqCst))
        };
        cell.store(5, Ordering::SeqCst);
        ctx.join(writer);
        let keep = ctx.next_bool();
        if keep {
            ctx.assert(cell.load(Ordering::SeqCst) == 5, "lost update");
        }
    })
    .expect("configuration is valid")
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn identical_seeds_reproduce_identical_reports(seed in any::<u64>()) {
        prop_assert_eq!(run_once(seed), run_once(seed));
    }
}
