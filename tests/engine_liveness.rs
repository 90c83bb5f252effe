//! Liveness-violation detection through specification monitors.

use interleave_rs::{
    Configuration, ControlledRuntime, SpecificationMonitor, TaskHandle, TestError,
};

/// Tracks one outstanding obligation: hot after a request, cold once the
/// matching completion event arrives.
struct ObligationMonitor {
    hot: bool,
}

impl ObligationMonitor {
    fn new() -> Self {
        Self { hot: false }
    }
}

impl SpecificationMonitor for ObligationMonitor {
    fn name(&self) -> &str {
        "pending-request"
    }

    fn on_event(&mut self, event: &str) {
        match event {
            "request" => self.hot = true,
            "complete" => self.hot = false,
            _ => {}
        }
    }

    fn is_hot(&self) -> bool {
        self.hot
    }
}

#[test]
fn monitor_stuck_hot_is_a_liveness_violation() {
    let config = Configuration {
        iterations: 1,
        seed: 3,
        liveness_temperature: 50,
        ..Configuration::default()
    };

    let report = ControlledRuntime::new(config)
        .with_monitor(|| Box::new(ObligationMonitor::new()))
        .run(|ctx| {
            ctx.monitor_event("request");
            // The request is never completed; the spinner keeps the
            // iteration alive until the temperature window trips.
            let _spinner: TaskHandle<()> = ctx.spawn_named("spinner", |ctx| loop {
                ctx.yield_now();
            });
        })
        .expect("configuration is valid");

    match &report.failure.expect("liveness violation expected").error {
        TestError::LivenessViolation { monitor } => {
            assert_eq!(monitor, "pending-request");
        }
        other => panic!("expected liveness violation, got {other}"),
    }
}

#[test]
fn completed_obligation_stays_quiet() {
    let config = Configuration {
        iterations: 5,
        seed: 3,
        liveness_temperature: 50,
        ..Configuration::default()
    };

    let report = ControlledRuntime::new(config)
        .with_monitor(|| Box::new(ObligationMonitor::new()))
        .run(|ctx| {
            ctx.monitor_event("request");
            ctx.delay(1);
            ctx.monitor_event("complete");
        })
        .expect("configuration is valid");

    assert!(!report.found_bug(), "failure: {:?}", report.failure);
    assert_eq!(report.passed, 5);
}
