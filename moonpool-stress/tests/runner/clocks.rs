//! Logical clock tracking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moonpool_stress::{ClockMode, DistributedConfiguration, Operation};

use crate::support::{init_logging, runner, Peer};

fn config(mode: ClockMode) -> DistributedConfiguration {
    let mut config = DistributedConfiguration::new(2);
    config.logical_clocks = mode;
    config
}

#[test]
fn test_clocks_capture_completed_operations() {
    init_logging();
    let first_done = Arc::new(AtomicBool::new(false));
    let signal = Arc::clone(&first_done);
    let wait = Arc::clone(&first_done);
    let parallel = vec![
        vec![
            Operation::void("a0", |_: &Peer| {}),
            Operation::void("a1", move |_: &Peer| signal.store(true, Ordering::Release)),
        ],
        vec![
            Operation::void("wait", move |peer: &Peer| {
                while !wait.load(Ordering::Acquire) && peer.env.is_running() {
                    std::thread::sleep(Duration::from_millis(1));
                }
                // a1 stores progress after returning.
                std::thread::sleep(Duration::from_millis(20));
            }),
            Operation::void("b1", |_: &Peer| {}),
        ],
    ];
    let mut runner = runner(config(ClockMode::Always), parallel);

    let outcome = runner.run().expect("run");
    let result = outcome.completed().expect("completed run");
    assert!(result.used_clocks);

    let own = &result.parallel_results[0];
    assert_eq!(own[0].clock.values()[0], 0);
    assert_eq!(own[1].clock.values()[0], 1);

    let other = &result.parallel_results[1][1].clock;
    assert_eq!(other.values(), &[2, 1]);
    assert!(other.happens_before(0, 1));
    assert!(!other.happens_before(1, 1));
}

#[test]
fn test_clocks_disabled() {
    init_logging();
    let parallel = vec![
        vec![
            Operation::void("a0", |_: &Peer| {}),
            Operation::void("a1", |_: &Peer| {}),
        ],
        vec![Operation::void("b0", |_: &Peer| {})],
    ];
    let mut runner = runner(config(ClockMode::Never), parallel);

    let outcome = runner.run().expect("run");
    let result = outcome.completed().expect("completed run");
    assert!(!result.used_clocks);
    assert!(result
        .parallel_results
        .iter()
        .flatten()
        .all(|r| r.clock.is_empty()));
}
