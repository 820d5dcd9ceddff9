//! Deadlock detection.

use std::time::Duration;

use moonpool_stress::{DistributedConfiguration, InvocationResult, Operation, RunnerState};

use crate::support::{init_logging, runner, Peer, PONG};

#[test]
fn test_stuck_node_is_reported_with_its_operation() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.operation_timeout = Duration::from_millis(200);

    let parallel = vec![
        vec![Operation::void("warm up", |_: &Peer| {})],
        vec![
            Operation::void("noop", |_: &Peer| {}),
            Operation::void("hang", |_: &Peer| std::thread::sleep(Duration::from_secs(2))),
        ],
    ];
    let mut runner = runner(config, parallel);

    let outcome = runner.run().expect("run");
    assert_eq!(runner.state(), RunnerState::Deadlocked);
    let InvocationResult::Deadlocked { snapshot, .. } = &outcome else {
        panic!("expected a deadlock, got {outcome}");
    };

    assert_eq!(snapshot.len(), 2);
    assert!(snapshot[0].finished());
    assert_eq!(snapshot[1].completed_operations, 1);
    assert_eq!(snapshot[1].current_operation.as_deref(), Some("hang"));
    assert!(!snapshot[1].failed);
    assert!(outcome.to_string().contains("hang"));
}

#[test]
fn test_runner_recovers_after_deadlock() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.operation_timeout = Duration::from_millis(200);

    // Node 1 never answers: PONG is only sent in reply to PING.
    let parallel = vec![
        vec![Operation::value("wait for pong", |peer: &Peer| {
            peer.send(PONG, 1);
            peer.wait_for(PONG)
        })],
        Vec::new(),
    ];
    let mut runner = runner(config, parallel);

    let first = runner.run().expect("run");
    assert!(matches!(first, InvocationResult::Deadlocked { .. }));

    let second = runner.run().expect("runner is usable after a deadlock");
    assert!(matches!(second, InvocationResult::Deadlocked { .. }));
    assert_eq!(runner.invocations(), 2);
}

#[test]
fn test_abandoned_thread_does_not_touch_next_run_progress() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.operation_timeout = Duration::from_millis(200);

    // The first run's "hang" finishes while the second run's copy is still stuck.
    let parallel = vec![
        Vec::new(),
        vec![
            Operation::void("noop", |_: &Peer| {}),
            Operation::void("hang", |_: &Peer| {
                std::thread::sleep(Duration::from_millis(300))
            }),
        ],
    ];
    let mut runner = runner(config, parallel);

    for run in 0..2 {
        let outcome = runner.run().expect("run");
        let InvocationResult::Deadlocked { snapshot, .. } = &outcome else {
            panic!("run {run}: expected a deadlock, got {outcome}");
        };
        assert_eq!(snapshot[1].completed_operations, 1, "run {run}");
        assert_eq!(snapshot[1].current_operation.as_deref(), Some("hang"));
    }
}
