//! Crashes without recovery.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use moonpool_stress::{
    CalibrationContext, CrashMode, DistributedConfiguration, Event, NodeGroup, Operation,
};

use crate::support::{init_logging, route, runner_with, Peer};

#[test]
fn test_crashed_node_stops_sending_and_receiving() {
    init_logging();
    let mut config = DistributedConfiguration::new(3);
    config.crash_mode = CrashMode::NoRecoveries;
    config.max_failed_nodes = 1;
    config.expected_failures = Some(1_000);

    let crashed = Arc::new(AtomicBool::new(false));
    let signal = Arc::clone(&crashed);
    let wait = Arc::clone(&crashed);
    let parallel = vec![
        vec![Operation::void("send to 2 after crash", move |peer: &Peer| {
            while !wait.load(Ordering::Acquire) && peer.env.is_running() {
                std::thread::sleep(Duration::from_millis(1));
            }
            peer.send(7, 2);
        })],
        Vec::new(),
        vec![
            Operation::void("first send", move |peer: &Peer| {
                peer.send(1, 0);
                signal.store(true, Ordering::Release);
            }),
            Operation::void("second send", |peer: &Peer| peer.send(2, 0)),
        ],
    ];
    let mut runner = runner_with(config, parallel, Peer::new, CalibrationContext::with_history(1));

    let outcome = runner.run().expect("run");
    let result = outcome.completed().expect("failed nodes do not block completion");

    assert_eq!(result.events[0], Event::NodeCrash { node: 2 });
    let routes: Vec<_> = result.events.iter().filter_map(route).collect();
    assert_eq!(routes, vec![(0, 2, 7)], "only node 0's send is logged and never delivered");
    assert!(!result.events.iter().any(Event::is_delivered));
    assert_eq!(result.message_counts, vec![1, 0, 1]);
}

#[test]
fn test_failures_are_capped() {
    init_logging();
    let mut config = DistributedConfiguration::new(3);
    config.crash_mode = CrashMode::NoRecoveries;
    config.max_failed_nodes = 1;
    config.expected_failures = Some(1_000);

    let parallel = (0..3)
        .map(|id| {
            vec![Operation::void("send to next", move |peer: &Peer| {
                peer.send(1, (id + 1) % 3)
            })]
        })
        .collect();
    let mut runner = runner_with(config, parallel, Peer::new, CalibrationContext::with_history(1));

    let outcome = runner.run().expect("run");
    let result = outcome.completed().expect("completed run");
    let crashes: Vec<_> = result
        .events
        .iter()
        .filter(|e| matches!(e, Event::NodeCrash { .. }))
        .collect();
    assert_eq!(crashes.len(), 1);
    assert_eq!(result.events.iter().filter(|e| e.is_sent()).count(), 2);
    assert_eq!(result.message_counts, vec![1, 1, 1]);
}

#[test]
fn test_extra_groups_get_ids_after_scenario_nodes() {
    let mut config =
        DistributedConfiguration::new(2).with_group(NodeGroup::new("witness", 1, false));
    config.node_group = "client".to_string();
    let runner = runner_with(
        config,
        vec![Vec::new(), Vec::new()],
        Peer::new,
        CalibrationContext::new(),
    );

    assert_eq!(runner.resolver().ids_for("client"), vec![0, 1]);
    assert_eq!(runner.resolver().ids_for("witness"), vec![2]);
    assert!(runner.resolver().can_fail(0));
    assert!(!runner.resolver().can_fail(2));
}
