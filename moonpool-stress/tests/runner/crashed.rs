//! Panicking operations and message handlers.

use moonpool_stress::{DistributedConfiguration, InvocationResult, Operation, RunnerState};

use crate::support::{init_logging, runner, Peer, POISON};

#[test]
fn test_operation_panic_names_the_node() {
    init_logging();
    let parallel = vec![
        vec![Operation::void("fine", |_: &Peer| {})],
        vec![Operation::void("explode", |_: &Peer| panic!("operation exploded"))],
    ];
    let mut runner = runner(DistributedConfiguration::new(2), parallel);

    let outcome = runner.run().expect("run");
    assert_eq!(runner.state(), RunnerState::Crashed);
    let InvocationResult::Crashed { node, cause, .. } = &outcome else {
        panic!("expected a crash, got {outcome}");
    };
    assert_eq!(*node, Some(1));
    assert_eq!(cause, "operation exploded");

    let outcome = runner.run().expect("runner is usable after a crash");
    assert!(matches!(outcome, InvocationResult::Crashed { node: Some(1), .. }));
}

#[test]
fn test_handler_panic_has_no_node() {
    init_logging();
    let parallel = vec![
        vec![Operation::void("poison", |peer: &Peer| {
            peer.send(POISON, 1);
            while peer.env.is_running() {
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
        })],
        Vec::new(),
    ];
    let mut runner = runner(DistributedConfiguration::new(2), parallel);

    let outcome = runner.run().expect("run");
    let InvocationResult::Crashed { node, cause, .. } = &outcome else {
        panic!("expected a crash, got {outcome}");
    };
    assert_eq!(*node, None);
    assert_eq!(cause, "poisoned by node 0");
}
