//! Request/response over a reliable synchronous network.

use moonpool_stress::{DistributedConfiguration, Event, Operation, OperationResult, RunnerState};

use crate::support::{init_logging, route, runner, Peer, PING, PONG};

fn ping_then_wait() -> Operation<Peer> {
    Operation::value("ping", |peer: &Peer| {
        peer.send(PING, 1);
        peer.wait_for(PONG)
    })
}

#[test]
fn test_ping_pong_event_log() {
    init_logging();
    let mut config = DistributedConfiguration::new(3);
    config.seed = Some(42);
    let mut runner = runner(config, vec![vec![ping_then_wait()], Vec::new(), Vec::new()]);

    let outcome = runner.run().expect("run");
    assert_eq!(runner.state(), RunnerState::Completed);
    let result = outcome.completed().expect("completed run");

    let routes: Vec<(bool, (usize, usize, u32))> = result
        .events
        .iter()
        .filter_map(|e| route(e).map(|r| (e.is_sent(), r)))
        .collect();
    assert_eq!(
        routes,
        vec![
            (true, (0, 1, PING)),
            (false, (0, 1, PING)),
            (true, (1, 0, PONG)),
            (false, (1, 0, PONG)),
        ]
    );
    assert!(result
        .events
        .iter()
        .all(|e| matches!(e, Event::MessageSent { .. } | Event::MessageDelivered { .. })));
    assert_eq!(result.message_counts, vec![1, 1, 0]);
    assert_eq!(
        result.parallel_results[0][0].result,
        OperationResult::Value("true".to_string())
    );
    assert!(result.parallel_results[1].is_empty());
    assert!(result.state_representation.starts_with("MESSAGES\n"));
    assert!(result.state_representation.contains("NODE STATES\n0: received [(1, 10)]"));
}

#[test]
fn test_runs_are_independent() {
    init_logging();
    let mut runner = runner(
        DistributedConfiguration::new(2),
        vec![vec![ping_then_wait()], Vec::new()],
    );

    for _ in 0..3 {
        let outcome = runner.run().expect("run");
        let result = outcome.completed().expect("completed run");
        assert_eq!(result.events.len(), 4, "event log is cleared between runs");
        assert_eq!(result.message_counts, vec![1, 1]);
    }
    assert_eq!(runner.invocations(), 3);
}

#[test]
fn test_explicit_seed_is_reported() {
    init_logging();
    let mut runner = runner(DistributedConfiguration::new(2), vec![Vec::new(), Vec::new()]);
    let outcome = runner.run_with_seed(1234).expect("run");
    assert!(outcome.is_completed());
    assert_eq!(outcome.seed(), 1234);
}
