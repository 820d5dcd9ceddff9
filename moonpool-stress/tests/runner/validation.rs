//! Post-run validation.

use moonpool_stress::{
    CalibrationContext, DistributedConfiguration, DistributedRunner, ExecutionScenario,
    InvocationResult, Operation, RunnerError, RunnerState,
};

use crate::support::{init_logging, runner, Peer};

#[test]
fn test_validation_failure_drops_post_phase() {
    init_logging();
    let scenario = ExecutionScenario {
        init: vec![Operation::void("setup", |_: &Peer| {})],
        parallel: vec![vec![Operation::void("a", |_: &Peer| {})], Vec::new()],
        post: vec![Operation::void("cleanup", |_: &Peer| {})],
    };
    let mut runner = DistributedRunner::new(
        DistributedConfiguration::new(2),
        scenario,
        Box::new(Peer::strict),
        CalibrationContext::new(),
    )
    .expect("valid runner");

    let outcome = runner.run_with_seed(9).expect("run");
    assert_eq!(runner.state(), RunnerState::InvariantViolated);
    let InvocationResult::ValidationFailed {
        seed,
        scenario,
        node,
        group,
        message,
    } = &outcome
    else {
        panic!("expected a validation failure, got {outcome}");
    };
    assert_eq!(*seed, 9);
    assert_eq!(*node, 1);
    assert_eq!(group, "node");
    assert_eq!(message, "node 1 rejects every run");
    assert_eq!(scenario.init.len(), 1);
    assert!(scenario.post.is_empty());
}

#[test]
fn test_runner_construction_errors() {
    let err = DistributedRunner::new(
        DistributedConfiguration::new(3),
        ExecutionScenario::parallel(vec![Vec::<Operation<Peer>>::new(); 2]),
        Box::new(Peer::new),
        CalibrationContext::new(),
    )
    .expect_err("scenario size must match");
    assert!(matches!(
        err,
        RunnerError::ScenarioMismatch {
            expected: 3,
            actual: 2
        }
    ));

    let err = DistributedRunner::new(
        DistributedConfiguration::new(0),
        ExecutionScenario::parallel(Vec::<Vec<Operation<Peer>>>::new()),
        Box::new(Peer::new),
        CalibrationContext::new(),
    )
    .expect_err("no nodes");
    assert!(matches!(err, RunnerError::Config(_)));
}

#[test]
fn test_closed_runner_refuses_runs() {
    init_logging();
    let mut runner = runner(DistributedConfiguration::new(2), vec![Vec::new(), Vec::new()]);
    assert!(runner.run().expect("run").is_completed());

    runner.close();
    runner.close();
    assert!(matches!(runner.run(), Err(RunnerError::Closed)));
}
