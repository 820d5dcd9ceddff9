//! Stress suites.

use std::time::Duration;

use moonpool_stress::simulations::broadcast;
use moonpool_stress::{
    CalibrationContext, CrashMode, DistributedConfiguration, ExecutionScenario, InvocationResult,
    MessageOrder, NetworkPartitionMode, Operation, StressBuilder,
};

use crate::support::{init_logging, Peer};

#[test]
fn test_broadcast_suite_under_faults() {
    init_logging();
    let mut config = DistributedConfiguration::new(4);
    config.message_order = MessageOrder::Asynchronous;
    config.network_reliability = 0.9;
    config.message_duplication = true;
    config.crash_mode = CrashMode::AllRecoveries;
    config.max_failed_nodes = 1;
    config.partition_mode = NetworkPartitionMode::Halves;
    config.partition_duration = Duration::from_millis(1)..Duration::from_millis(5);
    config.seed = Some(2024);

    let report = broadcast::stress_builder(config, 3)
        .set_iterations(5)
        .run()
        .expect("suite");

    assert!(report.is_success(), "{report}");
    assert_eq!(report.iterations, 5);
    assert_eq!(report.successful_runs, 5);
    assert_eq!(report.seeds_used.len(), 5);
    assert_eq!(report.failing_seed(), None);
}

#[test]
fn test_debug_seeds_run_first() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.seed = Some(1);
    let report = broadcast::stress_builder(config, 1)
        .set_debug_seeds(vec![77, 78])
        .set_iterations(3)
        .run()
        .expect("suite");

    assert_eq!(&report.seeds_used[..2], &[77, 78]);
    assert_eq!(report.seeds_used.len(), 3);
}

#[test]
fn test_suite_stops_at_first_failure() {
    init_logging();
    let scenario = ExecutionScenario::parallel(vec![
        vec![Operation::void("explode", |_: &Peer| panic!("boom"))],
        Vec::new(),
    ]);
    let mut config = DistributedConfiguration::new(2);
    config.seed = Some(5);

    let report = StressBuilder::new(config, scenario, Peer::new)
        .set_iterations(10)
        .run()
        .expect("suite");

    assert!(!report.is_success());
    assert_eq!(report.iterations, 1);
    assert_eq!(report.failed_runs, 1);
    assert_eq!(report.failing_seed(), Some(report.seeds_used[0]));
    assert!(matches!(
        report.failure,
        Some(InvocationResult::Crashed { node: Some(0), .. })
    ));
    assert!(report.to_string().contains("Faulty seed"));
}

#[test]
fn test_time_limited_suite() {
    init_logging();
    let report = broadcast::stress_builder(DistributedConfiguration::new(2), 1)
        .set_time_limit(Duration::from_millis(200))
        .run()
        .expect("suite");

    assert!(report.is_success(), "{report}");
    assert!(report.iterations >= 1);
}

fn crash_prone() -> (DistributedConfiguration, ExecutionScenario<Peer>) {
    let mut config = DistributedConfiguration::new(3);
    config.crash_mode = CrashMode::NoRecoveries;
    config.max_failed_nodes = 1;
    config.expected_failures = Some(1_000);
    config.seed = Some(11);
    let parallel = (0..3)
        .map(|id| {
            vec![Operation::void("send to next", move |peer: &Peer| {
                peer.send(1, (id + 1) % 3)
            })]
        })
        .collect();
    (config, ExecutionScenario::parallel(parallel))
}

#[test]
fn test_failing_history_replays_fault_driven_failure() {
    init_logging();
    // The first run has no history, so it cannot crash and folds in its three sends.
    let (config, scenario) = crash_prone();
    let report = StressBuilder::new(config, scenario, Peer::crash_intolerant)
        .set_iterations(5)
        .run()
        .expect("suite");

    assert_eq!(report.iterations, 2, "{report}");
    assert_eq!(report.successful_runs, 1);
    assert_eq!(report.failing_history, Some(3));
    assert!(report.to_string().contains("Calibration history: 3"));
    let seed = report.failing_seed().expect("failing seed");

    let (config, scenario) = crash_prone();
    let replay = StressBuilder::new(config, scenario, Peer::crash_intolerant)
        .set_debug_seeds(vec![seed])
        .set_iterations(1)
        .calibration(CalibrationContext::with_history(3))
        .run()
        .expect("replay");
    assert_eq!(replay.failing_seed(), Some(seed));
    assert!(matches!(
        replay.failure,
        Some(InvocationResult::ValidationFailed { .. })
    ));

    let (config, scenario) = crash_prone();
    let cold = StressBuilder::new(config, scenario, Peer::crash_intolerant)
        .set_debug_seeds(vec![seed])
        .set_iterations(1)
        .run()
        .expect("replay without history");
    assert!(cold.is_success(), "{cold}");
}
