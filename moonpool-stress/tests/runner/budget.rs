//! Message budgets.

use moonpool_stress::{
    BudgetViolation, DistributedConfiguration, InvocationResult, Operation, RunnerState,
};

use crate::support::{init_logging, runner, Peer};

fn chatter(count: u32, receiver: usize) -> Vec<Operation<Peer>> {
    vec![Operation::void("chatter", move |peer: &Peer| {
        for body in 0..count {
            peer.send(body, receiver);
        }
    })]
}

#[test]
fn test_per_node_budget() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.messages_per_node = 1;
    let mut runner = runner(config, vec![chatter(2, 1), Vec::new()]);

    let outcome = runner.run().expect("run");
    assert_eq!(runner.state(), RunnerState::InvariantViolated);
    let InvocationResult::BudgetExceeded {
        violation, counts, ..
    } = outcome
    else {
        panic!("expected a budget violation");
    };
    assert_eq!(
        violation,
        BudgetViolation::PerNode {
            node: 0,
            sent: 2,
            limit: 1
        }
    );
    assert_eq!(counts, vec![2, 0]);
}

#[test]
fn test_total_budget() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.total_messages = 3;
    let mut runner = runner(config, vec![chatter(2, 1), chatter(2, 0)]);

    let outcome = runner.run().expect("run");
    let InvocationResult::BudgetExceeded { violation, .. } = outcome else {
        panic!("expected a budget violation");
    };
    assert_eq!(violation, BudgetViolation::Total { sent: 4, limit: 3 });
}

#[test]
fn test_budget_at_limit_passes() {
    init_logging();
    let mut config = DistributedConfiguration::new(2);
    config.messages_per_node = 2;
    config.total_messages = 2;
    let mut runner = runner(config, vec![chatter(2, 1), Vec::new()]);

    assert!(runner.run().expect("run").is_completed());
}
