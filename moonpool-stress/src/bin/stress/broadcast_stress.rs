//! Binary target for the echo broadcast stress suite.
//!
//! Runs the broadcast workload under the requested faults and exits non-zero
//! on the first failing run, printing its seed and calibration history for
//! `--replay` and `--history`.

use std::process;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use moonpool_stress::simulations::broadcast;
use moonpool_stress::{
    CalibrationContext, CrashMode, DistributedConfiguration, MessageOrder, NetworkPartitionMode,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Order {
    Synchronous,
    Fifo,
    Asynchronous,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Crashes {
    None,
    NoRecoveries,
    AllRecoveries,
    Mixed,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Partitions {
    None,
    Halves,
    SingleNode,
}

/// Stress the echo broadcast workload under injected faults.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Number of broadcasting nodes.
    #[arg(long, default_value_t = 4)]
    nodes: usize,
    /// Rumors originated by every node.
    #[arg(long, default_value_t = 3)]
    rumors: u64,
    /// Number of runs.
    #[arg(long, default_value_t = 100)]
    iterations: usize,
    /// Base seed the run seeds are derived from.
    #[arg(long)]
    seed: Option<u64>,
    /// Run exactly one iteration with this run seed.
    #[arg(long)]
    replay: Option<u64>,
    /// Calibration history to start from, as printed next to a failing seed.
    #[arg(long)]
    history: Option<usize>,
    /// Message ordering policy.
    #[arg(long, value_enum, default_value_t = Order::Asynchronous)]
    order: Order,
    /// Delivery probability.
    #[arg(long, default_value_t = 0.95)]
    reliability: f64,
    /// Allow duplicated deliveries.
    #[arg(long)]
    duplication: bool,
    /// Crash behaviour.
    #[arg(long, value_enum, default_value_t = Crashes::Mixed)]
    crashes: Crashes,
    /// Maximum number of concurrently failed nodes.
    #[arg(long, default_value_t = 1)]
    max_failed: usize,
    /// Partition shape.
    #[arg(long, value_enum, default_value_t = Partitions::Halves)]
    partitions: Partitions,
    /// Per-node completion timeout in milliseconds.
    #[arg(long, default_value_t = 5_000)]
    timeout_ms: u64,
}

impl Args {
    fn configuration(&self) -> DistributedConfiguration {
        let mut config = DistributedConfiguration::new(self.nodes);
        config.message_order = match self.order {
            Order::Synchronous => MessageOrder::Synchronous,
            Order::Fifo => MessageOrder::Fifo,
            Order::Asynchronous => MessageOrder::Asynchronous,
        };
        config.network_reliability = self.reliability;
        config.message_duplication = self.duplication;
        config.crash_mode = match self.crashes {
            Crashes::None => CrashMode::NoCrashes,
            Crashes::NoRecoveries => CrashMode::NoRecoveries,
            Crashes::AllRecoveries => CrashMode::AllRecoveries,
            Crashes::Mixed => CrashMode::Mixed,
        };
        config.max_failed_nodes = self.max_failed;
        config.partition_mode = match self.partitions {
            Partitions::None => NetworkPartitionMode::None,
            Partitions::Halves => NetworkPartitionMode::Halves,
            Partitions::SingleNode => NetworkPartitionMode::SingleNode,
        };
        config.operation_timeout = Duration::from_millis(self.timeout_ms);
        config.seed = self.seed;
        config
    }
}

fn main() {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let builder = broadcast::stress_builder(args.configuration(), args.rumors);
    let builder = match args.replay {
        Some(seed) => builder.set_debug_seeds(vec![seed]).set_iterations(1),
        None => builder.set_iterations(args.iterations),
    };
    let builder = match args.history {
        Some(points) => builder.calibration(CalibrationContext::with_history(points)),
        None => builder,
    };

    let report = match builder.run() {
        Ok(report) => report,
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(2);
        }
    };

    eprintln!("{report}");

    if let Some(seed) = report.failing_seed() {
        match report.failing_history {
            Some(points) => eprintln!("Replay with --replay {seed} --history {points}"),
            None => eprintln!("Replay with --replay {seed}"),
        }
        process::exit(1);
    }
}
