//! End-to-end sweep against the in-memory registry.
//!
//! Drives the scheduler tick-by-tick, simulating training runs whose loss
//! curves either converge or stall, so pruning and completion are both
//! visible in the log output.
//!
//! Run with: `cargo run --example local_sweep`

use anyhow::Result;
use sl_optimizer::OptimizerAdapter;
use sl_sched::{InMemoryRegistry, RecordingLauncher, RunStatus, Scheduler, SchedulerEvent};
use sl_types::{Direction, PrunerConfig, RunId, SchedulerConfig, SweepParameters};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let pruner = PrunerConfig {
        kind: "patient".into(),
        patience: Some(2),
        ..Default::default()
    };
    let parameters = SweepParameters::new()
        .add_float("log_learning_rate", 1e-5, 1e-1)
        .add_int("batch_size", 16, 256)
        .add_categorical(
            "optimizer",
            vec!["adam".into(), "sgd".into(), "rmsprop".into()],
        );

    let config = SchedulerConfig::new("demo-team", "local", "sweep-local", "val_loss", parameters)
        .with_direction(Direction::Minimize)
        .with_num_workers(2)
        .with_pruner(pruner.clone())
        .with_queue_timing(0.05, 0.0);

    let adapter = OptimizerAdapter::new(&pruner, Direction::Minimize);
    let mut scheduler = Scheduler::new(
        config,
        adapter,
        InMemoryRegistry::new(),
        RecordingLauncher::new(),
    )?;

    // Simulated training: every dispatched run starts producing a loss
    // curve; odd-numbered runs stall and should be pruned.
    let mut active: Vec<(RunId, u64, bool)> = Vec::new();
    let mut dispatched = 0usize;

    for tick in 0..30 {
        scheduler.tick()?;

        for event in scheduler.drain_events() {
            match event {
                SchedulerEvent::RunDispatched { run_id } => {
                    dispatched += 1;
                    let stalls = dispatched % 2 == 1;
                    scheduler.registry_mut().set_status(&run_id, RunStatus::Running);
                    active.push((run_id, 0, stalls));
                }
                SchedulerEvent::RunPruned { run_id } => {
                    println!("tick {tick:2}: pruned    {run_id}");
                    active.retain(|(id, _, _)| *id != run_id);
                }
                SchedulerEvent::RunCompleted { run_id } => {
                    println!("tick {tick:2}: completed {run_id}");
                    active.retain(|(id, _, _)| *id != run_id);
                }
                _ => {}
            }
        }

        // Advance every simulated run by one training step.
        for (run_id, step, stalls) in active.iter_mut() {
            let value = if *stalls {
                0.9
            } else {
                1.0 / (*step + 2) as f64
            };
            scheduler
                .registry_mut()
                .log_metric(run_id, "val_loss", *step, value);
            *step += 1;
            if *step >= 6 {
                scheduler.registry_mut().set_status(run_id, RunStatus::Finished);
            }
        }
    }

    println!(
        "trials created: {}, still live: {}",
        scheduler.adapter().trial_count(),
        scheduler.adapter().live_trial_count()
    );
    Ok(())
}
