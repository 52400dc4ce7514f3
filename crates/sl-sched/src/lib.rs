//! # sl-sched
//!
//! The Sweepline scheduler core: a single-threaded control loop that turns
//! search-algorithm suggestions into managed training runs, polls their
//! metrics, prunes underperformers, and reports terminal outcomes back to
//! the algorithm while keeping a fixed worker pool saturated.
//!
//! The experiment-tracking backend ([`RunRegistry`]), the job launcher
//! ([`Launcher`]), and the liveness probe ([`Liveness`]) are external
//! collaborators consumed through traits; [`InMemoryRegistry`] and
//! [`RecordingLauncher`] provide fully in-process versions for development
//! and tests.

mod launcher;
mod poller;
mod queue;
mod registry;
mod scheduler;

pub use launcher::{build_launch_payload, Launcher, LaunchPayload, RecordingLauncher};
pub use queue::DispatchQueue;
pub use registry::{InMemoryRegistry, MetricSample, RunRegistry, RunStatus};
pub use scheduler::{
    AlwaysAlive, Liveness, LoopState, Scheduler, SchedulerControl, SchedulerEvent,
};
