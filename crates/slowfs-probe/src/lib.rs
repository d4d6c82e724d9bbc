//! Client harnesses for slowfs.
//!
//! Both harnesses work against any directory. Pointed at a slowfs mount they
//! exercise `open(2)` while the filesystem holds every create:
//!
//! - [`stress`]: many threads open/truncate one file while child processes
//!   churn, flooding the process with `SIGCHLD`.
//! - [`probe`]: one create raced against a single signal sent to the own
//!   process.

pub mod probe;
pub mod stress;

pub use probe::{run_probe, CreateMode, ProbeConfig, ProbeError, ProbeOutcome};
pub use stress::{run_open_stress, OpenStress, StopHandle, StressConfig, StressError, StressReport};
