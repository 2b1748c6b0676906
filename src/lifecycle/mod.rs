// Process lifecycle: at-most-one-instance lockfile protocol, parent-process
// watchdog, and startup consistency repair.

pub mod lockfile;
pub mod repair;
pub mod watchdog;

pub use lockfile::{Lockfile, StartupOutcome};
pub use repair::{run_consistency_repair, RepairReport};
