//! Offline-first reconciliation with a remote provider.
//!
//! [`merge`] holds the pure rules, [`Reconciler`] runs them against local
//! storage and a [`crate::remote::RemoteAdapter`], and [`Scheduler`] decides
//! when to run.

pub mod merge;
mod reconciler;
mod report;
mod scheduler;

pub use merge::DELETION_SAFETY_WINDOW_MS;
pub use reconciler::{pull_notes, Pulled, Reconciler, RunPhase};
pub use report::{PullSource, RestoreOutcome, SwitchReport, SyncReport};
pub use scheduler::{Scheduler, SchedulerStats, SyncTrigger, Trigger};
