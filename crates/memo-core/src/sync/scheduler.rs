//! Decides when reconciliation runs.
//!
//! Local changes are debounced, runs are spaced apart, lifecycle events
//! (startup, focus, network back online) run immediately, and guests get a
//! periodic public refresh. Everything happens on one awaited loop, so runs
//! never overlap from the scheduler's side.

use std::future;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};

use super::reconciler::Reconciler;
use crate::config::SchedulePolicy;
use crate::error::Error;
use crate::events::{ChangeFeed, DataPart, Subscription};
use crate::remote::RemoteAdapter;

/// Something that may warrant a sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// Local data changed
    Changed(DataPart),
    /// Startup, focus, visibility or connectivity regained
    Lifecycle,
    /// Stop the loop
    Shutdown,
}

/// Cloneable handle for sending triggers into a running scheduler.
#[derive(Debug, Clone)]
pub struct SyncTrigger {
    sender: mpsc::UnboundedSender<Trigger>,
}

impl SyncTrigger {
    /// Returns false once the scheduler has stopped.
    pub fn send(&self, trigger: Trigger) -> bool {
        self.sender.send(trigger).is_ok()
    }

    pub fn shutdown(&self) -> bool {
        self.send(Trigger::Shutdown)
    }
}

/// Counters from a finished scheduler loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub runs: usize,
    pub failures: usize,
    pub refreshes: usize,
}

pub struct Scheduler<'a, R> {
    reconciler: &'a Reconciler<R>,
    policy: SchedulePolicy,
    sender: mpsc::UnboundedSender<Trigger>,
    receiver: mpsc::UnboundedReceiver<Trigger>,
    last_start: Option<Instant>,
    last_finish: Option<Instant>,
    stats: SchedulerStats,
    _subscription: Subscription,
}

impl<'a, R: RemoteAdapter> Scheduler<'a, R> {
    /// Create a scheduler fed by every change emitted on `changes`.
    pub fn new(
        reconciler: &'a Reconciler<R>,
        changes: &Arc<ChangeFeed>,
        policy: SchedulePolicy,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let feed_sender = sender.clone();
        let subscription = changes.subscribe(move |part| {
            // A closed channel means the loop already stopped.
            let _ = feed_sender.send(Trigger::Changed(part));
        });
        Self {
            reconciler,
            policy,
            sender,
            receiver,
            last_start: None,
            last_finish: None,
            stats: SchedulerStats::default(),
            _subscription: subscription,
        }
    }

    pub fn trigger(&self) -> SyncTrigger {
        SyncTrigger {
            sender: self.sender.clone(),
        }
    }

    /// Run until a [`Trigger::Shutdown`] arrives.
    pub async fn run(mut self) -> SchedulerStats {
        let mut deadline: Option<Instant> = None;
        let mut guest_refresh = time::interval(self.policy.guest_refresh());
        guest_refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                trigger = self.receiver.recv() => match trigger {
                    None | Some(Trigger::Shutdown) => break,
                    Some(Trigger::Changed(part)) => {
                        if self.reconciler.can_sync() {
                            let at = self.next_run_at();
                            tracing::debug!("{} changed, sync in {:?}", part, at - Instant::now());
                            deadline = Some(at);
                        }
                    }
                    Some(Trigger::Lifecycle) => {
                        if self.reconciler.can_sync() {
                            self.run_sync().await;
                            deadline = self.chain_deadline();
                        } else if !self.reconciler.is_authenticated() {
                            self.refresh_public().await;
                        }
                    }
                },
                () = sleep_until(deadline) => {
                    self.run_sync().await;
                    deadline = self.chain_deadline();
                }
                _ = guest_refresh.tick(), if !self.reconciler.is_authenticated() => {
                    self.refresh_public().await;
                }
            }
        }

        tracing::debug!(
            "Scheduler stopped after {} runs ({} failed)",
            self.stats.runs,
            self.stats.failures
        );
        self.stats
    }

    fn next_run_at(&self) -> Instant {
        let now = Instant::now();
        let delay = self.policy.delay_for(
            self.last_start.map(|start| now - start),
            self.last_finish.map(|finish| now - finish),
        );
        now + delay
    }

    /// Schedule a follow-up pass when requests arrived during the last run.
    fn chain_deadline(&self) -> Option<Instant> {
        self.reconciler
            .has_pending()
            .then(|| Instant::now() + self.policy.chain_delay())
    }

    async fn run_sync(&mut self) {
        self.last_start = Some(Instant::now());
        self.stats.runs += 1;
        match self.reconciler.sync().await {
            Ok(report) if report.coalesced => {}
            Ok(report) => {
                if let Some(warning) = report.warning {
                    tracing::warn!("{}", warning);
                }
            }
            Err(Error::AuthRequired) => {
                self.stats.failures += 1;
                tracing::warn!("Sync skipped: session expired");
            }
            Err(error) => {
                self.stats.failures += 1;
                tracing::error!("Sync failed: {}", error);
            }
        }
        self.last_finish = Some(Instant::now());
    }

    async fn refresh_public(&mut self) {
        match self.reconciler.refresh_public().await {
            Ok(changed) => {
                self.stats.refreshes += 1;
                if changed {
                    tracing::info!("Public notes refreshed");
                }
            }
            Err(error) => tracing::warn!("Public refresh failed: {}", error),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProviderKind;
    use crate::models::Note;
    use crate::remote::MemoryRemote;
    use crate::store::{LocalStore, NoteDraft};
    use std::time::Duration;

    fn setup(authenticated: bool) -> (Reconciler<MemoryRemote>, MemoryRemote, Arc<ChangeFeed>) {
        let remote = MemoryRemote::new(ProviderKind::D1);
        let changes = ChangeFeed::new();
        let reconciler = Reconciler::new(
            LocalStore::open_in_memory().unwrap(),
            Arc::clone(&changes),
            vec![remote.clone()],
            ProviderKind::D1,
        )
        .unwrap();
        reconciler.set_authenticated(authenticated);
        reconciler.set_sync_enabled(true).unwrap();
        (reconciler, remote, changes)
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_changes_runs_once() {
        let (reconciler, remote, changes) = setup(true);
        let scheduler = Scheduler::new(&reconciler, &changes, SchedulePolicy::default());
        let trigger = scheduler.trigger();

        let drive = async {
            for text in ["one", "two", "three"] {
                reconciler.notes().create(text, NoteDraft::default()).unwrap();
                time::sleep(Duration::from_millis(50)).await;
            }
            time::sleep(Duration::from_secs(1)).await;
            trigger.shutdown();
        };
        let (stats, ()) = tokio::join!(scheduler.run(), drive);

        assert_eq!(stats.runs, 1);
        assert_eq!(remote.notes().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn runs_are_spaced_apart() {
        let (reconciler, remote, changes) = setup(true);
        let scheduler = Scheduler::new(&reconciler, &changes, SchedulePolicy::default());
        let trigger = scheduler.trigger();

        let drive = async {
            reconciler.notes().create("first", NoteDraft::default()).unwrap();
            time::sleep(Duration::from_secs(1)).await;
            assert_eq!(remote.upserted().len(), 1);

            reconciler.notes().create("second", NoteDraft::default()).unwrap();
            time::sleep(Duration::from_secs(2)).await;
            assert_eq!(remote.upserted().len(), 1);

            time::sleep(Duration::from_secs(3)).await;
            assert_eq!(remote.notes().len(), 2);
            trigger.shutdown();
        };
        let (stats, ()) = tokio::join!(scheduler.run(), drive);

        assert_eq!(stats.runs, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn lifecycle_trigger_runs_immediately() {
        let (reconciler, remote, changes) = setup(true);
        remote.insert(Note::new("from another device"));
        let scheduler = Scheduler::new(&reconciler, &changes, SchedulePolicy::default());
        let trigger = scheduler.trigger();

        let drive = async {
            trigger.send(Trigger::Lifecycle);
            time::sleep(Duration::from_millis(1)).await;
            assert_eq!(reconciler.notes().notes().unwrap().len(), 1);
            trigger.shutdown();
        };
        let (stats, ()) = tokio::join!(scheduler.run(), drive);

        assert_eq!(stats.runs, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn guests_refresh_public_notes_and_never_sync() {
        let (reconciler, remote, changes) = setup(false);
        let mut public = Note::new("hello world");
        public.is_public = true;
        remote.insert(public);
        let policy = SchedulePolicy::default();
        let scheduler = Scheduler::new(&reconciler, &changes, policy);
        let trigger = scheduler.trigger();

        let drive = async {
            time::sleep(Duration::from_millis(10)).await;
            assert_eq!(reconciler.notes().notes().unwrap().len(), 1);
            trigger.send(Trigger::Lifecycle);
            time::sleep(policy.guest_refresh() + Duration::from_millis(10)).await;
            trigger.shutdown();
        };
        let (stats, ()) = tokio::join!(scheduler.run(), drive);

        assert_eq!(stats.runs, 0);
        assert_eq!(stats.refreshes, 3);
        assert!(remote.upserted().is_empty());
    }

    #[tokio::test]
    async fn dropping_the_scheduler_unsubscribes() {
        let (reconciler, _remote, changes) = setup(true);
        let scheduler = Scheduler::new(&reconciler, &changes, SchedulePolicy::default());
        assert_eq!(changes.subscriber_count(), 1);
        drop(scheduler);
        assert_eq!(changes.subscriber_count(), 0);
    }
}
