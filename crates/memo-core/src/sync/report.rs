//! Outcome types returned by the reconciler

use serde::Serialize;

use crate::config::ProviderKind;

/// How the remote listing was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullSource {
    #[default]
    Primary,
    Secondary,
    /// Both paths failed and the merge ran against an empty listing
    Unavailable,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub provider: ProviderKind,
    /// Unix millis taken before the pull; becomes the checkpoint of a clean run
    pub started_at: i64,
    pub pulled: usize,
    pub pull_source: PullSource,
    pub merged: usize,
    pub added: usize,
    pub updated: usize,
    pub dropped: usize,
    pub pushed: usize,
    pub push_failures: usize,
    pub deletes_propagated: usize,
    pub deletes_failed: usize,
    pub settings_pushed: bool,
    pub warning: Option<String>,
    /// The request joined a run already in flight
    pub coalesced: bool,
    /// Number of extra passes run for requests that arrived mid-run
    pub chained: usize,
}

impl SyncReport {
    pub const fn new(provider: ProviderKind) -> Self {
        Self {
            provider,
            started_at: 0,
            pulled: 0,
            pull_source: PullSource::Primary,
            merged: 0,
            added: 0,
            updated: 0,
            dropped: 0,
            pushed: 0,
            push_failures: 0,
            deletes_propagated: 0,
            deletes_failed: 0,
            settings_pushed: false,
            warning: None,
            coalesced: false,
            chained: 0,
        }
    }

    pub const fn coalesced(provider: ProviderKind) -> Self {
        let mut report = Self::new(provider);
        report.coalesced = true;
        report
    }

    /// Fold an earlier pass into this one. Counters accumulate; the latest
    /// pull state wins.
    #[must_use]
    pub fn chained_after(mut self, earlier: Self) -> Self {
        self.added += earlier.added;
        self.updated += earlier.updated;
        self.dropped += earlier.dropped;
        self.deletes_propagated += earlier.deletes_propagated;
        self.deletes_failed += earlier.deletes_failed;
        self.warning = self.warning.or(earlier.warning);
        self.chained = earlier.chained + 1;
        self
    }

    /// Whether everything pulled and pushed cleanly.
    pub fn is_clean(&self) -> bool {
        self.pull_source != PullSource::Unavailable
            && self.push_failures == 0
            && self.deletes_failed == 0
    }
}

/// Result of seeding an empty local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum RestoreOutcome {
    Restored { count: usize, needs_sync: bool },
    /// Local data exists; a merge sync should follow
    NeedsMerge,
    /// Local data exists and sync is off
    KeptLocal,
    /// The remote could not be read
    Unavailable,
}

/// Summary of a provider switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SwitchReport {
    pub from: ProviderKind,
    pub to: ProviderKind,
    pub merged: usize,
    pub push_failures: usize,
    pub warning: Option<String>,
    pub changed: bool,
}

impl SwitchReport {
    pub const fn new(from: ProviderKind, to: ProviderKind) -> Self {
        Self {
            from,
            to,
            merged: 0,
            push_failures: 0,
            warning: None,
            changed: true,
        }
    }

    pub const fn unchanged(provider: ProviderKind) -> Self {
        let mut report = Self::new(provider, provider);
        report.changed = false;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chained_reports_accumulate() {
        let mut first = SyncReport::new(ProviderKind::D1);
        first.added = 2;
        first.warning = Some("quota".to_string());
        let mut second = SyncReport::new(ProviderKind::D1);
        second.added = 1;
        second.pulled = 7;

        let report = second.chained_after(first);
        assert_eq!(report.added, 3);
        assert_eq!(report.pulled, 7);
        assert_eq!(report.chained, 1);
        assert_eq!(report.warning.as_deref(), Some("quota"));
    }

    #[test]
    fn unavailable_pull_is_not_clean() {
        let mut report = SyncReport::new(ProviderKind::Supabase);
        assert!(report.is_clean());
        report.pull_source = PullSource::Unavailable;
        assert!(!report.is_clean());
    }
}
