//! Results and progress events of sync operations.

use std::fmt;

use uuid::Uuid;

use super::kind::EntityKind;

/// Phases of a sync cycle, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    PushCreates,
    PushUpdates,
    PushDeletes,
    Pull,
    ResolveConflicts,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::PushCreates => write!(f, "push creates"),
            SyncPhase::PushUpdates => write!(f, "push updates"),
            SyncPhase::PushDeletes => write!(f, "push deletes"),
            SyncPhase::Pull => write!(f, "pull"),
            SyncPhase::ResolveConflicts => write!(f, "resolve conflicts"),
        }
    }
}

/// Counters accumulated over one sync operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Creates and updates confirmed by the server.
    pub pushed: usize,
    /// Local deletes confirmed by the server (or never pushed).
    pub deleted: usize,
    pub push_failed: usize,
    /// Pushes postponed because a parent has no server id yet.
    pub skipped: usize,
    /// Server records inserted or fast-forwarded locally.
    pub pulled: usize,
    pub pull_failed: usize,
    /// Records newly flagged as conflicts.
    pub conflicts: usize,
    pub resolved: usize,
    pub unresolved: usize,
}

impl SyncReport {
    pub fn merge(&mut self, other: SyncReport) {
        self.pushed += other.pushed;
        self.deleted += other.deleted;
        self.push_failed += other.push_failed;
        self.skipped += other.skipped;
        self.pulled += other.pulled;
        self.pull_failed += other.pull_failed;
        self.conflicts += other.conflicts;
        self.resolved += other.resolved;
        self.unresolved += other.unresolved;
    }

    pub fn failures(&self) -> usize {
        self.push_failed + self.pull_failed + self.unresolved
    }

    pub fn is_clean(&self) -> bool {
        self.failures() == 0 && self.skipped == 0
    }
}

impl fmt::Display for SyncReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed {}, deleted {}, pulled {}, conflicts {}, resolved {}",
            self.pushed, self.deleted, self.pulled, self.conflicts, self.resolved
        )?;
        if self.failures() > 0 {
            write!(f, ", failed {}", self.failures())?;
        }
        if self.skipped > 0 {
            write!(f, ", skipped {}", self.skipped)?;
        }
        Ok(())
    }
}

/// Result of [`SyncEngine::sync_all`](super::SyncEngine::sync_all).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed(SyncReport),
    /// Another cycle was already running; nothing was done.
    Skipped,
}

/// Progress notifications broadcast while the engine works.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    CycleStarted,
    PhaseStarted {
        phase: SyncPhase,
        kind: EntityKind,
        count: usize,
    },
    RecordFailed {
        kind: EntityKind,
        local_id: Uuid,
        error: String,
    },
    ConflictDetected {
        kind: EntityKind,
        local_id: Uuid,
    },
    CycleFinished(SyncReport),
    CycleFailed(String),
}
