use super::MessageId;

/// Whether a local-authoritative operation changed the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalEffect {
    Applied,
    NoOp,
}

/// Whether the server heard about it. Remote failures never undo local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteSync {
    Synced,
    Failed(String),
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncOutcome {
    pub local: LocalEffect,
    pub remote: RemoteSync,
}

impl SyncOutcome {
    pub fn noop() -> Self {
        Self {
            local: LocalEffect::NoOp,
            remote: RemoteSync::Skipped,
        }
    }

    pub fn applied(remote: RemoteSync) -> Self {
        Self {
            local: LocalEffect::Applied,
            remote,
        }
    }

    pub fn is_applied(&self) -> bool {
        self.local == LocalEffect::Applied
    }

    pub fn is_synced(&self) -> bool {
        self.remote == RemoteSync::Synced
    }
}

/// Result of a sweep: ids burned locally and those whose notify failed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub burned: Vec<MessageId>,
    pub notify_failures: Vec<MessageId>,
}

impl SweepReport {
    pub fn is_empty(&self) -> bool {
        self.burned.is_empty()
    }
}
