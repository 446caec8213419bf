//! Mid-stream checkpoint trigger.

use std::time::Duration;

use waypoint_types::checkpoint::{CheckpointMode, CheckpointPolicyConfig};

/// Decides, before each pull, whether the next yielded item must be a
/// checkpoint rather than the next record.
///
/// Immutable for the lifetime of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckpointPolicy {
    every_records: u64,
    every: Option<Duration>,
    mode: CheckpointMode,
}

impl CheckpointPolicy {
    #[must_use]
    pub fn new(config: &CheckpointPolicyConfig) -> Self {
        Self {
            every_records: config.every_records,
            every: config.effective_every(),
            mode: config.mode,
        }
    }

    /// A policy that never fires mid-stream.
    #[must_use]
    pub fn disabled() -> Self {
        Self::new(&CheckpointPolicyConfig::default())
    }

    /// Whether a mid-stream checkpoint can ever fire under this policy.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        match self.mode {
            CheckpointMode::Eager => true,
            CheckpointMode::Interval => self.every_records > 0 || self.every.is_some(),
        }
    }

    #[must_use]
    pub fn mode(&self) -> CheckpointMode {
        self.mode
    }

    /// `true` only when a snapshot is pending and a threshold has been met.
    ///
    /// Without a pending snapshot this is always `false`; a pending snapshot
    /// below threshold stays buffered.
    #[must_use]
    pub fn should_checkpoint_now(
        &self,
        records_since_last_checkpoint: u64,
        elapsed_since_last_checkpoint: Duration,
        has_pending_snapshot: bool,
    ) -> bool {
        if !has_pending_snapshot {
            return false;
        }
        match self.mode {
            CheckpointMode::Eager => true,
            CheckpointMode::Interval => {
                let count_reached =
                    self.every_records > 0 && records_since_last_checkpoint >= self.every_records;
                let time_elapsed = self
                    .every
                    .is_some_and(|every| elapsed_since_last_checkpoint >= every);
                count_reached || time_elapsed
            }
        }
    }
}
