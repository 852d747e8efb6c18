//! Staleness detection
//!
//! Decides whether a reconcile pass has any convergence work to do. The
//! decision itself is a pure function over the resource's generation
//! counters and the remote last-modified timestamp; it performs no gateway
//! calls, which keeps steady-state reconciliation free of remote traffic.
//! The caller consults the gateway at most once beforehand, and only when
//! the generation counters alone cannot decide.

use gantry_types::{ObservedStatus, ResourceMeta};

/// What the caller knows about the remote counterpart when evaluating
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteState {
    /// The gateway was not consulted; generation counters decide alone
    NotFetched,
    /// The gateway was consulted and the counterpart does not exist
    Missing,
    /// The gateway was consulted and reported this last-modified timestamp
    Present { updated_at: i64 },
}

/// Outcome of the staleness check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncCheck {
    /// Nothing to do; skip the pass entirely
    UpToDate,
    /// Desired state is ahead of the last converged generation, or no
    /// remote counterpart exists yet
    SpecChanged,
    /// The remote side moved without a local spec change
    RemoteDrift,
    /// A counterpart was recorded but the gateway no longer knows it; the
    /// recorded ID must be dropped and the entity re-created
    RemoteMissing,
}

impl SyncCheck {
    /// Pure staleness decision
    ///
    /// Callers fetch the remote entity only when `synced_generation` has
    /// caught up with `generation` and a counterpart is recorded, then
    /// pass the result here; in every other case `RemoteState::NotFetched`
    /// is correct and no gateway traffic happens at all.
    pub fn evaluate(meta: &ResourceMeta, status: &ObservedStatus, remote: RemoteState) -> Self {
        if matches!(remote, RemoteState::Missing) && status.has_remote() {
            return SyncCheck::RemoteMissing;
        }
        if status.synced_generation < meta.generation {
            return SyncCheck::SpecChanged;
        }
        if !status.has_remote() {
            // Never created, or the recorded ID was dropped by an earlier
            // pass that could not finish re-creating
            return SyncCheck::SpecChanged;
        }
        if let RemoteState::Present { updated_at } = remote {
            if updated_at > status.remote_updated_at {
                return SyncCheck::RemoteDrift;
            }
        }
        SyncCheck::UpToDate
    }

    pub fn needs_work(&self) -> bool {
        !matches!(self, SyncCheck::UpToDate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_types::ResourceName;

    fn meta(generation: i64) -> ResourceMeta {
        let mut m = ResourceMeta::new(ResourceName::new("r"));
        m.generation = generation;
        m
    }

    fn status(remote_id: Option<&str>, updated_at: i64, synced: i64) -> ObservedStatus {
        ObservedStatus {
            remote_id: remote_id.map(String::from),
            remote_updated_at: updated_at,
            synced_generation: synced,
        }
    }

    #[test]
    fn test_generation_bump_needs_work_without_fetch() {
        let check = SyncCheck::evaluate(
            &meta(2),
            &status(Some("id"), 100, 1),
            RemoteState::NotFetched,
        );
        assert_eq!(check, SyncCheck::SpecChanged);
        assert!(check.needs_work());
    }

    #[test]
    fn test_new_resource_needs_create() {
        let check = SyncCheck::evaluate(&meta(1), &status(None, 0, 0), RemoteState::NotFetched);
        assert_eq!(check, SyncCheck::SpecChanged);
    }

    #[test]
    fn test_unchanged_is_up_to_date() {
        // This is the short-circuit: generations equal, remote timestamp
        // unchanged, and no adapter was involved in the decision.
        let check = SyncCheck::evaluate(
            &meta(3),
            &status(Some("id"), 100, 3),
            RemoteState::Present { updated_at: 100 },
        );
        assert_eq!(check, SyncCheck::UpToDate);
        assert!(!check.needs_work());
    }

    #[test]
    fn test_newer_remote_timestamp_is_drift() {
        let check = SyncCheck::evaluate(
            &meta(3),
            &status(Some("id"), 100, 3),
            RemoteState::Present { updated_at: 101 },
        );
        assert_eq!(check, SyncCheck::RemoteDrift);
    }

    #[test]
    fn test_older_remote_timestamp_is_not_drift() {
        let check = SyncCheck::evaluate(
            &meta(3),
            &status(Some("id"), 100, 3),
            RemoteState::Present { updated_at: 99 },
        );
        assert_eq!(check, SyncCheck::UpToDate);
    }

    #[test]
    fn test_missing_remote_wins_over_generation() {
        let check = SyncCheck::evaluate(&meta(5), &status(Some("id"), 100, 1), RemoteState::Missing);
        assert_eq!(check, SyncCheck::RemoteMissing);
    }

    #[test]
    fn test_cleared_remote_id_forces_recreate() {
        // A pass that observed the counterpart missing clears the ID but
        // may abort before re-creating; the next pass must still work.
        let check = SyncCheck::evaluate(&meta(3), &status(None, 100, 3), RemoteState::NotFetched);
        assert_eq!(check, SyncCheck::SpecChanged);
    }
}
