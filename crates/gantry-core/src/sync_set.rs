//! Generic sub-resource set synchronization
//!
//! One algorithm serves both endpoint plans and application subscriptions:
//! desired and remote entries are matched by business key (never by
//! remote-assigned ID), partitioned three ways, and executed as
//! create/update/retire calls. Retiring is always close-then-delete;
//! "already closed" is tolerated, anything else stops the pass right
//! there. Earlier calls of the same pass are never rolled back: the
//! routine is at-least-once, not atomic, and safe to re-issue after a
//! crash because every invocation re-fetches the remote set.

use crate::error::SyncResult;
use async_trait::async_trait;
use gantry_types::SubresourceKind;

/// Binds the generic algorithm to one sub-resource kind
///
/// `list_remote` returns entries pre-keyed: for plans the key is the plan
/// name; for subscriptions the adapter joins through the plan and its
/// owning API to build the context-path + plan-name key.
#[async_trait]
pub trait SubresourceAdapter: Send + Sync {
    type Desired: Send + Sync;
    type Remote: Send + Sync;

    fn kind(&self) -> SubresourceKind;

    /// Business key of a desired entry
    fn desired_key(&self, desired: &Self::Desired) -> String;

    /// Fetch the remote set with business keys attached
    async fn list_remote(&self) -> SyncResult<Vec<(String, Self::Remote)>>;

    async fn create(&self, desired: &Self::Desired) -> SyncResult<()>;

    /// Unconditional overwrite of the remote entry with the desired
    /// mutable fields; not a field-level diff
    async fn update(&self, remote: &Self::Remote, desired: &Self::Desired) -> SyncResult<()>;

    async fn close(&self, remote: &Self::Remote) -> SyncResult<()>;

    async fn delete(&self, remote: &Self::Remote) -> SyncResult<()>;
}

/// Three-way partition of desired against remote
#[derive(Debug)]
pub struct SetPlan<'a, D, R> {
    /// Desired entries with no remote match
    pub create: Vec<&'a D>,
    /// Matched pairs, in desired order
    pub update: Vec<(&'a D, &'a R)>,
    /// Remote entries no longer desired, in remote order
    pub retire: Vec<&'a R>,
}

/// What a synchronizer pass changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub created: usize,
    pub updated: usize,
    pub retired: usize,
}

impl SyncOutcome {
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.retired == 0
    }
}

/// Partition desired against remote by business key
///
/// Duplicate desired keys collapse to the last occurrence, so a repeated
/// declaration cannot produce duplicate create calls.
pub fn partition<'a, D, R>(
    desired: &'a [D],
    key: impl Fn(&D) -> String,
    remote: &'a [(String, R)],
) -> SetPlan<'a, D, R> {
    let mut chosen: Vec<(String, &'a D)> = Vec::new();
    for d in desired {
        let k = key(d);
        if let Some(entry) = chosen.iter_mut().find(|(ck, _)| *ck == k) {
            entry.1 = d;
        } else {
            chosen.push((k, d));
        }
    }

    let mut create = Vec::new();
    let mut update = Vec::new();
    for (k, d) in &chosen {
        match remote.iter().find(|(rk, _)| rk == k) {
            Some((_, r)) => update.push((*d, r)),
            None => create.push(*d),
        }
    }

    let retire = remote
        .iter()
        .filter(|(rk, _)| !chosen.iter().any(|(ck, _)| ck == rk))
        .map(|(_, r)| r)
        .collect();

    SetPlan {
        create,
        update,
        retire,
    }
}

/// Run one synchronizer pass: re-fetch the remote set, partition, execute
pub async fn synchronize<A: SubresourceAdapter>(
    adapter: &A,
    desired: &[A::Desired],
) -> SyncResult<SyncOutcome> {
    let remote = adapter.list_remote().await?;
    let plan = partition(desired, |d| adapter.desired_key(d), &remote);

    let mut outcome = SyncOutcome::default();

    for (d, r) in &plan.update {
        adapter.update(r, d).await?;
        outcome.updated += 1;
    }

    for d in &plan.create {
        adapter.create(d).await?;
        tracing::debug!(
            kind = %adapter.kind(),
            key = %adapter.desired_key(d),
            "created sub-resource"
        );
        outcome.created += 1;
    }

    for r in &plan.retire {
        // close must complete, or be tolerated as already-closed, before
        // delete is attempted
        match adapter.close(r).await {
            Ok(()) => {}
            Err(e) if e.is_already_done() => {}
            Err(e) => return Err(e),
        }
        match adapter.delete(r).await {
            Ok(()) => {}
            Err(e) if e.is_already_done() => {}
            Err(e) => return Err(e),
        }
        outcome.retired += 1;
    }

    Ok(outcome)
}
