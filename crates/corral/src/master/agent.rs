use crate::AgentId;
use crate::resources::{ResourceError, ResourceSet};

/// Direction of a reservation change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOp {
    Reserve,
    Unreserve,
}

impl ReservationOp {
    pub fn verb(&self) -> &'static str {
        match self {
            ReservationOp::Reserve => "reserve",
            ReservationOp::Unreserve => "unreserve",
        }
    }
}

/// Failure of the commit step of a reservation change.
#[derive(Debug)]
pub enum ApplyFailure {
    /// The free pool does not cover the delta at commit time.
    Insufficient,
    /// Arithmetic failed after the sufficiency check passed; a broken
    /// invariant, never surfaced to callers.
    Internal(ResourceError),
}

/// Authoritative per-node resource ledger entry.
///
/// `total` only changes form on reservation changes (role/tag metadata moves
/// between buckets, the quantity is preserved); `offered` and `allocated`
/// track what is embedded in live offers and bound to running tasks.
/// Invariant at every observable instant:
/// `total == free + offered + allocated`, with `free` derived.
pub struct Agent {
    id: AgentId,
    hostname: String,
    total: ResourceSet,
    offered: ResourceSet,
    allocated: ResourceSet,
}

impl Agent {
    pub fn new(id: AgentId, hostname: String, total: ResourceSet) -> Self {
        Agent {
            id,
            hostname,
            total,
            offered: Default::default(),
            allocated: Default::default(),
        }
    }

    pub fn id(&self) -> AgentId {
        self.id
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn total(&self) -> &ResourceSet {
        &self.total
    }

    pub fn offered(&self) -> &ResourceSet {
        &self.offered
    }

    pub fn allocated(&self) -> &ResourceSet {
        &self.allocated
    }

    /// Resources not embedded in an offer nor bound to a task.
    pub fn free(&self) -> Result<ResourceSet, ResourceError> {
        self.total
            .checked_subtract(&self.offered)?
            .checked_subtract(&self.allocated)
    }

    /// Resources a reservation change may draw from: everything not bound to
    /// a running task. Outstanding offers count, they will be rescinded as
    /// part of applying the change.
    pub fn reservable(&self) -> Result<ResourceSet, ResourceError> {
        self.total.checked_subtract(&self.allocated)
    }

    /// Does `free ∪ offered` cover `delta` (in its consumed form)?
    pub fn sufficient(&self, delta: &ResourceSet) -> bool {
        self.reservable().map(|r| r.contains(delta)).unwrap_or(false)
    }

    /// Applies a validated reservation change against the free pool.
    ///
    /// Must only run after offer rescission vacated `offered` into `free`.
    /// The new total is computed fully before committing, so a failure at
    /// any step leaves the ledger untouched.
    pub fn apply(&mut self, op: ReservationOp, delta: &ResourceSet) -> Result<(), ApplyFailure> {
        let (consumed, produced) = match op {
            ReservationOp::Reserve => (
                delta.unflatten().map_err(ApplyFailure::Internal)?,
                delta.clone(),
            ),
            ReservationOp::Unreserve => (
                delta.clone(),
                delta.unflatten().map_err(ApplyFailure::Internal)?,
            ),
        };
        let free = self.free().map_err(ApplyFailure::Internal)?;
        if !free.contains(&consumed) {
            return Err(ApplyFailure::Insufficient);
        }
        let new_total = self
            .total
            .checked_subtract(&consumed)
            .and_then(|t| t.union(&produced))
            .map_err(ApplyFailure::Internal)?;
        self.total = new_total;
        Ok(())
    }

    /// Moves resources from `free` into `offered` for a newly issued offer.
    pub fn add_offered(&mut self, resources: &ResourceSet) -> Result<(), ResourceError> {
        self.offered = self.offered.union(resources)?;
        Ok(())
    }

    /// Returns an offer's resources from `offered` back to `free`.
    pub fn remove_offered(&mut self, resources: &ResourceSet) -> Result<(), ResourceError> {
        self.offered = self.offered.checked_subtract(resources)?;
        Ok(())
    }

    /// Binds resources to a running task (`offered`/`free` → `allocated`
    /// handled by the caller via `remove_offered`).
    pub fn add_allocated(&mut self, resources: &ResourceSet) -> Result<(), ResourceError> {
        self.allocated = self.allocated.union(resources)?;
        Ok(())
    }

    /// Recovers a terminated task's resources back to `free`.
    pub fn remove_allocated(&mut self, resources: &ResourceSet) -> Result<(), ResourceError> {
        self.allocated = self.allocated.checked_subtract(resources)?;
        Ok(())
    }
}
