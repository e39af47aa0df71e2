use super::*;

/// RAII guard for one region permit.
///
/// Holding a permit entitles the owner to submit tuples and mutate operator
/// state; the region never starts a drain while any permit is outstanding.
/// The sequence id observed at acquisition is stable for the whole time the
/// permit is held. Dropping the guard returns the permit.
pub struct RegionPermit {
    region: Arc<ConsistentRegion>,
    sequence_id: SequenceId,
    active: bool,
}

impl RegionPermit {
    pub(crate) fn new(region: Arc<ConsistentRegion>, sequence_id: SequenceId) -> Self {
        Self {
            region,
            sequence_id,
            active: true,
        }
    }

    /// The region's sequence id as observed when this permit was acquired.
    pub fn sequence_id(&self) -> SequenceId {
        self.sequence_id
    }

    pub(crate) fn belongs_to(&self, region: &Arc<ConsistentRegion>) -> bool {
        Arc::ptr_eq(&self.region, region)
    }

    /// Consume the guard without returning the permit; the caller has already
    /// adjusted the count under the region lock.
    pub(crate) fn deactivate(mut self) {
        self.active = false;
    }
}

impl std::fmt::Debug for RegionPermit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegionPermit")
            .field("region", &self.region.index())
            .field("sequence_id", &self.sequence_id)
            .field("active", &self.active)
            .finish()
    }
}

impl Drop for RegionPermit {
    fn drop(&mut self) {
        if self.active {
            self.region.permit_returned();
        }
    }
}
