use crate::define_id_type;

// Identifies one queued work item across its admission attempts
define_id_type!(WorkItemId, u64);

// Position of a resource inside the current catalog; invalidated by `configure`
define_id_type!(ResourceIdx, u32);

impl ResourceIdx {
    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}
