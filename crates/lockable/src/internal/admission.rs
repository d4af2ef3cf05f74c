//! Glue between the pool and a job queue that retries admission until it succeeds.

use std::fmt::{Display, Formatter};

use crate::internal::allocator::{AllocationOutcome, attempt_allocate};
use crate::internal::common::ids::WorkItemId;
use crate::internal::expand::EnvVars;
use crate::internal::pool::ResourcePool;
use crate::internal::pool::matched::MatchedResources;
use crate::internal::requirement::{RequirementSpec, ResolvedRequirement};
use crate::internal::resource::LockOwner;

/// Why a work item cannot start yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockedReason {
    requirements: Vec<String>,
}

impl BlockedReason {
    fn new(groups: &[ResolvedRequirement]) -> Self {
        BlockedReason {
            requirements: groups.iter().map(|g| g.display_text()).collect(),
        }
    }

    pub fn requirements(&self) -> &[String] {
        &self.requirements
    }
}

impl Display for BlockedReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Waiting for resources: {}", self.requirements.join(", "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// Every requested resource is queued for the work item.
    Ready(MatchedResources),
    /// Try again later.
    Blocked(BlockedReason),
    /// The work item does not ask for anything.
    NoRequirements,
}

impl ResourcePool {
    /// One admission check: resolves `specs` and attempts the allocation atomically.
    pub fn check_admission(
        &self,
        work_item: WorkItemId,
        project: &str,
        specs: &[RequirementSpec],
        env: &EnvVars,
    ) -> Admission {
        if specs.is_empty() {
            return Admission::NoRequirements;
        }
        let mut state = self.lock_state();
        let groups: Vec<ResolvedRequirement> = specs
            .iter()
            .map(|spec| Self::resolve_locked(&state, self.evaluator(), spec, env))
            .collect();
        log::trace!("{project} trying to get resources with {groups:?}");

        let expiry = self.expiry(&state);
        let outcome = trace_time!(project, "admission", {
            attempt_allocate(&mut state, &expiry, work_item, project, &groups)
        });
        match outcome {
            AllocationOutcome::Selected(matched) if matched.is_empty() => {
                log::debug!("{project} requirements resolved to no resources");
                Admission::NoRequirements
            }
            AllocationOutcome::Selected(matched) => {
                log::debug!(
                    "{project} reserved resources {:?}",
                    matched.names().collect::<Vec<_>>()
                );
                Admission::Ready(matched)
            }
            AllocationOutcome::NotSatisfiable => {
                log::debug!("{project} waiting for resources");
                Admission::Blocked(BlockedReason::new(&groups))
            }
        }
    }

    /// Locks the selection of `work_item` for the run identified by `owner` and
    /// hands the selection over to the caller.
    ///
    /// Nothing is locked if any of the resources is taken; the selection is then
    /// kept for the next admission check.
    pub fn on_started(
        &self,
        work_item: WorkItemId,
        owner: &LockOwner,
    ) -> Option<MatchedResources> {
        let mut state = self.lock_state();
        let names: Vec<String> = state
            .matched
            .get(&work_item)?
            .names()
            .map(|n| n.to_string())
            .collect();
        if self.lock_in(&mut state, &names, owner) {
            log::debug!("{owner} acquired lock on {names:?}");
            state.matched.remove(&work_item)
        } else {
            log::debug!("{owner} failed to lock {names:?}");
            None
        }
    }

    /// Unlocks everything `owner` holds. Returns the released names.
    pub fn on_completed(&self, owner: &LockOwner) -> Vec<String> {
        let names = self.resources_locked_by(owner);
        if !names.is_empty() {
            self.unlock(&names, Some(owner));
            log::debug!("{owner} released lock on {names:?}");
        }
        names
    }
}
