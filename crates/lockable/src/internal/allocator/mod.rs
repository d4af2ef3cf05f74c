//! Selection of resources for one admission attempt of a work item.
//!
//! An attempt either queues every requested resource for the work item or
//! leaves the pool as it found it. Resources the work item still holds from
//! an earlier attempt take part in the selection again and keep their
//! first ticket, so the queue timeout always counts from the first time
//! a resource was queued.

pub(crate) mod balance;
pub(crate) mod percent;
pub(crate) mod select;

use smallvec::SmallVec;

use crate::internal::common::clock::Expiry;
use crate::internal::common::ids::{ResourceIdx, WorkItemId};
use crate::internal::index::LabelIndex;
use crate::internal::pool::matched::{MatchedGroup, MatchedResources};
use crate::internal::pool::state::PoolState;
use crate::internal::requirement::ResolvedRequirement;
use crate::internal::resource::Resource;
use select::Picker;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    Selected(MatchedResources),
    /// Not enough resources are available now; the caller may try again later.
    NotSatisfiable,
}

impl AllocationOutcome {
    pub fn is_selected(&self) -> bool {
        matches!(self, AllocationOutcome::Selected(_))
    }

    pub fn selected(&self) -> Option<&MatchedResources> {
        match self {
            AllocationOutcome::Selected(matched) => Some(matched),
            AllocationOutcome::NotSatisfiable => None,
        }
    }
}

struct Attempt<'a> {
    resources: &'a mut Vec<Resource>,
    picker: &'a mut Picker,
    expiry: &'a Expiry,
    work_item: WorkItemId,
    project: &'a str,
    held: &'a [ResourceIdx],
    picked: Vec<(ResourceIdx, usize)>,
    fresh: SmallVec<[ResourceIdx; 8]>,
}

impl Attempt<'_> {
    fn is_picked(&self, idx: ResourceIdx) -> bool {
        self.picked.iter().any(|(i, _)| *i == idx)
    }

    fn is_available(&self, idx: ResourceIdx) -> bool {
        let resource = &self.resources[idx.index()];
        let available = !resource.is_reserved()
            && !resource.is_locked()
            && !self.is_picked(idx)
            && (!resource.is_queued(self.expiry)
                || (self.held.contains(&idx)
                    && resource.is_queued_by(self.work_item, self.expiry)));
        if !available {
            log::trace!(
                "Removing resource {resource} [reserved={}, locked={}, queued={}]",
                resource.is_reserved(),
                resource.is_locked(),
                resource.is_queued(self.expiry)
            );
        }
        available
    }

    fn take(&mut self, idx: ResourceIdx, group: usize) {
        let resource = &mut self.resources[idx.index()];
        if !self.held.contains(&idx) {
            resource.queue(self.work_item, self.project, self.expiry.now());
            self.fresh.push(idx);
        }
        log::trace!("Queued resource lock on {resource} for {}", self.work_item);
        self.picked.push((idx, group));
    }

    fn selected_count(&self, before: usize) -> usize {
        self.picked.len() - before
    }

    /// Selects resources for one group and returns how many the group asks for.
    fn select_group(
        &mut self,
        position: usize,
        group: &ResolvedRequirement,
        index: &LabelIndex,
    ) -> usize {
        let candidates: Vec<ResourceIdx> = group
            .required()
            .iter()
            .filter_map(|name| {
                let idx = index.resource_idx(name);
                if idx.is_none() {
                    log::debug!("Resource {name} is no longer in the catalog");
                }
                idx
            })
            .collect();
        let num_required = match group.required_number() {
            0 => candidates.len(),
            n => n,
        };
        if num_required == 0 {
            return 0;
        }

        let available: Vec<ResourceIdx> = candidates
            .into_iter()
            .filter(|idx| self.is_available(*idx))
            .collect();
        let before = self.picked.len();

        if num_required >= available.len() {
            log::trace!("Selecting all {} available resources", available.len());
            for idx in available {
                self.take(idx, position);
            }
        } else if index.load_balancing_enabled() {
            let mut parts = balance::partition(available, index);
            while self.selected_count(before) < num_required {
                let Some(part) =
                    balance::least_used_part(&parts, index, &self.resources[..], self.expiry)
                else {
                    break;
                };
                if let Some(idx) = self.picker.take(&mut parts[part]) {
                    self.take(idx, position);
                }
            }
        } else {
            let buckets = match group.percent_labels() {
                Some(labels) => percent::percent_buckets(available, labels, &self.resources[..]),
                None => vec![(0.0, available)],
            };
            for (value, mut bucket) in buckets {
                log::trace!("Working through bucket {value} with {} resources", bucket.len());
                while self.selected_count(before) < num_required {
                    let Some(idx) = self.picker.take(&mut bucket) else {
                        break;
                    };
                    self.take(idx, position);
                }
                if self.selected_count(before) >= num_required {
                    break;
                }
            }
        }
        log::debug!(
            "Selected {} of {num_required} resources for {:?}",
            self.selected_count(before),
            group.text()
        );
        num_required
    }
}

/// Splits the previous selection of `work_item` into resources it still holds
/// and stale entries, which are dropped.
fn reconcile(
    state: &mut PoolState,
    index: &LabelIndex,
    expiry: &Expiry,
    work_item: WorkItemId,
) -> (SmallVec<[ResourceIdx; 8]>, Option<MatchedResources>) {
    let previous = state.matched.remove(&work_item);
    let mut held = SmallVec::new();
    if let Some(previous) = &previous {
        for name in previous.names() {
            match index.resource_idx(name) {
                Some(idx) if state.resources[idx.index()].is_queued_by(work_item, expiry) => {
                    held.push(idx);
                }
                Some(idx) => {
                    log::debug!("{name} is no longer queued by {work_item}, dropping it");
                    state.resources[idx.index()].validate_queue_timeout(expiry);
                }
                None => log::debug!("{name} is no longer in the catalog, dropping it"),
            }
        }
    }
    (held, previous)
}

/// Runs one all-or-nothing admission attempt. The caller holds the pool lock.
pub(crate) fn attempt_allocate(
    state: &mut PoolState,
    expiry: &Expiry,
    work_item: WorkItemId,
    project: &str,
    groups: &[ResolvedRequirement],
) -> AllocationOutcome {
    let index = state.index.clone();
    let (held, previous) = reconcile(state, &index, expiry, work_item);

    let mut attempt = Attempt {
        resources: &mut state.resources,
        picker: &mut state.picker,
        expiry,
        work_item,
        project,
        held: &held,
        picked: Vec::new(),
        fresh: SmallVec::new(),
    };
    let total_required: usize = groups
        .iter()
        .enumerate()
        .map(|(position, group)| attempt.select_group(position, group, &index))
        .sum();
    let Attempt { picked, fresh, .. } = attempt;

    if picked.len() != total_required {
        log::debug!(
            "{project} found {} resource(s) to queue, waiting for {total_required}",
            picked.len()
        );
        for idx in fresh {
            state.resources[idx.index()].unqueue();
        }
        if let Some(mut previous) = previous.filter(|_| !held.is_empty()) {
            previous.retain(|name| {
                index
                    .resource_idx(name)
                    .is_some_and(|idx| held.contains(&idx))
            });
            state.matched.insert(work_item, previous);
        }
        return AllocationOutcome::NotSatisfiable;
    }

    for idx in &held {
        if !picked.iter().any(|(i, _)| i == idx) {
            log::debug!(
                "Releasing {} which is no longer needed by {work_item}",
                state.resources[idx.index()]
            );
            state.resources[idx.index()].unqueue();
        }
    }

    let mut matched = MatchedResources::new(groups.iter().map(MatchedGroup::from).collect());
    for (idx, group) in &picked {
        let resource = &state.resources[idx.index()];
        matched.push(resource.name(), *group, resource.properties());
    }
    log::debug!(
        "Queued resources {:?} for {work_item} ({project})",
        matched.names().collect::<Vec<_>>()
    );
    if !matched.is_empty() {
        state.matched.insert(work_item, matched.clone());
    }
    AllocationOutcome::Selected(matched)
}
