use crate::internal::common::clock::Expiry;
use crate::internal::common::ids::ResourceIdx;
use crate::internal::index::LabelIndex;
use crate::internal::resource::Resource;

/// Splits `available` by load balancing group. The result is indexed like
/// [`LabelIndex::lb_groups`] and keeps the order of `available` inside each part.
pub(crate) fn partition(available: Vec<ResourceIdx>, index: &LabelIndex) -> Vec<Vec<ResourceIdx>> {
    let mut parts = vec![Vec::new(); index.lb_groups().len()];
    for idx in available {
        parts[index.lb_group_of(idx)].push(idx);
    }
    parts
}

/// Share of a group's resources that are not free right now.
pub(crate) fn group_usage(
    members: &[ResourceIdx],
    resources: &[Resource],
    expiry: &Expiry,
) -> f64 {
    if members.is_empty() {
        return 0.0;
    }
    let used = members
        .iter()
        .filter(|idx| !resources[idx.index()].is_free(expiry))
        .count();
    used as f64 / members.len() as f64
}

/// The non empty part whose group is least used; ties go to the earlier group.
pub(crate) fn least_used_part(
    parts: &[Vec<ResourceIdx>],
    index: &LabelIndex,
    resources: &[Resource],
    expiry: &Expiry,
) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (position, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        let usage = group_usage(index.lb_groups()[position].members(), resources, expiry);
        log::trace!(
            "Load balancing group {:?} usage {usage}",
            index.lb_groups()[position].label()
        );
        if best.is_none_or(|(_, lowest)| usage < lowest) {
            best = Some((position, usage));
        }
    }
    best.map(|(position, _)| position)
}
