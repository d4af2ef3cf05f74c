use crate::internal::common::ids::ResourceIdx;
use crate::internal::resource::Resource;

/// Candidates sharing the same fraction of requested labels.
pub(crate) type PercentBucket = (f64, Vec<ResourceIdx>);

/// Orders `available` by the fraction of a resource's own labels that were requested,
/// best match first.
///
/// If any candidate matches no requested label, or claims more matches than it has
/// labels, ranking makes no sense for the group and everything lands in one bucket
/// valued `0.0`.
pub(crate) fn percent_buckets(
    available: Vec<ResourceIdx>,
    requested: &[String],
    resources: &[Resource],
) -> Vec<PercentBucket> {
    let mut buckets: Vec<PercentBucket> = Vec::new();
    for idx in &available {
        let resource = &resources[idx.index()];
        let size = resource.labels().len();
        let matched = requested.iter().filter(|l| resource.has_label(l)).count();
        log::trace!("Resource {resource} matched labels: {matched} / {size}");
        if matched == 0 || size == 0 || matched > size {
            log::trace!(
                "Resource {resource} cannot be ranked by labels, not using percent matching"
            );
            return vec![(0.0, available)];
        }
        let value = matched as f64 / size as f64;
        match buckets.iter_mut().find(|(v, _)| *v == value) {
            Some((_, members)) => members.push(*idx),
            None => buckets.push((value, vec![*idx])),
        }
    }
    buckets.sort_by(|a, b| b.0.total_cmp(&a.0));
    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources() -> Vec<Resource> {
        [("half", "l1 l2"), ("full", "l1"), ("third", "l1 l2 l3"), ("half2", "l1 x")]
            .iter()
            .map(|(n, l)| Resource::new(n).unwrap().with_labels(l))
            .collect()
    }

    fn idxs(values: &[u32]) -> Vec<ResourceIdx> {
        values.iter().copied().map(ResourceIdx::new).collect()
    }

    #[test]
    fn test_best_match_first() {
        let buckets = percent_buckets(idxs(&[0, 1, 2, 3]), &["l1".to_string()], &resources());
        assert_eq!(
            buckets,
            vec![
                (1.0, idxs(&[1])),
                (0.5, idxs(&[0, 3])),
                (1.0 / 3.0, idxs(&[2])),
            ]
        );
    }

    #[test]
    fn test_unmatched_candidate_disables_ranking() {
        let rs = resources();
        let buckets = percent_buckets(idxs(&[1, 0]), &["l2".to_string()], &rs);
        assert_eq!(buckets, vec![(0.0, idxs(&[1, 0]))]);

        let buckets = percent_buckets(idxs(&[0, 1]), &[], &rs);
        assert_eq!(buckets, vec![(0.0, idxs(&[0, 1]))]);
    }
}
