use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Map;
use crate::internal::common::ids::ResourceIdx;
use crate::internal::requirement::EXPRESSION_MARKER;
use crate::internal::resource::Resource;

/// Alternative name under which the resources of `label` can be requested.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelAlias {
    pub name: String,
    pub label: String,
}

impl LabelAlias {
    pub fn new(name: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
        }
    }
}

/// Resources that share the first load balancing label they carry.
/// The group without a label collects resources carrying none of them.
#[derive(Debug, Clone)]
pub struct LoadBalancingGroup {
    label: Option<String>,
    members: Vec<ResourceIdx>,
}

impl LoadBalancingGroup {
    #[inline]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    #[inline]
    pub fn members(&self) -> &[ResourceIdx] {
        &self.members
    }
}

type Bucket = Arc<Vec<ResourceIdx>>;

/// Lookup tables derived from the resource catalog.
///
/// The index is immutable once built. Every catalog change builds a fresh one
/// which the pool then publishes in place of the old.
#[derive(Debug, Default)]
pub struct LabelIndex {
    names: Map<String, ResourceIdx>,
    // Accepted aliases point at the very same bucket as their target label
    buckets: Map<String, Bucket>,
    aliases: Map<String, String>,
    lb_label_count: usize,
    lb_groups: Vec<LoadBalancingGroup>,
    lb_group_of: Vec<usize>,
}

impl LabelIndex {
    pub fn build(resources: &[Resource], aliases: &[LabelAlias], lb_labels: &[String]) -> Self {
        let mut names = Map::with_capacity_and_hasher(resources.len(), Default::default());
        let mut labels: Map<String, Vec<ResourceIdx>> = Map::default();
        let mut lb_members: Vec<Vec<ResourceIdx>> = vec![Vec::new(); lb_labels.len() + 1];
        let mut lb_slot_of = Vec::with_capacity(resources.len());

        for (i, resource) in resources.iter().enumerate() {
            let idx = ResourceIdx::new(i as u32);
            names.insert(resource.name().to_string(), idx);
            for label in resource.labels() {
                labels.entry(label.clone()).or_default().push(idx);
            }
            let slot = lb_labels
                .iter()
                .position(|lb| resource.has_label(lb))
                .unwrap_or(lb_labels.len());
            lb_members[slot].push(idx);
            lb_slot_of.push(slot);
        }

        let mut buckets: Map<String, Bucket> = labels
            .into_iter()
            .map(|(label, members)| (label, Arc::new(members)))
            .collect();

        let mut accepted = Map::default();
        for alias in aliases {
            if buckets.contains_key(&alias.name) || names.contains_key(&alias.name) {
                log::warn!(
                    "Alias {} collides with an existing label or resource name, ignoring it",
                    alias.name
                );
                continue;
            }
            if accepted.contains_key(&alias.label) {
                log::warn!(
                    "Alias {} points to another alias {}, ignoring it",
                    alias.name,
                    alias.label
                );
                continue;
            }
            let Some(bucket) = buckets.get(&alias.label).cloned() else {
                log::debug!(
                    "Alias {} points to unknown label {}, ignoring it",
                    alias.name,
                    alias.label
                );
                continue;
            };
            buckets.insert(alias.name.clone(), bucket);
            accepted.insert(alias.name.clone(), alias.label.clone());
        }

        // Empty groups are dropped, the remaining ones keep the configured order
        let mut lb_groups = Vec::new();
        let mut slot_to_group = vec![usize::MAX; lb_members.len()];
        for (slot, members) in lb_members.into_iter().enumerate() {
            if members.is_empty() {
                continue;
            }
            slot_to_group[slot] = lb_groups.len();
            lb_groups.push(LoadBalancingGroup {
                label: lb_labels.get(slot).cloned(),
                members,
            });
        }
        let lb_group_of = lb_slot_of.into_iter().map(|s| slot_to_group[s]).collect();

        log::debug!(
            "Label index rebuilt: {} resources, {} labels, {} aliases, {} load balancing groups",
            names.len(),
            buckets.len() - accepted.len(),
            accepted.len(),
            lb_groups.len()
        );

        LabelIndex {
            names,
            buckets,
            aliases: accepted,
            lb_label_count: lb_labels.len(),
            lb_groups,
            lb_group_of,
        }
    }

    #[inline]
    pub fn resource_idx(&self, name: &str) -> Option<ResourceIdx> {
        self.names.get(name).copied()
    }

    #[inline]
    pub fn resource_count(&self) -> usize {
        self.names.len()
    }

    /// Label or accepted alias.
    #[inline]
    pub fn has_label(&self, label: &str) -> bool {
        self.buckets.contains_key(label)
    }

    pub fn is_valid_label(&self, label: &str) -> bool {
        label.starts_with(EXPRESSION_MARKER) || self.has_label(label)
    }

    pub fn dereference_alias(&self, alias: &str) -> Option<&str> {
        self.aliases.get(alias).map(|l| l.as_str())
    }

    /// The label an alias stands for, or `label` itself.
    pub fn resolve_label<'a>(&'a self, label: &'a str) -> &'a str {
        self.dereference_alias(label).unwrap_or(label)
    }

    /// Resources carrying `label` in catalog order. Aliases resolve to their target.
    pub fn resources_with_label(&self, label: &str) -> &[ResourceIdx] {
        self.buckets
            .get(label)
            .map(|bucket| bucket.as_slice())
            .unwrap_or_default()
    }

    /// Every known label and alias, sorted.
    pub fn all_labels(&self) -> Vec<&str> {
        let mut labels: Vec<&str> = self.buckets.keys().map(|l| l.as_str()).collect();
        labels.sort_unstable();
        labels
    }

    /// Accepted aliases sorted by alias name.
    pub fn label_aliases(&self) -> Vec<(&str, &str)> {
        let mut aliases: Vec<_> = self
            .aliases
            .iter()
            .map(|(a, l)| (a.as_str(), l.as_str()))
            .collect();
        aliases.sort_unstable();
        aliases
    }

    /// Load balanced selection needs at least two labels to choose between.
    #[inline]
    pub fn load_balancing_enabled(&self) -> bool {
        self.lb_label_count > 1
    }

    #[inline]
    pub fn lb_groups(&self) -> &[LoadBalancingGroup] {
        &self.lb_groups
    }

    #[inline]
    pub fn lb_group_of(&self, idx: ResourceIdx) -> usize {
        self.lb_group_of[idx.index()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources(spec: &[(&str, &str)]) -> Vec<Resource> {
        spec.iter()
            .map(|(name, labels)| Resource::new(name).unwrap().with_labels(labels))
            .collect()
    }

    fn names<'a>(resources: &'a [Resource], idxs: &[ResourceIdx]) -> Vec<&'a str> {
        idxs.iter().map(|i| resources[i.index()].name()).collect()
    }

    #[test]
    fn test_label_buckets_keep_catalog_order() {
        let rs = resources(&[("r1", "a b"), ("r2", "b"), ("r3", "a c")]);
        let index = LabelIndex::build(&rs, &[], &[]);
        assert_eq!(names(&rs, index.resources_with_label("a")), ["r1", "r3"]);
        assert_eq!(names(&rs, index.resources_with_label("b")), ["r1", "r2"]);
        assert!(index.resources_with_label("zzz").is_empty());
        assert_eq!(index.all_labels(), ["a", "b", "c"]);
        assert_eq!(index.resource_idx("r2"), Some(ResourceIdx::new(1)));
        assert_eq!(index.resource_idx("r9"), None);
    }

    #[test]
    fn test_alias_shares_bucket() {
        let rs = resources(&[("r1", "linux x86"), ("r2", "linux")]);
        let index = LabelIndex::build(&rs, &[LabelAlias::new("lnx", "linux")], &[]);
        assert_eq!(names(&rs, index.resources_with_label("lnx")), ["r1", "r2"]);
        assert!(std::ptr::eq(
            index.resources_with_label("lnx"),
            index.resources_with_label("linux")
        ));
        assert_eq!(index.dereference_alias("lnx"), Some("linux"));
        assert_eq!(index.dereference_alias("linux"), None);
        assert_eq!(index.resolve_label("lnx"), "linux");
        assert!(index.is_valid_label("lnx"));
        assert_eq!(index.all_labels(), ["linux", "lnx", "x86"]);
    }

    #[test]
    fn test_alias_cannot_shadow_names_or_labels() {
        let rs = resources(&[("r1", "linux x86"), ("r2", "arm")]);
        let aliases = [
            LabelAlias::new("x86", "arm"),
            LabelAlias::new("r2", "linux"),
            LabelAlias::new("ghost", "missing"),
            LabelAlias::new("l", "linux"),
            LabelAlias::new("ll", "l"),
        ];
        let index = LabelIndex::build(&rs, &aliases, &[]);
        assert_eq!(names(&rs, index.resources_with_label("x86")), ["r1"]);
        assert!(!index.has_label("r2"));
        assert!(!index.has_label("ghost"));
        assert!(!index.has_label("ll"));
        assert_eq!(index.label_aliases(), [("l", "linux")]);
    }

    #[test]
    fn test_expression_marker_is_valid_label() {
        let index = LabelIndex::build(&[], &[], &[]);
        assert!(index.is_valid_label("expr:resourceName == 'x'"));
        assert!(!index.is_valid_label("x"));
    }

    #[test]
    fn test_load_balancing_groups() {
        let rs = resources(&[
            ("r1", "b x"),
            ("r2", "a b"),
            ("r3", "x"),
            ("r4", "a"),
        ]);
        let lb = ["a".to_string(), "b".to_string(), "c".to_string()];
        let index = LabelIndex::build(&rs, &[], &lb);
        assert!(index.load_balancing_enabled());
        let groups: Vec<_> = index
            .lb_groups()
            .iter()
            .map(|g| (g.label(), names(&rs, g.members())))
            .collect();
        assert_eq!(
            groups,
            vec![
                (Some("a"), vec!["r2", "r4"]),
                (Some("b"), vec!["r1"]),
                (None, vec!["r3"]),
            ]
        );
        assert_eq!(index.lb_group_of(ResourceIdx::new(0)), 1);
        assert_eq!(index.lb_group_of(ResourceIdx::new(2)), 2);

        let index = LabelIndex::build(&rs, &[], &lb[..1]);
        assert!(!index.load_balancing_enabled());
    }
}
