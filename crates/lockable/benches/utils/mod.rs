use lockable::config::{LabelList, PoolConfig, ResourceConfig};
use lockable::pool::ResourcePool;
use lockable::requirement::RequirementSpec;

/// Pool of `count` resources spread over `groups` racks, all sharing the `any` label.
pub fn create_pool(count: usize, groups: usize, load_balancing: bool) -> ResourcePool {
    let mut config = PoolConfig::default();
    for i in 0..count {
        config.resources.push(
            ResourceConfig::new(format!("res-{i}"))
                .with_labels(&format!("any rack-{} kind-{}", i % groups, i % 3)),
        );
    }
    if load_balancing {
        config.load_balancing_labels =
            LabelList::List((0..groups).map(|g| format!("rack-{g}")).collect());
    }
    ResourcePool::new(config).unwrap()
}

pub fn label_spec(label: &str, count: usize) -> RequirementSpec {
    RequirementSpec::builder()
        .names(label)
        .count(count.to_string())
        .build()
        .unwrap()
}
