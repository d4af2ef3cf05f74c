use std::sync::Arc;
use std::time::Duration;

use crate::internal::allocator::AllocationOutcome;
use crate::internal::common::clock::ManualClock;
use crate::internal::common::ids::WorkItemId;
use crate::internal::config::{LabelList, PoolConfig, ResourceConfig};
use crate::internal::expand::EnvVars;
use crate::internal::index::LabelAlias;
use crate::internal::pool::ResourcePool;
use crate::internal::pool::store::MemoryStore;
use crate::internal::requirement::{RequirementSpec, ResolvedRequirement};
use crate::internal::resource::ResourceState;

pub fn sorted_vec<T: Ord>(mut vec: Vec<T>) -> Vec<T> {
    vec.sort();
    vec
}

#[allow(unused)]
pub fn enable_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn expect_error_message<T: std::fmt::Debug>(result: crate::Result<T>, msg: &str) {
    match result {
        Ok(value) => panic!("Expected error, got Ok({value:?})"),
        Err(error) => {
            let formatted = error.to_string();
            if !formatted.contains(msg) {
                panic!("Did not find `{msg}` in `{formatted}`");
            }
        }
    }
}

/// Requirement on `names`, `count` of `0` asks for every candidate.
pub fn spec(names: &str, count: usize) -> RequirementSpec {
    let builder = RequirementSpec::builder().names(names);
    if count > 0 {
        builder.count(count.to_string()).build().unwrap()
    } else {
        builder.build().unwrap()
    }
}

#[derive(Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    pub fn resource(mut self, name: &str, labels: &str) -> Self {
        self.config
            .resources
            .push(ResourceConfig::new(name).with_labels(labels));
        self
    }

    pub fn resource_config(mut self, resource: ResourceConfig) -> Self {
        self.config.resources.push(resource);
        self
    }

    pub fn alias(mut self, name: &str, label: &str) -> Self {
        self.config.aliases.push(LabelAlias::new(name, label));
        self
    }

    pub fn load_balancing(mut self, labels: &str) -> Self {
        self.config.load_balancing_labels = LabelList::Text(labels.to_string());
        self
    }

    pub fn evenly(mut self, seed: u64) -> Self {
        self.config.use_resources_evenly = true;
        self.config.seed = Some(seed);
        self
    }

    pub fn percent_matching(mut self) -> Self {
        self.config.use_percent_matching_default = true;
        self
    }

    pub fn build(self) -> TestPool {
        let clock = Arc::new(ManualClock::default());
        let store = Arc::new(MemoryStore::new(self.config.clone()));
        let pool = ResourcePool::new(self.config)
            .unwrap()
            .with_clock(clock.clone())
            .with_store(Box::new(store.clone()));
        TestPool { pool, clock, store }
    }
}

pub struct TestPool {
    pub pool: ResourcePool,
    pub clock: Arc<ManualClock>,
    pub store: Arc<MemoryStore>,
}

impl TestPool {
    pub fn resolve(&self, spec: &RequirementSpec) -> ResolvedRequirement {
        self.pool.resolve_requirement(spec, &EnvVars::new())
    }

    pub fn allocate(&self, work_item: u64, specs: &[RequirementSpec]) -> AllocationOutcome {
        let groups: Vec<ResolvedRequirement> = specs.iter().map(|s| self.resolve(s)).collect();
        self.pool.attempt_allocate(
            WorkItemId::new(work_item),
            &format!("project-{work_item}"),
            &groups,
        )
    }

    /// Names picked by a successful allocation, in selection order.
    pub fn selected(&self, work_item: u64, specs: &[RequirementSpec]) -> Vec<String> {
        match self.allocate(work_item, specs) {
            AllocationOutcome::Selected(matched) => {
                matched.names().map(|n| n.to_string()).collect()
            }
            AllocationOutcome::NotSatisfiable => panic!("Allocation of {specs:?} failed"),
        }
    }

    pub fn state(&self, name: &str) -> ResourceState {
        self.pool.resource_state(name).unwrap()
    }

    pub fn queued_by(&self, work_item: u64) -> Vec<String> {
        self.pool
            .resources_queued_by_project(&format!("project-{work_item}"))
    }

    pub fn free(&self) -> Vec<String> {
        self.pool
            .resource_names()
            .into_iter()
            .filter(|n| self.state(n).is_free())
            .collect()
    }

    pub fn advance(&self, seconds: u64) {
        self.clock.advance(Duration::from_secs(seconds));
    }
}

pub fn pool_with(resources: &[(&str, &str)]) -> TestPool {
    resources
        .iter()
        .fold(PoolBuilder::default(), |b, (name, labels)| {
            b.resource(name, labels)
        })
        .build()
}
