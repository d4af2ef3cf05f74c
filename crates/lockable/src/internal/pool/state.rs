use std::sync::Arc;
use std::time::Duration;

use crate::Map;
use crate::internal::allocator::select::Picker;
use crate::internal::common::clock::Expiry;
use crate::internal::common::ids::WorkItemId;
use crate::internal::config::{LabelList, PoolConfig, ResourceConfig};
use crate::internal::index::{LabelAlias, LabelIndex};
use crate::internal::pool::matched::MatchedResources;
use crate::internal::resource::Resource;

/// Everything guarded by the pool lock.
#[derive(Debug)]
pub(crate) struct PoolState {
    pub resources: Vec<Resource>,
    pub aliases: Vec<LabelAlias>,
    pub lb_labels: Vec<String>,
    pub use_resources_evenly: bool,
    pub percent_matching_default: bool,
    pub queue_timeout: Duration,
    pub seed: Option<u64>,
    pub picker: Picker,
    pub matched: Map<WorkItemId, MatchedResources>,
    pub index: Arc<LabelIndex>,
}

impl PoolState {
    pub fn from_config(config: &PoolConfig) -> crate::Result<Self> {
        let resources = config.build_resources()?;
        let mut state = PoolState {
            resources,
            aliases: config.trimmed_aliases(),
            lb_labels: config.load_balancing_labels(),
            use_resources_evenly: config.use_resources_evenly,
            percent_matching_default: config.use_percent_matching_default,
            queue_timeout: config.queue_timeout,
            seed: config.seed,
            picker: Picker::new(config.use_resources_evenly, config.seed),
            matched: Map::default(),
            index: Default::default(),
        };
        state.rebuild_index();
        Ok(state)
    }

    /// Replaces the catalog and settings. Surviving resources keep their lock and ticket.
    pub fn apply_config(&mut self, config: &PoolConfig) -> crate::Result<()> {
        let mut resources = config.build_resources()?;
        for resource in resources.iter_mut() {
            if let Some(old) = self.index.resource_idx(resource.name()) {
                resource.inherit_transient_state(&self.resources[old.index()]);
            }
        }
        self.resources = resources;
        self.aliases = config.trimmed_aliases();
        self.lb_labels = config.load_balancing_labels();
        self.use_resources_evenly = config.use_resources_evenly;
        self.percent_matching_default = config.use_percent_matching_default;
        self.queue_timeout = config.queue_timeout;
        if self.seed != config.seed {
            self.seed = config.seed;
            self.picker = Picker::new(config.use_resources_evenly, config.seed);
        } else {
            self.picker.set_evenly(config.use_resources_evenly);
        }
        self.rebuild_index();
        Ok(())
    }

    pub fn rebuild_index(&mut self) {
        self.index = Arc::new(LabelIndex::build(
            &self.resources,
            &self.aliases,
            &self.lb_labels,
        ));
    }

    pub fn expiry(&self, now: std::time::Instant) -> Expiry {
        Expiry::new(now, self.queue_timeout)
    }

    pub fn resource(&self, name: &str) -> Option<&Resource> {
        self.index
            .resource_idx(name)
            .map(|idx| &self.resources[idx.index()])
    }

    pub fn resource_mut(&mut self, name: &str) -> Option<&mut Resource> {
        self.index
            .resource_idx(name)
            .map(|idx| &mut self.resources[idx.index()])
    }

    pub fn to_config(&self) -> PoolConfig {
        PoolConfig {
            load_balancing_labels: LabelList::List(self.lb_labels.clone()),
            use_resources_evenly: self.use_resources_evenly,
            use_percent_matching_default: self.percent_matching_default,
            queue_timeout: self.queue_timeout,
            seed: self.seed,
            resources: self.resources.iter().map(ResourceConfig::from).collect(),
            aliases: self.aliases.clone(),
        }
    }
}
