pub(crate) mod matched;
pub(crate) mod state;
pub(crate) mod store;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;

use crate::internal::allocator::{AllocationOutcome, attempt_allocate};
use crate::internal::common::clock::{Clock, Expiry, SystemClock};
use crate::internal::common::ids::WorkItemId;
use crate::internal::common::utils::fix_empty_and_trim;
use crate::internal::config::PoolConfig;
use crate::internal::expand::EnvVars;
use crate::internal::index::LabelIndex;
use crate::internal::predicate::{BasicEvaluator, ExpressionEvaluator};
use crate::internal::requirement::{
    RequirementSpec, ResolveContext, ResolvedRequirement, validate_resource_names,
    validate_resource_number,
};
use crate::internal::resource::{LockOwner, Resource, ResourceState};
use matched::MatchedResources;
use state::PoolState;
use store::{CatalogStore, NoopStore};

/// Point in time view of one resource, for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceOverview {
    pub name: String,
    pub description: Option<String>,
    pub labels: Vec<String>,
    pub state: &'static str,
    pub reserved_by: Option<String>,
    pub locked_by: Option<String>,
    pub queued_by: Option<u64>,
    pub queued_project: Option<String>,
}

impl ResourceOverview {
    fn new(resource: &Resource, expiry: &Expiry) -> Self {
        let state = resource.state(expiry);
        let (queued_by, queued_project) = match &state {
            ResourceState::Queued { owner, project, .. } => {
                (Some(owner.as_num()), Some(project.clone()))
            }
            _ => (None, None),
        };
        ResourceOverview {
            name: resource.name().to_string(),
            description: resource.description().map(|d| d.to_string()),
            labels: resource.labels().to_vec(),
            state: state.name(),
            reserved_by: resource.reserved_by().map(|r| r.to_string()),
            locked_by: resource.locked_by().map(|o| o.to_string()),
            queued_by,
            queued_project,
        }
    }
}

/// The shared set of lockable resources.
///
/// All mutation goes through one internal lock. The label index is published
/// separately so lookups never wait for an allocation in progress.
#[derive(Debug)]
pub struct ResourcePool {
    state: Mutex<PoolState>,
    index: RwLock<Arc<LabelIndex>>,
    clock: Arc<dyn Clock>,
    evaluator: Arc<dyn ExpressionEvaluator>,
    store: Box<dyn CatalogStore>,
}

impl ResourcePool {
    pub fn new(config: PoolConfig) -> crate::Result<Self> {
        let state = PoolState::from_config(&config)?;
        Ok(ResourcePool {
            index: RwLock::new(state.index.clone()),
            state: Mutex::new(state),
            clock: Arc::new(SystemClock),
            evaluator: Arc::new(BasicEvaluator),
            store: Box::new(NoopStore),
        })
    }

    /// Creates the pool from what `store` holds; an empty store gives an empty pool.
    pub fn load(store: Box<dyn CatalogStore>) -> crate::Result<Self> {
        let config = store.load()?.unwrap_or_default();
        Ok(Self::new(config)?.with_store(store))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_evaluator(mut self, evaluator: Arc<dyn ExpressionEvaluator>) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_store(mut self, store: Box<dyn CatalogStore>) -> Self {
        self.store = store;
        self
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn expiry(&self, state: &PoolState) -> Expiry {
        state.expiry(self.clock.now())
    }

    /// The most recently published label index.
    pub fn index(&self) -> Arc<LabelIndex> {
        self.index
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn publish_index(&self, state: &PoolState) {
        *self.index.write().unwrap_or_else(PoisonError::into_inner) = state.index.clone();
    }

    /// Rebuilds and publishes the index after a label change, then saves.
    fn save_relabeled(&self, state: &mut PoolState) -> crate::Result<()> {
        state.rebuild_index();
        self.publish_index(state);
        self.save(state)
    }

    fn save(&self, state: &PoolState) -> crate::Result<()> {
        self.store.save(&state.to_config()).inspect_err(|error| {
            log::error!("Unable to save configuration: {error}");
        })
    }

    pub fn resolve_requirement(
        &self,
        spec: &RequirementSpec,
        env: &EnvVars,
    ) -> ResolvedRequirement {
        let state = self.lock_state();
        Self::resolve_locked(&state, self.evaluator.as_ref(), spec, env)
    }

    pub(crate) fn resolve_locked(
        state: &PoolState,
        evaluator: &dyn ExpressionEvaluator,
        spec: &RequirementSpec,
        env: &EnvVars,
    ) -> ResolvedRequirement {
        ResolveContext {
            resources: &state.resources,
            index: &state.index,
            evaluator,
            percent_matching_default: state.percent_matching_default,
        }
        .resolve(spec, env)
    }

    /// Tries to queue every resource `groups` ask for on behalf of `work_item`.
    ///
    /// Never blocks on availability: if the request cannot be met now, the pool is
    /// left unchanged apart from dropping stale entries of the previous selection.
    pub fn attempt_allocate(
        &self,
        work_item: WorkItemId,
        project: &str,
        groups: &[ResolvedRequirement],
    ) -> AllocationOutcome {
        let mut state = self.lock_state();
        let expiry = self.expiry(&state);
        trace_time!(project, "allocate", {
            attempt_allocate(&mut state, &expiry, work_item, project, groups)
        })
    }

    /// Locks all of `names` for `owner`, or none of them.
    pub fn lock<S: AsRef<str>>(&self, names: &[S], owner: &LockOwner) -> bool {
        let mut state = self.lock_state();
        self.lock_in(&mut state, names, owner)
    }

    pub(crate) fn lock_in<S: AsRef<str>>(
        &self,
        state: &mut PoolState,
        names: &[S],
        owner: &LockOwner,
    ) -> bool {
        let mut to_lock = Vec::with_capacity(names.len());
        for name in names {
            let name = name.as_ref();
            match state.index.resource_idx(name) {
                Some(idx) => {
                    let resource = &state.resources[idx.index()];
                    if resource.is_reserved() || resource.is_locked() {
                        log::debug!(
                            "Cannot lock {name} for {owner}: {}",
                            resource.state(&self.expiry(state)).name()
                        );
                        return false;
                    }
                    if !to_lock.contains(&idx) {
                        to_lock.push(idx);
                    }
                }
                None => {
                    log::debug!("Cannot lock unknown resource {name}");
                    return false;
                }
            }
        }
        for idx in to_lock {
            state.resources[idx.index()].lock(owner.clone());
        }
        log::debug!("{owner} acquired lock on {} resources", names.len());
        true
    }

    /// Unlocks the resources of `names` held by `owner`, or regardless of the holder
    /// when `owner` is `None`. Returns how many were unlocked.
    pub fn unlock<S: AsRef<str>>(&self, names: &[S], owner: Option<&LockOwner>) -> usize {
        let mut state = self.lock_state();
        let mut count = 0;
        for name in names {
            let Some(resource) = state.resource_mut(name.as_ref()) else {
                continue;
            };
            if owner.is_none() || resource.locked_by() == owner {
                if resource.is_locked() {
                    count += 1;
                }
                resource.unlock();
            }
        }
        log::debug!("Released lock on {count} resources");
        count
    }

    /// Reserves all of `names` for `user`, or none of them when any is not free.
    pub fn reserve<S: AsRef<str>>(&self, names: &[S], user: &str) -> crate::Result<bool> {
        let mut state = self.lock_state();
        let expiry = self.expiry(&state);
        for name in names {
            let name = name.as_ref();
            match state.resource(name) {
                Some(resource) if resource.is_free(&expiry) => {}
                Some(resource) => {
                    log::debug!(
                        "Cannot reserve {name} for {user}: {}",
                        resource.state(&expiry).name()
                    );
                    return Ok(false);
                }
                None => {
                    log::debug!("Cannot reserve unknown resource {name}");
                    return Ok(false);
                }
            }
        }
        for name in names {
            if let Some(resource) = state.resource_mut(name.as_ref()) {
                resource.reserve(user);
            }
        }
        self.save(&state)?;
        Ok(true)
    }

    pub fn unreserve<S: AsRef<str>>(&self, names: &[S]) -> crate::Result<()> {
        let mut state = self.lock_state();
        for name in names {
            if let Some(resource) = state.resource_mut(name.as_ref()) {
                resource.unreserve();
            }
        }
        self.save(&state)
    }

    /// Clears reservation, lock and queue ticket of `names`.
    pub fn reset<S: AsRef<str>>(&self, names: &[S]) -> crate::Result<()> {
        let mut state = self.lock_state();
        for name in names {
            if let Some(resource) = state.resource_mut(name.as_ref()) {
                resource.reset();
            }
        }
        self.save(&state)
    }

    /// Replaces the catalog and settings. Resources that keep their name keep their
    /// lock and queue ticket. An invalid configuration leaves the pool untouched.
    pub fn configure(&self, config: &PoolConfig) -> crate::Result<()> {
        let mut state = self.lock_state();
        state.apply_config(config)?;
        self.publish_index(&state);
        self.save(&state)
    }

    pub fn add_resource_label(&self, name: &str, label: &str) -> crate::Result<bool> {
        let mut state = self.lock_state();
        let added = match state.resource_mut(name) {
            Some(resource) => resource.add_label(label),
            None => false,
        };
        if added {
            self.save_relabeled(&mut state)?;
        }
        Ok(added)
    }

    pub fn remove_resource_label(&self, name: &str, label: &str) -> crate::Result<bool> {
        let mut state = self.lock_state();
        let removed = match state.resource_mut(name) {
            Some(resource) => resource.remove_label(label),
            None => false,
        };
        if removed {
            self.save_relabeled(&mut state)?;
        }
        Ok(removed)
    }

    /// Drops the selection of a work item that left the queue and releases the
    /// resources it still has queued. Returns how many were released.
    pub fn release_work_item(&self, work_item: WorkItemId) -> usize {
        let mut state = self.lock_state();
        let expiry = self.expiry(&state);
        let Some(matched) = state.matched.remove(&work_item) else {
            return 0;
        };
        let mut released = 0;
        for name in matched.names() {
            if let Some(resource) = state.resource_mut(name) {
                if resource.is_queued_by(work_item, &expiry) {
                    resource.unqueue();
                    released += 1;
                }
            }
        }
        log::debug!("Released {released} queued resources of {work_item}");
        released
    }

    /// Last successful selection recorded for `work_item`.
    pub fn matched_resources(&self, work_item: WorkItemId) -> Option<MatchedResources> {
        self.lock_state().matched.get(&work_item).cloned()
    }

    pub fn resource_names(&self) -> Vec<String> {
        self.lock_state()
            .resources
            .iter()
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<Resource> {
        self.lock_state().resource(name).cloned()
    }

    pub fn resource_state(&self, name: &str) -> Option<ResourceState> {
        let state = self.lock_state();
        let expiry = self.expiry(&state);
        state.resource(name).map(|r| r.state(&expiry))
    }

    pub fn free_resource_amount(&self, label: &str) -> usize {
        let state = self.lock_state();
        let expiry = self.expiry(&state);
        state
            .index
            .resources_with_label(label.trim())
            .iter()
            .filter(|idx| state.resources[idx.index()].is_free(&expiry))
            .count()
    }

    pub fn is_valid_label(&self, label: &str) -> bool {
        self.index().is_valid_label(label)
    }

    pub fn all_labels(&self) -> Vec<String> {
        self.index()
            .all_labels()
            .into_iter()
            .map(|l| l.to_string())
            .collect()
    }

    pub fn label_aliases(&self) -> Vec<(String, String)> {
        self.index()
            .label_aliases()
            .into_iter()
            .map(|(a, l)| (a.to_string(), l.to_string()))
            .collect()
    }

    pub fn dereference_alias(&self, alias: &str) -> Option<String> {
        self.index().dereference_alias(alias).map(|l| l.to_string())
    }

    pub fn load_balancing_labels(&self) -> Vec<String> {
        self.lock_state().lb_labels.clone()
    }

    /// Load balancing groups in configured order, resources without a load
    /// balancing label last. Empty when load balancing is off.
    pub fn load_balancing_groups(&self) -> Vec<(Option<String>, Vec<String>)> {
        let state = self.lock_state();
        if !state.index.load_balancing_enabled() {
            return Vec::new();
        }
        state
            .index
            .lb_groups()
            .iter()
            .map(|group| {
                let members = group
                    .members()
                    .iter()
                    .map(|idx| state.resources[idx.index()].name().to_string())
                    .collect();
                (group.label().map(|l| l.to_string()), members)
            })
            .collect()
    }

    /// Names of the resources carrying `label` or the label an alias points to.
    pub fn resources_with_label(&self, label: &str) -> Vec<String> {
        let state = self.lock_state();
        state
            .index
            .resources_with_label(label.trim())
            .iter()
            .map(|idx| state.resources[idx.index()].name().to_string())
            .collect()
    }

    pub fn resources_queued_by_project(&self, project: &str) -> Vec<String> {
        let state = self.lock_state();
        let expiry = self.expiry(&state);
        state
            .resources
            .iter()
            .filter(|r| r.queue_project(&expiry) == Some(project))
            .map(|r| r.name().to_string())
            .collect()
    }

    pub fn resources_locked_by(&self, owner: &LockOwner) -> Vec<String> {
        self.lock_state()
            .resources
            .iter()
            .filter(|r| r.locked_by() == Some(owner))
            .map(|r| r.name().to_string())
            .collect()
    }

    /// Resource names, then labels, starting with `prefix`.
    pub fn autocomplete(&self, prefix: &str) -> Vec<String> {
        let Some(prefix) = fix_empty_and_trim(Some(prefix)) else {
            return Vec::new();
        };
        let mut result: Vec<String> = self
            .resource_names()
            .into_iter()
            .filter(|n| n.starts_with(&prefix))
            .collect();
        result.extend(
            self.all_labels()
                .into_iter()
                .filter(|l| l.starts_with(&prefix)),
        );
        result
    }

    pub fn overview(&self) -> Vec<ResourceOverview> {
        let state = self.lock_state();
        let expiry = self.expiry(&state);
        state
            .resources
            .iter()
            .map(|r| ResourceOverview::new(r, &expiry))
            .collect()
    }

    /// The persisted form of the current catalog.
    pub fn snapshot(&self) -> PoolConfig {
        self.lock_state().to_config()
    }

    pub fn validate_resource_names(&self, names: &str) -> crate::Result<()> {
        validate_resource_names(names, &self.index())
    }

    pub fn validate_resource_number(
        &self,
        number: Option<&str>,
        names: Option<&str>,
    ) -> crate::Result<()> {
        validate_resource_number(number, names, &self.index())
    }

    pub(crate) fn evaluator(&self) -> &dyn ExpressionEvaluator {
        self.evaluator.as_ref()
    }
}
