use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use lockable::WorkItemId;
use lockable::config::PoolConfig;
use lockable::expand::EnvVars;
use lockable::pool::{Admission, ResourcePool};
use lockable::requirement::RequirementSpec;

use crate::cli::{AllocateOpts, ResolveOpts};

/// Work item id used for dry-run admission attempts.
const DRY_RUN_WORK_ITEM: WorkItemId = WorkItemId::new(1);

pub fn load_pool(path: &Path) -> anyhow::Result<ResourcePool> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read catalog {}", path.display()))?;
    let config = PoolConfig::parse(&text)
        .with_context(|| format!("Invalid catalog {}", path.display()))?;
    log::debug!("Loaded {} resources from {}", config.resources.len(), path.display());
    Ok(ResourcePool::new(config)?)
}

fn make_env(vars: &[(String, String)]) -> EnvVars {
    vars.iter().cloned().collect()
}

#[derive(Debug, Serialize)]
pub struct CheckReport {
    pub resources: usize,
    pub labels: usize,
    pub aliases: usize,
    pub reserved: Vec<String>,
    pub load_balancing_labels: Vec<String>,
}

pub fn check(pool: &ResourcePool) -> CheckReport {
    let overview = pool.overview();
    CheckReport {
        resources: overview.len(),
        labels: pool.all_labels().len() - pool.label_aliases().len(),
        aliases: pool.label_aliases().len(),
        reserved: overview
            .into_iter()
            .filter(|r| r.reserved_by.is_some())
            .map(|r| r.name)
            .collect(),
        load_balancing_labels: pool.load_balancing_labels(),
    }
}

#[derive(Debug, Serialize)]
pub struct LabelEntry {
    pub label: String,
    pub alias_of: Option<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LoadBalancingEntry {
    pub label: Option<String>,
    pub resources: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct LabelsReport {
    pub labels: Vec<LabelEntry>,
    pub load_balancing: Vec<LoadBalancingEntry>,
}

pub fn labels(pool: &ResourcePool) -> LabelsReport {
    let labels = pool
        .all_labels()
        .into_iter()
        .map(|label| LabelEntry {
            alias_of: pool.dereference_alias(&label),
            resources: pool.resources_with_label(&label),
            label,
        })
        .collect();
    let load_balancing = pool
        .load_balancing_groups()
        .into_iter()
        .map(|(label, resources)| LoadBalancingEntry { label, resources })
        .collect();
    LabelsReport {
        labels,
        load_balancing,
    }
}

#[derive(Debug, Serialize)]
pub struct ResolveReport {
    pub text: String,
    pub mode: String,
    pub resources: Vec<String>,
    /// `0` stands for all of them.
    pub required_number: usize,
}

pub fn resolve(pool: &ResourcePool, opts: &ResolveOpts) -> anyhow::Result<ResolveReport> {
    let mut builder = RequirementSpec::builder().names(opts.spec.as_str());
    if let Some(count) = &opts.count {
        builder = builder.count(count.as_str());
    }
    let spec = builder.build()?;
    let resolved = pool.resolve_requirement(&spec, &make_env(&opts.env));
    Ok(ResolveReport {
        text: resolved.display_text(),
        mode: format!("{:?}", resolved.mode()),
        resources: resolved.required().to_vec(),
        required_number: resolved.required_number(),
    })
}

#[derive(Debug, Serialize)]
pub struct SelectedResource {
    pub name: String,
    pub requirement: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllocateReport {
    Ready {
        selected: Vec<SelectedResource>,
        environment: Vec<(String, String)>,
    },
    Blocked {
        reason: String,
    },
    NoRequirements,
}

pub fn allocate(pool: &ResourcePool, opts: &AllocateOpts) -> anyhow::Result<AllocateReport> {
    let specs = opts
        .requirements
        .iter()
        .map(|(names, count)| {
            let mut builder = RequirementSpec::builder().names(names.as_str());
            if let Some(count) = count {
                builder = builder.count(count.as_str());
            }
            if opts.percent {
                builder = builder.percent_matching(true);
            }
            builder.build()
        })
        .collect::<lockable::Result<Vec<_>>>()?;

    let env = make_env(&opts.env);
    Ok(
        match pool.check_admission(DRY_RUN_WORK_ITEM, "lockctl", &specs, &env) {
            Admission::Ready(matched) => {
                let selected = matched
                    .entries()
                    .iter()
                    .map(|entry| SelectedResource {
                        name: entry.name.clone(),
                        requirement: matched.group_of(&entry.name).and_then(|g| g.text.clone()),
                    })
                    .collect();
                let mut environment: Vec<(String, String)> = matched
                    .environment()
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect();
                environment.sort();
                AllocateReport::Ready {
                    selected,
                    environment,
                }
            }
            Admission::Blocked(reason) => AllocateReport::Blocked {
                reason: reason.to_string(),
            },
            Admission::NoRequirements => AllocateReport::NoRequirements,
        },
    )
}
