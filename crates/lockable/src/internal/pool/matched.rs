use serde::Serialize;

use crate::internal::expand::EnvVars;
use crate::internal::requirement::ResolvedRequirement;
use crate::internal::resource::ResourceProperty;

/// Requirement group a matched resource was selected for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchedGroup {
    pub text: Option<String>,
    pub output_var: Option<String>,
    pub env_prefix: Option<String>,
}

impl From<&ResolvedRequirement> for MatchedGroup {
    fn from(requirement: &ResolvedRequirement) -> Self {
        MatchedGroup {
            text: requirement.text().map(|t| t.to_string()),
            output_var: requirement.output_var().map(|v| v.to_string()),
            env_prefix: requirement.env_prefix().map(|p| p.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedEntry {
    pub name: String,
    pub group: usize,
    pub properties: Vec<ResourceProperty>,
}

/// Resources selected for one work item, in selection order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatchedResources {
    groups: Vec<MatchedGroup>,
    entries: Vec<MatchedEntry>,
}

impl MatchedResources {
    pub(crate) fn new(groups: Vec<MatchedGroup>) -> Self {
        MatchedResources {
            groups,
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, name: &str, group: usize, properties: &[ResourceProperty]) {
        self.entries.push(MatchedEntry {
            name: name.to_string(),
            group,
            properties: properties.to_vec(),
        });
    }

    pub(crate) fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.entries.retain(|e| keep(&e.name));
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn entries(&self) -> &[MatchedEntry] {
        &self.entries
    }

    pub fn groups(&self) -> &[MatchedGroup] {
        &self.groups
    }

    /// The requirement group `name` was selected for.
    pub fn group_of(&self, name: &str) -> Option<&MatchedGroup> {
        self.entries
            .iter()
            .find(|e| e.name == name)
            .and_then(|e| self.groups.get(e.group))
    }

    /// Variables describing the selection.
    ///
    /// The output variable of a group collects the names of its resources separated
    /// by spaces. With a prefix, each property `P` of the `n`-th resource of a group
    /// (counting from 1) becomes `<prefix><n>_<P>`.
    pub fn environment(&self) -> EnvVars {
        let mut env = EnvVars::new();
        let mut counters = vec![0usize; self.groups.len()];
        for entry in &self.entries {
            let Some(group) = self.groups.get(entry.group) else {
                continue;
            };
            counters[entry.group] += 1;
            let n = counters[entry.group];

            if let Some(var) = &group.output_var {
                let value = match env.get(var) {
                    Some(previous) => format!("{previous} {}", entry.name),
                    None => entry.name.clone(),
                };
                env.insert(var.clone(), value);
            }
            if let Some(prefix) = &group.env_prefix {
                for property in &entry.properties {
                    env.insert(format!("{prefix}{n}_{}", property.name), property.value.clone());
                }
            }
        }
        env
    }
}
