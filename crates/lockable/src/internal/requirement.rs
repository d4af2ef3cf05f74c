use derive_builder::Builder;
use serde::{Deserialize, Serialize};

use crate::internal::common::error::{LockError, validation_error};
use crate::internal::common::ids::ResourceIdx;
use crate::internal::common::utils::{fix_empty_and_trim, push_unique, split_tokens};
use crate::internal::expand::{EnvVars, expand_tokens, expanded_variables};
use crate::internal::index::LabelIndex;
use crate::internal::predicate::{ExpressionEvaluator, ResourceView, expression_matches};
use crate::internal::resource::Resource;
use crate::{Result, Set};

/// Requirement text starting with this marker is a boolean expression over each resource.
pub const EXPRESSION_MARKER: &str = "expr:";
/// Requirement text starting with this marker lists labels a resource must all carry.
pub const LABEL_MARKER: &str = "label:";

/// One group of resources a work item asks for, as written by the user.
#[derive(Debug, Clone, Default, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(pattern = "owned", build_fn(error = "LockError"))]
pub struct RequirementSpec {
    /// Resource names, labels, `label:` list or `expr:` expression.
    #[builder(setter(into))]
    pub names: String,
    /// How many resources to take; missing, zero or unparsable means all.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub count: Option<String>,
    /// Variable that receives the space separated names of the matched resources.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub output_var: Option<String>,
    /// Prefix of per resource property variables.
    #[builder(default, setter(into, strip_option))]
    #[serde(default)]
    pub env_prefix: Option<String>,
    /// Overrides the pool wide percent matching default.
    #[builder(default, setter(strip_option))]
    #[serde(default)]
    pub percent_matching: Option<bool>,
}

impl RequirementSpec {
    pub fn new(names: impl Into<String>) -> Self {
        RequirementSpec {
            names: names.into(),
            ..Default::default()
        }
    }

    pub fn builder() -> RequirementSpecBuilder {
        RequirementSpecBuilder::default()
    }
}

impl From<derive_builder::UninitializedFieldError> for LockError {
    fn from(error: derive_builder::UninitializedFieldError) -> Self {
        LockError::Validation(error.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequirementMode {
    Expression,
    ExactLabels,
    Default,
}

impl RequirementMode {
    pub fn of(text: &str) -> Self {
        if text.starts_with(EXPRESSION_MARKER) {
            RequirementMode::Expression
        } else if text.starts_with(LABEL_MARKER) {
            RequirementMode::ExactLabels
        } else {
            RequirementMode::Default
        }
    }
}

/// A requirement bound to the catalog it was resolved against.
#[derive(Debug, Clone)]
pub struct ResolvedRequirement {
    text: Option<String>,
    mode: RequirementMode,
    required: Vec<String>,
    required_number: usize,
    output_var: Option<String>,
    env_prefix: Option<String>,
    percent_labels: Option<Vec<String>>,
    env: EnvVars,
}

impl ResolvedRequirement {
    /// The trimmed requirement text, `None` when it was empty.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn mode(&self) -> RequirementMode {
        self.mode
    }

    /// Names of the candidate resources in catalog resolution order, without duplicates.
    pub fn required(&self) -> &[String] {
        &self.required
    }

    /// Requested amount, `0` means every candidate.
    pub fn required_number(&self) -> usize {
        self.required_number
    }

    pub fn output_var(&self) -> Option<&str> {
        self.output_var.as_deref()
    }

    pub fn env_prefix(&self) -> Option<&str> {
        self.env_prefix.as_deref()
    }

    pub fn uses_percent_matching(&self) -> bool {
        self.percent_labels.is_some()
    }

    /// Labels percent matching compares against, `None` when percent matching is off.
    /// An empty list means the requirement cannot be ranked by labels.
    pub fn percent_labels(&self) -> Option<&[String]> {
        self.percent_labels.as_deref()
    }

    pub fn env(&self) -> &EnvVars {
        &self.env
    }

    /// Requirement text with the variables of the work item substituted.
    pub fn display_text(&self) -> String {
        self.text
            .as_deref()
            .map(|t| self.env.expand(t))
            .unwrap_or_default()
    }
}

pub(crate) struct ResolveContext<'a> {
    pub resources: &'a [Resource],
    pub index: &'a LabelIndex,
    pub evaluator: &'a dyn ExpressionEvaluator,
    pub percent_matching_default: bool,
}

impl ResolveContext<'_> {
    pub fn resolve(&self, spec: &RequirementSpec, env: &EnvVars) -> ResolvedRequirement {
        let text = fix_empty_and_trim(Some(&spec.names));
        let mode = text.as_deref().map_or(RequirementMode::Default, RequirementMode::of);

        let mut found: Vec<ResourceIdx> = Vec::new();
        if let Some(text) = text.as_deref() {
            match mode {
                RequirementMode::Expression => {
                    let expression = &text[EXPRESSION_MARKER.len()..];
                    log::trace!("Looking for resources matching expression {expression}");
                    for (i, resource) in self.resources.iter().enumerate() {
                        let view = ResourceView::from(resource);
                        if expression_matches(self.evaluator, expression, &view, env) {
                            found.push(ResourceIdx::new(i as u32));
                        }
                    }
                }
                RequirementMode::ExactLabels => {
                    let labels = self.exact_labels(text, env);
                    log::trace!("Exact label matching looking for labels {labels:?}");
                    if !labels.is_empty() {
                        for (i, resource) in self.resources.iter().enumerate() {
                            if resource.has_all_labels(&labels) {
                                found.push(ResourceIdx::new(i as u32));
                            }
                        }
                    }
                }
                RequirementMode::Default => {
                    for token in expand_tokens(split_tokens(text), env) {
                        if let Some(idx) = self.index.resource_idx(&token) {
                            push_unique(&mut found, idx);
                        } else {
                            let members = self.index.resources_with_label(&token);
                            if members.is_empty() {
                                log::trace!("{token} is neither a resource nor a label");
                            }
                            for idx in members {
                                push_unique(&mut found, *idx);
                            }
                        }
                    }
                }
            }
        }

        let required: Vec<String> = found
            .iter()
            .map(|idx| self.resources[idx.index()].name().to_string())
            .collect();
        log::debug!("Found required resources {required:?} for {text:?}");

        let required_number = expanded_variables(
            fix_empty_and_trim(spec.count.as_deref()).as_deref(),
            env,
            1,
        )
        .and_then(|n| n.parse::<usize>().ok())
        .unwrap_or(0);

        let percent_labels = spec
            .percent_matching
            .unwrap_or(self.percent_matching_default)
            .then(|| match (mode, text.as_deref()) {
                (RequirementMode::Expression, _) | (_, None) => Vec::new(),
                (RequirementMode::ExactLabels, Some(text)) => self.exact_labels(text, env),
                (RequirementMode::Default, Some(text)) => expand_tokens(split_tokens(text), env)
                    .iter()
                    .map(|t| self.index.resolve_label(t).to_string())
                    .collect(),
            });

        ResolvedRequirement {
            text,
            mode,
            required,
            required_number,
            output_var: expanded_variables(
                fix_empty_and_trim(spec.output_var.as_deref()).as_deref(),
                env,
                1,
            ),
            env_prefix: expanded_variables(
                fix_empty_and_trim(spec.env_prefix.as_deref()).as_deref(),
                env,
                1,
            ),
            percent_labels,
            env: env.clone(),
        }
    }

    fn exact_labels(&self, text: &str, env: &EnvVars) -> Vec<String> {
        let text = &text[LABEL_MARKER.len()..];
        expand_tokens(split_tokens(text), env)
            .iter()
            .map(|label| self.index.resolve_label(label).to_string())
            .collect()
    }
}

/// Checks that every token of `names` is a known resource or label.
pub(crate) fn validate_resource_names(names: &str, index: &LabelIndex) -> Result<()> {
    let Some(names) = fix_empty_and_trim(Some(names)) else {
        return Ok(());
    };
    let mut unknown = Vec::new();
    for name in split_tokens(&names) {
        if index.resource_idx(name).is_none() && !index.is_valid_label(name) {
            push_unique(&mut unknown, name.to_string());
        }
    }
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(LockError::UnknownResources(unknown))
    }
}

/// Checks that `number` can be satisfied by what `names` can ever resolve to.
pub(crate) fn validate_resource_number(
    number: Option<&str>,
    names: Option<&str>,
    index: &LabelIndex,
) -> Result<()> {
    let Some(number) = fix_empty_and_trim(number).filter(|n| n != "0") else {
        return Ok(());
    };
    let Ok(number) = number.parse::<usize>() else {
        return validation_error("Could not parse the given value as integer.");
    };
    let Some(names) = fix_empty_and_trim(names) else {
        return Ok(());
    };
    if names.starts_with(EXPRESSION_MARKER) {
        return Ok(());
    }

    let mut reachable: Set<ResourceIdx> = Set::default();
    for name in split_tokens(&names) {
        match index.resource_idx(name) {
            Some(idx) => {
                reachable.insert(idx);
            }
            None => reachable.extend(index.resources_with_label(name).iter().copied()),
        }
    }
    if reachable.len() < number {
        return validation_error(format!(
            "Given amount {number} is greater than amount of resources: {}.",
            reachable.len()
        ));
    }
    Ok(())
}
