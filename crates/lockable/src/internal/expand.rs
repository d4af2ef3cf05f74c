use std::fmt::Write;

use nom::bytes::complete::{tag, take_until};
use nom::sequence::delimited;

use crate::Map;
use crate::internal::common::parser::NomResult;
use crate::internal::common::utils::{format_space_delimited, push_unique, split_tokens};

/// Longest chain of bindings followed while expanding a single token.
const MAX_EXPANSION_DEPTH: usize = 64;
/// Longest text a single token may expand to in one step.
const MAX_EXPANDED_LEN: usize = 64 * 1024;

/// Variable bindings visible to requirement expansion and expressions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: Map<String, String>,
}

impl EnvVars {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(|v| v.as_str())
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Replaces every bound `${NAME}` in `input` once. Unbound references stay verbatim.
    pub fn expand(&self, input: &str) -> String {
        let mut buffer = String::with_capacity(input.len());
        for part in parse_expandable_string(input) {
            match part {
                StringPart::Verbatim(data) => buffer.push_str(data),
                StringPart::Placeholder(name) => match self.get(name) {
                    Some(value) => buffer.push_str(value),
                    None => {
                        let _ = write!(buffer, "${{{name}}}");
                    }
                },
            }
        }
        buffer
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvVars {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut env = EnvVars::new();
        for (key, value) in iter {
            env.insert(key, value);
        }
        env
    }
}

#[derive(Debug, Eq, PartialEq)]
pub enum StringPart<'a> {
    Verbatim(&'a str),
    Placeholder(&'a str),
}

fn parse_placeholder(data: &str) -> NomResult<&str> {
    delimited(tag("${"), take_until("}"), tag("}"))(data)
}

/// Splits a string into verbatim text and `${NAME}` references.
pub fn parse_expandable_string(data: &str) -> Vec<StringPart> {
    let mut parts = vec![];
    let mut start = 0;
    let mut input = data;

    while start < input.len() {
        if let Ok((rest, placeholder)) = parse_placeholder(&input[start..]) {
            if start > 0 {
                parts.push(StringPart::Verbatim(&input[..start]));
            }
            input = rest;
            parts.push(StringPart::Placeholder(placeholder));
            start = 0;
        } else {
            start += input[start..].chars().next().map_or(1, char::len_utf8);
        }
    }

    if start > 0 {
        parts.push(StringPart::Verbatim(&input[..start]));
    }
    parts
}

/// Rewrites a `%NAME%` token into `${NAME}`; other tokens are returned as they are.
pub fn fold_percent_syntax(token: &str) -> String {
    match token
        .strip_prefix('%')
        .and_then(|t| t.strip_suffix('%'))
        .filter(|name| !name.is_empty())
    {
        Some(name) => format!("${{{name}}}"),
        None => token.to_string(),
    }
}

/// Returns the bound name if the whole token looks like `${NAME}` or `%NAME%`.
pub fn placeholder_name(token: &str) -> Option<&str> {
    token
        .strip_prefix("${")
        .and_then(|t| t.strip_suffix('}'))
        .or_else(|| token.strip_prefix('%').and_then(|t| t.strip_suffix('%')))
        .filter(|name| !name.is_empty())
}

/// One expansion step of a single token.
pub fn expand_variable(token: &str, env: &EnvVars) -> String {
    env.expand(&fold_percent_syntax(token))
}

/// The token refers back to itself or grows without bound.
#[derive(Debug, Clone, Copy)]
struct Unresolvable;

/// Expands tokens against one set of bindings, resolving each distinct token once.
struct Expander<'a> {
    env: &'a EnvVars,
    stack: Vec<String>,
    resolved: Map<String, Result<Vec<String>, Unresolvable>>,
}

impl<'a> Expander<'a> {
    fn new(env: &'a EnvVars) -> Self {
        Expander {
            env,
            stack: Vec::new(),
            resolved: Map::default(),
        }
    }

    fn resolve(&mut self, token: &str) -> Result<Vec<String>, Unresolvable> {
        let folded = fold_percent_syntax(token);
        if let Some(result) = self.resolved.get(&folded) {
            return result.clone();
        }
        if self.stack.contains(&folded) || self.stack.len() >= MAX_EXPANSION_DEPTH {
            return Err(Unresolvable);
        }
        let expanded = self.env.expand(&folded);
        let result = if expanded == folded {
            Ok(vec![folded.clone()])
        } else if expanded.len() > MAX_EXPANDED_LEN {
            log::debug!("Expansion of {folded} exceeds {MAX_EXPANDED_LEN} bytes");
            Err(Unresolvable)
        } else {
            log::trace!("Expanding {folded} to {expanded}");
            self.stack.push(folded.clone());
            let result = self.resolve_all(split_tokens(&expanded));
            self.stack.pop();
            result
        };
        self.resolved.insert(folded, result.clone());
        result
    }

    fn resolve_all<'t>(
        &mut self,
        tokens: impl Iterator<Item = &'t str>,
    ) -> Result<Vec<String>, Unresolvable> {
        let mut out = Vec::new();
        for token in tokens {
            for item in self.resolve(token)? {
                push_unique(&mut out, item);
            }
        }
        Ok(out)
    }
}

/// Expands every token to a fixed point, splitting values that contain whitespace.
///
/// The result keeps the order in which tokens first appear and has no duplicates.
/// A token whose expansion chain comes back to itself or grows without bound is
/// kept in its `${NAME}` form, as is any reference without a binding.
pub fn expand_tokens<'a>(tokens: impl IntoIterator<Item = &'a str>, env: &EnvVars) -> Vec<String> {
    let mut expander = Expander::new(env);
    let mut result = Vec::new();
    for token in tokens.into_iter().flat_map(split_tokens) {
        match expander.resolve(token) {
            Ok(expanded) => {
                for item in expanded {
                    push_unique(&mut result, item);
                }
            }
            Err(Unresolvable) => {
                log::warn!("Variable {token} cannot be fully expanded, keeping it unexpanded");
                push_unique(&mut result, fold_percent_syntax(token));
            }
        }
    }
    result
}

/// Expands a whitespace separated list of tokens into a space joined string.
///
/// Returns `None` for missing input, or when `expected` is non zero and the number
/// of resulting tokens differs from it.
pub fn expanded_variables(text: Option<&str>, env: &EnvVars, expected: usize) -> Option<String> {
    let tokens = expand_tokens(split_tokens(text?), env);
    if expected != 0 && tokens.len() != expected {
        return None;
    }
    Some(format_space_delimited(&tokens))
}
