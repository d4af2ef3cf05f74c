use std::fmt::Debug;

use nom::branch::alt;
use nom::bytes::complete::{tag, take_while};
use nom::character::complete::{alpha1, alphanumeric1, char, multispace0};
use nom::combinator::{all_consuming, map, opt, recognize};
use nom::multi::many0;
use nom::sequence::{delimited, pair, preceded};

use crate::internal::common::error::LockError;
use crate::internal::common::parser::{NomResult, ParserError, format_parse_error};
use crate::internal::common::utils::split_tokens;
use crate::internal::expand::{EnvVars, fold_percent_syntax};
use crate::internal::resource::Resource;

/// Deepest nesting of parentheses, negations and call arguments in one expression.
const MAX_NESTING: usize = 64;
const MAX_EXPRESSION_LEN: usize = 4096;

/// The data of one resource an expression is evaluated against.
#[derive(Debug, Clone, Copy)]
pub struct ResourceView<'a> {
    pub name: &'a str,
    pub description: &'a str,
    pub labels: &'a [String],
}

impl<'a> From<&'a Resource> for ResourceView<'a> {
    fn from(resource: &'a Resource) -> Self {
        ResourceView {
            name: resource.name(),
            description: resource.description().unwrap_or_default(),
            labels: resource.labels(),
        }
    }
}

impl ResourceView<'_> {
    pub fn labels_string(&self) -> String {
        self.labels.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateValue {
    Bool(bool),
    Str(String),
}

/// Decides whether a resource satisfies an expression requirement.
pub trait ExpressionEvaluator: Send + Sync + Debug {
    fn evaluate(
        &self,
        expression: &str,
        resource: &ResourceView,
        params: &EnvVars,
    ) -> crate::Result<PredicateValue>;
}

/// Only a boolean `true` counts as a match. Errors are logged and treated as no match.
pub fn expression_matches(
    evaluator: &dyn ExpressionEvaluator,
    expression: &str,
    resource: &ResourceView,
    params: &EnvVars,
) -> bool {
    match evaluator.evaluate(expression, resource, params) {
        Ok(PredicateValue::Bool(value)) => {
            log::trace!("Checked resource {} for {expression} -> {value}", resource.name);
            value
        }
        Ok(other) => {
            log::debug!(
                "Expression {expression} returned a non boolean value {other:?} for {}",
                resource.name
            );
            false
        }
        Err(error) => {
            log::debug!(
                "Cannot evaluate {expression} for {}: {error}",
                resource.name
            );
            false
        }
    }
}

/// Rejects every expression.
#[derive(Debug, Default)]
pub struct DisabledEvaluator;

impl ExpressionEvaluator for DisabledEvaluator {
    fn evaluate(&self, _: &str, _: &ResourceView, _: &EnvVars) -> crate::Result<PredicateValue> {
        Err(LockError::Expression(
            "Expression requirements are disabled".to_string(),
        ))
    }
}

/// Evaluates a small side effect free boolean language.
///
/// ```text
/// resourceName.startsWith('db') && (resourceLabels.hasLabel("x86") || !(zone == 'eu'))
/// ```
///
/// Identifiers are `resourceName`, `resourceDescription`, `resourceLabels` and any
/// caller parameter. `${NAME}` and `%NAME%` are substituted from the parameters
/// before parsing.
#[derive(Debug, Default)]
pub struct BasicEvaluator;

impl ExpressionEvaluator for BasicEvaluator {
    fn evaluate(
        &self,
        expression: &str,
        resource: &ResourceView,
        params: &EnvVars,
    ) -> crate::Result<PredicateValue> {
        let text = params.expand(&fold_percent_references(expression));
        if text.len() > MAX_EXPRESSION_LEN {
            return Err(LockError::Expression(format!(
                "expression is longer than {MAX_EXPRESSION_LEN} characters"
            )));
        }
        let (_, expr) = all_consuming(|i| parse_or(i, 0))(text.trim())
            .map_err(|e| LockError::Expression(format_parse_error(e)))?;
        let ctx = EvalContext { resource, params };
        ctx.eval(&expr)
    }
}

/// Rewrites every `%NAME%` inside `text` into `${NAME}`.
fn fold_percent_references(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('%') {
        result.push_str(&rest[..start]);
        let tail = &rest[start..];
        match tail[1..].find('%') {
            Some(end) => {
                let token = &tail[..end + 2];
                if token[1..token.len() - 1].chars().any(char::is_whitespace) {
                    result.push('%');
                    rest = &tail[1..];
                } else {
                    result.push_str(&fold_percent_syntax(token));
                    rest = &tail[end + 2..];
                }
            }
            None => {
                result.push_str(tail);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Contains,
    StartsWith,
    EndsWith,
    HasLabel,
}

impl Method {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "contains" => Some(Method::Contains),
            "startsWith" => Some(Method::StartsWith),
            "endsWith" => Some(Method::EndsWith),
            "hasLabel" => Some(Method::HasLabel),
            _ => None,
        }
    }
}

#[derive(Debug)]
enum Expr {
    Literal(PredicateValue),
    Var(String),
    Not(Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Compare {
        left: Box<Expr>,
        right: Box<Expr>,
        negate: bool,
    },
    Call(Box<Expr>, Method, Box<Expr>),
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> NomResult<'a, O>,
) -> impl FnMut(&'a str) -> NomResult<'a, O> {
    delimited(multispace0, inner, multispace0)
}

fn parse_string(input: &str) -> NomResult<Expr> {
    map(
        alt((
            delimited(char('\''), take_while(|c| c != '\''), char('\'')),
            delimited(char('"'), take_while(|c| c != '"'), char('"')),
        )),
        |s: &str| Expr::Literal(PredicateValue::Str(s.to_string())),
    )(input)
}

fn parse_identifier(input: &str) -> NomResult<&str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn parse_atom(input: &str, depth: usize) -> NomResult<Expr> {
    ws(alt((
        parse_string,
        delimited(char('('), |i| parse_or(i, depth + 1), char(')')),
        map(parse_identifier, |id| match id {
            "true" => Expr::Literal(PredicateValue::Bool(true)),
            "false" => Expr::Literal(PredicateValue::Bool(false)),
            _ => Expr::Var(id.to_string()),
        }),
    )))(input)
}

fn parse_postfix(input: &str, depth: usize) -> NomResult<Expr> {
    let (mut input, mut expr) = parse_atom(input, depth)?;
    loop {
        let call = pair(
            preceded(char('.'), parse_identifier),
            delimited(ws(char('(')), |i| parse_or(i, depth + 1), char(')')),
        )(input);
        match call {
            Ok((rest, (name, arg))) => {
                let Some(method) = Method::from_name(name) else {
                    return Err(nom::Err::Failure(ParserError::Custom(format!(
                        "unknown method '{name}'"
                    ))));
                };
                expr = Expr::Call(Box::new(expr), method, Box::new(arg));
                input = rest;
            }
            Err(nom::Err::Error(_)) => break,
            Err(e) => return Err(e),
        }
    }
    let (input, _) = multispace0(input)?;
    Ok((input, expr))
}

fn parse_unary(input: &str, depth: usize) -> NomResult<Expr> {
    if depth > MAX_NESTING {
        return Err(nom::Err::Failure(ParserError::Custom(format!(
            "expression is nested deeper than {MAX_NESTING} levels"
        ))));
    }
    alt((
        map(preceded(ws(char('!')), |i| parse_unary(i, depth + 1)), |e| {
            Expr::Not(Box::new(e))
        }),
        |i| parse_postfix(i, depth),
    ))(input)
}

fn parse_comparison(input: &str, depth: usize) -> NomResult<Expr> {
    let (input, left) = parse_unary(input, depth)?;
    let (input, right) = opt(pair(
        ws(alt((tag("=="), tag("!=")))),
        |i| parse_unary(i, depth),
    ))(input)?;
    let expr = match right {
        Some((op, right)) => Expr::Compare {
            left: Box::new(left),
            right: Box::new(right),
            negate: op == "!=",
        },
        None => left,
    };
    Ok((input, expr))
}

fn parse_and(input: &str, depth: usize) -> NomResult<Expr> {
    let (input, first) = parse_comparison(input, depth)?;
    let (input, rest) = many0(preceded(ws(tag("&&")), |i| parse_comparison(i, depth)))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, e| Expr::And(Box::new(acc), Box::new(e)));
    Ok((input, expr))
}

fn parse_or(input: &str, depth: usize) -> NomResult<Expr> {
    let (input, first) = parse_and(input, depth)?;
    let (input, rest) = many0(preceded(ws(tag("||")), |i| parse_and(i, depth)))(input)?;
    let expr = rest
        .into_iter()
        .fold(first, |acc, e| Expr::Or(Box::new(acc), Box::new(e)));
    Ok((input, expr))
}

struct EvalContext<'a, 'b> {
    resource: &'a ResourceView<'b>,
    params: &'a EnvVars,
}

impl EvalContext<'_, '_> {
    fn eval(&self, expr: &Expr) -> crate::Result<PredicateValue> {
        Ok(match expr {
            Expr::Literal(value) => value.clone(),
            Expr::Var(name) => PredicateValue::Str(self.lookup(name)?),
            Expr::Not(inner) => PredicateValue::Bool(!self.eval_bool(inner)?),
            Expr::And(left, right) => {
                PredicateValue::Bool(self.eval_bool(left)? && self.eval_bool(right)?)
            }
            Expr::Or(left, right) => {
                PredicateValue::Bool(self.eval_bool(left)? || self.eval_bool(right)?)
            }
            Expr::Compare {
                left,
                right,
                negate,
            } => PredicateValue::Bool((self.eval(left)? == self.eval(right)?) != *negate),
            Expr::Call(receiver, method, arg) => {
                let receiver = self.eval_str(receiver)?;
                let arg = self.eval_str(arg)?;
                PredicateValue::Bool(match method {
                    Method::Contains => receiver.contains(&arg),
                    Method::StartsWith => receiver.starts_with(&arg),
                    Method::EndsWith => receiver.ends_with(&arg),
                    Method::HasLabel => split_tokens(&receiver).any(|l| l == arg),
                })
            }
        })
    }

    fn eval_bool(&self, expr: &Expr) -> crate::Result<bool> {
        match self.eval(expr)? {
            PredicateValue::Bool(value) => Ok(value),
            PredicateValue::Str(value) => Err(LockError::Expression(format!(
                "expected a boolean, found '{value}'"
            ))),
        }
    }

    fn eval_str(&self, expr: &Expr) -> crate::Result<String> {
        match self.eval(expr)? {
            PredicateValue::Str(value) => Ok(value),
            PredicateValue::Bool(value) => Err(LockError::Expression(format!(
                "expected a string, found {value}"
            ))),
        }
    }

    fn lookup(&self, name: &str) -> crate::Result<String> {
        match name {
            "resourceName" => Ok(self.resource.name.to_string()),
            "resourceDescription" => Ok(self.resource.description.to_string()),
            "resourceLabels" => Ok(self.resource.labels_string()),
            _ => self
                .params
                .get(name)
                .map(|v| v.to_string())
                .ok_or_else(|| LockError::Expression(format!("unknown variable '{name}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval(expression: &str, params: &[(&str, &str)]) -> crate::Result<PredicateValue> {
        let resource = Resource::new("db-1")
            .unwrap()
            .with_description(Some("Primary database"))
            .with_labels("db x86 eu");
        let params: EnvVars = params.iter().copied().collect();
        BasicEvaluator.evaluate(expression, &ResourceView::from(&resource), &params)
    }

    fn is_true(expression: &str) -> bool {
        eval(expression, &[("ZONE", "eu"), ("KIND", "db")]).unwrap() == PredicateValue::Bool(true)
    }

    #[test]
    fn test_literals_and_operators() {
        assert!(is_true("true"));
        assert!(!is_true("false"));
        assert!(is_true("!false"));
        assert!(is_true("true && !false"));
        assert!(is_true("false || true"));
        assert!(!is_true("false || true && false"));
        assert!(is_true("(false || true) && true"));
        assert!(is_true("'a' == \"a\""));
        assert!(is_true("'a' != 'b'"));
    }

    #[test]
    fn test_resource_bindings() {
        assert!(is_true("resourceName == 'db-1'"));
        assert!(is_true("resourceName.startsWith('db')"));
        assert!(is_true("resourceDescription.contains('data')"));
        assert!(is_true("resourceLabels == 'db x86 eu'"));
        assert!(is_true("resourceLabels.hasLabel('x86')"));
        assert!(!is_true("resourceLabels.hasLabel('x8')"));
        assert!(is_true("resourceName.endsWith('-1') && resourceLabels.hasLabel(ZONE)"));
    }

    #[test]
    fn test_parameter_interpolation() {
        assert!(is_true("resourceLabels.hasLabel('${ZONE}')"));
        assert!(is_true("resourceName.startsWith('%KIND%')"));
        assert!(is_true("KIND == 'db'"));
    }

    #[test]
    fn test_errors() {
        assert!(eval("unknownVar == 'x'", &[]).is_err());
        assert!(eval("resourceName.explode('x')", &[]).is_err());
        assert!(eval("true &&", &[]).is_err());
        assert!(eval("'x' && true", &[]).is_err());
        assert_eq!(
            eval("resourceName", &[]).unwrap(),
            PredicateValue::Str("db-1".to_string())
        );
    }

    #[test]
    fn test_expression_matches_treats_errors_as_no_match() {
        let resource = Resource::new("r").unwrap();
        let view = ResourceView::from(&resource);
        let params = EnvVars::new();
        assert!(expression_matches(&BasicEvaluator, "true", &view, &params));
        assert!(!expression_matches(&BasicEvaluator, "resourceName", &view, &params));
        assert!(!expression_matches(&BasicEvaluator, "(", &view, &params));
        assert!(!expression_matches(&DisabledEvaluator, "true", &view, &params));
    }

    #[test]
    fn test_deeply_nested_expression_is_rejected() {
        let resource = Resource::new("r").unwrap();
        let view = ResourceView::from(&resource);
        let params = EnvVars::new();

        let negations = format!("{}true", "!".repeat(4000));
        assert!(eval(&negations, &[]).is_err());
        assert!(!expression_matches(&BasicEvaluator, &negations, &view, &params));

        let parens = format!("{}true{}", "(".repeat(2000), ")".repeat(2000));
        assert!(eval(&parens, &[]).is_err());
        assert!(!expression_matches(&BasicEvaluator, &parens, &view, &params));

        let calls = "resourceName.contains(".repeat(100);
        assert!(eval(&calls, &[]).is_err());

        let nested = format!("{}true{}", "!(".repeat(20), ")".repeat(20));
        assert!(is_true(&nested));
    }

    #[test]
    fn test_long_expression_is_rejected() {
        let long = vec!["true"; 2000].join(" && ");
        assert!(eval(&long, &[]).is_err());
        assert!(is_true(&vec!["true"; 100].join(" && ")));
    }

    #[test]
    fn test_fold_percent_references() {
        assert_eq!(fold_percent_references("a %X% b"), "a ${X} b");
        assert_eq!(fold_percent_references("50% of % x"), "50% of % x");
        assert_eq!(fold_percent_references("%"), "%");
    }
}
