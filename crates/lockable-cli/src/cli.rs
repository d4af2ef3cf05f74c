use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputMode {
    Cli,
    Json,
}

#[derive(Parser)]
pub struct CommonOpts {
    /// Catalog file (TOML) describing the resources
    #[arg(long, env = "LOCKCTL_CATALOG", global = true, value_hint = clap::ValueHint::FilePath)]
    pub catalog: Option<PathBuf>,

    /// Sets output formatting
    #[arg(
        long,
        env = "LOCKCTL_OUTPUT_MODE",
        default_value_t = OutputMode::Cli,
        value_enum,
        global = true
    )]
    pub output_mode: OutputMode,

    /// Enables more detailed log output
    #[arg(long, env = "LOCKCTL_DEBUG", global = true)]
    pub debug: bool,
}

/// Inspect a lockable resource catalog
#[derive(Parser)]
#[command(author, version, about)]
pub struct RootOptions {
    #[clap(flatten)]
    pub common: CommonOpts,

    #[command(subcommand)]
    pub subcmd: SubCommand,
}

#[derive(Parser)]
pub enum SubCommand {
    /// Validate the catalog and print a summary
    Check,
    /// List labels, aliases and load balancing groups
    Labels,
    /// Show which resources a requirement resolves to
    Resolve(ResolveOpts),
    /// Try one admission attempt against an idle pool
    Allocate(AllocateOpts),
}

#[derive(Parser)]
pub struct ResolveOpts {
    /// Resource names, labels, `label:` list or `expr:` expression
    pub spec: String,

    /// Amount of resources to take, all when missing
    #[arg(long)]
    pub count: Option<String>,

    /// Variables used for expansion (KEY=VALUE)
    #[arg(long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,
}

#[derive(Parser)]
pub struct AllocateOpts {
    /// Requirement group, optionally followed by `@COUNT`
    #[arg(long = "require", required = true, value_parser = parse_requirement)]
    pub requirements: Vec<(String, Option<String>)>,

    /// Prefer resources whose labels match the requirement most closely
    #[arg(long)]
    pub percent: bool,

    /// Variables used for expansion (KEY=VALUE)
    #[arg(long = "env", value_parser = parse_key_value)]
    pub env: Vec<(String, String)>,
}

pub fn parse_key_value(text: &str) -> Result<(String, String), String> {
    match text.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("Expected KEY=VALUE, got '{text}'")),
    }
}

/// Splits `SPEC@COUNT`. The suffix counts only when it is a number or a variable.
pub fn parse_requirement(text: &str) -> Result<(String, Option<String>), String> {
    if text.trim().is_empty() {
        return Err("Requirement cannot be empty".to_string());
    }
    match text.rsplit_once('@') {
        Some((spec, count))
            if !spec.trim().is_empty()
                && (count.chars().all(|c| c.is_ascii_digit()) || count.starts_with("${"))
                && !count.is_empty() =>
        {
            Ok((spec.to_string(), Some(count.to_string())))
        }
        _ => Ok((text.to_string(), None)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_key_value() {
        assert_eq!(
            parse_key_value("A=b=c").unwrap(),
            ("A".to_string(), "b=c".to_string())
        );
        assert_eq!(parse_key_value("A=").unwrap(), ("A".to_string(), String::new()));
        assert!(parse_key_value("A").is_err());
        assert!(parse_key_value("=x").is_err());
    }

    #[test]
    fn test_parse_requirement() {
        assert_eq!(
            parse_requirement("l1 l2@2").unwrap(),
            ("l1 l2".to_string(), Some("2".to_string()))
        );
        assert_eq!(
            parse_requirement("l1@${N}").unwrap(),
            ("l1".to_string(), Some("${N}".to_string()))
        );
        assert_eq!(
            parse_requirement("expr: resourceName.contains('@x')").unwrap(),
            ("expr: resourceName.contains('@x')".to_string(), None)
        );
        assert_eq!(parse_requirement("r1@").unwrap(), ("r1@".to_string(), None));
        assert!(parse_requirement(" ").is_err());
    }

    #[test]
    fn test_options_parse() {
        let opts = RootOptions::try_parse_from([
            "lockctl",
            "--catalog",
            "pool.toml",
            "allocate",
            "--require",
            "l1@2",
            "--require",
            "r1",
            "--env",
            "X=1",
            "--output-mode",
            "json",
        ])
        .unwrap();
        assert_eq!(opts.common.output_mode, OutputMode::Json);
        let SubCommand::Allocate(allocate) = opts.subcmd else {
            panic!("Expected allocate");
        };
        assert_eq!(allocate.requirements.len(), 2);
        assert!(!allocate.percent);
    }
}
