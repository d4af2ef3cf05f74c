use std::fmt::Write;

use crate::cli::OutputMode;
use crate::commands::{AllocateReport, CheckReport, LabelsReport, ResolveReport};

/// Renders command results for the terminal or for other programs.
pub trait Output {
    fn print_check(&self, report: &CheckReport) -> String;
    fn print_labels(&self, report: &LabelsReport) -> String;
    fn print_resolve(&self, report: &ResolveReport) -> String;
    fn print_allocate(&self, report: &AllocateReport) -> String;
}

pub fn make_output(mode: OutputMode) -> Box<dyn Output> {
    match mode {
        OutputMode::Cli => Box::new(CliOutput),
        OutputMode::Json => Box::new(JsonOutput),
    }
}

fn join_or_dash(items: &[String]) -> String {
    if items.is_empty() {
        "-".to_string()
    } else {
        items.join(" ")
    }
}

pub struct CliOutput;

impl Output for CliOutput {
    fn print_check(&self, report: &CheckReport) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Catalog is valid");
        let _ = writeln!(out, "Resources: {}", report.resources);
        let _ = writeln!(out, "Labels: {}", report.labels);
        let _ = writeln!(out, "Aliases: {}", report.aliases);
        let _ = writeln!(out, "Reserved: {}", join_or_dash(&report.reserved));
        let _ = write!(
            out,
            "Load balancing labels: {}",
            join_or_dash(&report.load_balancing_labels)
        );
        out
    }

    fn print_labels(&self, report: &LabelsReport) -> String {
        let mut out = String::new();
        for entry in &report.labels {
            match &entry.alias_of {
                Some(label) => {
                    let _ = writeln!(out, "{} -> {label}", entry.label);
                }
                None => {
                    let _ = writeln!(out, "{}: {}", entry.label, join_or_dash(&entry.resources));
                }
            }
        }
        if !report.load_balancing.is_empty() {
            let _ = writeln!(out, "Load balancing groups:");
            for group in &report.load_balancing {
                let _ = writeln!(
                    out,
                    "  {}: {}",
                    group.label.as_deref().unwrap_or("<other>"),
                    group.resources.join(" ")
                );
            }
        }
        out.trim_end().to_string()
    }

    fn print_resolve(&self, report: &ResolveReport) -> String {
        let amount = match report.required_number {
            0 => "all".to_string(),
            n => n.to_string(),
        };
        format!(
            "Requirement: {} ({})\nTake: {amount}\nCandidates: {}",
            report.text,
            report.mode,
            join_or_dash(&report.resources)
        )
    }

    fn print_allocate(&self, report: &AllocateReport) -> String {
        match report {
            AllocateReport::Ready {
                selected,
                environment,
            } => {
                let mut out = String::from("Selected:");
                for resource in selected {
                    let _ = write!(
                        out,
                        "\n  {} ({})",
                        resource.name,
                        resource.requirement.as_deref().unwrap_or("")
                    );
                }
                if !environment.is_empty() {
                    out.push_str("\nEnvironment:");
                    for (key, value) in environment {
                        let _ = write!(out, "\n  {key}={value}");
                    }
                }
                out
            }
            AllocateReport::Blocked { reason } => format!("Not yet satisfiable. {reason}"),
            AllocateReport::NoRequirements => "Nothing to allocate".to_string(),
        }
    }
}

pub struct JsonOutput;

impl JsonOutput {
    fn render<T: serde::Serialize>(&self, value: &T) -> String {
        serde_json::to_string_pretty(value).unwrap_or_else(|error| {
            log::error!("Cannot serialize output: {error}");
            String::new()
        })
    }
}

impl Output for JsonOutput {
    fn print_check(&self, report: &CheckReport) -> String {
        self.render(report)
    }

    fn print_labels(&self, report: &LabelsReport) -> String {
        self.render(report)
    }

    fn print_resolve(&self, report: &ResolveReport) -> String {
        self.render(report)
    }

    fn print_allocate(&self, report: &AllocateReport) -> String {
        self.render(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::SelectedResource;

    #[test]
    fn test_cli_allocate() {
        let report = AllocateReport::Ready {
            selected: vec![SelectedResource {
                name: "r1".to_string(),
                requirement: Some("l1".to_string()),
            }],
            environment: vec![("LOCKED".to_string(), "r1".to_string())],
        };
        assert_eq!(
            CliOutput.print_allocate(&report),
            "Selected:\n  r1 (l1)\nEnvironment:\n  LOCKED=r1"
        );
        assert_eq!(
            CliOutput.print_allocate(&AllocateReport::Blocked {
                reason: "Waiting for resources: l1".to_string()
            }),
            "Not yet satisfiable. Waiting for resources: l1"
        );
    }

    #[test]
    fn test_json_allocate() {
        let json: serde_json::Value =
            serde_json::from_str(&JsonOutput.print_allocate(&AllocateReport::NoRequirements))
                .unwrap();
        assert_eq!(json["status"], "no_requirements");

        let json: serde_json::Value = serde_json::from_str(&JsonOutput.print_allocate(
            &AllocateReport::Blocked {
                reason: "Waiting for resources: a".to_string(),
            },
        ))
        .unwrap();
        assert_eq!(json["status"], "blocked");
        assert_eq!(json["reason"], "Waiting for resources: a");
    }

    #[test]
    fn test_cli_resolve() {
        let report = ResolveReport {
            text: "l1".to_string(),
            mode: "Default".to_string(),
            resources: vec![],
            required_number: 0,
        };
        assert_eq!(
            CliOutput.print_resolve(&report),
            "Requirement: l1 (Default)\nTake: all\nCandidates: -"
        );
    }
}
