//! Validate command - surface skipped records and warnings without the full report

use crate::cmd::InputArgs;
use brokertax::engine::{EngineReport, Warning};
use clap::Args;
use serde::Serialize;

#[derive(Args, Debug)]
pub struct ValidateCommand {
    #[command(flatten)]
    input: InputArgs,

    /// Output as JSON instead of formatted text
    #[arg(long)]
    json: bool,
}

/// A validation issue for output
#[derive(Debug, Clone, Serialize)]
struct ValidationIssue {
    #[serde(rename = "type")]
    issue_type: String,
    index: usize,
    stage: String,
    message: String,
    description: String,
}

#[derive(Debug, Serialize)]
struct ValidationOutput {
    issue_count: usize,
    issues: Vec<ValidationIssue>,
}

impl ValidateCommand {
    pub fn exec(&self) -> anyhow::Result<()> {
        let report = self.input.run()?;
        let issues = collect_issues(&report);

        if self.json {
            let output = ValidationOutput {
                issue_count: issues.len(),
                issues: issues.clone(),
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            print_text(&issues);
        }

        if !issues.is_empty() {
            std::process::exit(1);
        }
        Ok(())
    }
}

fn collect_issues(report: &EngineReport) -> Vec<ValidationIssue> {
    let skipped = report.skipped.iter().map(|s| ValidationIssue {
        issue_type: "Skipped".to_string(),
        index: s.index,
        stage: format!("{:?}", s.stage),
        message: s.reason.to_string(),
        description: s.description.clone(),
    });
    let warnings = report.warnings.iter().map(|w| {
        let (index, stage) = match w {
            Warning::UnresolvedExchangeRate { index, .. } => (*index, "Enrichment"),
            Warning::UnmatchedSale { index, .. } => (*index, "StockMatching"),
        };
        ValidationIssue {
            issue_type: "Warning".to_string(),
            index,
            stage: stage.to_string(),
            message: w.to_string(),
            description: report
                .transactions
                .iter()
                .find(|tx| tx.index == index)
                .map(|tx| tx.raw_text.clone())
                .unwrap_or_default(),
        }
    });

    let mut issues: Vec<_> = skipped.chain(warnings).collect();
    issues.sort_by_key(|issue| issue.index);
    issues
}

fn print_text(issues: &[ValidationIssue]) {
    println!();
    println!("VALIDATION RESULTS");
    println!();

    if issues.is_empty() {
        println!("\u{2713} No issues found.");
        return;
    }

    println!("\u{26A0} {} issue(s) found:", issues.len());
    println!();
    for (i, issue) in issues.iter().enumerate() {
        println!(
            "  {}. [{}] record {} ({}): {}",
            i + 1,
            issue.issue_type,
            issue.index,
            issue.stage,
            issue.message
        );
        if !issue.description.is_empty() {
            println!("     {}", issue.description);
        }
        println!();
    }
}
