//! E2E tests for the command line front end

use std::io::Write;
use std::process::{Command, Stdio};

fn brokertax(args: &[&str]) -> std::process::Output {
    Command::new("cargo")
        .args(["run", "--quiet", "--"])
        .args(args)
        .output()
        .expect("Failed to execute command")
}

/// Test the report tables for a mixed batch
#[test]
fn report_all_years() {
    let output = brokertax(&[
        "report",
        "-t",
        "tests/data/transactions.json",
        "-r",
        "tests/data/rates.json",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);

    assert!(stdout.contains("STOCK SALES"));
    assert!(stdout.contains("DE0007164600"));
    assert!(stdout.contains("€20.00"));
    assert!(stdout.contains("OPTION TRADES"));
    assert!(stdout.contains("SPY 18FEB22 450 P"));
    assert!(stdout.contains("€5.00"));
    assert!(stdout.contains("United States (US)"));
    assert!(stdout.contains("€8.00"));
    assert!(stdout.contains("€-1.20"));
    assert!(stdout.contains("€1000.00"));
    // ambiguous assignment record
    assert!(stdout.contains("1 skipped record(s)"));
}

/// Test that the year filter hides other years
#[test]
fn report_single_year() {
    let output = brokertax(&[
        "report",
        "-t",
        "tests/data/transactions.json",
        "-r",
        "tests/data/rates.json",
        "--year",
        "2021",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);

    assert!(stdout.contains("BROKER TAX REPORT (2021)"));
    assert!(stdout.contains("€20.00"));
    assert!(!stdout.contains("SPY 18FEB22 450 P"));
    assert!(!stdout.contains("United States"));
}

/// Test the full JSON report
#[test]
fn report_json() {
    let output = brokertax(&[
        "report",
        "-t",
        "tests/data/transactions.json",
        "-r",
        "tests/data/rates.csv",
        "--json",
    ]);

    assert!(output.status.success(), "Command failed: {:?}", output);
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("report should be valid JSON");

    assert_eq!(report["transactions"].as_array().unwrap().len(), 8);
    assert_eq!(report["sales"].as_array().unwrap().len(), 1);
    assert_eq!(report["option_trades"].as_array().unwrap().len(), 1);
    assert_eq!(report["option_positions"].as_array().unwrap().len(), 0);
    assert_eq!(report["cash_movements"].as_array().unwrap().len(), 1);
    assert_eq!(report["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(report["skipped"][0]["index"], 7);
    assert_eq!(report["skipped"][0]["reason"]["type"], "AmbiguousDirection");
    assert!(report["warnings"].as_array().unwrap().is_empty());
    assert!(report["dividends"]["2022"]["US"].is_object());
}

/// Test year-end open lots
#[test]
fn holdings_by_year() {
    let output = brokertax(&[
        "holdings",
        "-t",
        "tests/data/transactions.json",
        "-r",
        "tests/data/rates.json",
        "--year",
        "2021",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);

    assert!(stdout.contains("End of 2021"));
    assert!(stdout.contains("DE0007164600"));
    assert!(stdout.contains("€-60.00"));
    assert!(!stdout.contains("US0378331005"));
}

/// Test filtering holdings by instrument, as JSON
#[test]
fn holdings_json_isin_filter() {
    let output = brokertax(&[
        "holdings",
        "-t",
        "tests/data/transactions.json",
        "-r",
        "tests/data/rates.json",
        "--isin",
        "us0378331005",
        "--json",
    ]);

    assert!(output.status.success(), "Command failed: {:?}", output);
    let holdings: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("holdings should be valid JSON");

    assert!(holdings["holdings"]["2021"].as_array().unwrap().is_empty());
    let lots = holdings["holdings"]["2022"].as_array().unwrap();
    assert_eq!(lots.len(), 1);
    assert_eq!(lots[0]["isin"], "US0378331005");
}

/// Test that validation reports issues and fails
#[test]
fn validate_reports_issues() {
    let output = brokertax(&[
        "validate",
        "-t",
        "tests/data/transactions.json",
        "-r",
        "tests/data/rates.json",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(output.status.code(), Some(1));
    assert!(stdout.contains("1 issue(s) found"));
    assert!(stdout.contains("ambiguous buy/sell direction"));
    assert!(stdout.contains("Assignment SPY 17JUN22 400 P"));
}

/// Test that missing rates surface as warnings
#[test]
fn validate_missing_rates() {
    let output = brokertax(&["validate", "-t", "tests/data/transactions.json", "--json"]);

    assert_eq!(output.status.code(), Some(1));
    let result: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("validation should be valid JSON");
    // two USD dividends, one USD buy, one ambiguous record
    assert_eq!(result["issue_count"], 4);
}

/// Test a clean batch passes validation
#[test]
fn validate_clean() {
    let output = brokertax(&["validate", "-t", "tests/data/clean.json"]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("No issues found"));
}

/// Test reading transactions from stdin
#[test]
fn report_from_stdin() {
    let input = std::fs::read("tests/data/clean.json").expect("fixture");
    let mut child = Command::new("cargo")
        .args(["run", "--quiet", "--", "holdings", "-t", "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to execute command");
    child
        .stdin
        .take()
        .expect("stdin")
        .write_all(&input)
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("€-100.00"));
}

/// Test rate lookup falls back to the latest earlier observation
#[test]
fn rate_lookup() {
    let output = brokertax(&[
        "rate",
        "-r",
        "tests/data/rates.csv",
        "-c",
        "usd",
        "-d",
        "2022-06-15",
    ]);

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("1 EUR = 1.25 USD on 2022-06-15"));
}

/// Test rate lookup before the first observation fails
#[test]
fn rate_not_found() {
    let output = brokertax(&[
        "rate",
        "-r",
        "tests/data/rates.json",
        "-c",
        "USD",
        "-d",
        "2020-01-01",
    ]);

    assert!(!output.status.success());
}

/// Test schema output
#[test]
fn schema_formats() {
    let output = brokertax(&["schema", "transactions"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert!(stdout.contains("NormalizedTransaction"));
    assert!(stdout.contains("buy_sell"));

    let output = brokertax(&["schema", "rates-csv-header"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Command failed: {:?}", output);
    assert_eq!(stdout.trim(), "period,value,currency");
}
