use serde::Serialize;
use triage_core::runner::{Outcome, RunReport};

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_row: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    println!("{}", header_row.join("  ").trim_end());

    let sep: Vec<String> = widths.iter().map(|&w| "-".repeat(w)).collect();
    println!("{}", sep.join("  "));

    for row in &rows {
        let cells: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let w = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = w)
            })
            .collect();
        println!("{}", cells.join("  ").trim_end());
    }
}

/// One row per invocation, in processing order.
pub fn print_report(report: &RunReport) {
    if report.invocations.is_empty() {
        println!("No invocations.");
        return;
    }
    let rows = report
        .invocations
        .iter()
        .map(|r| {
            let (outcome, detail) = outcome_cells(&r.outcome);
            vec![
                format!("#{}", r.number),
                r.task_id.clone(),
                if r.called { "yes" } else { "" }.to_string(),
                outcome.to_string(),
                detail,
            ]
        })
        .collect();
    print_table(&["TARGET", "TASK", "CALLED", "OUTCOME", "DETAIL"], rows);
    let failures = report.failures();
    if failures > 0 {
        println!("\n{failures} invocation(s) failed.");
    }
}

fn outcome_cells(outcome: &Outcome) -> (&'static str, String) {
    match outcome {
        Outcome::NotMatched => ("not matched", String::new()),
        Outcome::CallableOnly => ("callable only", String::new()),
        Outcome::Skipped(why) => ("skipped", single_line(why)),
        Outcome::Succeeded => ("succeeded", String::new()),
        Outcome::Failed(why) => ("failed", single_line(why)),
    }
}

fn single_line(text: &str) -> String {
    text.lines().next().unwrap_or_default().to_string()
}
