use crate::output::{print_json, print_table};
use anyhow::Context;
use platform_core::critical_path::{mark_completed, schedule, Schedule, Task};
use std::path::Path;

/// One-shot critical-path report for a task file. No token is issued: tokens
/// only exist inside a running server.
pub fn run(file: &Path, goal: Option<&str>, completed: &[String], json: bool) -> anyhow::Result<()> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let mut tasks: Vec<Task> = serde_json::from_str(&data)
        .with_context(|| format!("{} is not a JSON array of tasks", file.display()))?;
    mark_completed(&mut tasks, completed)?;

    let report = schedule(&tasks, goal)?;
    if json {
        return print_json(&report);
    }
    print_report(&report);
    Ok(())
}

fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 {
        format!("{n:.0}")
    } else {
        format!("{n:.2}")
    }
}

fn print_report(report: &Schedule) {
    println!("Critical path: {}", report.critical_path.join(" -> "));
    println!("Total duration: {}", fmt_num(report.total_duration));
    if let Some(goal) = &report.goal {
        println!("Goal: {goal}");
    }
    println!(
        "Progress: {} done, {} remaining",
        report.completed_count, report.remaining_count
    );
    println!();

    let rows = report
        .timings
        .iter()
        .map(|t| {
            vec![
                t.id.clone(),
                fmt_num(t.earliest_start),
                fmt_num(t.earliest_finish),
                fmt_num(t.slack),
                if report.is_on_critical_path(&t.id) {
                    "*".to_string()
                } else {
                    String::new()
                },
            ]
        })
        .collect();
    print_table(&["TASK", "START", "FINISH", "SLACK", "CRITICAL"], rows);

    println!();
    if report.ready_tasks.is_empty() {
        println!("Ready: (none)");
    } else {
        println!("Ready: {}", report.ready_tasks.join(", "));
    }
    if let Some(next) = &report.recommended_task {
        println!("Recommended next: {next}");
    }
}
