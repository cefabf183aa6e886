use std::fmt::Write;

use chrono::TimeDelta;

use super::{on_off, table, timestamp};
use crate::detail::{DetailPage, DetailTab, TabBody};

fn duration(duration: Option<TimeDelta>) -> String {
    let Some(duration) = duration else {
        return "-".to_string();
    };
    let seconds = duration.num_seconds().max(0);
    format!("{}m {:02}s", seconds / 60, seconds % 60)
}

fn reading(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |value| value.to_string())
}

fn tab_bar(active: DetailTab) -> String {
    DetailTab::ALL
        .into_iter()
        .map(|tab| {
            if tab == active {
                format!("[{}]", tab.label())
            } else {
                tab.label().to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

pub fn render_detail(page: &DetailPage) -> String {
    let mut out = String::new();
    let status = page.enabled.map(on_off).unwrap_or("unknown");
    let _ = writeln!(out, "{} ({status})", page.id);
    let _ = writeln!(out, "{}", tab_bar(page.tab));

    match &page.body {
        TabBody::Metrics(summary) => {
            let _ = writeln!(out, "Current Job Name: {}", summary.current_run);
            let _ = writeln!(out, "Schedule: {}", summary.schedule);
            let _ = writeln!(out, "Finished Runs: {}", summary.finished_runs);
            let _ = writeln!(out, "Running: {}", summary.running_runs);
            let _ = writeln!(out, "Max Memory Usage: {}", reading(summary.max_memory));
            let _ = writeln!(out, "Max CPU Usage: {}", reading(summary.max_cpu));
        }
        TabBody::Timeline(runs) => {
            let mut table = table(vec!["Run", "Execution Date", "Start", "End"]);
            for run in runs {
                table.add_row(vec![
                    run.name.clone(),
                    timestamp(run.execution_date),
                    timestamp(run.start_time),
                    match run.end_time {
                        Some(_) => timestamp(run.end_time),
                        None => "running".to_string(),
                    },
                ]);
            }
            let _ = writeln!(out, "{table}");
        }
        TabBody::RunTimes(times) => {
            let mut table = table(vec!["Run", "Duration"]);
            for time in times {
                let mut shown = duration(time.duration);
                if time.running {
                    shown.push_str(" (running)");
                }
                table.add_row(vec![time.run.clone(), shown]);
            }
            let _ = writeln!(out, "{table}");
        }
        TabBody::Resources(samples) => {
            let mut table = table(vec!["Time", "Pod", "CPU", "Memory"]);
            for sample in samples {
                table.add_row(vec![
                    timestamp(Some(sample.timestamp)),
                    sample.pod_name.clone(),
                    sample.cpu_usage.to_string(),
                    sample.memory_usage.to_string(),
                ]);
            }
            let _ = writeln!(out, "{table}");
        }
        TabBody::Config(rows) => {
            let mut table = table(vec!["Setting", "Value"]);
            for (setting, value) in rows {
                table.add_row(vec![setting.to_string(), value.clone()]);
            }
            let _ = writeln!(out, "{table}");
        }
    }
    out
}
