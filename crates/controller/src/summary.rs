//! Result tables printed at the end of a series.

use crate::series::{InsertSeries, QuerySeries, StepResult};
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, Color, Table};

fn right(text: impl ToString) -> Cell {
    Cell::new(text).set_alignment(CellAlignment::Right)
}

/// `Workers | Min | Max | Avg` in rounded ops/s.
pub fn format_insert_summary(series: &[InsertSeries]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Workers", "Min", "Max", "Avg"]);

    for s in series {
        table.add_row(vec![
            Cell::new(s.worker_count).fg(Color::Cyan),
            right(format!("{:.0}", s.min())),
            right(format!("{:.0}", s.max())),
            right(format!("{:.0}", s.avg())),
        ]);
    }
    table.to_string()
}

/// `Query | Min | Max | Avg` in seconds, one table per worker count.
pub fn format_query_summary(series: &[QuerySeries]) -> String {
    let mut output = String::new();
    for s in series {
        let mut table = Table::new();
        table.load_preset(UTF8_FULL);
        table.set_header(vec!["Query", "Min", "Max", "Avg"]);
        for (name, stats) in s.combined() {
            table.add_row(vec![
                Cell::new(name),
                right(format!("{:.2}", stats.min)),
                right(format!("{:.2}", stats.max)),
                right(format!("{:.2}", stats.avg)),
            ]);
        }
        output.push_str(&format!(
            "Workers: {} ({} runs)\n",
            s.worker_count,
            s.reports.len()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
    }
    output
}

/// Fill level and inserts/s (rounded to tens) of each step.
pub fn format_steps(step_size: u64, steps: &[StepResult]) -> String {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Level", "Inserts/s"]);
    for step in steps {
        let rounded = (step.ops_per_second / 10.0).round() * 10.0;
        table.add_row(vec![right(step.fill_level), right(format!("{rounded:.0}"))]);
    }
    format!("Stepsize: {step_size}\n{table}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_types::{QueryReport, QueryStats};
    use std::collections::BTreeMap;

    #[test]
    fn test_insert_summary_rounds() {
        let output = format_insert_summary(&[InsertSeries {
            worker_count: 4,
            samples: vec![1200.4, 1300.6, 1250.0],
        }]);
        assert!(output.contains("Workers"));
        assert!(output.contains("1200"));
        assert!(output.contains("1301"));
        assert!(output.contains("1250"));
    }

    #[test]
    fn test_query_summary_two_decimals() {
        let report = QueryReport {
            queries: BTreeMap::from([(
                "count-events".to_string(),
                QueryStats {
                    min: 0.8,
                    max: 1.2,
                    avg: 1.0,
                },
            )]),
        };
        let output = format_query_summary(&[QuerySeries {
            worker_count: 2,
            reports: vec![report],
        }]);
        assert!(output.contains("count-events"));
        assert!(output.contains("0.80"));
        assert!(output.contains("1.20"));
        assert!(output.contains("1.00"));
        assert!(output.contains("Workers: 2 (1 runs)"));
    }

    #[test]
    fn test_steps_round_to_tens() {
        let output = format_steps(
            4000,
            &[
                StepResult {
                    fill_level: 0,
                    ops_per_second: 1234.0,
                },
                StepResult {
                    fill_level: 4000,
                    ops_per_second: 987.0,
                },
            ],
        );
        assert!(output.starts_with("Stepsize: 4000"));
        assert!(output.contains("1230"));
        assert!(output.contains("990"));
    }
}
