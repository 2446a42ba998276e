use crate::extract::ExtractOutcome;
use crate::pipeline::RunSummary;
use crate::types::{QueryResult, QueryValue};
use prettytable::{format, Cell, Row, Table};
use std::fmt::Write;

/// Renders a query result as a box-drawn table, numbers right aligned.
pub fn render_query(result: &QueryResult) -> String {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.set_titles(Row::new(
        result
            .columns
            .iter()
            .map(|column| Cell::new(column).style_spec("b"))
            .collect(),
    ));
    for row in &result.rows {
        table.add_row(Row::new(
            row.iter()
                .map(|value| match value {
                    QueryValue::Integer(_) | QueryValue::Real(_) => {
                        Cell::new(&value.to_string()).style_spec("r")
                    }
                    _ => Cell::new(&value.to_string()),
                })
                .collect(),
        ));
    }

    let mut out = String::new();
    let _ = writeln!(out, "{}", result.query);
    let _ = writeln!(out, "{}", table.to_string().trim_end());
    let _ = writeln!(out, "({} rows)", result.rows.len());
    out
}

/// Operator-facing summary printed at the end of a run.
pub fn render_summary(summary: &RunSummary) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n📊 Largest banks report ({})", summary.started_at.format("%Y-%m-%d %H:%M:%S UTC"));
    let _ = writeln!(out, "   Source: {}", summary.source);
    match &summary.outcome {
        ExtractOutcome::Table {
            rows_seen,
            rows_skipped,
            parse_failures,
        } => {
            let _ = writeln!(
                out,
                "   Rows: {} seen, {} skipped ({} unparsable)",
                rows_seen, rows_skipped, parse_failures
            );
        }
        ExtractOutcome::StructureNotFound { reason } => {
            let _ = writeln!(out, "   ⚠️  Ranking table not found: {}", reason);
        }
    }
    let _ = writeln!(out, "   Report rows: {}", summary.report_rows);
    if summary.loaded {
        let _ = writeln!(out, "   CSV: {}", summary.csv_path.display());
        let _ = writeln!(
            out,
            "   Database: {} (table {})",
            summary.db_path.display(),
            summary.table_name
        );
    } else {
        let _ = writeln!(out, "   ⚠️  Outputs left unchanged");
    }
    for result in &summary.queries {
        let _ = writeln!(out);
        out.push_str(&render_query(result));
    }
    out
}
