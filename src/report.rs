use std::{borrow::Cow, fmt::Write as _};

use crate::{
    dataset::{Dataset, Row, SeverityCounts},
    rules::Severity,
};

const REPORT_HEADERS: [&str; 6] = ["row", "field", "severity", "origin", "message", "value"];

pub fn render_diagnostics(dataset: &Dataset, errors_only: bool) -> String {
    let lines = dataset
        .rows()
        .iter()
        .flat_map(|row| diagnostic_lines(row, errors_only))
        .collect::<Vec<_>>();
    if lines.is_empty() {
        return String::new();
    }
    let headers = REPORT_HEADERS.map(str::to_string);
    render_table(&headers, &lines)
}

fn diagnostic_lines(row: &Row, errors_only: bool) -> Vec<Vec<String>> {
    row.diagnostics
        .iter()
        .filter(|(_, diagnostic)| !errors_only || diagnostic.severity == Severity::Error)
        .map(|(key, diagnostic)| {
            vec![
                row.index.to_string(),
                key.clone(),
                diagnostic.severity.to_string(),
                diagnostic.origin.to_string(),
                diagnostic.message.clone(),
                row.value(key)
                    .map(|value| value.as_text().into_owned())
                    .unwrap_or_default(),
            ]
        })
        .collect()
}

pub fn render_summary(dataset: &Dataset) -> String {
    let SeverityCounts {
        info,
        warning,
        error,
    } = dataset.diagnostic_counts();
    format!(
        "{} row(s), {} with errors; diagnostics: {error} error, {warning} warning, {info} info",
        dataset.len(),
        dataset.error_count()
    )
}

pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let mut widths = headers
        .iter()
        .map(|header| display_width(header))
        .collect::<Vec<_>>();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(display_width(cell));
        }
    }

    let mut output = String::new();
    let _ = writeln!(output, "{}", format_row(headers, &widths));
    let rule = widths
        .iter()
        .map(|width| "-".repeat((*width).max(3)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_row(row, &widths));
    }
    output
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| {
            let cell = single_line(cell);
            let padding = width.saturating_sub(display_width(&cell));
            format!("{cell}{}", " ".repeat(padding))
        })
        .collect::<Vec<_>>()
        .join("  ");
    line.trim_end().to_string()
}

fn display_width(value: &str) -> usize {
    single_line(value).chars().count()
}

fn single_line(value: &str) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) {
        Cow::Owned(value.replace(['\n', '\r', '\t'], " "))
    } else {
        Cow::Borrowed(value)
    }
}
