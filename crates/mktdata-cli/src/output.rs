use serde_json::{Map, Value};

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => {
            for line in render_table(result)? {
                println!("{line}");
            }
        }
    }

    Ok(())
}

fn render_table(result: &CommandResult) -> Result<Vec<String>, CliError> {
    let meta = &result.meta;
    let mut lines = Vec::new();
    if let Some(source) = meta.source {
        lines.push(format!("source      : {source}"));
    }
    if !meta.source_chain.is_empty() {
        let chain: Vec<&str> = meta.source_chain.iter().map(|id| id.as_str()).collect();
        lines.push(format!("chain       : {}", chain.join(",")));
    }
    lines.push(format!("latency_ms  : {}", meta.latency_ms));
    lines.push(format!("cache_hit   : {}", meta.cache_hit));
    if meta.mock {
        lines.push(String::from("mock        : true (synthetic data)"));
    }
    for attempt in &meta.attempts {
        lines.push(format!(
            "  - {}: {} ({})",
            attempt.provider, attempt.message, attempt.code
        ));
    }

    let Value::Object(data) = &result.data else {
        lines.push(serde_json::to_string_pretty(&result.data)?);
        return Ok(lines);
    };

    // Scalars first, then each array of rows as its own table.
    for (key, value) in data {
        match value {
            Value::Array(_) => {}
            Value::Object(nested) => {
                lines.push(format!("{key}:"));
                for (field, nested_value) in nested {
                    lines.push(format!("  {field:<12}: {}", cell(nested_value)));
                }
            }
            scalar => lines.push(format!("{key:<12}: {}", cell(scalar))),
        }
    }
    for (key, value) in data {
        if let Value::Array(items) = value {
            lines.push(format!("{key}:"));
            let rows: Vec<&Map<String, Value>> = items.iter().filter_map(Value::as_object).collect();
            lines.extend(table(&rows));
        }
    }

    Ok(lines)
}

/// Left-aligned columns keyed by the first row's fields.
fn table(rows: &[&Map<String, Value>]) -> Vec<String> {
    let Some(first) = rows.first() else {
        return vec![String::from("  (none)")];
    };
    let columns: Vec<&String> = first.keys().collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|column| row.get(column.as_str()).map(cell).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            cells
                .iter()
                .map(|row| row[index].len())
                .chain(std::iter::once(column.len()))
                .max()
                .unwrap_or_default()
        })
        .collect();

    let format_row = |values: Vec<&str>| {
        let padded: Vec<String> = values
            .iter()
            .zip(&widths)
            .map(|(value, &width)| format!("{value:<width$}"))
            .collect();
        format!("  {}", padded.join("  ").trim_end())
    };

    let mut lines = Vec::with_capacity(cells.len() + 1);
    lines.push(format_row(columns.iter().map(|column| column.as_str()).collect()));
    for row in &cells {
        lines.push(format_row(row.iter().map(String::as_str).collect()));
    }
    lines
}

fn cell(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::from("-"),
        other => other.to_string(),
    }
}
