//! Violation record output: CSV, JSON, and a terminal table.

use anyhow::Result;
use std::io::Write;

use crate::ViolationRecord;

pub const CSV_HEADER: [&str; 4] = ["Start", "End", "Person", "Violation"];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Table,
    Csv,
    Json,
}

impl ExportFormat {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "table" => Some(ExportFormat::Table),
            "csv" => Some(ExportFormat::Csv),
            "json" => Some(ExportFormat::Json),
            _ => None,
        }
    }
}

pub fn write_records<W: Write>(
    out: &mut W,
    records: &[ViolationRecord],
    format: ExportFormat,
) -> Result<()> {
    match format {
        ExportFormat::Table => write_table(out, records),
        ExportFormat::Csv => write_csv(out, records),
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *out, records)?;
            writeln!(out)?;
            Ok(())
        }
    }
}

/// RFC 4180 CSV with a `Start,End,Person,Violation` header.
pub fn write_csv<W: Write>(out: &mut W, records: &[ViolationRecord]) -> Result<()> {
    writeln!(out, "{}", CSV_HEADER.join(","))?;
    for record in records {
        writeln!(
            out,
            "{},{},{},{}",
            csv_field(&record.start),
            csv_field(&record.end),
            record.person_id,
            csv_field(&record.category)
        )?;
    }
    Ok(())
}

pub fn write_table<W: Write>(out: &mut W, records: &[ViolationRecord]) -> Result<()> {
    if records.is_empty() {
        writeln!(out, "no violations found")?;
        return Ok(());
    }
    let rows: Vec<[String; 4]> = records
        .iter()
        .map(|r| {
            [
                r.start.clone(),
                r.end.clone(),
                r.person_id.to_string(),
                r.category.clone(),
            ]
        })
        .collect();
    let mut widths = CSV_HEADER.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: [&str; 4]| -> String {
        cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!("{:<width$}", cell, width = width))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    writeln!(out, "{}", line(CSV_HEADER))?;
    for row in &rows {
        let [start, end, person, category] = row;
        writeln!(out, "{}", line([start, end, person, category].map(String::as_str)))?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains(&[',', '"', '\n', '\r'][..]) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
