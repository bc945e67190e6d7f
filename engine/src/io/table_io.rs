//! CSV persistence for [`Table`].

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};

use crate::core::table::Table;
use crate::io::fs_util::write_atomic;

/// Parse CSV bytes with a header row. Ragged rows are kept as-is.
pub fn parse_table(bytes: &[u8]) -> Result<Table> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes);

    let headers = reader
        .headers()
        .context("read csv header")?
        .iter()
        .map(str::to_string)
        .collect::<Vec<_>>();

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("read csv record {}", index + 1))?;
        rows.push(record.iter().map(str::to_string).collect());
    }
    Ok(Table { headers, rows })
}

pub fn read_table(path: &Path) -> Result<Table> {
    let bytes = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    parse_table(&bytes).with_context(|| format!("parse {}", path.display()))
}

/// Serialize with `\n` terminators so the same table always yields the same bytes.
pub fn render_table(table: &Table) -> Result<Vec<u8>> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::<u8>::new());
    writer
        .write_record(&table.headers)
        .context("write csv header")?;
    for row in &table.rows {
        writer.write_record(row).context("write csv record")?;
    }
    writer.flush().context("flush csv")?;
    writer
        .into_inner()
        .map_err(|err| anyhow!("finish csv: {err}"))
}

pub fn write_table(path: &Path, table: &Table) -> Result<()> {
    let bytes = render_table(table)?;
    write_atomic(path, &bytes)
}
