//! Schema context text handed to the generator.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::schema::SchemaContext;
use crate::io::table_io::read_table;

/// Derive the schema context from a data file.
pub fn extract_context(data_path: &Path) -> Result<SchemaContext> {
    let table = read_table(data_path)?;
    Ok(SchemaContext::from_table(&table))
}

/// Schema text for an engine run.
///
/// Reads `schema_path` when it exists; otherwise derives the text from the
/// data file so a run never starts without a schema.
pub fn load_schema_text(schema_path: Option<&Path>, data_path: &Path) -> Result<String> {
    if let Some(path) = schema_path
        && path.exists()
    {
        debug!(path = %path.display(), "reading schema context");
        return fs::read_to_string(path).with_context(|| format!("read schema {}", path.display()));
    }
    info!(data = %data_path.display(), "deriving schema context from data");
    Ok(extract_context(data_path)?.render())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_existing_schema_file() {
        let temp = tempfile::tempdir().expect("tempdir");
        let schema = temp.path().join("context.txt");
        fs::write(&schema, "DATA SCHEMA:\n- custom").expect("write");
        let text = load_schema_text(Some(&schema), &temp.path().join("unused.csv")).expect("load");
        assert_eq!(text, "DATA SCHEMA:\n- custom");
    }

    #[test]
    fn derives_from_data_when_schema_is_missing() {
        let temp = tempfile::tempdir().expect("tempdir");
        let data = temp.path().join("data.csv");
        fs::write(&data, "Item,Price\na,1.5\nb,2\n").expect("write");
        let text =
            load_schema_text(Some(&temp.path().join("missing.txt")), &data).expect("derive");
        assert!(text.contains("Price: float64"));
        assert!(text.contains("- Total Rows: 2"));
    }
}
