//! JSON reader and writer for [`WorkbookData`].

use std::fs;
use std::path::Path;

use super::{CURRENT_VERSION, WorkbookData};
use crate::error::{Result, TabulaError};

const MAX_WORKBOOK_FILE_BYTES: u64 = 64 * 1_048_576; // 64 MiB

/// Read a workbook file.
pub fn parse_workbook(path: &Path) -> Result<WorkbookData> {
    let meta = fs::metadata(path)?;
    if meta.len() > MAX_WORKBOOK_FILE_BYTES {
        return Err(TabulaError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!(
                "Refusing to read {}: workbook too large ({} bytes, max {})",
                path.display(),
                meta.len(),
                MAX_WORKBOOK_FILE_BYTES
            ),
        )));
    }
    parse_workbook_content(&fs::read_to_string(path)?)
}

/// Parse workbook JSON from a string.
pub fn parse_workbook_content(content: &str) -> Result<WorkbookData> {
    let data: WorkbookData = serde_json::from_str(content)?;
    if data.version > CURRENT_VERSION {
        return Err(TabulaError::invalid(format!(
            "unsupported version {} (newest known is {})",
            data.version, CURRENT_VERSION
        )));
    }
    Ok(data)
}

/// Write a workbook file, pretty-printed.
pub fn write_workbook(path: &Path, data: &WorkbookData) -> Result<()> {
    fs::write(path, write_workbook_content(data)?)?;
    Ok(())
}

pub fn write_workbook_content(data: &WorkbookData) -> Result<String> {
    let mut content = serde_json::to_string_pretty(data)?;
    content.push('\n');
    Ok(content)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{CellData, SheetData};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_minimal_workbook() {
        let json = r#"{
            "version": 1,
            "sheets": [{
                "id": "s1", "name": "Sheet1", "colNumber": 3, "rowNumber": 4,
                "cells": { "A1": { "content": "12" }, "B2": { "content": "=A1*2", "style": 1 } },
                "merges": ["B3:C4"]
            }],
            "styles": { "1": { "bold": true } }
        }"#;
        let data = parse_workbook_content(json).unwrap();
        let sheet = &data.sheets[0];
        assert_eq!(sheet.col_number, 3);
        assert_eq!(sheet.cells["B2"].style, Some(1));
        assert_eq!(sheet.merges, vec!["B3:C4".to_string()]);
        assert_eq!(data.styles[&1].bold, Some(true));
        assert_eq!(data.active_sheet, None);
    }

    #[test]
    fn test_written_content_parses_back() {
        let mut sheet = SheetData::new("s1", "Data", 2, 2);
        sheet.cells.insert(
            "A1".into(),
            CellData {
                content: "hello".into(),
                style: None,
            },
        );
        let data = WorkbookData {
            sheets: vec![sheet],
            ..WorkbookData::default()
        };
        let text = write_workbook_content(&data).unwrap();
        assert!(text.contains("\"colNumber\": 2"));
        assert_eq!(parse_workbook_content(&text).unwrap(), data);
    }

    #[test]
    fn test_rejects_newer_versions_and_bad_json() {
        assert!(matches!(
            parse_workbook_content(r#"{"version": 99, "sheets": []}"#),
            Err(TabulaError::InvalidWorkbook { .. })
        ));
        assert!(matches!(
            parse_workbook_content("{"),
            Err(TabulaError::Json(_))
        ));
    }

    #[test]
    fn test_file_round_trip() {
        let path = std::env::temp_dir().join(format!(
            "tabula_json_round_trip_{}.json",
            std::process::id()
        ));
        let data = WorkbookData {
            sheets: vec![SheetData::new("s1", "Sheet1", 1, 1)],
            ..WorkbookData::default()
        };
        write_workbook(&path, &data).unwrap();
        let loaded = parse_workbook(&path);
        let _ = std::fs::remove_file(&path);
        assert_eq!(loaded.unwrap(), data);
    }
}
