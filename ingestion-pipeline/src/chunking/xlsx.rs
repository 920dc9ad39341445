use std::{ops::Range, path::Path};

use calamine::{open_workbook_auto, Data, Reader, SheetVisible};
use common::{
    error::AppError,
    storage::types::document_chunk::{ChunkType, DocumentChunk},
};

use super::tokenizer::count_tokens;

/// One visible sheet's worth of cell data, with its formulas kept alongside
/// the evaluated values so both survive into the chunk.
struct SheetContent {
    name: String,
    values: Vec<Vec<Data>>,
    formulas: Vec<Vec<Option<String>>>,
}

/// Parses an XLSX workbook into per-sheet content, skipping hidden sheets.
/// Returns the parsed sheets plus a note for every sheet skipped as hidden.
pub fn parse_xlsx(file_path: &Path) -> Result<(Vec<SheetContentHandle>, Vec<String>), AppError> {
    let mut workbook = open_workbook_auto(file_path)
        .map_err(|err| AppError::ParseError(format!("corrupted: failed to open workbook: {err}")))?;

    let metadata = workbook.sheets_metadata().to_vec();
    let mut sheets = Vec::new();
    let mut notes = Vec::new();

    for sheet in &metadata {
        if !matches!(sheet.visible, SheetVisible::Visible) {
            notes.push(format!("sheet '{}' is hidden; skipped", sheet.name));
            continue;
        }

        let range = match workbook.worksheet_range(&sheet.name) {
            Ok(range) => range,
            Err(err) => {
                notes.push(format!("sheet '{}' could not be read: {err}", sheet.name));
                continue;
            }
        };
        let formula_range = workbook.worksheet_formula(&sheet.name).ok();

        let values: Vec<Vec<Data>> = range.rows().map(|row| row.to_vec()).collect();
        let formulas: Vec<Vec<Option<String>>> = match formula_range {
            Some(formula_range) => formula_range
                .rows()
                .map(|row| {
                    row.iter()
                        .map(|cell| {
                            let cell = cell.trim();
                            if cell.is_empty() {
                                None
                            } else {
                                Some(cell.to_string())
                            }
                        })
                        .collect()
                })
                .collect(),
            None => Vec::new(),
        };

        sheets.push(SheetContentHandle(SheetContent {
            name: sheet.name.clone(),
            values,
            formulas,
        }));
    }

    if sheets.is_empty() && notes.is_empty() {
        return Err(AppError::ParseError("empty: workbook has no sheets".into()));
    }

    Ok((sheets, notes))
}

/// Opaque wrapper so callers outside this module can hold parsed sheets
/// without reaching into calamine's `Data` type directly.
pub struct SheetContentHandle(SheetContent);

/// Converts parsed sheets into `Table` chunks, one per sheet. A sheet's table
/// is never split across chunks; if it doesn't fit the token window it is
/// emitted as a single chunk flagged `oversize=true`.
pub fn xlsx_sheets_to_chunks(
    document_id: &str,
    sheets: Vec<SheetContentHandle>,
    token_range: Range<usize>,
) -> Vec<DocumentChunk> {
    let mut chunks = Vec::with_capacity(sheets.len());

    for (index, handle) in sheets.into_iter().enumerate() {
        let sheet = handle.0;
        let markdown = sheet_to_markdown_table(&sheet);
        let anchor_cell = "A1".to_string();
        let token_count = count_tokens(&markdown);

        let mut chunk = DocumentChunk::new(
            document_id.to_string(),
            index as u32,
            markdown,
            ChunkType::Table,
            token_count,
        );
        chunk.sheet_name = Some(sheet.name);
        chunk.cell_reference = Some(anchor_cell);
        if token_count as usize > token_range.end {
            chunk.metadata = serde_json::json!({ "oversize": true });
        }
        chunks.push(chunk);
    }

    chunks
}

fn sheet_to_markdown_table(sheet: &SheetContent) -> String {
    let mut lines = Vec::with_capacity(sheet.values.len() + 2);

    let width = sheet.values.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    for (row_idx, row) in sheet.values.iter().enumerate() {
        let mut cells = Vec::with_capacity(width);
        for col_idx in 0..width {
            let value = row.get(col_idx).map(data_to_string).unwrap_or_default();
            let formula = sheet
                .formulas
                .get(row_idx)
                .and_then(|row| row.get(col_idx))
                .and_then(|cell| cell.as_ref());

            let rendered = match formula {
                Some(formula) => format!("{value} (={formula})"),
                None => value,
            };
            cells.push(rendered);
        }
        lines.push(format!("| {} |", cells.join(" | ")));

        if row_idx == 0 {
            let separator = vec!["---"; width].join(" | ");
            lines.push(format!("| {separator} |"));
        }
    }

    lines.join("\n")
}

fn data_to_string(value: &Data) -> String {
    match value {
        Data::Empty => String::new(),
        Data::String(text) => text.clone(),
        Data::Float(number) => number.to_string(),
        Data::Int(number) => number.to_string(),
        Data::Bool(flag) => flag.to_string(),
        Data::Error(err) => format!("#ERROR({err:?})"),
        Data::DateTime(dt) => dt.to_string(),
        Data::DateTimeIso(dt) => dt.clone(),
        Data::DurationIso(duration) => duration.clone(),
    }
}

/// Converts a zero-based column index to its spreadsheet letter form
/// (0 -> "A", 25 -> "Z", 26 -> "AA").
pub fn column_letters(mut index: usize) -> String {
    let mut letters = Vec::new();
    loop {
        let remainder = index % 26;
        letters.push((b'A' + remainder as u8) as char);
        if index < 26 {
            break;
        }
        index = index / 26 - 1;
    }
    letters.iter().rev().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_letters_basic() {
        assert_eq!(column_letters(0), "A");
        assert_eq!(column_letters(25), "Z");
        assert_eq!(column_letters(26), "AA");
    }

    #[test]
    fn data_to_string_formats_variants() {
        assert_eq!(data_to_string(&Data::Empty), "");
        assert_eq!(data_to_string(&Data::Int(42)), "42");
        assert_eq!(data_to_string(&Data::Bool(true)), "true");
    }

    #[test]
    fn sheet_to_markdown_table_renders_header_and_formula() {
        let sheet = SheetContent {
            name: "Sheet1".into(),
            values: vec![
                vec![Data::String("Revenue".into())],
                vec![Data::Float(100.0)],
            ],
            formulas: vec![vec![None], vec![Some("SUM(B1:B2)".into())]],
        };
        let markdown = sheet_to_markdown_table(&sheet);
        assert!(markdown.contains("Revenue"));
        assert!(markdown.contains("100 (=SUM(B1:B2))"));
    }
}
