use std::{ops::Range, path::Path};

use common::{
    error::AppError,
    storage::types::document_chunk::{ChunkType, DocumentChunk},
};
use docx_rust::{
    document::{BodyContent, ParagraphContent, RunContent, TableCellContent, TableRowContent},
    DocxFile,
};

use super::text::{to_document_chunks, window_text};

pub enum DocxBlock {
    Paragraph(String),
    Table(String),
}

/// Reads a DOCX file into an ordered list of paragraph and table blocks.
/// Paragraphs are later windowed together; tables are kept intact.
pub fn parse_docx(file_path: &Path) -> Result<Vec<DocxBlock>, AppError> {
    let docx_file = DocxFile::from_file(file_path)
        .map_err(|err| AppError::ParseError(format!("corrupted: failed to open DOCX: {err}")))?;
    let document = docx_file
        .parse()
        .map_err(|err| AppError::ParseError(format!("corrupted: failed to parse DOCX: {err}")))?;

    let mut blocks = Vec::new();

    for content in &document.document.body.content {
        match content {
            BodyContent::Paragraph(paragraph) => {
                let text = paragraph_text(paragraph);
                if !text.trim().is_empty() {
                    blocks.push(DocxBlock::Paragraph(text));
                }
            }
            BodyContent::Table(table) => {
                let markdown = table_to_markdown(table);
                if !markdown.trim().is_empty() {
                    blocks.push(DocxBlock::Table(markdown));
                }
            }
            _ => {}
        }
    }

    if blocks.is_empty() {
        return Err(AppError::ParseError("empty: DOCX has no content".into()));
    }

    Ok(blocks)
}

fn paragraph_text(paragraph: &docx_rust::document::Paragraph) -> String {
    let mut text = String::new();
    for content in &paragraph.content {
        if let ParagraphContent::Run(run) = content {
            for run_content in &run.content {
                if let RunContent::Text(run_text) = run_content {
                    text.push_str(&run_text.text);
                }
            }
        }
    }
    text
}

fn table_to_markdown(table: &docx_rust::document::Table) -> String {
    let mut lines = Vec::with_capacity(table.rows.len() + 1);

    for (row_idx, row) in table.rows.iter().enumerate() {
        let cells: Vec<String> = row
            .cells
            .iter()
            .map(|cell| match cell {
                TableRowContent::TableCell(cell) => cell_text(cell),
                _ => String::new(),
            })
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));

        if row_idx == 0 {
            let separator = vec!["---"; cells.len()].join(" | ");
            lines.push(format!("| {separator} |"));
        }
    }

    lines.join("\n")
}

fn cell_text(cell: &docx_rust::document::TableCell) -> String {
    let mut text = String::new();
    for content in &cell.content {
        if let TableCellContent::Paragraph(paragraph) = content {
            text.push_str(&paragraph_text(paragraph));
            text.push(' ');
        }
    }
    text.trim().to_string()
}

/// Converts parsed DOCX blocks into `DocumentChunk` rows: paragraphs are
/// windowed together by `window_text`, tables become standalone chunks.
pub fn docx_blocks_to_chunks(
    document_id: &str,
    blocks: Vec<DocxBlock>,
    token_range: Range<usize>,
    overlap_tokens: usize,
) -> Result<Vec<DocumentChunk>, AppError> {
    let mut chunks = Vec::new();
    let mut next_index = 0u32;
    let mut paragraph_buffer = String::new();

    let flush_paragraphs = |buffer: &mut String,
                             chunks: &mut Vec<DocumentChunk>,
                             next_index: &mut u32|
     -> Result<(), AppError> {
        if buffer.trim().is_empty() {
            buffer.clear();
            return Ok(());
        }
        let windows = window_text(buffer, token_range.clone(), overlap_tokens)?;
        let windowed = to_document_chunks(document_id, windows, ChunkType::Text, *next_index);
        *next_index += windowed.len() as u32;
        chunks.extend(windowed);
        buffer.clear();
        Ok(())
    };

    for block in blocks {
        match block {
            DocxBlock::Paragraph(text) => {
                if !paragraph_buffer.is_empty() {
                    paragraph_buffer.push_str("\n\n");
                }
                paragraph_buffer.push_str(&text);
            }
            DocxBlock::Table(markdown) => {
                flush_paragraphs(&mut paragraph_buffer, &mut chunks, &mut next_index)?;

                let token_count = super::tokenizer::count_tokens(&markdown);
                let mut chunk = DocumentChunk::new(
                    document_id.to_string(),
                    next_index,
                    markdown,
                    ChunkType::Table,
                    token_count,
                );
                if token_count as usize > token_range.end {
                    chunk.metadata = serde_json::json!({ "oversize": true });
                }
                next_index += 1;
                chunks.push(chunk);
            }
        }
    }

    flush_paragraphs(&mut paragraph_buffer, &mut chunks, &mut next_index)?;

    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn docx_blocks_to_chunks_windows_paragraphs_and_keeps_tables_whole() {
        let blocks = vec![
            DocxBlock::Paragraph("Executive summary of the target company.".into()),
            DocxBlock::Table("| a | b |\n| --- | --- |\n| 1 | 2 |".into()),
        ];
        let chunks = docx_blocks_to_chunks("doc_1", blocks, 512..1024, 64).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_type, ChunkType::Text);
        assert_eq!(chunks[1].chunk_type, ChunkType::Table);
    }
}
