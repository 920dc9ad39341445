use std::ops::Range;

use common::{
    error::AppError,
    storage::types::document_chunk::{ChunkType, DocumentChunk},
};
use text_splitter::{ChunkCapacity, ChunkConfig, MarkdownSplitter, TextSplitter};

use super::tokenizer::{count_tokens, get_tokenizer};

/// Target window from the windowing contract: 512-1024 tokens per chunk.
pub const DEFAULT_TOKEN_RANGE: Range<usize> = 512..1024;
pub const DEFAULT_OVERLAP_TOKENS: usize = 64;

fn chunk_config(
    token_range: Range<usize>,
    overlap_tokens: usize,
) -> Result<ChunkConfig<&'static tokenizers::Tokenizer>, AppError> {
    let min_tokens = token_range.start;
    let max_tokens = token_range.end;

    if min_tokens == 0 || max_tokens == 0 || min_tokens > max_tokens {
        return Err(AppError::Validation(
            "invalid chunk token bounds; ensure 0 < min <= max".into(),
        ));
    }
    if overlap_tokens >= min_tokens {
        return Err(AppError::Validation(format!(
            "chunk overlap {overlap_tokens} must be smaller than the minimum window {min_tokens}"
        )));
    }

    let tokenizer = get_tokenizer()?;
    let capacity = ChunkCapacity::new(min_tokens)
        .with_max(max_tokens)
        .map_err(|err| AppError::Validation(format!("invalid chunk token bounds: {err}")))?;

    ChunkConfig::new(capacity)
        .with_overlap(overlap_tokens)
        .map_err(|err| AppError::Validation(format!("invalid chunk overlap: {err}")))
        .map(|cfg| cfg.with_sizer(tokenizer))
}

/// Splits plain text into token-bounded windows, honoring the embedding
/// provider's tokenizer for sizing.
pub fn window_text(
    text: &str,
    token_range: Range<usize>,
    overlap_tokens: usize,
) -> Result<Vec<String>, AppError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let config = chunk_config(token_range, overlap_tokens)?;
    let splitter = TextSplitter::new(config);
    Ok(splitter.chunks(text).map(str::to_owned).collect())
}

/// Splits markdown text the same way, but respects block boundaries (headings,
/// tables, code fences) so a window never cuts through one. Used for PDF/DOCX
/// bodies, which are rendered to markdown before windowing.
pub fn window_markdown(
    text: &str,
    token_range: Range<usize>,
    overlap_tokens: usize,
) -> Result<Vec<String>, AppError> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    let config = chunk_config(token_range, overlap_tokens)?;
    let splitter = MarkdownSplitter::new(config);
    Ok(splitter.chunks(text).map(str::to_owned).collect())
}

/// Turns pre-split text windows into `DocumentChunk` rows, assigning a dense
/// zero-based `chunk_index` starting from `start_index`.
pub fn to_document_chunks(
    document_id: &str,
    windows: Vec<String>,
    chunk_type: ChunkType,
    start_index: u32,
) -> Vec<DocumentChunk> {
    windows
        .into_iter()
        .enumerate()
        .map(|(offset, content)| {
            let token_count = count_tokens(&content);
            DocumentChunk::new(
                document_id.to_string(),
                start_index + offset as u32,
                content,
                chunk_type.clone(),
                token_count,
            )
        })
        .collect()
}

/// A single oversized chunk (e.g. a table too large to fit one window),
/// flagged `oversize=true` in its metadata per the windowing contract.
pub fn oversize_chunk(
    document_id: &str,
    content: String,
    chunk_type: ChunkType,
    index: u32,
) -> DocumentChunk {
    let token_count = count_tokens(&content);
    let mut chunk = DocumentChunk::new(document_id.to_string(), index, content, chunk_type, token_count);
    chunk.metadata = serde_json::json!({ "oversize": true });
    chunk
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_produces_no_windows() {
        let windows = window_text("   ", DEFAULT_TOKEN_RANGE, DEFAULT_OVERLAP_TOKENS);
        assert!(windows.unwrap().is_empty());
    }

    #[test]
    fn overlap_must_be_smaller_than_minimum_window() {
        let result = window_text("hello world", 10..20, 10);
        assert!(result.is_err());
    }

    #[test]
    fn to_document_chunks_assigns_dense_indices() {
        let chunks = to_document_chunks(
            "doc_1",
            vec!["first".into(), "second".into()],
            ChunkType::Text,
            0,
        );
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
        assert_eq!(chunks[0].content, "first");
    }

    #[test]
    fn oversize_chunk_is_flagged() {
        let chunk = oversize_chunk("doc_1", "big table".into(), ChunkType::Table, 0);
        assert_eq!(chunk.metadata["oversize"], true);
    }
}
