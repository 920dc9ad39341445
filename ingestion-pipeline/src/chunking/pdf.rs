use std::{
    ops::Range,
    path::{Path, PathBuf},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, ImageDetail, ImageUrlArgs,
    },
    Client,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::{
    error::AppError,
    storage::types::document_chunk::{ChunkType, DocumentChunk},
};
use headless_chrome::{
    protocol::cdp::{Emulation, Page, DOM},
    Browser,
};
use lopdf::Document as LopdfDocument;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::text::{to_document_chunks, window_markdown};

const FAST_PATH_MIN_LEN: usize = 150;
const FAST_PATH_MIN_ASCII_RATIO: f64 = 0.7;
const MAX_VISION_PAGES: usize = 50;
const PAGES_PER_VISION_CHUNK: usize = 4;
const MAX_VISION_ATTEMPTS: usize = 2;
const PDF_MARKDOWN_PROMPT: &str = "Convert these PDF pages to clean Markdown. Preserve headings, lists, tables, blockquotes, code fences, and inline formatting. Keep the original reading order, avoid commentary, and do NOT wrap the entire response in a Markdown code block.";
const PDF_MARKDOWN_PROMPT_RETRY: &str = "You must transcribe the provided PDF page images into accurate Markdown. The images are already supplied, so do not respond that you cannot view them. Extract all visible text, tables, and structure, and do NOT wrap the overall response in a Markdown code block.";
const NAVIGATION_RETRY_INTERVAL_MS: u64 = 120;
const NAVIGATION_RETRY_ATTEMPTS: usize = 10;
const MIN_PAGE_IMAGE_BYTES: usize = 1_024;
const DEFAULT_VIEWPORT_WIDTH: u32 = 1_248;
const DEFAULT_VIEWPORT_HEIGHT: u32 = 1_800;
const DEFAULT_DEVICE_SCALE_FACTOR: f64 = 1.0;
const CANVAS_VIEWPORT_ATTEMPTS: usize = 12;
const CANVAS_VIEWPORT_WAIT_MS: u64 = 200;
const DEBUG_IMAGE_ENV_VAR: &str = "MINNE_PDF_DEBUG_DIR";

/// One page's worth of markdown, with provenance for downstream chunking.
pub struct PdfPageContent {
    pub page_number: u32,
    pub markdown: String,
    pub ocr_processed: bool,
}

/// Extracts every page of a PDF to Markdown, using the embedded text layer
/// where it is good enough and falling back to vision OCR per page otherwise.
pub async fn parse_pdf(
    file_path: &Path,
    client: &Client<OpenAIConfig>,
    vision_model: &str,
) -> Result<Vec<PdfPageContent>, AppError> {
    let pdf_bytes = tokio::fs::read(file_path).await?;

    let page_numbers = load_page_numbers(pdf_bytes.clone()).await?;
    if page_numbers.is_empty() {
        return Err(AppError::ParseError("empty: PDF has no pages".into()));
    }
    if page_numbers.len() > MAX_VISION_PAGES {
        return Err(AppError::ParseError(format!(
            "oversize_file: PDF has {} pages which exceeds the processing limit of {}",
            page_numbers.len(),
            MAX_VISION_PAGES
        )));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    let mut needs_vision = Vec::new();

    for page_number in &page_numbers {
        match try_fast_path_page(pdf_bytes.clone(), *page_number).await? {
            Some(text) => pages.push(PdfPageContent {
                page_number: *page_number,
                markdown: normalize_fast_text(&text),
                ocr_processed: false,
            }),
            None => needs_vision.push(*page_number),
        }
    }

    if !needs_vision.is_empty() {
        let rendered = render_pdf_pages(file_path, &needs_vision).await?;
        for (batch_pages, batch_images) in needs_vision
            .chunks(PAGES_PER_VISION_CHUNK)
            .zip(rendered.chunks(PAGES_PER_VISION_CHUNK))
        {
            let markdown = vision_markdown_batch(batch_images.to_vec(), client, vision_model).await?;
            pages.push(PdfPageContent {
                page_number: batch_pages[0],
                markdown: post_process(&markdown),
                ocr_processed: true,
            });
        }
    }

    pages.sort_by_key(|page| page.page_number);
    Ok(pages)
}

/// Converts parsed pages into token-bounded `DocumentChunk` rows. Markdown
/// table blocks are kept intact as single `Table` chunks (flagged oversize
/// if they don't fit one window); surrounding prose is windowed normally.
pub fn pdf_pages_to_chunks(
    document_id: &str,
    pages: Vec<PdfPageContent>,
    token_range: Range<usize>,
    overlap_tokens: usize,
) -> Result<Vec<DocumentChunk>, AppError> {
    let mut chunks = Vec::new();
    let mut next_index = 0u32;

    for page in pages {
        for block in split_table_and_prose_blocks(&page.markdown) {
            match block {
                MarkdownBlock::Table(content) => {
                    let token_count = super::tokenizer::count_tokens(&content);
                    let mut chunk = DocumentChunk::new(
                        document_id.to_string(),
                        next_index,
                        content,
                        ChunkType::Table,
                        token_count,
                    );
                    chunk.page_number = Some(page.page_number);
                    if token_count as usize > token_range.end {
                        chunk.metadata = serde_json::json!({ "oversize": true });
                    }
                    if page.ocr_processed {
                        chunk.metadata["ocr_processed"] = Value::Bool(true);
                    }
                    next_index += 1;
                    chunks.push(chunk);
                }
                MarkdownBlock::Prose(content) => {
                    let windows = window_markdown(&content, token_range.clone(), overlap_tokens)?;
                    let mut windowed = to_document_chunks(
                        document_id,
                        windows,
                        ChunkType::Text,
                        next_index,
                    );
                    for chunk in &mut windowed {
                        chunk.page_number = Some(page.page_number);
                        if page.ocr_processed {
                            chunk.metadata = serde_json::json!({ "ocr_processed": true });
                        }
                    }
                    next_index += windowed.len() as u32;
                    chunks.extend(windowed);
                }
            }
        }
    }

    Ok(chunks)
}

enum MarkdownBlock {
    Table(String),
    Prose(String),
}

/// Splits markdown into alternating table and prose blocks so tables never
/// get split across a chunk boundary.
fn split_table_and_prose_blocks(markdown: &str) -> Vec<MarkdownBlock> {
    let mut blocks = Vec::new();
    let mut buffer: Vec<&str> = Vec::new();
    let mut table_buffer: Vec<&str> = Vec::new();

    let flush_prose = |buffer: &mut Vec<&str>, blocks: &mut Vec<MarkdownBlock>| {
        if !buffer.is_empty() {
            blocks.push(MarkdownBlock::Prose(buffer.join("\n")));
            buffer.clear();
        }
    };
    let flush_table = |buffer: &mut Vec<&str>, blocks: &mut Vec<MarkdownBlock>| {
        if !buffer.is_empty() {
            blocks.push(MarkdownBlock::Table(buffer.join("\n")));
            buffer.clear();
        }
    };

    for line in markdown.lines() {
        if line.trim_start().starts_with('|') {
            flush_prose(&mut buffer, &mut blocks);
            table_buffer.push(line);
        } else {
            flush_table(&mut table_buffer, &mut blocks);
            buffer.push(line);
        }
    }
    flush_table(&mut table_buffer, &mut blocks);
    flush_prose(&mut buffer, &mut blocks);

    blocks
}

async fn try_fast_path_page(pdf_bytes: Vec<u8>, page_number: u32) -> Result<Option<String>, AppError> {
    let extraction = tokio::task::spawn_blocking(move || -> Result<String, AppError> {
        let document = LopdfDocument::load_mem(&pdf_bytes)
            .map_err(|err| AppError::ParseError(format!("corrupted: failed to parse PDF: {err}")))?;
        document
            .extract_text(&[page_number])
            .map(|text| text.trim().to_string())
            .map_err(|err| AppError::ParseError(format!("corrupted: failed to extract text: {err}")))
    })
    .await??;

    if extraction.is_empty() || !looks_good_enough(&extraction) {
        return Ok(None);
    }

    Ok(Some(extraction))
}

async fn load_page_numbers(pdf_bytes: Vec<u8>) -> Result<Vec<u32>, AppError> {
    let pages = tokio::task::spawn_blocking(move || -> Result<Vec<u32>, AppError> {
        let document = LopdfDocument::load_mem(&pdf_bytes)
            .map_err(|err| AppError::ParseError(format!("corrupted: failed to parse PDF: {err}")))?;
        let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        page_numbers.sort_unstable();
        Ok(page_numbers)
    })
    .await??;

    Ok(pages)
}

async fn render_pdf_pages(file_path: &Path, pages: &[u32]) -> Result<Vec<Vec<u8>>, AppError> {
    let file_url = url::Url::from_file_path(file_path)
        .map_err(|_| AppError::TransientIO("unable to construct PDF file URL".into()))?;

    let browser = create_browser()?;
    let tab = browser
        .new_tab()
        .map_err(|err| AppError::TransientIO(format!("failed to create Chrome tab: {err}")))?;

    tab.set_default_timeout(Duration::from_secs(10));
    configure_tab(&tab)?;
    set_pdf_viewport(&tab)?;

    let mut captures = Vec::with_capacity(pages.len());

    for (idx, page) in pages.iter().enumerate() {
        let target = format!(
            "{}#page={}&toolbar=0&statusbar=0&zoom=page-fit",
            file_url, page
        );
        tab.navigate_to(&target)
            .map_err(|err| AppError::TransientIO(format!("failed to navigate to PDF page: {err}")))?
            .wait_until_navigated()
            .map_err(|err| AppError::TransientIO(format!("navigation to PDF page failed: {err}")))?;

        let mut loaded = false;
        for attempt in 0..NAVIGATION_RETRY_ATTEMPTS {
            if tab
                .wait_for_element("embed, canvas, body")
                .map(|_| ())
                .is_ok()
            {
                loaded = true;
                break;
            }
            if attempt + 1 < NAVIGATION_RETRY_ATTEMPTS {
                sleep(Duration::from_millis(NAVIGATION_RETRY_INTERVAL_MS)).await;
            }
        }

        if !loaded {
            return Err(AppError::TransientIO(
                "timed out waiting for Chrome to render PDF page".into(),
            ));
        }

        wait_for_pdf_ready(&tab, *page)?;
        tokio::time::sleep(Duration::from_millis(350)).await;

        prepare_pdf_viewer(&tab, *page);

        let mut viewport: Option<Page::Viewport> = None;
        for attempt in 0..CANVAS_VIEWPORT_ATTEMPTS {
            match canvas_viewport_for_page(&tab, *page) {
                Ok(Some(vp)) => {
                    viewport = Some(vp);
                    break;
                }
                Ok(None) => {
                    if attempt + 1 < CANVAS_VIEWPORT_ATTEMPTS {
                        tokio::time::sleep(Duration::from_millis(CANVAS_VIEWPORT_WAIT_MS)).await;
                    }
                }
                Err(err) => {
                    warn!(page = *page, error = %err, "failed to derive canvas viewport");
                    break;
                }
            }
        }

        let png = if let Some(clip) = viewport {
            match tab.call_method(Page::CaptureScreenshot {
                format: Some(Page::CaptureScreenshotFormatOption::Png),
                quality: None,
                clip: Some(clip),
                from_surface: Some(true),
                capture_beyond_viewport: Some(true),
                optimize_for_speed: Some(false),
            }) {
                Ok(data) => match STANDARD.decode(data.data) {
                    Ok(bytes) => bytes,
                    Err(err) => {
                        warn!(error = %err, page = *page, "failed to decode clipped screenshot; falling back to full page");
                        capture_full_page_png(&tab)?
                    }
                },
                Err(err) => {
                    warn!(error = %err, page = *page, "clipped screenshot failed; falling back to full page");
                    capture_full_page_png(&tab)?
                }
            }
        } else {
            warn!(page = *page, "unable to determine canvas viewport; capturing full page");
            capture_full_page_png(&tab)?
        };

        if is_suspicious_image(png.len()) {
            warn!(page = *page, bytes = png.len(), "screenshot size below threshold");
        }
        if let Err(err) = maybe_dump_debug_image(*page, idx as u32, &png).await {
            warn!(page = *page, error = %err, "failed to write debug screenshot to disk");
        }

        captures.push(png);
    }

    Ok(captures)
}

fn create_browser() -> Result<Browser, AppError> {
    #[cfg(feature = "docker")]
    {
        let options = headless_chrome::LaunchOptionsBuilder::default()
            .sandbox(false)
            .build()
            .map_err(|err| AppError::TransientIO(format!("failed to launch Chrome: {err}")))?;
        Browser::new(options)
            .map_err(|err| AppError::TransientIO(format!("failed to start Chrome: {err}")))
    }
    #[cfg(not(feature = "docker"))]
    {
        Browser::default().map_err(|err| AppError::TransientIO(format!("failed to start Chrome: {err}")))
    }
}

async fn vision_markdown_batch(
    images: Vec<Vec<u8>>,
    client: &Client<OpenAIConfig>,
    model: &str,
) -> Result<String, AppError> {
    let encoded_images: Vec<String> = images.iter().map(|bytes| STANDARD.encode(bytes)).collect();

    for attempt in 0..MAX_VISION_ATTEMPTS {
        let prompt_text = prompt_for_attempt(attempt, PDF_MARKDOWN_PROMPT);

        let mut content_parts = Vec::with_capacity(encoded_images.len() + 1);
        content_parts.push(
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt_text)
                .build()?
                .into(),
        );
        for encoded in &encoded_images {
            let image_url = format!("data:image/png;base64,{}", encoded);
            content_parts.push(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(
                        ImageUrlArgs::default()
                            .url(image_url)
                            .detail(ImageDetail::High)
                            .build()?,
                    )
                    .build()?
                    .into(),
            );
        }

        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages([ChatCompletionRequestUserMessageArgs::default()
                .content(content_parts)
                .build()?
                .into()])
            .build()?;

        let response = client.chat().create(request).await?;
        let Some(choice) = response.choices.first() else {
            warn!(attempt, "vision response contained zero choices");
            continue;
        };
        let Some(content) = choice.message.content.as_ref() else {
            warn!(attempt, "vision response missing content field");
            continue;
        };

        if is_low_quality_response(content) {
            warn!(attempt, "vision model returned low quality response");
            if attempt + 1 == MAX_VISION_ATTEMPTS {
                return Err(AppError::ProviderContract(
                    "vision model failed to transcribe PDF page contents".into(),
                ));
            }
            continue;
        }

        return Ok(content.trim().to_string());
    }

    Err(AppError::ProviderContract(
        "vision model did not return usable Markdown".into(),
    ))
}

fn looks_good_enough(text: &str) -> bool {
    if text.len() < FAST_PATH_MIN_LEN {
        return false;
    }
    let total_chars = text.chars().count() as f64;
    if total_chars == 0.0 {
        return false;
    }
    let ascii_chars = text.chars().filter(|c| c.is_ascii()).count() as f64;
    if ascii_chars / total_chars < FAST_PATH_MIN_ASCII_RATIO {
        return false;
    }
    let letters = text.chars().filter(|c| c.is_alphabetic()).count() as f64;
    letters / total_chars > 0.3
}

fn normalize_fast_text(text: &str) -> String {
    reflow_markdown(text)
}

fn post_process(markdown: &str) -> String {
    let cleaned = markdown.replace('\r', "");
    reflow_markdown(cleaned.trim())
}

fn reflow_markdown(input: &str) -> String {
    let mut paragraphs = Vec::new();
    let mut buffer: Vec<String> = Vec::new();

    for line in input.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !buffer.is_empty() {
                paragraphs.push(buffer.join(" "));
                buffer.clear();
            }
            continue;
        }
        if is_structural_line(trimmed) {
            if !buffer.is_empty() {
                paragraphs.push(buffer.join(" "));
                buffer.clear();
            }
            paragraphs.push(trimmed.to_string());
            continue;
        }
        buffer.push(trimmed.to_string());
    }
    if !buffer.is_empty() {
        paragraphs.push(buffer.join(" "));
    }
    paragraphs.join("\n\n")
}

fn is_structural_line(line: &str) -> bool {
    let lowered = line.to_ascii_lowercase();
    line.starts_with('#')
        || line.starts_with('-')
        || line.starts_with('*')
        || line.starts_with('>')
        || line.starts_with("```")
        || line.starts_with('~')
        || line.starts_with("| ")
        || line.starts_with("+-")
        || lowered
            .chars()
            .next()
            .map(|c| c.is_ascii_digit())
            .unwrap_or(false)
            && lowered.contains('.')
}

fn debug_dump_directory() -> Option<PathBuf> {
    std::env::var(DEBUG_IMAGE_ENV_VAR)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

fn configure_tab(tab: &headless_chrome::Tab) -> Result<(), AppError> {
    tab.call_method(Emulation::SetDefaultBackgroundColorOverride {
        color: Some(DOM::RGBA {
            r: 255,
            g: 255,
            b: 255,
            a: Some(1.0),
        }),
    })
    .map_err(|err| AppError::TransientIO(format!("failed to configure Chrome background: {err}")))?;
    Ok(())
}

fn set_pdf_viewport(tab: &headless_chrome::Tab) -> Result<(), AppError> {
    tab.call_method(Emulation::SetDeviceMetricsOverride {
        width: DEFAULT_VIEWPORT_WIDTH,
        height: DEFAULT_VIEWPORT_HEIGHT,
        device_scale_factor: DEFAULT_DEVICE_SCALE_FACTOR,
        mobile: false,
        scale: None,
        screen_width: Some(DEFAULT_VIEWPORT_WIDTH),
        screen_height: Some(DEFAULT_VIEWPORT_HEIGHT),
        position_x: None,
        position_y: None,
        dont_set_visible_size: Some(false),
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    })
    .map_err(|err| AppError::TransientIO(format!("failed to configure Chrome viewport: {err}")))?;

    tab.call_method(Emulation::SetVisibleSize {
        width: DEFAULT_VIEWPORT_WIDTH,
        height: DEFAULT_VIEWPORT_HEIGHT,
    })
    .map_err(|err| AppError::TransientIO(format!("failed to apply Chrome visible size: {err}")))?;

    Ok(())
}

fn wait_for_pdf_ready(
    tab: &headless_chrome::Tab,
    page_number: u32,
) -> Result<headless_chrome::Element<'_>, AppError> {
    let element = tab
        .wait_for_element_with_custom_timeout("embed[type='application/pdf']", Duration::from_secs(8))
        .or_else(|_| tab.wait_for_element_with_custom_timeout("embed", Duration::from_secs(8)))
        .map_err(|err| AppError::TransientIO(format!("timed out waiting for PDF content: {err}")))?;

    if let Err(err) = element.scroll_into_view() {
        debug!("failed to scroll PDF element into view: {err}");
    }
    debug!(page = page_number, "PDF viewer element located");
    Ok(element)
}

fn prepare_pdf_viewer(tab: &headless_chrome::Tab, page_number: u32) {
    let script = format!(
        r#"(function() {{
            const embed = document.querySelector('embed[type="application/pdf"]') || document.querySelector('embed');
            if (!embed || !embed.shadowRoot) return false;
            const viewer = embed.shadowRoot.querySelector('pdf-viewer');
            if (!viewer || !viewer.shadowRoot) return false;
            const app = viewer.shadowRoot.querySelector('viewer-app');
            if (app && app.shadowRoot) {{
                const toolbar = app.shadowRoot.querySelector('#toolbar');
                if (toolbar) {{ toolbar.style.display = 'none'; }}
            }}
            const page = viewer.shadowRoot.querySelector('viewer-page:nth-of-type({page})');
            if (page && page.scrollIntoView) {{
                page.scrollIntoView({{ block: 'start', inline: 'center' }});
            }}
            const canvas = viewer.shadowRoot.querySelector('canvas[aria-label="Page {page}"]');
            return !!canvas;
        }})()"#,
        page = page_number
    );

    match tab.evaluate(&script, false) {
        Ok(result) => {
            let ready = result.value.as_ref().and_then(Value::as_bool).unwrap_or(false);
            debug!(page = page_number, ready, "prepared PDF viewer page");
        }
        Err(err) => {
            debug!(page = page_number, error = %err, "unable to run PDF viewer preparation script");
        }
    }
}

fn canvas_viewport_for_page(
    tab: &headless_chrome::Tab,
    page_number: u32,
) -> Result<Option<Page::Viewport>, AppError> {
    let script = format!(
        r#"(function() {{
            const embed = document.querySelector('embed[type="application/pdf"]') || document.querySelector('embed');
            if (!embed || !embed.shadowRoot) return null;
            const viewer = embed.shadowRoot.querySelector('pdf-viewer');
            if (!viewer || !viewer.shadowRoot) return null;
            const canvas = viewer.shadowRoot.querySelector('canvas[aria-label="Page {page}"]');
            if (!canvas) return null;
            const rect = canvas.getBoundingClientRect();
            return {{ x: rect.x, y: rect.y, width: rect.width, height: rect.height }};
        }})()"#,
        page = page_number
    );

    let result = tab
        .evaluate(&script, false)
        .map_err(|err| AppError::TransientIO(format!("failed to inspect PDF canvas: {err}")))?;

    let Some(value) = result.value else {
        return Ok(None);
    };
    if value.is_null() {
        return Ok(None);
    }

    let x = value.get("x").and_then(Value::as_f64).unwrap_or_default().max(0.0);
    let y = value.get("y").and_then(Value::as_f64).unwrap_or_default().max(0.0);
    let width = value.get("width").and_then(Value::as_f64).unwrap_or_default();
    let height = value.get("height").and_then(Value::as_f64).unwrap_or_default();

    if width <= 0.0 || height <= 0.0 {
        return Ok(None);
    }

    Ok(Some(Page::Viewport {
        x,
        y,
        width,
        height,
        scale: 1.0,
    }))
}

fn capture_full_page_png(tab: &headless_chrome::Tab) -> Result<Vec<u8>, AppError> {
    let screenshot = tab
        .call_method(Page::CaptureScreenshot {
            format: Some(Page::CaptureScreenshotFormatOption::Png),
            quality: None,
            clip: None,
            from_surface: Some(true),
            capture_beyond_viewport: Some(true),
            optimize_for_speed: Some(false),
        })
        .map_err(|err| AppError::TransientIO(format!("failed to capture PDF page (fallback): {err}")))?;

    STANDARD
        .decode(screenshot.data)
        .map_err(|err| AppError::TransientIO(format!("failed to decode PDF screenshot (fallback): {err}")))
}

fn is_suspicious_image(len: usize) -> bool {
    len < MIN_PAGE_IMAGE_BYTES
}

async fn maybe_dump_debug_image(page_number: u32, index: u32, bytes: &[u8]) -> Result<(), AppError> {
    if let Some(dir) = debug_dump_directory() {
        tokio::fs::create_dir_all(&dir).await?;
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        let file_path = dir.join(format!("page-{page_number:04}-{index:04}-{timestamp}.png"));
        tokio::fs::write(&file_path, bytes).await?;
    }
    Ok(())
}

fn is_low_quality_response(content: &str) -> bool {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return true;
    }
    let lowered = trimmed.to_ascii_lowercase();
    lowered.contains("unable to") || lowered.contains("cannot")
}

fn prompt_for_attempt(attempt: usize, base_prompt: &str) -> &str {
    if attempt == 0 {
        base_prompt
    } else {
        PDF_MARKDOWN_PROMPT_RETRY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn looks_good_enough_rejects_short_text() {
        assert!(!looks_good_enough("too short"));
    }

    #[test]
    fn looks_good_enough_accepts_ascii_prose() {
        let text = "This is a reasonably long ASCII text that should pass the heuristic. \
        It contains multiple sentences and a decent amount of letters to satisfy the threshold.";
        assert!(looks_good_enough(text));
    }

    #[test]
    fn reflow_markdown_preserves_lists() {
        let input = "Item one\nItem two\n\n- Bullet\n- Another";
        let output = reflow_markdown(input);
        assert!(output.contains("Item one Item two"));
        assert!(output.contains("- Bullet"));
    }

    #[test]
    fn is_suspicious_image_threshold() {
        assert!(is_suspicious_image(0));
        assert!(is_suspicious_image(MIN_PAGE_IMAGE_BYTES - 1));
        assert!(!is_suspicious_image(MIN_PAGE_IMAGE_BYTES + 1));
    }

    #[test]
    fn is_low_quality_response_detection() {
        assert!(is_low_quality_response(""));
        assert!(is_low_quality_response("I'm unable to help."));
        assert!(is_low_quality_response("I cannot read this."));
        assert!(!is_low_quality_response("# Heading\nValid content"));
    }

    #[test]
    fn prompt_for_attempt_variants() {
        assert_eq!(prompt_for_attempt(0, PDF_MARKDOWN_PROMPT), PDF_MARKDOWN_PROMPT);
        assert_eq!(prompt_for_attempt(1, PDF_MARKDOWN_PROMPT), PDF_MARKDOWN_PROMPT_RETRY);
    }

    #[test]
    fn splits_table_blocks_from_prose() {
        let markdown = "Intro paragraph\n\n| a | b |\n|---|---|\n| 1 | 2 |\n\nOutro paragraph";
        let blocks = split_table_and_prose_blocks(markdown);
        assert_eq!(blocks.len(), 3);
        assert!(matches!(blocks[0], MarkdownBlock::Prose(_)));
        assert!(matches!(blocks[1], MarkdownBlock::Table(_)));
        assert!(matches!(blocks[2], MarkdownBlock::Prose(_)));
    }
}
