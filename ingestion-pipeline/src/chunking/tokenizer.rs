use std::sync::OnceLock;

use common::error::AppError;
use tokenizers::Tokenizer;

static TOKENIZER: OnceLock<Result<Tokenizer, String>> = OnceLock::new();

/// The embedding provider's tokenizer, loaded once per process. Used for
/// every token-count decision the chunkers make (window sizing, oversize
/// detection) so counts line up with what `EmbeddingProvider` actually bills.
pub(crate) fn get_tokenizer() -> Result<&'static Tokenizer, AppError> {
    TOKENIZER
        .get_or_init(|| {
            Tokenizer::from_pretrained("bert-base-cased", None).map_err(|err| err.to_string())
        })
        .as_ref()
        .map_err(|err| AppError::Internal(format!("failed to initialize tokenizer: {err}")))
}

/// Counts tokens in `text`. Falls back to a whitespace-split estimate if the
/// tokenizer failed to load (e.g. no network access in an offline test run).
pub fn count_tokens(text: &str) -> u32 {
    match get_tokenizer() {
        Ok(tokenizer) => tokenizer
            .encode(text, false)
            .map(|encoding| encoding.len() as u32)
            .unwrap_or_else(|_| fallback_count(text)),
        Err(_) => fallback_count(text),
    }
}

fn fallback_count(text: &str) -> u32 {
    text.split_whitespace().count() as u32
}
