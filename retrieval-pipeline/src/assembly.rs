use knowledge_graph::store::{Candidate, CandidateKind};

/// §4.7 step 3's token budget: retrieved context injected ahead of the user
/// turn is capped so it never crowds out the conversation itself.
pub const TOKEN_BUDGET: usize = 2_000;

const AVG_CHARS_PER_TOKEN: usize = 4;

fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(AVG_CHARS_PER_TOKEN).max(1)
}

/// One formatted citation backing a line of assembled context.
#[derive(Debug, Clone)]
pub struct Citation {
    pub candidate_id: String,
    pub source: String,
    pub channel: Option<String>,
}

/// The formatted, citation-bearing block handed to the agent orchestrator as
/// a system message ahead of the user's turn.
#[derive(Debug, Clone)]
pub struct AssembledContext {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl AssembledContext {
    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

fn source_label(candidate: &Candidate) -> String {
    let reference = candidate.source_refs.first().cloned().unwrap_or_default();
    match (&candidate.channel, candidate.kind) {
        (Some(channel), _) => format!("{reference} | channel={channel}"),
        (None, CandidateKind::Entity) => format!("{reference} | entity"),
        (None, CandidateKind::Episode) => reference,
    }
}

/// Formats already-reranked candidates as `«snippet» [source: …]` lines,
/// keeping the caller's rank order and stopping once `token_budget` would be
/// exceeded. Lower-rank items are dropped before any item is truncated,
/// except the very first, which is truncated in place if it alone overflows
/// the budget (so assembly never returns an empty context when candidates
/// exist).
pub fn assemble(ranked: &[Candidate], token_budget: usize) -> AssembledContext {
    let mut lines = Vec::new();
    let mut citations = Vec::new();
    let mut used_tokens = 0usize;

    for candidate in ranked {
        let source = source_label(candidate);
        let line = format!("«{}» [source: {source}]", candidate.text);
        let line_tokens = estimate_tokens(&line);

        if used_tokens.saturating_add(line_tokens) > token_budget {
            if lines.is_empty() {
                let max_chars = token_budget.saturating_mul(AVG_CHARS_PER_TOKEN);
                let snippet: String = candidate.text.chars().take(max_chars).collect();
                lines.push(format!("«{snippet}…» [source: {source}]"));
                citations.push(Citation {
                    candidate_id: candidate.id.clone(),
                    source,
                    channel: candidate.channel.clone(),
                });
            }
            break;
        }

        lines.push(line);
        citations.push(Citation {
            candidate_id: candidate.id.clone(),
            source,
            channel: candidate.channel.clone(),
        });
        used_tokens += line_tokens;
    }

    AssembledContext {
        text: lines.join("\n\n"),
        citations,
    }
}
