pub mod analyze_document;
pub mod common;
pub mod graphiti_ingest;
pub mod index_episode;
pub mod parse_document;

use std::sync::Arc;

use job_queue::WorkerRuntime;

pub use common::IngestionDeps;

use analyze_document::AnalyzeDocumentHandler;
use graphiti_ingest::GraphitiIngestHandler;
use index_episode::IndexEpisodeHandler;
use parse_document::ParseDocumentHandler;

/// Registers every C8 ingestion stage handler on `runtime`, each with its own
/// per-handler concurrency cap so LLM-bound stages (analysis, graph ingest)
/// don't starve the cheaper parsing stage.
pub fn register_handlers(runtime: &mut WorkerRuntime, deps: IngestionDeps) {
    runtime.register(
        "parse_document",
        Arc::new(ParseDocumentHandler { deps: deps.clone() }),
        8,
    );
    runtime.register(
        "graphiti_ingest",
        Arc::new(GraphitiIngestHandler { deps: deps.clone() }),
        4,
    );
    runtime.register(
        "analyze_document",
        Arc::new(AnalyzeDocumentHandler { deps: deps.clone() }),
        4,
    );
    runtime.register("index_episode", Arc::new(IndexEpisodeHandler { deps }), 4);
}
