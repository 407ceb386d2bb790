use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use bda_ai::embeddings;
use bda_ai::llm::LlmState;
use bda_ai::policy::{default_extractors, ingest_policy_dir, ChunkSplitter, VectorIndex};
use bda_ai::retrieve::Retriever;
use bda_ai::text::snippet;
use bda_core::config::Settings;

use super::open_index;

pub fn handle_ingest(settings: &Settings, policy_dir: &Path, clear: bool) -> Result<()> {
    let store_dir = settings.paths.vector_store_dir();
    let embedder = embeddings::from_settings(&settings.embeddings)?;
    let index = if clear {
        VectorIndex::open_empty(&store_dir, embedder)?
    } else {
        VectorIndex::open(&store_dir, embedder)?
    };
    let splitter = ChunkSplitter::new(settings.chunking.chunk_size, settings.chunking.chunk_overlap);

    let report = ingest_policy_dir(policy_dir, &splitter, &default_extractors(), &index)?;
    println!("Documents loaded: {}", report.documents_loaded);
    println!("Chunks added: {}", report.chunks_added);
    println!("Chunks in index: {}", index.count());
    if !report.skipped.is_empty() {
        println!("Skipped:");
        for s in &report.skipped {
            println!(" - {} [{}] {}", s.path, s.code, s.message);
        }
    }
    Ok(())
}

pub fn handle_status(settings: &Settings, query: Option<&str>) -> Result<()> {
    println!("Environment: {:?}", settings.environment);
    println!("Database: {}", settings.paths.db_path().display());
    println!("Audit file: {}", settings.paths.audit_log_path().display());
    println!(
        "Chunking: size={}, overlap={}",
        settings.chunking.chunk_size, settings.chunking.chunk_overlap
    );
    println!(
        "Retrieval: top_k={}, threshold={}, max_policy_chars={}",
        settings.retrieval.top_k,
        settings
            .retrieval
            .threshold()
            .map(|t| t.to_string())
            .unwrap_or_else(|| "none".to_string()),
        settings.retrieval.max_policy_chars
    );
    match LlmState::from_settings(&settings.llm) {
        LlmState::Available(m) => println!("Model: {} (available)", m.model_name()),
        LlmState::Unavailable(e) => {
            println!("Model: unavailable [{}] {}; answers use the rule-based composer", e.code, e.message)
        }
    }

    let index = open_index(settings)?;
    let status = index.status();
    println!("Policy index: {}", settings.paths.vector_store_dir().display());
    println!(" - Embedder: {}", status.embedder);
    println!(" - Chunks: {}", status.chunk_count);
    if let Some(d) = status.dims {
        println!(" - Dims: {d}");
    }

    if let Some(q) = query {
        let retriever = Retriever::from_settings(Arc::clone(&index), &settings.retrieval);
        let hits = retriever.retrieve_hits(q)?;
        if hits.is_empty() {
            println!("No matching policy chunks.");
        }
        for (i, h) in hits.iter().enumerate() {
            println!("{}. score={:.3} {}", i + 1, h.score, snippet(&h.text, 160));
        }
    }
    Ok(())
}
