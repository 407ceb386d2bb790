use std::sync::Arc;

use bda_ai::embeddings::{Embedder, HashingEmbedder};
use bda_ai::policy::VectorIndex;
use bda_ai::retrieve::Retriever;
use bda_core::error::AppError;
use pretty_assertions::assert_eq;

/// Two-dimensional vectors: counts of `a` and `b`. Inputs containing `boom` fail.
struct CountABEmbedder;

impl Embedder for CountABEmbedder {
    fn embed(&self, input: &str) -> Result<Vec<f32>, AppError> {
        if input.contains("boom") {
            return Err(AppError::new("GENERATION_OLLAMA_FAILED", "embedder offline"));
        }
        let a = input.chars().filter(|c| *c == 'a').count();
        let b = input.chars().filter(|c| *c == 'b').count();
        Ok(vec![a as f32, b as f32])
    }

    fn id(&self) -> String {
        "count-ab".to_string()
    }
}

fn ab_index() -> Arc<VectorIndex> {
    let index = Arc::new(VectorIndex::in_memory(Arc::new(CountABEmbedder)));
    index.add(&["a", "ab", "b", "aab", "c"]).expect("add");
    index
}

#[test]
fn ranks_by_similarity_with_insertion_order_ties() {
    let index = ab_index();
    let hits = index.similarity_search("aaaa", 3, None).expect("search");
    let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "aab", "ab"]);

    index.add(&["aa"]).expect("add");
    let hits = index.similarity_search("a", 2, None).expect("search");
    // "a" and "aa" both score 1.0; the earlier insert wins.
    assert_eq!(hits[0].text, "a");
    assert_eq!(hits[1].text, "aa");
}

#[test]
fn threshold_only_shrinks_results() {
    let index = ab_index();
    let mut last = usize::MAX;
    for t in [-1.0f32, 0.0, 0.5, 0.8, 0.95, 1.0] {
        let n = index.similarity_search("aaaa", 3, Some(t)).expect("search").len();
        assert!(n <= last, "threshold {t} returned {n} > {last}");
        assert!(n <= 3);
        last = n;
    }
    assert_eq!(index.similarity_search("aaaa", 3, Some(0.8)).expect("search").len(), 2);
}

#[test]
fn threshold_applies_after_top_k() {
    let index = ab_index();
    // "ab" clears 0.5 but sits outside the top 2, so it is not returned.
    let hits = index.similarity_search("aaaa", 2, Some(0.5)).expect("search");
    let texts: Vec<&str> = hits.iter().map(|h| h.text.as_str()).collect();
    assert_eq!(texts, vec!["a", "aab"]);
}

#[test]
fn empty_index_answers_without_embedding() {
    let index = Arc::new(VectorIndex::in_memory(Arc::new(CountABEmbedder)));
    assert_eq!(index.count(), 0);
    assert!(index.is_empty());
    let retriever = Retriever::new(index, 3, Some(0.5));
    for q in ["", "   ", "boom", "anything at all"] {
        assert!(retriever.retrieve(q).expect("empty").is_empty());
    }
}

#[test]
fn failures_are_distinct_from_no_results() {
    let index = ab_index();
    let err = index.similarity_search("boom", 3, None).expect_err("embed fails");
    assert_eq!(err.code, "EMBEDDINGS_FAILED");

    let err = index.similarity_search("ccc", 3, None).expect_err("zero vector");
    assert_eq!(err.code, "RETRIEVAL_FAILED");

    let err = index.similarity_search("  ", 3, None).expect_err("blank");
    assert_eq!(err.code, "RETRIEVAL_QUERY_EMPTY");

    // Nothing above the threshold is an empty success.
    assert!(index.similarity_search("bbbb", 1, Some(1.1)).expect("search").is_empty());
}

#[test]
fn failed_add_leaves_index_unchanged() {
    let index = ab_index();
    let err = index.add(&["aa", "boom"]).expect_err("fails");
    assert_eq!(err.code, "EMBEDDINGS_FAILED");
    assert_eq!(index.count(), 5);
}

#[test]
fn persisted_index_reopens_with_same_entries() {
    let dir = tempfile::tempdir().expect("tempdir");
    let embedder = Arc::new(HashingEmbedder::new(64));
    {
        let index = VectorIndex::open(dir.path(), embedder.clone()).expect("open");
        assert!(index.is_empty());
        index
            .add(&["Refunds require approval.", "Travel is booked early."])
            .expect("add");
    }

    let reopened = VectorIndex::open(dir.path(), embedder.clone()).expect("reopen");
    assert_eq!(reopened.count(), 2);
    let status = reopened.status();
    assert_eq!(status.dims, Some(64));
    assert_eq!(status.embedder, "hashing:64");
    assert!(status.persisted);
    let hits = reopened.similarity_search("refunds approval", 1, None).expect("search");
    assert_eq!(hits[0].text, "Refunds require approval.");

    let err = VectorIndex::open(dir.path(), Arc::new(HashingEmbedder::new(32)))
        .err()
        .expect("mismatch");
    assert_eq!(err.code, "INDEX_EMBEDDER_MISMATCH");

    let cleared = VectorIndex::open_empty(dir.path(), Arc::new(HashingEmbedder::new(32)))
        .expect("open_empty");
    assert!(cleared.is_empty());
    assert!(VectorIndex::open(dir.path(), Arc::new(HashingEmbedder::new(32)))
        .expect("reopen")
        .is_empty());
}

#[test]
fn duplicate_text_gets_distinct_ids() {
    let index = VectorIndex::in_memory(Arc::new(HashingEmbedder::new(16)));
    index.add(&["same", "same"]).expect("add");
    let hits = index.similarity_search("same", 5, None).expect("search");
    assert_eq!(hits.len(), 2);
    assert_ne!(hits[0].chunk_id, hits[1].chunk_id);
}

#[test]
fn concurrent_searches_during_adds_see_whole_batches() {
    let index = Arc::new(VectorIndex::in_memory(Arc::new(CountABEmbedder)));
    index.add(&["a"]).expect("seed");

    std::thread::scope(|s| {
        for _ in 0..4 {
            let index = index.clone();
            s.spawn(move || {
                for _ in 0..25 {
                    index.add(&["ab", "aab"]).expect("add");
                }
            });
        }
        for _ in 0..4 {
            let index = index.clone();
            s.spawn(move || {
                for _ in 0..50 {
                    let n = index.count();
                    // Batches of two on top of the seed.
                    assert_eq!(n % 2, 1);
                    assert!(!index.similarity_search("a", 3, None).expect("search").is_empty());
                }
            });
        }
    });

    assert_eq!(index.count(), 1 + 4 * 25 * 2);
}
