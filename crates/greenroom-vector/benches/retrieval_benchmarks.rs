//! Benchmarks for the retrieval hot paths.
//!
//! Covers the two operations on the per-turn critical path: splitting a
//! document into chunks at ingestion time, and running a session-filtered
//! search with diversity re-ranking against a populated index.

use std::time::Duration;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, Criterion};
use uuid::Uuid;

use greenroom_core::types::ChunkPayload;
use greenroom_vector::embedding::{EmbeddingService, MockEmbedding};
use greenroom_vector::index::{ChunkPoint, MemoryIndex, SearchQuery, VectorStore};
use greenroom_vector::splitter::ChunkSplitter;

const SESSION_COUNT: usize = 20;
const CHUNKS_PER_SESSION: usize = 50;

/// Realistic chunk-sized text, made unique per index so MockEmbedding
/// produces distinct vectors.
fn generate_chunk_text(index: usize) -> String {
    format!(
        "Led the migration of a monolithic billing service to an event-driven \
         architecture processing forty thousand transactions per minute. \
         Mentored four junior engineers through their first production \
         on-call rotations and built the team's incident review process. \
         Reduced p99 API latency from nine hundred milliseconds to one \
         hundred and twenty by introducing a read-through cache layer and \
         rewriting the three hottest queries. Experience item: {}",
        index
    )
}

/// Build an index holding `SESSION_COUNT` sessions of `CHUNKS_PER_SESSION`
/// chunks each, plus the embedder for query generation.
fn build_populated_index() -> (MemoryIndex, MockEmbedding) {
    let index = MemoryIndex::new();
    let embedder = MockEmbedding::new(384);

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    rt.block_on(index.ensure_collection("chunks", 384))
        .expect("ensure_collection failed");

    for session in 0..SESSION_COUNT {
        let session_id = format!("session-{}", session);
        let texts: Vec<String> = (0..CHUNKS_PER_SESSION)
            .map(|i| generate_chunk_text(session * CHUNKS_PER_SESSION + i))
            .collect();
        let vectors = rt
            .block_on(embedder.embed_batch(&texts))
            .expect("embed failed");

        let now = Utc::now();
        let points: Vec<ChunkPoint> = texts
            .into_iter()
            .zip(vectors)
            .enumerate()
            .map(|(seq, (text, vector))| ChunkPoint {
                id: Uuid::new_v4(),
                vector,
                payload: ChunkPayload::new(text, &session_id, seq, now),
            })
            .collect();
        rt.block_on(index.upsert("chunks", points))
            .expect("upsert failed");
    }

    (index, embedder)
}

/// Benchmark document splitting at the default chunk configuration.
fn bench_splitter(c: &mut Criterion) {
    let splitter = ChunkSplitter::new(500, 100);
    let document: String = (0..100)
        .map(generate_chunk_text)
        .collect::<Vec<_>>()
        .join("\n\n");

    let mut group = c.benchmark_group("splitter");
    group.bench_function(format!("split_{}_chars", document.len()), |b| {
        b.iter(|| {
            let chunks = splitter.split(&document);
            assert!(!chunks.is_empty(), "Splitter should produce chunks");
            chunks
        });
    });
    group.finish();
}

/// Benchmark session-filtered search with MMR re-ranking.
fn bench_filtered_search(c: &mut Criterion) {
    let (index, embedder) = build_populated_index();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build tokio runtime");

    let query_vec = rt
        .block_on(embedder.embed_batch(&["tell me about the billing migration".to_string()]))
        .expect("query embed failed")
        .remove(0);

    let mut group = c.benchmark_group("filtered_search");
    group.sample_size(100);
    group.measurement_time(Duration::from_secs(10));

    group.bench_function(
        format!("mmr_top4_{}x{}_chunks", SESSION_COUNT, CHUNKS_PER_SESSION),
        |b| {
            b.iter(|| {
                let hits = rt
                    .block_on(index.search(
                        "chunks",
                        SearchQuery {
                            vector: query_vec.clone(),
                            session_id: "session-7".to_string(),
                            k: 4,
                            fetch_k: 40,
                            diversity_weight: 0.5,
                        },
                    ))
                    .expect("search failed");
                assert!(!hits.is_empty(), "Search should return results");
                hits
            });
        },
    );

    group.finish();
}

criterion_group!(benches, bench_splitter, bench_filtered_search);
criterion_main!(benches);
