use core::hint::black_box;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use sparse_ingest::{
    EncoderFactory, EncodingConfig, ModelKey, Parallelism, Pipeline, Result, SparseEncoder,
    TokenWeights, VocabularyCache, VocabularyTable,
};
use std::sync::Arc;
use std::time::Instant;

// Documents encoded per benchmark iteration.
const TOTAL_DOCS: usize = 4096;
const VOCABULARY: usize = 2048;

/// Term-frequency encoder that burns a fixed amount of CPU per token, roughly
/// standing in for model inference.
struct SpinEncoder {
    rounds: u32,
}

impl SparseEncoder for SpinEncoder {
    fn encode(&mut self, texts: &[&str]) -> Result<Vec<TokenWeights>> {
        Ok(texts
            .iter()
            .map(|text| {
                text.split_whitespace()
                    .map(|token| {
                        let mut h = 0u64;
                        for round in 0..self.rounds {
                            for b in token.bytes() {
                                h = h.rotate_left(5) ^ u64::from(b) ^ u64::from(round);
                            }
                        }
                        black_box(h);
                        (token.to_string(), 1.0)
                    })
                    .collect()
            })
            .collect())
    }
}

struct SpinFactory {
    rounds: u32,
}

impl EncoderFactory for SpinFactory {
    type Encoder = SpinEncoder;

    fn model_key(&self) -> ModelKey {
        ModelKey::from("bench-spin")
    }

    fn vocabulary(&self) -> Result<VocabularyTable> {
        VocabularyTable::from_tokens((0..VOCABULARY).map(|i| format!("t{i}")))
    }

    fn build(&self) -> Result<SpinEncoder> {
        Ok(SpinEncoder {
            rounds: self.rounds,
        })
    }
}

fn corpus() -> Vec<String> {
    (0..TOTAL_DOCS)
        .map(|i| {
            (0..16)
                .map(|j| format!("t{}", (i * 31 + j * 7) % VOCABULARY))
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect()
}

fn bench_encode(c: &mut Criterion, group_name: &str, rounds: u32) {
    let cache = Arc::new(VocabularyCache::new());
    let docs = corpus();

    let mut group = c.benchmark_group(group_name);
    group.sample_size(10);
    group.throughput(Throughput::Elements(TOTAL_DOCS as u64));

    let sequential = EncodingConfig::default().with_parallelism(Parallelism::Never);
    let pipeline = Pipeline::new(SpinFactory { rounds }, sequential).with_cache(Arc::clone(&cache));
    group.bench_function(format!("elems/{TOTAL_DOCS}/sequential"), |b| {
        b.iter_custom(|iters| {
            let start = Instant::now();
            for _ in 0..iters {
                black_box(pipeline.encode(docs.iter().map(String::as_str)).unwrap());
            }
            start.elapsed()
        });
    });

    for workers in [1, 2, 4, 8] {
        let config = EncodingConfig::default()
            .with_parallelism(Parallelism::Always)
            .with_max_workers(workers);
        let pipeline = Pipeline::new(SpinFactory { rounds }, config).with_cache(Arc::clone(&cache));

        group.bench_function(format!("elems/{TOTAL_DOCS}/workers/{workers}"), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    black_box(pipeline.encode(docs.iter().map(String::as_str)).unwrap());
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

fn bench_streamed(c: &mut Criterion, group_name: &str, rounds: u32) {
    let cache = Arc::new(VocabularyCache::new());
    let docs = corpus();

    let mut group = c.benchmark_group(group_name);
    group.sample_size(10);
    group.throughput(Throughput::Elements(TOTAL_DOCS as u64));

    for batch_size in [64, 256, 1024] {
        let config = EncodingConfig::default()
            .with_parallelism(Parallelism::Always)
            .with_max_workers(4)
            .with_batch_size(batch_size);
        let pipeline = Pipeline::new(SpinFactory { rounds }, config).with_cache(Arc::clone(&cache));

        group.bench_function(format!("elems/{TOTAL_DOCS}/batch/{batch_size}"), |b| {
            b.iter_custom(|iters| {
                let start = Instant::now();
                for _ in 0..iters {
                    let stream = pipeline
                        .encode_streamed(docs.iter().map(String::as_str))
                        .unwrap();
                    for batch in stream {
                        black_box(batch.unwrap());
                    }
                }
                start.elapsed()
            });
        });
    }

    group.finish();
}

fn benchmark_encode_light(c: &mut Criterion) {
    bench_encode(c, "encode/light", 1);
}

fn benchmark_encode_heavy(c: &mut Criterion) {
    bench_encode(c, "encode/heavy", 256);
}

fn benchmark_streamed_heavy(c: &mut Criterion) {
    bench_streamed(c, "streamed/heavy", 256);
}

criterion_group!(
    benches,
    // Dispatch overhead dominates
    benchmark_encode_light,
    // Encoder work dominates
    benchmark_encode_heavy,
    benchmark_streamed_heavy,
);
criterion_main!(benches);
