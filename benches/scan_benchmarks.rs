use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use dupesift::duplicates::{
    DetectorConfig, DuplicateDetector, HammingBucketMatcher, ImageMatchStrategy, NameMetric,
    NameSimilarityGrouper,
};
use dupesift::scanner::{ContentHasher, FileRecord, PerceptualHash};
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tempfile::TempDir;

const STEMS: [&str; 6] = ["IMG_", "holiday_", "scan_", "report_v", "track", "invoice-"];

fn virtual_records(count: usize) -> Vec<FileRecord> {
    (0..count)
        .map(|i| {
            let name = format!("{}{:04}.jpg", STEMS[i % STEMS.len()], i / 7);
            FileRecord::new(PathBuf::from("/bench").join(name), 200_000, SystemTime::UNIX_EPOCH)
        })
        .collect()
}

// Deterministic pseudo-random 64-bit hashes
fn hashes(count: usize) -> Vec<(usize, PerceptualHash)> {
    let mut state = 0x9E37_79B9_7F4A_7C15u64;
    (0..count)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (i, PerceptualHash::from_u64(state))
        })
        .collect()
}

// 1. Filename grouping
fn bench_names(c: &mut Criterion) {
    let mut group = c.benchmark_group("names");
    let records = virtual_records(2_000);

    for metric in [NameMetric::Lcs, NameMetric::Levenshtein, NameMetric::JaroWinkler] {
        let grouper = NameSimilarityGrouper::new(0.7, metric);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{metric:?}")), &records, |b, r| {
            b.iter(|| black_box(grouper.group(r)))
        });
    }
    group.finish();
}

// 2. Hamming matching
fn bench_hamming(c: &mut Criterion) {
    let mut group = c.benchmark_group("hamming");
    let input = hashes(10_000);

    for strategy in [ImageMatchStrategy::PrefixBucket, ImageMatchStrategy::BkTree] {
        let matcher = HammingBucketMatcher::new(8, strategy);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{strategy:?}")), &input, |b, h| {
            b.iter(|| black_box(matcher.group(h)))
        });
    }
    group.finish();
}

// 3. Prefix content hashing
fn bench_content_hasher(c: &mut Criterion) {
    let mut group = c.benchmark_group("content_hasher");
    let dir = TempDir::new().unwrap();

    for size_kb in [1usize, 64, 1024] {
        let path = dir.path().join(format!("file_{size_kb}.bin"));
        fs::write(&path, vec![0xA5u8; size_kb * 1024]).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(format!("{size_kb}KB")), &path, |b, p| {
            b.iter(|| {
                // fresh hasher so the memo does not short-circuit
                let hasher = ContentHasher::default();
                black_box(hasher.hash_path(p).unwrap())
            })
        });
    }
    group.finish();
}

// 4. Full detection over seeded records
fn bench_detect(c: &mut Criterion) {
    let detector = DuplicateDetector::new(DetectorConfig::default()).unwrap();
    let seeds = hashes(1_000);

    c.bench_function("detect_1000_seeded", |b| {
        b.iter(|| {
            let records: Vec<FileRecord> = virtual_records(1_000)
                .into_iter()
                .zip(&seeds)
                .map(|(r, (i, h))| r.with_content_hash((i % 300) as u64).with_perceptual_hash(h.clone()))
                .collect();
            black_box(detector.detect(&records).unwrap())
        })
    });
}

criterion_group!(benches, bench_names, bench_hamming, bench_content_hasher, bench_detect);
criterion_main!(benches);
