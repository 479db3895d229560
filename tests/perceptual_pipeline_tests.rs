use std::fs;
use std::path::Path;

use dupesift::duplicates::{DetectionMethod, DetectorConfig, DuplicateDetector, ImageMatchStrategy};
use dupesift::scanner::{FileRecord, PerceptualHasher};
use image::{Rgb, RgbImage};
use tempfile::tempdir;

fn horizontal_gradient(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |x, _| {
        let v = (x * 255 / (size - 1)) as u8;
        Rgb([v, v, v])
    })
}

fn vertical_gradient(size: u32) -> RgbImage {
    RgbImage::from_fn(size, size, |_, y| {
        let v = (y * 255 / (size - 1)) as u8;
        Rgb([v, v / 2, 255 - v / 3])
    })
}

fn records(dir: &Path, names: &[&str]) -> Vec<FileRecord> {
    names
        .iter()
        .map(|n| FileRecord::from_path(dir.join(n)).unwrap())
        .collect()
}

#[test]
fn test_gradient_hashes() {
    let hasher = PerceptualHasher::default();
    let horizontal = hasher.hash_image(&horizontal_gradient(64).into());
    assert_eq!(horizontal.to_hex(), "0f0f0f0f0f0f0f0f");

    let vertical = hasher.hash_image(&vertical_gradient(64).into());
    assert_eq!(vertical.to_hex(), "00000000ffffffff");
    assert_eq!(horizontal.distance(&vertical), 32);
}

#[test]
fn test_mixed_batch() {
    let dir = tempdir().unwrap();
    horizontal_gradient(64).save(dir.path().join("horizon.png")).unwrap();
    horizontal_gradient(40).save(dir.path().join("thumb.png")).unwrap();
    vertical_gradient(64).save(dir.path().join("stripes.png")).unwrap();
    fs::copy(dir.path().join("stripes.png"), dir.path().join("stripes_dup.png")).unwrap();
    fs::write(dir.path().join("broken.png"), b"definitely not a png").unwrap();
    fs::write(dir.path().join("readme.txt"), b"plain text").unwrap();

    let batch = records(
        dir.path(),
        &["horizon.png", "thumb.png", "stripes.png", "stripes_dup.png", "broken.png", "readme.txt"],
    );
    let detector = DuplicateDetector::new(DetectorConfig::default().with_workers(2)).unwrap();
    let report = detector.detect(&batch).unwrap();

    assert!(report.warnings.is_empty());
    assert_eq!(report.groups.len(), 2);

    let exact = &report.groups[0];
    assert_eq!(exact.method, DetectionMethod::Exact);
    assert_eq!(
        exact.paths(),
        vec![dir.path().join("stripes.png"), dir.path().join("stripes_dup.png")]
    );

    let visual = &report.groups[1];
    assert_eq!(visual.method, DetectionMethod::PerceptualImage);
    assert_eq!(
        visual.paths(),
        vec![dir.path().join("horizon.png"), dir.path().join("thumb.png")]
    );
    assert!(visual.confidence > 0.85);

    let stats = &report.stats;
    assert_eq!(stats.images_considered, 5);
    assert_eq!(stats.images_hashed, 4);
    assert_eq!(stats.images_skipped, 1);
    assert_eq!(stats.content_skipped, 0);
    // an undecodable image is not a partial result
    assert!(!report.is_partial());

    assert!(batch[4].perceptual_hash().is_none());
    assert!(batch[5].perceptual_hash().is_none());
    assert!(batch[0].perceptual_hash().is_some());
}

#[test]
fn test_bk_tree_strategy_matches_default_here() {
    let dir = tempdir().unwrap();
    horizontal_gradient(64).save(dir.path().join("a_large.png")).unwrap();
    horizontal_gradient(32).save(dir.path().join("z_small.png")).unwrap();

    let batch = records(dir.path(), &["a_large.png", "z_small.png"]);
    let config = DetectorConfig::default()
        .with_workers(1)
        .with_image_matching(ImageMatchStrategy::BkTree);
    let report = DuplicateDetector::new(config).unwrap().detect(&batch).unwrap();

    assert_eq!(report.groups.len(), 1);
    assert_eq!(report.groups[0].method, DetectionMethod::PerceptualImage);
}

#[test]
fn test_larger_grid() {
    let dir = tempdir().unwrap();
    horizontal_gradient(64).save(dir.path().join("wide.png")).unwrap();
    horizontal_gradient(48).save(dir.path().join("narrow.png")).unwrap();

    let batch = records(dir.path(), &["wide.png", "narrow.png"]);
    let config = DetectorConfig::default()
        .with_workers(1)
        .with_grid_size(16)
        .with_hamming_threshold(20);
    let report = DuplicateDetector::new(config).unwrap().detect(&batch).unwrap();

    assert_eq!(batch[0].perceptual_hash().unwrap().bit_len(), 256);
    assert_eq!(report.groups.len(), 1);
}
