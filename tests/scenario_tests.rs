//! End-to-end scenarios for the duplicate pipeline.

use dupetree::duplicates::{DuplicateFinder, FinderConfig};
use dupetree::events::MemorySink;
use dupetree::scanner::HasherConfig;
use dupetree::stats::{HashStage, StageStatistics};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

const KIB: u64 = 1024;

fn finder_with(hasher: HasherConfig) -> (DuplicateFinder, Arc<StageStatistics>) {
    let stats = Arc::new(StageStatistics::new());
    let config = FinderConfig::default()
        .with_hasher_config(hasher)
        .with_event_sink(Arc::new(MemorySink::new()))
        .with_stats_collector(stats.clone());
    (DuplicateFinder::new(config), stats)
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap()
}

#[test]
fn test_identical_content_grouped_same_length_other_content_absent() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    fs::create_dir(root.join("one")).unwrap();
    fs::create_dir(root.join("two")).unwrap();
    fs::write(root.join("one/a.txt"), b"helloworld").unwrap();
    fs::write(root.join("two/b.txt"), b"helloworld").unwrap();
    fs::write(root.join("c.txt"), b"goodbye!!!").unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, summary) = finder.find_duplicates(&[root.clone()]).unwrap();

    // one/ and two/ hold nothing but the duplicate, so they are the units.
    assert_eq!(map.len(), 1);
    let (key, paths) = map.iter().next().unwrap();
    assert!(key.starts_with("dir:"));
    assert_eq!(paths, &vec![root.join("one"), root.join("two")]);
    assert!(map.values().flatten().all(|p| !p.ends_with("c.txt")));
    assert_eq!(summary.candidates, 3);
}

#[test]
fn test_identical_content_as_loose_files() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    fs::write(root.join("a.txt"), b"helloworld").unwrap();
    fs::write(root.join("b.txt"), b"helloworld").unwrap();
    fs::write(root.join("c.txt"), b"goodbye!!!").unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, _) = finder.find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    let (key, paths) = map.iter().next().unwrap();
    assert!(key.starts_with("file:10-"));
    assert_eq!(paths, &vec![root.join("a.txt"), root.join("b.txt")]);
}

#[test]
fn test_last_byte_difference_rejected_by_full_pass() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    let base = vec![7u8; 1024];
    let mut other = base.clone();
    other[1023] = 8;
    fs::write(root.join("a.bin"), &base).unwrap();
    fs::write(root.join("b.bin"), &other).unwrap();
    fs::write(root.join("keep"), b"x").unwrap();

    // A 512-byte prefix for every file so the difference survives both prefix passes.
    let hasher = HasherConfig::default().with_tiers(0, 512, 1 << 20, 512);
    let (finder, stats) = finder_with(hasher);
    let (map, summary) = finder.find_duplicates(&[root]).unwrap();

    assert!(map.is_empty());
    assert_eq!(stats.bytes_read(HashStage::PrefixChecksum), 1024);
    assert_eq!(stats.bytes_read(HashStage::PrefixDigest), 1024);
    assert_eq!(stats.bytes_read(HashStage::FullChecksum), 2048);
    let full = summary
        .hash_stages
        .iter()
        .find(|s| s.stage == HashStage::FullChecksum)
        .unwrap();
    assert_eq!(full.eliminated, 2);
}

#[test]
fn test_directories_with_equal_files_are_units() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    fs::create_dir(root.join("d1")).unwrap();
    fs::create_dir(root.join("d2")).unwrap();
    fs::write(root.join("d1/x"), b"abc").unwrap();
    fs::write(root.join("d2/x2"), b"abc").unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, summary) = finder.find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    let paths = map.values().next().unwrap();
    assert_eq!(paths, &vec![root.join("d1"), root.join("d2")]);
    assert!(map.keys().all(|k| k.starts_with("dir:")));
    assert_eq!(summary.duplicate_directories, 2);
    assert_eq!(summary.duplicate_files, 0);
    assert_eq!(summary.duplicate_directory_bytes, 6);
}

#[test]
fn test_large_pair_differing_after_prefix_and_pair_differing_inside_prefix() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    let size = 256 * KIB as usize;
    let prefix = 16 * KIB;

    // Same prefix, different tail: only the full pass can tell them apart.
    let mut tail_a = vec![1u8; size];
    let mut tail_b = vec![1u8; size];
    tail_a[size - 1] = 2;
    tail_b[size - 1] = 3;
    fs::write(root.join("tail_a"), &tail_a).unwrap();
    fs::write(root.join("tail_b"), &tail_b).unwrap();

    // Different first byte: eliminated by the first prefix pass.
    let mut head_a = vec![5u8; size];
    let mut head_b = vec![5u8; size];
    head_a[0] = 0;
    head_b[0] = 1;
    fs::write(root.join("head_a"), &head_a).unwrap();
    fs::write(root.join("head_b"), &head_b).unwrap();

    let hasher = HasherConfig::default().with_tiers(KIB, KIB, 64 * KIB, prefix);
    let (finder, stats) = finder_with(hasher);
    let (map, _) = finder.find_duplicates(&[root]).unwrap();

    assert!(map.is_empty());
    assert_eq!(stats.bytes_read(HashStage::PrefixChecksum), 4 * prefix);
    assert_eq!(stats.bytes_read(HashStage::PrefixDigest), 2 * prefix);
    assert_eq!(stats.bytes_read(HashStage::FullChecksum), 2 * size as u64);
    assert_eq!(stats.totals_for(HashStage::FullChecksum).files, 2);
}

#[test]
fn test_empty_directories_are_never_duplicates() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    fs::create_dir(root.join("empty1")).unwrap();
    fs::create_dir(root.join("empty2")).unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, summary) = finder.find_duplicates(&[root]).unwrap();

    assert!(map.is_empty());
    assert_eq!(summary.duplicate_directories, 0);
}

#[test]
fn test_empty_subdirectory_breaks_parent_unit() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    fs::create_dir_all(root.join("a/empty")).unwrap();
    fs::create_dir(root.join("b")).unwrap();
    fs::write(root.join("a/f"), b"same").unwrap();
    fs::write(root.join("b/f"), b"same").unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, _) = finder.find_duplicates(&[root.clone()]).unwrap();

    // a/ is not a unit because of its empty child, and b/ alone has no
    // partner, so the two files are reported together.
    assert_eq!(map.len(), 1);
    let (key, paths) = map.iter().next().unwrap();
    assert!(key.starts_with("file:4-"));
    assert_eq!(paths, &vec![root.join("a/f"), root.join("b/f")]);
}

#[test]
fn test_directory_without_partner_reports_its_files() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    fs::create_dir(root.join("backup")).unwrap();
    fs::create_dir(root.join("work")).unwrap();
    fs::write(root.join("backup/report.pdf"), b"%PDF quarterly numbers").unwrap();
    fs::write(root.join("work/report.pdf"), b"%PDF quarterly numbers").unwrap();
    fs::write(root.join("work/notes.txt"), b"draft notes").unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, summary) = finder.find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    let (key, paths) = map.iter().next().unwrap();
    assert!(key.starts_with("file:"));
    assert_eq!(
        paths,
        &vec![root.join("backup/report.pdf"), root.join("work/report.pdf")]
    );
    assert_eq!(summary.duplicate_directories, 0);
    assert_eq!(summary.duplicate_files, 2);
}

#[test]
fn test_third_loose_copy_expands_matching_directories() {
    let dir = TempDir::new().unwrap();
    let root = canonical(dir.path());
    for name in ["d1", "d2"] {
        fs::create_dir(root.join(name)).unwrap();
        fs::write(root.join(name).join("song"), b"same audio").unwrap();
    }
    fs::write(root.join("song copy"), b"same audio").unwrap();

    let (finder, _) = finder_with(HasherConfig::default());
    let (map, _) = finder.find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(
        map.values().next().unwrap(),
        &vec![root.join("d1/song"), root.join("d2/song"), root.join("song copy")]
    );
}
