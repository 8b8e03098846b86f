use dupetree::duplicates::{SizeBuckets, StagedHasher};
use dupetree::events::{EventLevel, MemorySink};
use dupetree::scanner::{ContentHasher, HashError, HasherConfig};
use dupetree::stats::{HashStage, StageStatistics};
use dupetree::tree::{DuplicateIndex, TreeBuilder, TreeError};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

#[test]
fn test_missing_files_are_skipped_and_reported() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    let b = dir.path().join("b");
    fs::write(&a, b"0123456789").unwrap();
    fs::write(&b, b"0123456789").unwrap();
    let gone = dir.path().join("gone");

    let sink = Arc::new(MemorySink::new());
    let stats = Arc::new(StageStatistics::new());
    let hasher = StagedHasher::new(HasherConfig::default())
        .with_event_sink(sink.clone())
        .with_stats_collector(stats.clone());

    let buckets = SizeBuckets::from([(10, vec![a.clone(), b.clone(), gone])]);
    let (groups, refine) = hasher.refine(buckets);

    assert_eq!(groups.len(), 1);
    assert_eq!(groups.values().next().unwrap(), &vec![a, b]);
    assert_eq!(refine.failed_files(), 1);
    assert_eq!(sink.count(EventLevel::Error), 1);
    assert_eq!(stats.totals_for(HashStage::PrefixChecksum).failures, 1);
    assert!(!refine.interrupted);
}

#[test]
fn test_group_collapses_when_members_disappear() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a");
    fs::write(&a, b"lonely").unwrap();

    let sink = Arc::new(MemorySink::new());
    let hasher = StagedHasher::new(HasherConfig::default()).with_event_sink(sink.clone());
    let buckets = SizeBuckets::from([(6, vec![a, dir.path().join("vanished")])]);
    let (groups, refine) = hasher.refine(buckets);

    assert!(groups.is_empty());
    assert_eq!(refine.stages.len(), 1);
    assert_eq!(sink.count(EventLevel::Error), 1);
}

#[test]
fn test_hash_error_kinds() {
    let hasher = ContentHasher::new(HasherConfig::default());
    let missing = PathBuf::from("/nonexistent/dupetree/file");
    let err = hasher
        .hash_stage(&missing, 10, HashStage::FullChecksum)
        .unwrap_err();
    assert!(matches!(err, HashError::NotFound(_)));
}

#[test]
fn test_tree_builder_rejects_bad_root() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("f");
    fs::write(&file, b"x").unwrap();

    let builder = TreeBuilder::new(
        DuplicateIndex::default(),
        Vec::new(),
        Vec::new(),
        Arc::new(MemorySink::new()),
    );
    assert!(matches!(builder.build(&file), Err(TreeError::NotADirectory(_))));
    assert!(matches!(
        builder.build(&dir.path().join("missing")),
        Err(TreeError::NotFound(_))
    ));
}
