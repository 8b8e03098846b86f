use dupetree::duplicates::{DuplicateFinder, FinderConfig, FinderError};
use dupetree::events::{EventLevel, MemorySink};
use dupetree::scanner::WalkerConfig;
use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

fn finder() -> DuplicateFinder {
    DuplicateFinder::new(FinderConfig::default().with_event_sink(Arc::new(MemorySink::new())))
}

fn write(path: PathBuf, content: &[u8]) {
    File::create(path).unwrap().write_all(content).unwrap();
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let (map, summary) = finder().find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert!(map.is_empty());
    assert_eq!(summary.total_files, 0);
    assert_eq!(summary.steps.len(), 4);
}

#[test]
fn test_scan_unique_files() {
    let dir = tempdir().unwrap();
    write(dir.path().join("a.txt"), b"content a");
    write(dir.path().join("b.txt"), b"content b");
    write(dir.path().join("c.txt"), b"content c");

    let (map, summary) = finder().find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert!(map.is_empty());
    assert_eq!(summary.total_files, 3);
    assert_eq!(summary.candidates, 3);
    assert_eq!(summary.eliminated_by_hashing(), 3);
}

#[test]
fn test_scan_nested_duplicate_directory_reported_once() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    for side in ["left", "right"] {
        fs::create_dir_all(root.join(side).join("album/disc1")).unwrap();
        write(root.join(side).join("album/cover.jpg"), b"jpeg bytes");
        write(root.join(side).join("album/disc1/track01"), b"track one audio");
    }
    write(root.join("left/notes.txt"), b"only on the left");
    write(root.join("right/other.txt"), b"only on the right!");

    let (map, summary) = finder().find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    let (key, paths) = map.iter().next().unwrap();
    assert!(key.starts_with("dir:"));
    assert_eq!(paths, &vec![root.join("left/album"), root.join("right/album")]);
    assert_eq!(summary.duplicate_directories, 2);
    assert_eq!(summary.duplicate_files, 0);
}

#[test]
fn test_directory_key_ignores_names() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir(root.join("a")).unwrap();
    fs::create_dir(root.join("b")).unwrap();
    write(root.join("a/one"), b"111");
    write(root.join("a/two"), b"2222");
    write(root.join("b/uno"), b"111");
    write(root.join("b/dos"), b"2222");
    write(root.join("stray"), b"unique stray file");

    let (map, _) = finder().find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(map.values().next().unwrap(), &vec![root.join("a"), root.join("b")]);
}

#[test]
fn test_directories_with_different_content_are_not_grouped() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    for name in ["a", "b", "c", "d"] {
        fs::create_dir(root.join(name)).unwrap();
    }
    write(root.join("a/f"), b"xxx");
    write(root.join("c/f"), b"xxx");
    write(root.join("b/f"), b"yyy");
    write(root.join("d/f"), b"yyy");

    let (map, _) = finder().find_duplicates(&[root.clone()]).unwrap();

    // Same total size, different content: two separate units.
    assert_eq!(map.len(), 2);
    let groups: Vec<&Vec<PathBuf>> = map.values().collect();
    assert!(groups.contains(&&vec![root.join("a"), root.join("c")]));
    assert!(groups.contains(&&vec![root.join("b"), root.join("d")]));
}

#[test]
fn test_metadata_artifacts_do_not_break_directory_units() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir(root.join("a")).unwrap();
    fs::create_dir(root.join("b")).unwrap();
    write(root.join("a/photo"), b"pixels");
    write(root.join("b/photo"), b"pixels");
    write(root.join("a/.DS_Store"), b"finder metadata");
    write(root.join("unique"), b"something else entirely");

    let (map, _) = finder().find_duplicates(&[root.clone()]).unwrap();

    assert_eq!(map.values().next().unwrap(), &vec![root.join("a"), root.join("b")]);
}

#[test]
fn test_ignore_patterns_exclude_files() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    write(root.join("a.tmp"), b"same");
    write(root.join("b.tmp"), b"same");
    write(root.join("c.txt"), b"else");

    let config = FinderConfig::default()
        .with_event_sink(Arc::new(MemorySink::new()))
        .with_walker_config(WalkerConfig::default().with_ignore_patterns(vec!["*.tmp".into()]));
    let (map, summary) = DuplicateFinder::new(config)
        .find_duplicates(&[root])
        .unwrap();

    assert!(map.is_empty());
    assert_eq!(summary.total_files, 1);
}

#[test]
fn test_ignore_patterns_do_not_break_directory_units() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    fs::create_dir(root.join("a")).unwrap();
    fs::create_dir(root.join("b")).unwrap();
    write(root.join("a/doc"), b"shared document");
    write(root.join("b/doc"), b"shared document");
    write(root.join("a/~lock.tmp"), b"editor lock");

    let config = FinderConfig::default()
        .with_event_sink(Arc::new(MemorySink::new()))
        .with_walker_config(WalkerConfig::default().with_ignore_patterns(vec!["*.tmp".into()]));
    let (map, _) = DuplicateFinder::new(config)
        .find_duplicates(&[root.clone()])
        .unwrap();

    assert_eq!(map.len(), 1);
    assert_eq!(map.values().next().unwrap(), &vec![root.join("a"), root.join("b")]);
}

#[test]
fn test_zero_length_files_never_reported() {
    let dir = tempdir().unwrap();
    write(dir.path().join("e1"), b"");
    write(dir.path().join("e2"), b"");

    let (map, summary) = finder().find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    assert!(map.is_empty());
    assert_eq!(summary.total_files, 0);
}

#[test]
fn test_step_events_in_order() {
    let dir = tempdir().unwrap();
    let sink = Arc::new(MemorySink::new());
    let finder = DuplicateFinder::new(FinderConfig::default().with_event_sink(sink.clone()));
    finder.find_duplicates(&[dir.path().to_path_buf()]).unwrap();

    let starts: Vec<String> = sink
        .messages()
        .into_iter()
        .filter(|m| m.starts_with("Starting "))
        .collect();
    assert_eq!(
        starts,
        vec![
            "Starting collect candidates",
            "Starting staged hashing",
            "Starting build tree",
            "Starting extract duplicates",
        ]
    );
    assert_eq!(sink.count(EventLevel::Error), 0);
}

#[test]
fn test_interrupted_scan() {
    let dir = tempdir().unwrap();
    write(dir.path().join("a"), b"same");
    write(dir.path().join("b"), b"same");

    let flag = Arc::new(std::sync::atomic::AtomicBool::new(true));
    let config = FinderConfig::default()
        .with_event_sink(Arc::new(MemorySink::new()))
        .with_shutdown_flag(flag);
    let result = DuplicateFinder::new(config).find_duplicates(&[dir.path().to_path_buf()]);

    assert!(matches!(result, Err(FinderError::Interrupted)));
}
