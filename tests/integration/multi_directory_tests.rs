use dupetree::duplicates::{DuplicateFinder, FinderConfig};
use dupetree::events::MemorySink;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::tempdir;

fn finder() -> DuplicateFinder {
    DuplicateFinder::new(FinderConfig::default().with_event_sink(Arc::new(MemorySink::new())))
}

#[test]
fn test_two_roots_with_same_content_are_units() {
    let base = tempdir().unwrap();
    let base = base.path().canonicalize().unwrap();
    let photos = base.join("home/photos");
    let backup = base.join("mnt/backup/photos");
    fs::create_dir_all(&photos).unwrap();
    fs::create_dir_all(&backup).unwrap();
    fs::write(photos.join("img1"), b"first image").unwrap();
    fs::write(backup.join("img1"), b"first image").unwrap();

    let (map, summary) = finder()
        .find_duplicates(&[photos.clone(), backup.clone()])
        .unwrap();

    assert_eq!(summary.common_ancestor, base);
    assert_eq!(map.len(), 1);
    let paths = map.values().next().unwrap();
    assert_eq!(paths, &vec![photos, backup]);
}

#[test]
fn test_connecting_directories_never_emitted() {
    let base = tempdir().unwrap();
    let base = base.path().canonicalize().unwrap();
    let a = base.join("wrap/a");
    let b = base.join("wrap/b");
    fs::create_dir_all(&a).unwrap();
    fs::create_dir_all(&b).unwrap();
    fs::write(a.join("f"), b"dup").unwrap();
    fs::write(b.join("g"), b"dup").unwrap();

    let (map, _) = finder().find_duplicates(&[a.clone(), b.clone()]).unwrap();

    // wrap/ only holds duplicates but lies above both roots.
    let all: Vec<&PathBuf> = map.values().flatten().collect();
    assert!(!all.contains(&&base.join("wrap")));
    assert_eq!(all, vec![&a, &b]);
}

#[test]
fn test_siblings_outside_roots_are_ignored() {
    let base = tempdir().unwrap();
    let base = base.path().canonicalize().unwrap();
    let a = base.join("a");
    let b = base.join("b");
    let outside = base.join("outside");
    for dir in [&a, &b, &outside] {
        fs::create_dir(dir).unwrap();
    }
    fs::write(a.join("f"), b"data").unwrap();
    fs::write(b.join("f"), b"data").unwrap();
    fs::write(outside.join("f"), b"data").unwrap();

    let (map, summary) = finder().find_duplicates(&[a.clone(), b.clone()]).unwrap();

    assert_eq!(summary.total_files, 2);
    let all: Vec<&PathBuf> = map.values().flatten().collect();
    assert_eq!(all, vec![&a, &b]);
}

#[test]
fn test_overlapping_roots_scan_each_file_once() {
    let dir = tempdir().unwrap();
    let root = dir.path().canonicalize().unwrap();
    let sub = root.join("sub");
    fs::create_dir(&sub).unwrap();
    fs::write(root.join("a.txt"), b"content").unwrap();
    fs::write(sub.join("b.txt"), b"content").unwrap();

    let (map, summary) = finder().find_duplicates(&[root.clone(), sub.clone()]).unwrap();

    assert_eq!(summary.total_files, 2);
    // sub/ has no partner directory, so its file pairs with root/a.txt.
    assert_eq!(map.len(), 1);
    assert!(map.keys().next().unwrap().starts_with("file:7-"));
    assert_eq!(
        map.values().next().unwrap(),
        &vec![root.join("a.txt"), sub.join("b.txt")]
    );
}

#[test]
fn test_cross_root_loose_files() {
    let base = tempdir().unwrap();
    let base = base.path().canonicalize().unwrap();
    let a = base.join("a");
    let b = base.join("b");
    fs::create_dir(&a).unwrap();
    fs::create_dir(&b).unwrap();
    fs::write(a.join("shared"), b"shared bytes").unwrap();
    fs::write(a.join("only_a"), b"a-specific content").unwrap();
    fs::write(b.join("shared_copy"), b"shared bytes").unwrap();
    fs::write(b.join("only_b"), b"b-specific content!!").unwrap();

    let (map, summary) = finder().find_duplicates(&[a.clone(), b.clone()]).unwrap();

    assert_eq!(map.len(), 1);
    let (key, paths) = map.iter().next().unwrap();
    assert!(key.starts_with("file:12-"));
    assert_eq!(paths, &vec![a.join("shared"), b.join("shared_copy")]);
    assert_eq!(summary.duplicate_files, 2);
}
