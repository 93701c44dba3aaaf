// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn relative_paths_resolve_against_base() {
    let p = ResourcePath::normalize("a.txt", Path::new("/work/job"));
    assert_eq!(p.as_str(), "/work/job/a.txt");
}

#[test]
fn absolute_paths_ignore_base() {
    let p = ResourcePath::normalize("/etc/hosts.new", Path::new("/work/job"));
    assert_eq!(p.as_str(), "/etc/hosts.new");
}

#[test]
fn dot_components_fold_away() {
    let p = ResourcePath::normalize("./src/../src/lib.rs", Path::new("/work"));
    assert_eq!(p.as_str(), "/work/src/lib.rs");
}

#[test]
fn equal_spellings_normalize_identically() {
    let base = Path::new("/work");
    let a = ResourcePath::normalize("src/lib.rs", base);
    let b = ResourcePath::normalize("./src/lib.rs", base);
    let c = ResourcePath::normalize("src/sub/../lib.rs", base);
    assert_eq!(a, b);
    assert_eq!(a, c);
}

#[test]
fn trailing_slash_marks_directory_resource() {
    let base = Path::new("/work");
    let dir = ResourcePath::normalize("build/", base);
    let file = ResourcePath::normalize("build", base);
    assert!(dir.is_dir());
    assert!(!file.is_dir());
    // A directory resource and a file at the same path are distinct locks
    assert_ne!(dir, file);
}

#[test]
fn prefix_is_not_containment() {
    let base = Path::new("/work");
    let parent = ResourcePath::normalize("a/b", base);
    let child = ResourcePath::normalize("a/b/c", base);
    assert_ne!(parent, child);
}

#[test]
fn symlinks_resolve_when_target_exists() {
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("real.txt");
    std::fs::write(&target, "x").unwrap();
    let link = dir.path().join("alias.txt");
    std::os::unix::fs::symlink(&target, &link).unwrap();

    let via_link = ResourcePath::normalize(link.to_str().unwrap(), dir.path());
    let direct = ResourcePath::normalize(target.to_str().unwrap(), dir.path());
    assert_eq!(via_link, direct);
}

#[test]
fn serde_round_trip() {
    let p = ResourcePath::normalize("a.txt", Path::new("/w"));
    let json = serde_json::to_string(&p).unwrap();
    let back: ResourcePath = serde_json::from_str(&json).unwrap();
    assert_eq!(p, back);
}
