use std::time::Duration;

use atlas_fs::{Dir, Mutex};
use tempfile::tempdir;

#[test]
fn lock_file_lives_only_while_held() {
    let td = tempdir().unwrap();
    let dir = Dir::new(td.path());
    let mut m = Mutex::new("nightly", td.path());
    assert_eq!(m.name(), "nightly");

    assert!(m.lock(false));
    assert!(dir.has_file("nightly.lock"));
    assert!(m.lock(false));
    m.unlock().unwrap();
    assert!(dir.has_file("nightly.lock"));
    m.unlock().unwrap();
    assert!(!dir.has_file("nightly.lock"));
}

#[test]
fn independent_instances_exclude_each_other() {
    let td = tempdir().unwrap();
    let mut first = Mutex::new("job", td.path());
    let mut second = Mutex::new("job", td.path());
    let mut other = Mutex::new("other-job", td.path());

    assert!(first.lock(true));
    assert!(!second.lock(false));
    assert!(other.lock(false));
    drop(first);
    assert!(second.lock(false));
    assert_eq!(second.depth(), 1);
}

#[test]
fn abandoned_lock_file_can_be_recovered() {
    let td = tempdir().unwrap();
    let dir = Dir::new(td.path());
    dir.create_file("crashed.lock", "").unwrap();

    let mut m = Mutex::new("crashed", td.path());
    assert!(!m.lock(false));
    assert!(m.recover_stale(Duration::ZERO).unwrap());
    assert!(m.lock(false));
}
