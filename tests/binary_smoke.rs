use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use assert_cmd::Command;
use assert_fs::TempDir;
use assert_fs::prelude::*;
use predicates::prelude::*;

/// Binary invocation isolated from any user config.
fn atlas(td: &Path) -> Command {
    let cfg = td.join("atlas-config.xml");
    if !cfg.exists() {
        fs::write(
            &cfg,
            format!(
                "<config>\n  <lock_dir>{}</lock_dir>\n  <log_level>quiet</log_level>\n</config>\n",
                td.join("locks").display()
            ),
        )
        .unwrap();
        fs::create_dir_all(td.join("locks")).unwrap();
    }
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("atlas"));
    cmd.env("ATLAS_CONFIG", &cfg);
    cmd
}

#[test]
fn print_config_reports_source_and_values() {
    let td = TempDir::new().unwrap();
    atlas(td.path())
        .arg("print-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("ATLAS_CONFIG"))
        .stdout(predicate::str::contains("log_level = quiet"))
        .stdout(predicate::str::contains("default_dir_mode = 0777"));
}

#[test]
fn mkdir_then_scan_lists_entries() {
    let td = TempDir::new().unwrap();
    let root = td.child("tree");
    atlas(td.path())
        .args(["mkdir", "--mode", "0750"])
        .arg(root.path().join("a/b"))
        .assert()
        .success();
    root.child("a/file.txt").write_str("x").unwrap();

    atlas(td.path())
        .arg("scan")
        .arg(root.path().join("a"))
        .assert()
        .success()
        .stdout("b/\nfile.txt\n");

    atlas(td.path())
        .args(["scan", "-r", "--files"])
        .arg(root.path())
        .assert()
        .success()
        .stdout("a/file.txt\n");
}

#[test]
fn mkdir_without_mode_keeps_existing_permissions() {
    let td = TempDir::new().unwrap();
    let dir = td.child("private");
    dir.create_dir_all().unwrap();
    fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o700)).unwrap();

    atlas(td.path()).arg("mkdir").arg(dir.path()).assert().success();

    let mode = fs::metadata(dir.path()).unwrap().permissions().mode() & 0o777;
    assert_eq!(mode, 0o700);
}

#[test]
fn copy_refuses_existing_destination() {
    let td = TempDir::new().unwrap();
    td.child("src/f.txt").write_str("data").unwrap();
    td.child("dst").create_dir_all().unwrap();
    atlas(td.path())
        .arg("copy")
        .arg(td.path().join("src"))
        .arg(td.path().join("dst"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn merge_and_delete_round_trip() {
    let td = TempDir::new().unwrap();
    td.child("src/sub/f.txt").write_str("data").unwrap();
    atlas(td.path())
        .arg("merge")
        .arg(td.path().join("src"))
        .arg(td.path().join("dst"))
        .assert()
        .success();
    td.child("dst/sub/f.txt").assert("data");

    atlas(td.path())
        .arg("delete")
        .arg(td.path().join("dst"))
        .assert()
        .success();
    td.child("dst").assert(predicate::path::missing());
}

#[test]
fn lock_runs_command_and_propagates_exit_code() {
    let td = TempDir::new().unwrap();
    atlas(td.path())
        .args(["lock", "job", "--", "sh", "-c", "exit 3"])
        .assert()
        .code(3);
    td.child("locks/job.lock").assert(predicate::path::missing());
}

#[test]
fn lock_reports_busy_when_held() {
    let td = TempDir::new().unwrap();
    let locks = td.path().join("locks");
    fs::create_dir_all(&locks).unwrap();
    let mut holder = atlas_fs::Mutex::new("busy", &locks);
    assert!(holder.lock(false));

    atlas(td.path())
        .args(["lock", "busy", "--", "true"])
        .assert()
        .code(75)
        .stderr(predicate::str::contains("busy"));
    holder.unlock().unwrap();
}

#[test]
fn invalid_mode_is_a_usage_error() {
    let td = TempDir::new().unwrap();
    atlas(td.path())
        .args(["chmod", "somewhere", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid octal mode"));
}
