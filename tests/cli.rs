use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

#[test]
fn test_scan_lists_chunk_groups() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("factory.js");
    fs::write(
        &bundle,
        r#"function(e,t,n){let a=()=>Promise.all([n.e("12"),n.e("34")]).then(n.bind(n,"56"))}"#,
    )
    .unwrap();

    Command::cargo_bin("chunksweep")
        .unwrap()
        .arg("scan")
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("12,34 -> 56"));
}

#[test]
fn test_scan_json_output() {
    let dir = tempfile::tempdir().unwrap();
    let bundle = dir.path().join("factory.js");
    fs::write(&bundle, r#"e=>n.e(7).then(n.bind(n,8))"#).unwrap();

    Command::cargo_bin("chunksweep")
        .unwrap()
        .args(["scan", "--json"])
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"entry_point\": 8"));
}

#[test]
fn test_universe_lists_ids() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("u.js");
    fs::write(&source, r#"e=>({3:"a",9:"b"})[e]+".js""#).unwrap();

    Command::cargo_bin("chunksweep")
        .unwrap()
        .arg("universe")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("3\n9\n"));
}

#[test]
fn test_universe_fails_without_ids() {
    let dir = tempfile::tempdir().unwrap();
    let source = dir.path().join("u.js");
    fs::write(&source, r#"e=>"static/"+e+".js""#).unwrap();

    Command::cargo_bin("chunksweep")
        .unwrap()
        .arg("universe")
        .arg(&source)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No chunk ids found"));
}

#[test]
fn test_load_missing_snapshot_fails() {
    let dir = tempfile::tempdir().unwrap();

    Command::cargo_bin("chunksweep")
        .unwrap()
        .current_dir(dir.path())
        .args(["load", "--snapshot", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read snapshot"));
}
