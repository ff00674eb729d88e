// SPDX-License-Identifier: MIT OR Apache-2.0
//! CLI smoke: project create → source add → build → search over a folder
//! source, end to end through the `foundry` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn foundry(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("foundry").expect("foundry binary");
    cmd.env("FOUNDRY_PROJECTS_DIR", dir.path().join("projects"));
    cmd.env("FOUNDRY_RUNS_DIR", dir.path().join("runs"));
    cmd
}

#[test]
fn create_add_build_search_roundtrip() {
    let dir = TempDir::new().unwrap();
    let docs = dir.path().join("docs");
    std::fs::create_dir_all(&docs).unwrap();
    std::fs::write(
        docs.join("guide.md"),
        "# Guide\n\nThe chamber holds shadow demons near the ceiling, according to the guide.",
    )
    .unwrap();

    foundry(&dir)
        .args(["project", "create", "smoke", "--dimension", "16"])
        .assert()
        .success()
        .stdout(predicate::str::contains("created smoke"));

    foundry(&dir)
        .args([
            "source",
            "add",
            "smoke",
            "--kind",
            "folder",
            "--uri",
            docs.to_str().unwrap(),
            "--tag",
            "guide",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("added src_"));

    foundry(&dir)
        .args(["build", "smoke"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: +"));

    foundry(&dir)
        .args(["search", "smoke", "shadow demons", "--mode", "keyword"])
        .assert()
        .success()
        .stdout(predicate::str::contains("mode: keyword"))
        .stdout(predicate::str::contains("shadow demons"));

    foundry(&dir)
        .args(["project", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("smoke"));
}

#[test]
fn delete_requires_confirmation() {
    let dir = TempDir::new().unwrap();
    foundry(&dir)
        .args(["project", "create", "doomed", "--dimension", "8"])
        .assert()
        .success();

    foundry(&dir)
        .args(["project", "delete", "doomed"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("NOT_CONFIRMED"));

    foundry(&dir)
        .args(["project", "delete", "doomed", "--confirm"])
        .assert()
        .success()
        .stdout(predicate::str::contains("deleted doomed"));
}

#[test]
fn unknown_project_fails_cleanly() {
    let dir = TempDir::new().unwrap();
    foundry(&dir)
        .args(["project", "show", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("PROJECT_NOT_FOUND"));
}
