//! Integration tests for the kb CLI
//!
//! Each test runs the binary against its own temporary scan and data directories.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper to create a CLI command with environment overrides and colors off
fn cli() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_kb"));
    for key in [
        "KB_SCAN_DIR",
        "KB_DATA_DIR",
        "KB_CHUNK_SIZE",
        "KB_CHUNK_OVERLAP",
        "KB_LLM_PROVIDER",
        "KB_LLM_MODEL",
        "ANTHROPIC_API_KEY",
    ] {
        cmd.env_remove(key);
    }
    cmd.env("NO_COLOR", "1").env("CLICOLOR", "0");
    cmd
}

/// Write a small document tree and a config pointing at it
fn setup(dir: &TempDir) -> PathBuf {
    let docs = dir.path().join("docs");
    fs::create_dir_all(docs.join("notes")).unwrap();
    fs::write(
        docs.join("notes/rust.md"),
        "# Rust\n\n\
         ## Ownership\n\n\
         Every value has a single owner and is dropped when the owner goes out of scope.\n\n\
         ## Borrowing\n\n\
         References borrow a value without taking ownership.\n",
    )
    .unwrap();
    fs::write(
        docs.join("recipes.txt"),
        "Bake the bread at two hundred degrees for forty minutes.",
    )
    .unwrap();

    let config = dir.path().join("kb.toml");
    fs::write(
        &config,
        format!(
            "[paths]\nscan_dir = '{}'\ndata_dir = '{}'\n\n[llm]\nprovider = \"none\"\n",
            docs.display(),
            dir.path().join("data").display()
        ),
    )
    .unwrap();
    config
}

fn run_index(config: &Path) {
    cli()
        .arg("--config")
        .arg(config)
        .arg("index")
        .assert()
        .success()
        .stdout(predicate::str::contains("Indexing complete!"));
}

#[test]
fn test_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Personal knowledge base"));
}

#[test]
fn test_missing_config_file_fails() {
    let dir = TempDir::new().unwrap();
    cli()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn test_index_dry_run_changes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["index", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("dry run"));

    cli()
        .arg("--config")
        .arg(&config)
        .args(["status", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
}

#[test]
fn test_index_then_search_json() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);
    run_index(&config);

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["search", "single owner dropped out of scope", "--json", "-k", "1"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let results = json["results"].as_array().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["filename"], "rust.md");
    assert_eq!(results[0]["folder"], "notes");
    assert_eq!(results[0]["section_title"], "Ownership");
}

#[test]
fn test_search_folder_filter() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);
    run_index(&config);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["search", "bread", "--folder", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust.md"))
        .stdout(predicate::str::contains("recipes.txt").not());
}

#[test]
fn test_ask_without_llm() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);
    run_index(&config);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["ask", "How long should bread bake?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(LLM not configured)"))
        .stdout(predicate::str::contains("Sources"));
}

#[test]
fn test_documents_listing() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);
    run_index(&config);

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "--status", "indexed"])
        .assert()
        .success()
        .stdout(predicate::str::contains("notes/rust.md"))
        .stdout(predicate::str::contains("2 documents"));

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "--status", "done"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown document status"));
}

#[test]
fn test_chunk_command() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);

    let output = cli()
        .arg("--config")
        .arg(&config)
        .arg("chunk")
        .arg(dir.path().join("docs/notes/rust.md"))
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["smart"], true);
    let passages = json["passages"].as_array().unwrap();
    assert!(!passages.is_empty());
    assert!(passages
        .iter()
        .any(|p| p["metadata"]["section_title"] == "Borrowing"));
}

/// ID of the indexed document with `filename`, read from `documents --json`
fn document_id(config: &Path, filename: &str) -> String {
    let output = cli()
        .arg("--config")
        .arg(config)
        .args(["documents", "--json"])
        .output()
        .unwrap();
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    json.as_array()
        .unwrap()
        .iter()
        .find(|d| d["filename"] == filename)
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string()
}

#[test]
fn test_documents_show_and_tags() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);
    run_index(&config);
    let id = document_id(&config, "rust.md");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "tag", &id, "lang", "notes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lang, notes"));

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "untag", &id, "notes"])
        .assert()
        .success();

    let output = cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "show", &id, "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["document"]["filename"], "rust.md");
    assert_eq!(json["tags"], serde_json::json!(["lang"]));
    let chunks = json["chunks"].as_array().unwrap();
    assert_eq!(chunks.len(), 2);
    assert_eq!(chunks[0]["chunk_id"], format!("{id}_chunk_0"));

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "tags"])
        .assert()
        .success()
        .stdout(predicate::str::contains("lang"));

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "show", "000000000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Document not found"));
}

#[test]
fn test_documents_delete_removes_passages() {
    let dir = TempDir::new().unwrap();
    let config = setup(&dir);
    run_index(&config);
    let id = document_id(&config, "rust.md");

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "delete", &id])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 passages removed"));

    cli()
        .arg("--config")
        .arg(&config)
        .args(["search", "ownership", "--json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("rust.md").not());

    cli()
        .arg("--config")
        .arg(&config)
        .args(["documents", "delete", &id])
        .assert()
        .failure();
}
