//! Integration tests for the datasift binary

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const NEWS_CSV: &str = "id,category,title,text
1,tech,Quantum chips arrive,New quantum processors ship this year
2,sport,Cup final,The final ended in a draw
3,tech,Phone sales slow,Smartphone sales slowed in the last quarter
4,business,Markets rally,Stocks rose on strong earnings
";

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("news.csv"), NEWS_CSV).unwrap();
        Self { dir }
    }

    fn loaded() -> Self {
        let ws = Self::new();
        ws.cmd().arg("load").arg(ws.csv()).assert().success();
        ws
    }

    fn csv(&self) -> PathBuf {
        self.dir.path().join("news.csv")
    }

    fn db(&self) -> PathBuf {
        self.dir.path().join("news.sqlite")
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.yml")
    }

    /// Command isolated from the user's environment and config
    fn cmd(&self) -> Command {
        let mut cmd = Command::cargo_bin("datasift").unwrap();
        cmd.env_remove("DATASIFT_LLM_URL")
            .env_remove("DATASIFT_DB")
            .env_remove("DATASIFT_DATASET")
            .env_remove("RUST_LOG")
            .arg("--config")
            .arg(self.config())
            .arg("--db")
            .arg(self.db())
            .arg("--dataset")
            .arg("news");
        cmd
    }

    fn json(&self, args: &[&str]) -> Value {
        let output = self.cmd().args(args).arg("--format").arg("json").output().unwrap();
        assert!(output.status.success(), "{:?} failed: {}", args, String::from_utf8_lossy(&output.stderr));
        serde_json::from_slice(&output.stdout).unwrap()
    }
}

fn ids(rows: &Value) -> Vec<i64> {
    rows.as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect()
}

fn path_str(p: &Path) -> &str {
    p.to_str().unwrap()
}

#[test]
fn test_load_reports_rows() {
    let ws = Workspace::new();
    ws.cmd()
        .arg("load")
        .arg(ws.csv())
        .assert()
        .success()
        .stdout(predicate::str::contains("Rows:        4"))
        .stdout(predicate::str::contains(path_str(&ws.db())));
    assert!(ws.db().exists());
}

#[test]
fn test_load_save_remembers_source() {
    let ws = Workspace::new();
    ws.cmd().arg("load").arg(ws.csv()).arg("--save").assert().success();

    let config = fs::read_to_string(ws.config()).unwrap();
    assert!(config.contains("source_csv"));
    assert!(config.contains("news.csv"));
}

#[test]
fn test_search_by_category() {
    let ws = Workspace::loaded();
    let page = ws.json(&["search", "--category", "tech"]);

    assert_eq!(page["total_count"], 2);
    assert_eq!(page["page"], 1);
    let mut found = ids(&page["data"]);
    found.sort();
    assert_eq!(found, vec![1, 3]);
}

#[test]
fn test_search_pagination() {
    let ws = Workspace::loaded();
    let page = ws.json(&["search", "--limit", "3", "--page", "2"]);

    assert_eq!(page["total_count"], 4);
    assert_eq!(page["total_pages"], 2);
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
}

#[test]
fn test_search_rejects_unknown_field() {
    let ws = Workspace::loaded();
    ws.cmd()
        .args(["search", "--filter", "director=Nolan"])
        .assert()
        .code(3)
        .stderr(predicate::str::starts_with("error:"))
        .stderr(predicate::str::contains("director"));
}

#[test]
fn test_search_rejects_page_zero() {
    let ws = Workspace::loaded();
    ws.cmd().args(["search", "--page", "0"]).assert().code(3);
}

#[test]
fn test_find_csv_output() {
    let ws = Workspace::loaded();
    ws.cmd()
        .args(["find", "quantum", "--format", "csv"])
        .assert()
        .success()
        .stdout(predicate::str::starts_with("category,id,text,title\n"))
        .stdout(predicate::str::contains("Quantum chips arrive"))
        .stdout(predicate::str::contains("Cup final").not());
}

#[test]
fn test_find_markdown_output() {
    let ws = Workspace::loaded();
    ws.cmd()
        .args(["find", "earnings", "--format", "md"])
        .assert()
        .success()
        .stdout(predicate::str::contains("# Search Results for \"earnings\""))
        .stdout(predicate::str::contains("## 1. Markets rally"));
}

#[test]
fn test_get_row() {
    let ws = Workspace::loaded();
    let row = ws.json(&["get", "3"]);
    assert_eq!(row["title"], "Phone sales slow");
    assert_eq!(row["category"], "tech");

    ws.cmd().args(["get", "99"]).assert().code(2);
}

#[test]
fn test_query_uses_heuristic_without_llm() {
    let ws = Workspace::loaded();
    let response = ws.json(&["query", "tech news about smartphone sales"]);

    assert_eq!(response["extraction_source"], "heuristic");
    assert_eq!(response["fallback_reason"]["reason"], "remote_not_configured");
    assert_eq!(response["parsed"]["category"], "tech");
    assert_eq!(ids(&response["results"]), vec![3]);
    assert_eq!(response["results_count"], 1);
}

#[test]
fn test_query_terminal_output() {
    let ws = Workspace::loaded();
    ws.cmd()
        .args(["query", "tech", "news", "about", "quantum"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Quantum chips arrive"))
        .stdout(predicate::str::contains("(heuristic)"));
}

#[test]
fn test_blank_query_is_invalid() {
    let ws = Workspace::loaded();
    ws.cmd().args(["query", "   "]).assert().code(3);
}

#[test]
fn test_missing_database() {
    let ws = Workspace::new();

    let status = ws.json(&["status"]);
    assert_eq!(status["status"], "degraded");
    assert_eq!(status["db_exists"], false);

    ws.cmd()
        .args(["query", "tech news about chips"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("error: tech news about chips: "))
        .stderr(predicate::str::contains("Storage unavailable"));
}

#[test]
fn test_errors_name_the_request() {
    let ws = Workspace::loaded();
    ws.cmd()
        .args(["search", "--filter", "director=Nolan"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error: director=Nolan: "));

    ws.cmd()
        .args(["find", "chips", "--page", "0"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error: chips: "));

    ws.cmd()
        .args(["agent", "busiest", "category"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error: busiest category: "));
}

#[test]
fn test_status_after_load() {
    let ws = Workspace::loaded();
    let status = ws.json(&["status"]);

    assert_eq!(status["status"], "ok");
    assert_eq!(status["dataset"], "news");
    assert_eq!(status["row_count"], 4);
    assert_eq!(status["llm_configured"], false);
}

#[test]
fn test_agent_requires_llm() {
    let ws = Workspace::loaded();
    ws.cmd()
        .args(["agent", "which category has the most articles?"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("DATASIFT_LLM_URL"));
}

#[test]
fn test_repl_session() {
    let ws = Workspace::loaded();
    ws.cmd()
        .arg("repl")
        .write_stdin(":get 2\n:bogus\n:quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Cup final"))
        .stderr(predicate::str::contains("Unknown command ':bogus'"));
}

#[test]
fn test_unknown_dataset_flag() {
    let ws = Workspace::new();
    let mut cmd = Command::cargo_bin("datasift").unwrap();
    cmd.arg("--dataset")
        .arg("podcasts")
        .arg("--config")
        .arg(ws.config())
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown dataset"));
}
