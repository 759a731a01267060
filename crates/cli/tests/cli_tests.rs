//! CLI integration tests
use predicates::prelude::*;
use tempfile::TempDir;

fn cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("gleaner")
}

fn get_fixture_path(name: &str) -> String {
    format!("../../tests/fixtures/{}", name)
}

#[test]
fn test_cli_file_input() {
    cmd()
        .args([&get_fixture_path("landmark_article.html"), "--url", "https://valleyledger.example/metro/transit"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Council approves new transit plan"))
        .stdout(predicate::str::contains("\"provenance\": \"structural\""));
}

#[test]
fn test_cli_json_output_is_valid() {
    let output = cmd()
        .args([&get_fixture_path("landmark_article.html"), "--url", "https://valleyledger.example/metro/transit"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["shape"], "article");
    assert_eq!(json["record"]["author"], "Dana Whitfield");
    assert_eq!(json["record"]["image"], "https://valleyledger.example/images/transit.jpg");
}

#[test]
fn test_cli_stdin_input() {
    let html = std::fs::read_to_string(get_fixture_path("ledger_a.html")).unwrap();
    cmd()
        .args(["-", "--url", "https://valleyledger.example/library"])
        .write_stdin(html)
        .assert()
        .success()
        .stdout(predicate::str::contains("Library extends weekend hours"));
}

#[test]
fn test_cli_text_format() {
    cmd()
        .args(["-f", "text", &get_fixture_path("landmark_article.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("title: Council approves new transit plan"))
        .stdout(predicate::str::contains("provenance: structural"));
}

#[test]
fn test_cli_malformed_html_fails() {
    cmd()
        .arg(get_fixture_path("malformed.html"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid HTML"));
}

#[test]
fn test_cli_bare_body_fails_without_fallback() {
    cmd()
        .arg(get_fixture_path("bare_body.html"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Missing required field"));
}

#[test]
fn test_cli_unknown_shape() {
    cmd()
        .args(["-s", "statistics", &get_fixture_path("landmark_article.html")])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unsupported target shape"));
}

#[test]
fn test_cli_video_shape() {
    cmd()
        .args(["-s", "video", &get_fixture_path("metadata_video.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("thumbnail"))
        .stdout(predicate::str::contains("launch-thumb.jpg"));
}

#[test]
fn test_cli_candidates() {
    cmd()
        .args(["--candidates", &get_fixture_path("metadata_video.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("og:title"));
}

#[test]
fn test_cli_candidates_text() {
    cmd()
        .args(["--candidates", "-f", "text", &get_fixture_path("metadata_video.html")])
        .assert()
        .success()
        .stdout(predicate::str::contains("title"))
        .stdout(predicate::str::contains("og:title"));
}

#[test]
fn test_cli_rules_round_trip() {
    let rules = TempDir::new().unwrap();
    std::fs::write(rules.path().join("valleyledger.example.json"), r#"{"title": "h2.story-headline"}"#).unwrap();
    let saved = TempDir::new().unwrap();

    cmd()
        .arg(get_fixture_path("ledger_b.html"))
        .args(["--url", "https://valleyledger.example/market"])
        .arg("--rules-dir")
        .arg(rules.path())
        .arg("--save-rules")
        .arg(saved.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Farmers market moves to riverside park"));

    let written = std::fs::read_to_string(saved.path().join("valleyledger.example.json")).unwrap();
    assert!(written.contains("h2.story-headline"));
    assert!(written.contains("div.story-body"));
}

#[test]
fn test_cli_nonexistent_file() {
    cmd().arg("/nonexistent/file.html").assert().failure();
}

#[test]
fn test_cli_output_file() {
    let temp_dir = TempDir::new().unwrap();
    let output_path = temp_dir.path().join("record.json");

    cmd()
        .args([&get_fixture_path("landmark_article.html"), "-o", output_path.to_str().unwrap()])
        .assert()
        .success();

    let content = std::fs::read_to_string(&output_path).unwrap();
    assert!(content.contains("Council approves new transit plan"));
}

#[test]
fn test_cli_verbose() {
    cmd()
        .args(["-v", &get_fixture_path("landmark_article.html")])
        .assert()
        .success()
        .stderr(predicate::str::contains("Gleaner"))
        .stderr(predicate::str::contains("Extraction Details"));
}

#[test]
fn test_cli_help() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--shape"))
        .stdout(predicate::str::contains("--fallback"));
}
