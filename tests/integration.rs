use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn bsearch_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("bsearch");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    fs::write(
        root.join("records.json"),
        r#"[
  {"id": "d1", "entity_type": "dossier", "title_en": "Water security",
   "title_ar": "أمن المياه", "description_en": "Regional water security cooperation.",
   "updated_at": "2026-01-10T00:00:00Z"},
  {"id": "d2", "entity_type": "dossier", "title_en": "Energy transition",
   "title_ar": "تحول الطاقة", "description_en": "Energy and water nexus.",
   "updated_at": "2026-01-09T00:00:00Z"},
  {"id": "p1", "entity_type": "position", "title_en": "Water allocation policy",
   "title_ar": "سياسة توزيع المياه", "updated_at": "2026-01-08T00:00:00Z"},
  {"id": "per1", "entity_type": "person", "title_en": "Amal Haddad",
   "title_ar": "أمل حداد", "updated_at": "2026-01-08T00:00:00Z"},
  {"id": "old1", "entity_type": "document", "title_en": "Archived water memo",
   "is_archived": true, "updated_at": "2020-01-08T00:00:00Z"}
]"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[db]
path = "{}/data/bsearch.sqlite"

[search]
default_limit = 10

[warmer]
scopes = ["all"]
batch_delay_ms = 0
"#,
        root.display()
    );

    let config_path = config_dir.join("bsearch.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_bsearch(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = bsearch_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run bsearch binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn import(config_path: &Path) {
    let records = config_path
        .parent()
        .unwrap()
        .parent()
        .unwrap()
        .join("records.json");
    let (stdout, stderr, success) = run_bsearch(config_path, &["import", records.to_str().unwrap()]);
    assert!(success, "import failed: {}", stderr);
    assert!(stdout.contains("Imported 5 records (4 queued for embedding)"), "{}", stdout);
}

fn json(stdout: &str) -> serde_json::Value {
    serde_json::from_str(stdout).unwrap_or_else(|e| panic!("invalid JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_bsearch(&config_path, &["init"]);
    assert!(success, "init failed: {}", stderr);
    assert!(stdout.contains("Database initialized successfully"));
    assert!(tmp.path().join("data/bsearch.sqlite").exists());

    let (_, stderr, success) = run_bsearch(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_bsearch(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_search_after_import() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, stderr, success) = run_bsearch(&config_path, &["search", "water", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let response = json(&stdout);
    let ids: Vec<&str> = response["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(ids.contains(&"d1"));
    assert!(ids.contains(&"p1"));
    assert!(ids.contains(&"d2"));
    assert!(!ids.contains(&"old1"));
    assert!(response["results"]
        .as_array()
        .unwrap()
        .iter()
        .all(|r| r["rank_score"].as_f64().unwrap() > 100.0));
}

#[test]
fn test_search_boolean_and_arabic() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, stderr, success) =
        run_bsearch(&config_path, &["search", "water NOT energy", "--json"]);
    assert!(success, "search failed: {}", stderr);
    let response = json(&stdout);
    let ids: Vec<&str> = response["results"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_str().unwrap())
        .collect();
    assert!(!ids.contains(&"d2"));
    assert!(ids.contains(&"d1"));

    let (stdout, stderr, success) = run_bsearch(&config_path, &["search", "المياه", "--json"]);
    assert!(success, "arabic search failed: {}", stderr);
    let response = json(&stdout);
    assert_eq!(response["query"]["language"], "ar");
    assert!(!response["results"].as_array().unwrap().is_empty());
}

#[test]
fn test_search_archived_flag() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, _, success) = run_bsearch(
        &config_path,
        &["search", "memo", "--type", "document", "--archived"],
    );
    assert!(success);
    assert!(stdout.contains("id: old1"));

    let (stdout, _, success) = run_bsearch(&config_path, &["search", "memo", "--type", "document"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn test_invalid_query_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_bsearch(&config_path, &["init"]);

    let (_, stderr, success) = run_bsearch(&config_path, &["search", "(water"]);
    assert!(!success);
    assert!(stderr.contains("unbalanced parentheses"));

    let (stdout, _, success) = run_bsearch(&config_path, &["validate", "climate AND policy"]);
    assert!(success);
    assert!(stdout.contains("normalized: climate & policy"));
}

#[test]
fn test_suggest_and_warm() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, _, success) = run_bsearch(&config_path, &["suggest", "w"]);
    assert!(success);
    assert!(stdout.contains("No suggestions."));

    let (stdout, stderr, success) = run_bsearch(&config_path, &["suggest", "wat", "--json"]);
    assert!(success, "suggest failed: {}", stderr);
    let response = json(&stdout);
    assert_eq!(response["cache_hit"], false);
    assert_eq!(response["suggestions"][0]["id"], "d1");

    let (stdout, _, success) = run_bsearch(&config_path, &["suggest", "wat", "--json"]);
    assert!(success);
    assert_eq!(json(&stdout)["cache_hit"], true);

    run_bsearch(&config_path, &["search", "allocation"]);
    let (stdout, stderr, success) = run_bsearch(&config_path, &["warm"]);
    assert!(success, "warm failed: {}", stderr);
    assert!(stdout.contains("from 1 popular queries"), "{}", stdout);

    let (stdout, _, success) = run_bsearch(&config_path, &["suggest", "alloc", "--json"]);
    assert!(success);
    let response = json(&stdout);
    assert_eq!(response["cache_hit"], true);
    assert_eq!(response["suggestions"][0]["id"], "p1");
}

#[test]
fn test_embed_commands_with_disabled_provider() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, _, success) = run_bsearch(&config_path, &["embed", "pending", "--dry-run"]);
    assert!(success);
    assert!(stdout.contains("4 records pending embedding."));

    let (_, stderr, success) = run_bsearch(&config_path, &["embed", "pending"]);
    assert!(!success);
    assert!(stderr.contains("Embedding provider is disabled"));

    let (stdout, _, success) = run_bsearch(&config_path, &["embed", "health"]);
    assert!(success);
    assert!(stdout.contains("available: no"));
}

#[test]
fn test_semantic_with_disabled_provider_falls_back() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, stderr, success) =
        run_bsearch(&config_path, &["semantic", "water", "--hybrid", "--json"]);
    assert!(success, "semantic failed: {}", stderr);
    let response = json(&stdout);
    assert_eq!(response["embedding_info"]["generated"], false);
    assert!(!response["exact_matches"].as_array().unwrap().is_empty());
    assert!(response["semantic_matches"].as_array().unwrap().is_empty());
}

#[test]
fn test_hints_suggest_corrections() {
    let (_tmp, config_path) = setup_test_env();
    import(&config_path);

    let (stdout, stderr, success) = run_bsearch(&config_path, &["hints", "watr security"]);
    assert!(success, "hints failed: {}", stderr);
    assert!(stdout.contains("Did you mean: Water security?"), "{}", stdout);
    assert!(stdout.contains("Check your spelling"));

    let (stdout, _, success) =
        run_bsearch(&config_path, &["hints", "watr security", "--lang", "ar", "--json"]);
    assert!(success);
    let hints = json(&stdout);
    assert_eq!(hints["typo_corrections"][0]["corrected"], "Water security");
    assert_eq!(hints["search_tips"][1], "تحقق من الإملاء");
}
