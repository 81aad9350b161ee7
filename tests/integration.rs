use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn blogctl_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("blogctl");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let blog_dir = root.join("data").join("blog");
    fs::create_dir_all(&blog_dir).unwrap();
    fs::write(
        blog_dir.join("1.mdx"),
        "---\ntitle: \"Hello Rust\"\ndate: '2024-01-10'\ntags: ['rust']\ndraft: false\n---\n\nFirst post.",
    )
    .unwrap();
    fs::write(
        blog_dir.join("2.mdx"),
        "---\ntitle: \"Unfinished\"\ndate: '2024-02-01'\ndraft: true\n---\n\nDraft.",
    )
    .unwrap();
    fs::write(
        blog_dir.join("3.mdx"),
        "---\ntitle: \"Async in practice\"\ndate: '2024-03-15'\nsummary: \"Tokio notes\"\ndraft: false\n---\n\nThird post.",
    )
    .unwrap();

    let config_content = format!(
        r#"[content]
blog_dir = "{}/data/blog"
authors_dir = "{}/data/authors"

[server]
bind = "127.0.0.1:7441"
"#,
        root.display(),
        root.display()
    );

    let config_path = config_dir.join("blog.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_blogctl(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = blogctl_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env_remove("NOTION_TOKEN")
        .env_remove("NOTION_DATABASE_ID")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run blogctl binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_pages_table() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_blogctl(&config_path, &["pages"]);
    assert!(success, "pages failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("/about"));
    assert!(stdout.contains("/blog/1"));
    assert!(stdout.contains("/blog/3"));
    assert!(!stdout.contains("/blog/2"), "draft should be hidden");
    assert!(stdout.contains("6 pages"));
}

#[test]
fn test_pages_json() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_blogctl(&config_path, &["pages", "--json"]);
    assert!(success, "pages --json failed: stderr={}", stderr);

    let pages: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    let pages = pages.as_array().unwrap();
    assert_eq!(pages.len(), 6);
    assert_eq!(pages[0]["path"], "/");
    assert_eq!(pages[0]["type"], "home");
    // Newest post first.
    assert_eq!(pages[4]["path"], "/blog/3");
    assert_eq!(pages[4]["title"], "Async in practice");
    assert_eq!(pages[5]["path"], "/blog/1");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_blogctl(&tmp.path().join("nope.toml"), &["pages"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}

#[test]
fn test_invalid_config_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("blog.toml");
    fs::write(
        &path,
        "[content]\nblog_dir = \"x\"\n[chat]\ntimeout_secs = 0\n",
    )
    .unwrap();
    let (_, stderr, success) = run_blogctl(&path, &["pages"]);
    assert!(!success);
    assert!(stderr.contains("timeout_secs"));
}

#[test]
fn test_missing_blog_dir_fails() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("blog.toml");
    fs::write(
        &path,
        format!("[content]\nblog_dir = \"{}/missing\"\n", tmp.path().display()),
    )
    .unwrap();
    let (_, stderr, success) = run_blogctl(&path, &["pages"]);
    assert!(!success);
    assert!(stderr.contains("Blog directory does not exist"));
}

#[test]
fn test_sync_requires_notion_section() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_blogctl(&config_path, &["sync", "--dry-run"]);
    assert!(!success);
    assert!(stderr.contains("[notion]"));
}

#[test]
fn test_sync_requires_token() {
    let (tmp, config_path) = setup_test_env();
    let mut config = fs::read_to_string(&config_path).unwrap();
    config.push_str(&format!(
        "\n[notion]\ndatabase_id = \"db\"\noutput_dir = \"{}/out\"\n",
        tmp.path().display()
    ));
    fs::write(&config_path, config).unwrap();

    let (_, stderr, success) = run_blogctl(&config_path, &["sync"]);
    assert!(!success);
    assert!(stderr.contains("NOTION_TOKEN"));
}
