//! MDX text transforms used by the sync.
//!
//! - [`escape_angle_brackets`]: keep MDX from parsing prose like `<K, V>`
//!   or `a <- b` as JSX.
//! - [`extract_image_urls`] / [`is_notion_asset_url`]: find images to rehost.
//! - [`front_matter`]: the post header the blog reads.
//! - [`post_files`]: existing files that belong to an article id.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

use crate::notion::NotionPage;

static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[\s\S]*?```").expect("valid regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").expect("valid regex"));
static ANGLE_BLOCK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<([^>]+)>").expect("valid regex"));
static HTML_TAG_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^[a-z][a-z0-9]*$").expect("valid regex"));
static IMAGE_LINK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"!\[[^\]]*\]\((https?://[^)]+)\)").expect("valid regex"));

/// Swap every match of `re` for a numbered placeholder, collecting the originals.
fn protect(text: &str, re: &Regex, label: &str, saved: &mut Vec<String>) -> String {
    re.replace_all(text, |caps: &regex::Captures| {
        let placeholder = format!("__{}_{}__", label, saved.len());
        saved.push(caps[0].to_string());
        placeholder
    })
    .into_owned()
}

fn restore(mut text: String, label: &str, saved: &[String]) -> String {
    for (i, original) in saved.iter().enumerate() {
        text = text.replacen(&format!("__{}_{}__", label, i), original, 1);
    }
    text
}

/// Wrap non-HTML `<…>` spans in backticks, leaving code untouched.
pub fn escape_angle_brackets(markdown: &str) -> String {
    let mut blocks = Vec::new();
    let mut inlines = Vec::new();

    let text = protect(markdown, &FENCED_CODE, "CODE_BLOCK", &mut blocks);
    let text = protect(&text, &INLINE_CODE, "INLINE_CODE", &mut inlines);

    let text = ANGLE_BLOCK
        .replace_all(&text, |caps: &regex::Captures| {
            let whole = &caps[0];
            let first = caps[1].split(char::is_whitespace).next().unwrap_or_default();
            let name = first.strip_prefix('/').unwrap_or(first);
            if HTML_TAG_NAME.is_match(name) {
                whole.to_string()
            } else {
                format!("`{}`", whole)
            }
        })
        .into_owned();

    let text = restore(text, "INLINE_CODE", &inlines);
    restore(text, "CODE_BLOCK", &blocks)
}

/// URLs of `![alt](http…)` images, in document order.
pub fn extract_image_urls(markdown: &str) -> Vec<String> {
    IMAGE_LINK
        .captures_iter(markdown)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Whether `url` points at a Notion-hosted (expiring) asset.
pub fn is_notion_asset_url(url: &str) -> bool {
    let Ok(parsed) = url::Url::parse(url) else {
        return false;
    };
    let host = parsed.host_str().unwrap_or_default();
    let host_matches = matches!(host, "www.notion.so" | "notion.so" | "images.notion.so")
        || host.contains("prod-files-secure.s3")
        || host == "s3.us-west-2.amazonaws.com"
        || host.ends_with("secure.notion-static.com");
    host_matches || parsed.path().contains("secure.notion-static.com")
}

fn extension_from_content_type(content_type: &str) -> Option<&'static str> {
    let ct = content_type.to_ascii_lowercase();
    if ct.contains("image/png") {
        Some(".png")
    } else if ct.contains("image/jpeg") || ct.contains("image/jpg") {
        Some(".jpg")
    } else if ct.contains("image/webp") {
        Some(".webp")
    } else if ct.contains("image/gif") {
        Some(".gif")
    } else if ct.contains("image/svg+xml") {
        Some(".svg")
    } else {
        None
    }
}

fn extension_from_url(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let file = parsed.path().rsplit('/').next().unwrap_or_default();
    let dot = file.rfind('.')?;
    Some(file[dot..].to_lowercase())
}

/// File extension for a downloaded asset, with the leading dot.
pub fn infer_extension(content_type: Option<&str>, url: &str) -> String {
    content_type
        .and_then(extension_from_content_type)
        .map(str::to_string)
        .or_else(|| extension_from_url(url))
        .unwrap_or_else(|| ".bin".to_string())
}

fn quote_list(items: &[String]) -> String {
    if items.is_empty() {
        return "[]".to_string();
    }
    let quoted: Vec<String> = items
        .iter()
        .map(|item| format!("'{}'", item.replace('\'', "''")))
        .collect();
    format!("[{}]", quoted.join(", "))
}

fn escape_double_quoted(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Prepend the post header to `body`.
///
/// `today` stands in for a missing creation time.
pub fn front_matter(
    page: &NotionPage,
    author: &str,
    layout: &str,
    body: &str,
    today: NaiveDate,
) -> String {
    let title = page.title.as_deref().unwrap_or("Untitled");
    let date = page
        .created_time
        .map(|t| t.date_naive())
        .unwrap_or(today)
        .format("%Y-%m-%d")
        .to_string();
    let lastmod = page
        .last_edited_time
        .map(|t| t.date_naive().format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| date.clone());
    let draft = page.status.as_deref() != Some("ready");

    let mut lines = vec![
        format!("title: \"{}\"", escape_double_quoted(title)),
        format!("date: '{}'", date),
        format!("tags: {}", quote_list(&page.tags)),
        format!("lastmod: '{}'", lastmod),
        format!("draft: {}", draft),
        format!("authors: {}", quote_list(&[author.to_string()])),
        format!("layout: '{}'", layout),
    ];
    if let Some(summary) = page.summary.as_deref().filter(|s| !s.is_empty()) {
        lines.push(format!("summary: \"{}\"", escape_double_quoted(summary)));
    }

    format!("---\n{}\n---\n\n{}", lines.join("\n"), body)
}

/// `.mdx` files in `dir` belonging to `article_id`, sorted by name.
///
/// Matches `{id}.mdx` and `{id}_*.mdx`. A missing directory has none.
pub fn post_files(dir: &Path, article_id: &str) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let exact = format!("{}.mdx", article_id);
    let prefix = format!("{}_", article_id);

    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.ends_with(".mdx") && (name == exact || name.starts_with(&prefix)) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn wraps_non_tag_brackets() {
        assert_eq!(escape_angle_brackets("Use Vec<T> here"), "Use Vec<T> here");
        assert_eq!(
            escape_angle_brackets("Use HashMap<K, V> here"),
            "Use HashMap`<K, V>` here"
        );
        assert_eq!(escape_angle_brackets("x <3.5 and y> 1"), "x `<3.5 and y>` 1");
        assert_eq!(escape_angle_brackets("a <-> b"), "a `<->` b");
    }

    #[test]
    fn keeps_html_tags() {
        let md = "<div class=\"x\">hi</div> <br> <img src=\"a\" />";
        assert_eq!(escape_angle_brackets(md), md);
    }

    #[test]
    fn leaves_code_alone() {
        let md = "```rust\nlet v: Vec<u8> = vec![];\n```\ninline `Option<T>` and <Foo.Bar>";
        assert_eq!(
            escape_angle_brackets(md),
            "```rust\nlet v: Vec<u8> = vec![];\n```\ninline `Option<T>` and `<Foo.Bar>`"
        );
    }

    #[test]
    fn finds_image_urls() {
        let md = "![a](https://x.test/1.png) text ![](http://y.test/2) ![rel](./local.png)";
        assert_eq!(
            extract_image_urls(md),
            vec!["https://x.test/1.png", "http://y.test/2"]
        );
    }

    #[test]
    fn recognises_notion_hosts() {
        assert!(is_notion_asset_url("https://www.notion.so/image/abc"));
        assert!(is_notion_asset_url(
            "https://prod-files-secure.s3.us-west-2.amazonaws.com/a/b.png?X-Amz=1"
        ));
        assert!(is_notion_asset_url("https://s3.us-west-2.amazonaws.com/secure.notion-static.com/x.png"));
        assert!(is_notion_asset_url("https://files.secure.notion-static.com/x"));
        assert!(!is_notion_asset_url("https://cdn.example.com/notion-images/x.png"));
        assert!(!is_notion_asset_url("not a url"));
    }

    #[test]
    fn extension_inference_order() {
        assert_eq!(infer_extension(Some("image/png"), "https://a/b.gif"), ".png");
        assert_eq!(infer_extension(Some("image/jpeg; q=1"), "https://a/b"), ".jpg");
        assert_eq!(infer_extension(Some("image/svg+xml"), "https://a/b"), ".svg");
        assert_eq!(
            infer_extension(Some("application/octet-stream"), "https://a/B.WEBP?sig=1"),
            ".webp"
        );
        assert_eq!(infer_extension(None, "https://a/b"), ".bin");
    }

    fn page() -> NotionPage {
        NotionPage {
            id: "page-1".to_string(),
            title: Some("Hello".to_string()),
            status: Some("ready".to_string()),
            tags: vec!["rust".to_string(), "web".to_string()],
            summary: Some("Short".to_string()),
            article_id: Some(7),
            created_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap()),
            last_edited_time: Some(Utc.with_ymd_and_hms(2024, 3, 5, 1, 0, 0).unwrap()),
        }
    }

    #[test]
    fn front_matter_layout() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let out = front_matter(&page(), "nihei-seiji", "PostSimple", "Body", today);
        assert_eq!(
            out,
            "---\ntitle: \"Hello\"\ndate: '2024-03-01'\ntags: ['rust', 'web']\n\
             lastmod: '2024-03-05'\ndraft: false\nauthors: ['nihei-seiji']\n\
             layout: 'PostSimple'\nsummary: \"Short\"\n---\n\nBody"
        );
    }

    #[test]
    fn front_matter_with_quotes_reads_back() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let quoted = NotionPage {
            id: "p".to_string(),
            title: Some("Say \"hi\" to C:\\".to_string()),
            status: Some("ready".to_string()),
            tags: vec!["rust's".to_string(), "a, b".to_string()],
            summary: Some("It's \"fine\"".to_string()),
            ..NotionPage::default()
        };
        let out = front_matter(&quoted, "me", "PostLayout", "Body", today);
        let (fields, body) = crate::pages::parse_front_matter(&out).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Say \"hi\" to C:\\"));
        assert_eq!(fields.summary.as_deref(), Some("It's \"fine\""));
        assert_eq!(fields.tags.unwrap().into_vec(), vec!["rust's", "a, b"]);
        assert!(!fields.draft);
        assert_eq!(body, "Body");
    }

    #[test]
    fn front_matter_defaults() {
        let today = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let bare = NotionPage {
            id: "p".to_string(),
            ..NotionPage::default()
        };
        let out = front_matter(&bare, "me", "PostLayout", "", today);
        assert!(out.contains("title: \"Untitled\""));
        assert!(out.contains("date: '2025-01-01'\ntags: []\nlastmod: '2025-01-01'\ndraft: true"));
        assert!(!out.contains("summary"));
    }

    #[test]
    fn lists_files_for_article() {
        let tmp = tempfile::TempDir::new().unwrap();
        for name in ["7.mdx", "7_old-title.mdx", "70.mdx", "7.md", "8_7.mdx"] {
            std::fs::write(tmp.path().join(name), "").unwrap();
        }
        let names: Vec<String> = post_files(tmp.path(), "7")
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["7.mdx", "7_old-title.mdx"]);
        assert!(post_files(&tmp.path().join("missing"), "7").unwrap().is_empty());
    }
}
