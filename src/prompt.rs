//! Persona system prompt assembly.
//!
//! The prompt template is a Markdown file with three placeholders that are
//! filled on every chat request, so newly synced posts are visible to the
//! assistant without a restart:
//!
//! | Placeholder | Filled with |
//! |-------------|-------------|
//! | `{{ALL_POSTS_INFO}}` | id/title/summary of every published post |
//! | `{{ABOUT_PAGE_INFO}}` | author profile and cleaned about-page text |
//! | `{{PAGE_META_JSON}}` | the navigable page list, pretty-printed |

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

use crate::config::Config;
use crate::models::{BlogPost, PageMeta};
use crate::pages::{build_page_meta, parse_front_matter, published_posts, FrontMatter};

static IMPORT_STMT: Lazy<Regex> = Lazy::new(|| Regex::new(r"import[^;]*;").expect("valid regex"));
static JSX_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[^>]+>").expect("valid regex"));
static JSX_EXPR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{[^}]+\}").expect("valid regex"));
static FENCED_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```.*?```").expect("valid regex"));
static INLINE_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r"`[^`]+`").expect("valid regex"));

/// One `- ID:` block per post, separated by blank lines.
pub fn posts_info(posts: &[BlogPost]) -> String {
    posts
        .iter()
        .map(|post| {
            let summary = post
                .summary
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(|s| format!("\n  Summary: {}", s))
                .unwrap_or_default();
            format!("- ID: {}\n  Title: {}{}", post.slug, post.title, summary)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Author profile section; empty when the author file is missing.
pub fn about_info(authors_dir: &Path, author: &str) -> Result<String> {
    let path = ["mdx", "md"]
        .iter()
        .map(|ext| authors_dir.join(format!("{}.{}", author, ext)))
        .find(|p| p.exists());
    let Some(path) = path else {
        log::debug!("no author file for '{}' in {}", author, authors_dir.display());
        return Ok(String::new());
    };

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read author file: {}", path.display()))?;
    let (fields, body) = match parse_front_matter(&content) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!("ignoring front matter of {}: {:#}", path.display(), e);
            (FrontMatter::default(), content.as_str())
        }
    };

    let mut info = Vec::new();
    for (value, label) in [
        (fields.name, "Name"),
        (fields.occupation, "Occupation"),
        (fields.company, "Company"),
        (fields.email, "Email"),
        (fields.github, "GitHub"),
        (fields.linkedin, "LinkedIn"),
    ] {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            info.push(format!("{}: {}", label, value));
        }
    }
    info.push(format!("\nContent:\n{}", clean_body(body)));
    Ok(info.join("\n"))
}

/// Strip MDX syntax from an about page, leaving readable prose.
fn clean_body(body: &str) -> String {
    let text = IMPORT_STMT.replace_all(body, "");
    let text = JSX_TAG.replace_all(&text, "");
    let text = JSX_EXPR.replace_all(&text, "");
    let text = FENCED_CODE.replace_all(&text, "");
    let text = INLINE_CODE.replace_all(&text, "");
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Substitute the placeholders in `template`.
pub fn fill_template(
    template: &str,
    posts: &[BlogPost],
    about: &str,
    pages: &[PageMeta],
) -> Result<String> {
    Ok(template
        .replace("{{ALL_POSTS_INFO}}", &posts_info(posts))
        .replace("{{ABOUT_PAGE_INFO}}", about)
        .replace("{{PAGE_META_JSON}}", &serde_json::to_string_pretty(pages)?))
}

/// Build the system prompt from the configured template and content.
pub fn build_system_prompt(config: &Config) -> Result<String> {
    let template = std::fs::read_to_string(&config.chat.prompt_path).with_context(|| {
        format!(
            "Failed to read prompt template: {}",
            config.chat.prompt_path.display()
        )
    })?;
    let posts = published_posts(&config.content.blog_dir)?;
    let pages = build_page_meta(&posts);
    let about = about_info(&config.content.authors_dir, &config.content.about_author)?;
    fill_template(&template, &posts, &about, &pages)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PageType;

    fn post(slug: &str, title: &str, summary: Option<&str>) -> BlogPost {
        BlogPost {
            slug: slug.to_string(),
            title: title.to_string(),
            summary: summary.map(str::to_string),
            date: None,
            tags: vec![],
            draft: false,
            sort: None,
        }
    }

    #[test]
    fn posts_info_format() {
        let info = posts_info(&[post("1", "One", Some("first")), post("2", "Two", None)]);
        assert_eq!(
            info,
            "- ID: 1\n  Title: One\n  Summary: first\n\n- ID: 2\n  Title: Two"
        );
    }

    #[test]
    fn clean_body_strips_mdx() {
        let body = "import X from './x';\n# Heading\n<FamiliarTechStack items={stack} />\n\
                    I like `rust` and {props.value} things.\n```js\nconsole.log(1)\n```\n  Last line  ";
        assert_eq!(clean_body(body), "I like  and  things.\nLast line");
    }

    #[test]
    fn about_info_reads_author_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("jane.mdx"),
            "---\nname: Jane\noccupation: Engineer\ngithub: https://github.com/jane\n---\nHello there.\n",
        )
        .unwrap();
        let info = about_info(tmp.path(), "jane").unwrap();
        assert_eq!(
            info,
            "Name: Jane\nOccupation: Engineer\nGitHub: https://github.com/jane\n\nContent:\nHello there."
        );
        assert_eq!(about_info(tmp.path(), "nobody").unwrap(), "");
    }

    #[test]
    fn fills_all_placeholders() {
        let pages = vec![PageMeta::new("/", "Home", PageType::Home)];
        let out = fill_template(
            "P:{{ALL_POSTS_INFO}}|A:{{ABOUT_PAGE_INFO}}|M:{{PAGE_META_JSON}}",
            &[post("a", "A", None)],
            "me",
            &pages,
        )
        .unwrap();
        assert!(out.starts_with("P:- ID: a\n  Title: A|A:me|M:["));
        assert!(out.contains("\"type\": \"home\""));
        assert!(!out.contains("{{"));
    }
}
