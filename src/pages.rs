//! Post catalogue and page metadata.
//!
//! Published posts are read from the blog directory: every `.mdx` / `.md`
//! file, recursively, with a YAML front matter block. A post whose header
//! does not parse is skipped with a warning. The page list the
//! chat client validates navigation targets against is the four static pages
//! followed by one entry per non-draft post.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::Path;
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{BlogPost, PageMeta, PageType};

/// Header fields of a post or author page. Unknown keys are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FrontMatter {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub date: Option<String>,
    pub tags: Option<Tags>,
    pub draft: bool,
    pub sort: Option<i64>,
    pub name: Option<String>,
    pub occupation: Option<String>,
    pub company: Option<String>,
    pub email: Option<String>,
    pub github: Option<String>,
    pub linkedin: Option<String>,
}

/// `tags: rust` and `tags: [rust, web]` are both accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Tags {
    One(String),
    Many(Vec<String>),
}

impl Tags {
    pub fn into_vec(self) -> Vec<String> {
        match self {
            Tags::One(tag) => vec![tag],
            Tags::Many(tags) => tags,
        }
    }
}

/// Split `content` into the raw YAML header and the body after it.
fn split_front_matter(content: &str) -> Option<(&str, &str)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let (header, after) = if let Some(after) = rest.strip_prefix("---") {
        ("", after)
    } else {
        let end = rest.find("\n---")?;
        (&rest[..end], &rest[end + 4..])
    };
    Some((header, after.trim_start_matches(['\r', '\n'])))
}

/// Parse the leading `---` block of `content` and return it with the body.
///
/// Content without a front matter block yields default fields and the whole
/// content as body.
pub fn parse_front_matter(content: &str) -> Result<(FrontMatter, &str)> {
    let Some((header, body)) = split_front_matter(content) else {
        return Ok((FrontMatter::default(), content));
    };
    if header.trim().is_empty() {
        return Ok((FrontMatter::default(), body));
    }
    let fields = serde_yaml::from_str(header).context("Invalid front matter")?;
    Ok((fields, body))
}

/// Read every post under `blog_dir`, drafts included.
pub fn load_posts(blog_dir: &Path) -> Result<Vec<BlogPost>> {
    if !blog_dir.exists() {
        bail!("Blog directory does not exist: {}", blog_dir.display());
    }

    let mut posts = Vec::new();
    for entry in WalkDir::new(blog_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let is_post = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("mdx") | Some("md")
        );
        if !is_post {
            continue;
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read post: {}", path.display()))?;
        let relative = path.strip_prefix(blog_dir).unwrap_or(path);
        let slug = relative
            .with_extension("")
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("/");
        match post_from_source(slug, &content) {
            Ok(post) => posts.push(post),
            Err(e) => log::warn!("skipping {}: {:#}", path.display(), e),
        }
    }

    sort_posts(&mut posts);
    Ok(posts)
}

/// Non-draft posts, in display order.
pub fn published_posts(blog_dir: &Path) -> Result<Vec<BlogPost>> {
    let mut posts = load_posts(blog_dir)?;
    posts.retain(|p| !p.draft);
    Ok(posts)
}

fn post_from_source(slug: String, content: &str) -> Result<BlogPost> {
    let (fields, _) = parse_front_matter(content)?;
    let non_empty = |value: Option<String>| value.filter(|s| !s.is_empty());

    Ok(BlogPost {
        title: non_empty(fields.title).unwrap_or_else(|| slug.clone()),
        summary: non_empty(fields.summary),
        date: non_empty(fields.date),
        tags: fields.tags.map(Tags::into_vec).unwrap_or_default(),
        draft: fields.draft,
        sort: fields.sort,
        slug,
    })
}

/// Descending `sort`, then newest first, then slug for stability.
pub fn sort_posts(posts: &mut [BlogPost]) {
    posts.sort_by(|a, b| {
        b.sort
            .unwrap_or(0)
            .cmp(&a.sort.unwrap_or(0))
            .then_with(|| b.date.cmp(&a.date))
            .then_with(|| a.slug.cmp(&b.slug))
    });
}

/// The static pages followed by one entry per post.
pub fn build_page_meta(posts: &[BlogPost]) -> Vec<PageMeta> {
    let mut pages = vec![
        PageMeta::new("/", "Home", PageType::Home),
        PageMeta::new("/blog", "Blog", PageType::Blog),
        PageMeta::new("/projects", "Projects", PageType::Project),
        PageMeta::new("/about", "About", PageType::About),
    ];
    pages.extend(
        posts
            .iter()
            .filter(|post| !post.draft)
            .map(|post| PageMeta::new(format!("/blog/{}", post.slug), &post.title, PageType::Blog)),
    );
    pages
}

/// Page list for the configured content directory.
pub fn page_meta_for(config: &Config) -> Result<Vec<PageMeta>> {
    let posts = published_posts(&config.content.blog_dir)?;
    Ok(build_page_meta(&posts))
}

/// `blogctl pages`: print the page list.
pub fn list_pages(config: &Config, json: bool) -> Result<()> {
    let pages = page_meta_for(config)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
        return Ok(());
    }

    println!("{:<8} {:<40} TITLE", "TYPE", "PATH");
    for page in &pages {
        let kind = serde_json::to_value(page.page_type)?;
        println!(
            "{:<8} {:<40} {}",
            kind.as_str().unwrap_or_default(),
            page.path,
            page.title
        );
    }
    println!("{} pages", pages.len());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_and_lists() {
        let src = "---\ntitle: \"Hello: world\"\ndate: '2024-01-02'\ntags: ['rust', 'web']\ndraft: false\n---\n\nBody text";
        let (fields, body) = parse_front_matter(src).unwrap();
        assert_eq!(fields.title.as_deref(), Some("Hello: world"));
        assert_eq!(fields.date.as_deref(), Some("2024-01-02"));
        assert_eq!(
            fields.tags,
            Some(Tags::Many(vec!["rust".to_string(), "web".to_string()]))
        );
        assert!(!fields.draft);
        assert_eq!(body, "Body text");
    }

    #[test]
    fn yaml_quoting_and_comments() {
        let src = "---\ntitle: 'It''s live'\ntags: ['a, b', 'c']\ndraft: true # not ready\nsort: 3\n---\n";
        let (fields, _) = parse_front_matter(src).unwrap();
        assert_eq!(fields.title.as_deref(), Some("It's live"));
        assert_eq!(
            fields.tags.unwrap().into_vec(),
            vec!["a, b".to_string(), "c".to_string()]
        );
        assert!(fields.draft);
        assert_eq!(fields.sort, Some(3));
    }

    #[test]
    fn block_lists_and_single_tag() {
        let src = "---\ntags:\n  - a\n  - 'b'\nname: X\n---\n";
        let (fields, _) = parse_front_matter(src).unwrap();
        assert_eq!(fields.tags.unwrap().into_vec(), vec!["a", "b"]);
        assert_eq!(fields.name.as_deref(), Some("X"));

        let (fields, _) = parse_front_matter("---\ntags: rust\n---\n").unwrap();
        assert_eq!(fields.tags, Some(Tags::One("rust".to_string())));
    }

    #[test]
    fn no_front_matter() {
        let (fields, body) = parse_front_matter("# Title\n").unwrap();
        assert!(fields.title.is_none());
        assert_eq!(body, "# Title\n");

        let (fields, body) = parse_front_matter("---\n---\nBody").unwrap();
        assert!(fields.tags.is_none());
        assert_eq!(body, "Body");
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        assert!(parse_front_matter("---\ntitle: [unclosed\n---\n").is_err());
    }

    #[test]
    fn commented_draft_stays_out_of_page_meta() {
        let tmp = tempfile::TempDir::new().unwrap();
        std::fs::write(
            tmp.path().join("1.mdx"),
            "---\ntitle: \"Soon\"\ndraft: true # not ready\n---\nx",
        )
        .unwrap();
        std::fs::write(
            tmp.path().join("2.mdx"),
            "---\ntitle: [broken\n---\nx",
        )
        .unwrap();
        std::fs::write(tmp.path().join("3.mdx"), "---\ntitle: Live\n---\nx").unwrap();

        let posts = published_posts(tmp.path()).unwrap();
        let slugs: Vec<&str> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["3"]);
        let pages = build_page_meta(&posts);
        assert!(pages.iter().all(|p| p.path != "/blog/1"));
    }

    #[test]
    fn loads_posts_and_skips_drafts() {
        let tmp = tempfile::TempDir::new().unwrap();
        let dir = tmp.path();
        std::fs::create_dir_all(dir.join("series")).unwrap();
        std::fs::write(
            dir.join("1.mdx"),
            "---\ntitle: \"First\"\ndate: '2024-01-01'\ndraft: false\n---\nx",
        )
        .unwrap();
        std::fs::write(
            dir.join("2.mdx"),
            "---\ntitle: \"Second\"\ndate: '2024-02-01'\ndraft: true\n---\nx",
        )
        .unwrap();
        std::fs::write(
            dir.join("series").join("part.md"),
            "---\ntitle: Part\ndate: '2024-03-01'\nsummary: \"A part\"\n---\nx",
        )
        .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let posts = published_posts(dir).unwrap();
        let slugs: Vec<&str> = posts.iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, vec!["series/part", "1"]);
        assert_eq!(posts[0].summary.as_deref(), Some("A part"));

        let pages = build_page_meta(&posts);
        assert_eq!(pages.len(), 6);
        assert_eq!(pages[4].path, "/blog/series/part");
        assert_eq!(pages[4].page_type, PageType::Blog);
    }

    #[test]
    fn sort_field_wins_over_date() {
        let mut posts = vec![
            post_from_source("old".into(), "---\ndate: '2020-01-01'\nsort: 5\n---\n").unwrap(),
            post_from_source("new".into(), "---\ndate: '2024-01-01'\n---\n").unwrap(),
        ];
        sort_posts(&mut posts);
        assert_eq!(posts[0].slug, "old");
    }

    #[test]
    fn missing_blog_dir_is_an_error() {
        assert!(load_posts(Path::new("/definitely/not/here")).is_err());
    }
}
