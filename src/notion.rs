//! Notion content source.
//!
//! Posts live in a Notion database whose `publish_status` select drives the
//! sync: `ready` posts are published, `delete` posts are removed, and the
//! sync writes `published` / `deleted` back.
//!
//! # Environment Variables
//!
//! - `NOTION_TOKEN`: integration token, required
//! - `NOTION_DATABASE_ID`: used when `[notion].database_id` is unset

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::future::{BoxFuture, FutureExt};
use serde_json::{json, Value};

use crate::config::NotionConfig;

const NOTION_VERSION: &str = "2022-06-28";
const PAGE_SIZE: u32 = 100;

/// The properties of a database row the sync cares about.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NotionPage {
    pub id: String,
    pub title: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    /// The `ID` unique-id property; names the output file.
    pub article_id: Option<i64>,
    pub created_time: Option<DateTime<Utc>>,
    pub last_edited_time: Option<DateTime<Utc>>,
}

fn first_plain_text(value: Option<&Value>) -> Option<String> {
    value?
        .as_array()?
        .first()?
        .get("plain_text")?
        .as_str()
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = value?.as_str()?;
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

impl NotionPage {
    /// Read a page object as returned by the database query endpoint.
    pub fn from_json(page: &Value, status_property: &str) -> Result<Self> {
        let id = page
            .get("id")
            .and_then(Value::as_str)
            .context("Notion page has no id")?
            .to_string();
        let empty = json!({});
        let props = page.get("properties").unwrap_or(&empty);

        let title = props
            .as_object()
            .and_then(|map| map.values().find(|p| p["type"] == "title"))
            .and_then(|p| first_plain_text(p.get("title")));

        Ok(Self {
            id,
            title,
            status: props[status_property]["select"]["name"]
                .as_str()
                .map(str::to_string),
            tags: props["tags"]["multi_select"]
                .as_array()
                .map(|tags| {
                    tags.iter()
                        .filter_map(|t| t["name"].as_str().map(str::to_string))
                        .collect()
                })
                .unwrap_or_default(),
            summary: first_plain_text(props["summary"].get("rich_text")),
            article_id: props["ID"]["unique_id"]["number"].as_i64(),
            created_time: timestamp(page.get("created_time")),
            last_edited_time: timestamp(page.get("last_edited_time")),
        })
    }

    pub fn display_title(&self) -> &str {
        self.title.as_deref().unwrap_or("Untitled")
    }
}

/// Where the sync reads posts from and reports status to.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn posts_with_status(&self, status: &str) -> Result<Vec<NotionPage>>;
    async fn page_markdown(&self, page_id: &str) -> Result<String>;
    async fn set_status(&self, page_id: &str, status: &str) -> Result<()>;
}

pub struct NotionClient {
    client: reqwest::Client,
    token: String,
    database_id: String,
    status_property: String,
    api_base: String,
}

impl NotionClient {
    pub fn from_env(config: &NotionConfig) -> Result<Self> {
        let token = std::env::var("NOTION_TOKEN")
            .ok()
            .filter(|t| !t.is_empty())
            .context("NOTION_TOKEN environment variable not set")?;
        Ok(Self::new(config, token, config.resolve_database_id()?))
    }

    pub fn new(config: &NotionConfig, token: String, database_id: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            database_id,
            status_property: config.status_property.clone(),
            api_base: config.api_base.trim_end_matches('/').to_string(),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.api_base, path))
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Notion-Version", NOTION_VERSION)
    }

    async fn send_json(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<Value> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("Notion request failed: {}", what))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            bail!(
                "Notion API error {} ({}): {}",
                status,
                what,
                body.chars().take(500).collect::<String>()
            );
        }
        Ok(resp.json().await?)
    }

    /// All database rows matching `filter`, following cursors.
    async fn query(&self, filter: Value) -> Result<Vec<Value>> {
        let path = format!("/v1/databases/{}/query", self.database_id);
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut body = json!({ "page_size": PAGE_SIZE, "filter": filter });
            if let Some(c) = &cursor {
                body["start_cursor"] = json!(c);
            }
            let page = self
                .send_json(self.request(reqwest::Method::POST, &path).json(&body), "query database")
                .await?;

            if let Some(batch) = page["results"].as_array() {
                results.extend(batch.iter().cloned());
            }
            cursor = page["next_cursor"].as_str().map(str::to_string);
            if page["has_more"].as_bool() != Some(true) || cursor.is_none() {
                break;
            }
        }

        Ok(results)
    }

    async fn children(&self, block_id: &str) -> Result<Vec<Value>> {
        let mut results = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut path = format!("/v1/blocks/{}/children?page_size={}", block_id, PAGE_SIZE);
            if let Some(c) = &cursor {
                path.push_str(&format!("&start_cursor={}", c));
            }
            let page = self
                .send_json(self.request(reqwest::Method::GET, &path), "list block children")
                .await?;

            if let Some(batch) = page["results"].as_array() {
                results.extend(batch.iter().cloned());
            }
            cursor = page["next_cursor"].as_str().map(str::to_string);
            if page["has_more"].as_bool() != Some(true) || cursor.is_none() {
                break;
            }
        }

        Ok(results)
    }

    fn block_tree<'a>(&'a self, block_id: &'a str) -> BoxFuture<'a, Result<Vec<BlockNode>>> {
        async move {
            let mut nodes = Vec::new();
            for block in self.children(block_id).await? {
                let children = match block["id"].as_str() {
                    Some(id) if block["has_children"].as_bool() == Some(true) => {
                        self.block_tree(id).await?
                    }
                    _ => Vec::new(),
                };
                nodes.push(BlockNode { block, children });
            }
            Ok(nodes)
        }
        .boxed()
    }
}

#[async_trait]
impl ContentSource for NotionClient {
    async fn posts_with_status(&self, status: &str) -> Result<Vec<NotionPage>> {
        let filter = json!({
            "property": self.status_property,
            "select": { "equals": status },
        });
        let mut posts = Vec::new();
        for raw in self.query(filter).await? {
            let page = NotionPage::from_json(&raw, &self.status_property)?;
            if page.status.as_deref() == Some(status) {
                posts.push(page);
            }
        }
        Ok(posts)
    }

    async fn page_markdown(&self, page_id: &str) -> Result<String> {
        let tree = self.block_tree(page_id).await?;
        Ok(blocks_to_markdown(&tree))
    }

    async fn set_status(&self, page_id: &str, status: &str) -> Result<()> {
        let body = json!({
            "properties": {
                self.status_property.as_str(): { "select": { "name": status } }
            }
        });
        self.send_json(
            self.request(reqwest::Method::PATCH, &format!("/v1/pages/{}", page_id))
                .json(&body),
            "update page status",
        )
        .await?;
        Ok(())
    }
}

// ============ Blocks → Markdown ============

/// A block with its fetched children.
#[derive(Debug, Clone)]
pub struct BlockNode {
    pub block: Value,
    pub children: Vec<BlockNode>,
}

impl BlockNode {
    pub fn leaf(block: Value) -> Self {
        Self {
            block,
            children: Vec::new(),
        }
    }
}

/// Rich text with annotations applied.
pub fn rich_text(items: &Value) -> String {
    let Some(items) = items.as_array() else {
        return String::new();
    };
    items
        .iter()
        .map(|item| {
            let mut text = item["plain_text"].as_str().unwrap_or_default().to_string();
            if text.trim().is_empty() {
                return text;
            }
            let a = &item["annotations"];
            if a["code"].as_bool() == Some(true) {
                text = format!("`{}`", text);
            }
            if a["bold"].as_bool() == Some(true) {
                text = format!("**{}**", text);
            }
            if a["italic"].as_bool() == Some(true) {
                text = format!("_{}_", text);
            }
            if a["strikethrough"].as_bool() == Some(true) {
                text = format!("~~{}~~", text);
            }
            if let Some(href) = item["href"].as_str() {
                text = format!("[{}]({})", text, href);
            }
            text
        })
        .collect()
}

fn plain_text(items: &Value) -> String {
    items
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|i| i["plain_text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

fn indent(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("  {}", line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_list_item(kind: &str) -> bool {
    matches!(kind, "bulleted_list_item" | "numbered_list_item" | "to_do")
}

/// Render one block; `ordinal` is its 1-based index in a numbered run.
fn render_block(node: &BlockNode, ordinal: usize) -> Option<String> {
    let kind = node.block["type"].as_str()?;
    let data = &node.block[kind];

    let text = match kind {
        "paragraph" => rich_text(&data["rich_text"]),
        "heading_1" => format!("# {}", rich_text(&data["rich_text"])),
        "heading_2" => format!("## {}", rich_text(&data["rich_text"])),
        "heading_3" => format!("### {}", rich_text(&data["rich_text"])),
        "bulleted_list_item" => format!("- {}", rich_text(&data["rich_text"])),
        "numbered_list_item" => format!("{}. {}", ordinal, rich_text(&data["rich_text"])),
        "to_do" => {
            let mark = if data["checked"].as_bool() == Some(true) { "x" } else { " " };
            format!("- [{}] {}", mark, rich_text(&data["rich_text"]))
        }
        "quote" => rich_text(&data["rich_text"])
            .lines()
            .map(|l| format!("> {}", l))
            .collect::<Vec<_>>()
            .join("\n"),
        "callout" => {
            let icon = data["icon"]["emoji"].as_str().map(|e| format!("{} ", e)).unwrap_or_default();
            format!("> {}{}", icon, rich_text(&data["rich_text"]))
        }
        "code" => format!(
            "```{}\n{}\n```",
            data["language"].as_str().unwrap_or_default(),
            plain_text(&data["rich_text"])
        ),
        "divider" => "---".to_string(),
        "image" => {
            let url = data["file"]["url"]
                .as_str()
                .or_else(|| data["external"]["url"].as_str())?;
            format!("![{}]({})", plain_text(&data["caption"]), url)
        }
        "bookmark" => {
            let url = data["url"].as_str()?;
            let caption = plain_text(&data["caption"]);
            let label = if caption.is_empty() { url } else { caption.as_str() };
            format!("[{}]({})", label, url)
        }
        other => {
            log::debug!("skipping unsupported block type '{}'", other);
            return None;
        }
    };

    if node.children.is_empty() {
        return Some(text);
    }
    let nested = blocks_to_markdown(&node.children);
    if is_list_item(kind) {
        Some(format!("{}\n{}", text, indent(&nested)))
    } else {
        Some(format!("{}\n\n{}", text, nested))
    }
}

/// Render a block tree. List items in a run are separated by single
/// newlines; everything else by blank lines.
pub fn blocks_to_markdown(nodes: &[BlockNode]) -> String {
    let mut out = String::new();
    let mut prev_list = false;
    let mut ordinal = 0;

    for node in nodes {
        let kind = node.block["type"].as_str().unwrap_or_default();
        ordinal = if kind == "numbered_list_item" { ordinal + 1 } else { 0 };
        let Some(rendered) = render_block(node, ordinal.max(1)) else {
            continue;
        };
        let list = is_list_item(kind);
        if !out.is_empty() {
            out.push_str(if list && prev_list { "\n" } else { "\n\n" });
        }
        out.push_str(&rendered);
        prev_list = list;
    }

    out
}
