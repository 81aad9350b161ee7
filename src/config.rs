//! TOML configuration.
//!
//! Everything except secrets lives in the config file. Secrets are read from
//! the environment (optionally via `.env`):
//!
//! | Variable | Used by |
//! |----------|---------|
//! | `OPENAI_API_KEY` | `serve` (chat endpoint) |
//! | `NOTION_TOKEN` | `sync` |
//! | `NOTION_DATABASE_ID` | `sync`, when `[notion].database_id` is unset |
//! | `R2_ACCESS_KEY_ID`, `R2_SECRET_ACCESS_KEY` | `sync` (image rehost) |

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub content: ContentConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub chat: ChatConfig,
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub notion: Option<NotionConfig>,
    #[serde(default)]
    pub storage: Option<StorageConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContentConfig {
    /// Directory of published `.mdx` posts.
    pub blog_dir: PathBuf,
    #[serde(default = "default_authors_dir")]
    pub authors_dir: PathBuf,
    /// Author slug whose profile feeds the about-page section of the prompt.
    #[serde(default = "default_author")]
    pub about_author: String,
}

fn default_authors_dir() -> PathBuf {
    PathBuf::from("data/authors")
}
fn default_author() -> String {
    "nihei-seiji".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:3000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChatConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Persona prompt template with `{{ALL_POSTS_INFO}}`,
    /// `{{ABOUT_PAGE_INFO}}` and `{{PAGE_META_JSON}}` placeholders.
    #[serde(default = "default_prompt_path")]
    pub prompt_path: PathBuf,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            prompt_path: default_prompt_path(),
            api_base: default_api_base(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_prompt_path() -> PathBuf {
    PathBuf::from("data/chu-prompt.md")
}
fn default_api_base() -> String {
    "https://api.openai.com".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Base URL of the running `blogctl serve` instance.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Public site URL used when printing links.
    #[serde(default)]
    pub site_url: Option<String>,
    #[serde(default = "default_state_dir")]
    pub state_dir: PathBuf,
    #[serde(default = "default_transcript_key")]
    pub transcript_key: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            site_url: None,
            state_dir: default_state_dir(),
            transcript_key: default_transcript_key(),
        }
    }
}

impl ClientConfig {
    /// Prefix for printed links: the site URL if set, else the endpoint.
    pub fn link_base(&self) -> &str {
        self.site_url
            .as_deref()
            .unwrap_or(&self.endpoint)
            .trim_end_matches('/')
    }
}

fn default_endpoint() -> String {
    "http://127.0.0.1:3000".to_string()
}
fn default_state_dir() -> PathBuf {
    PathBuf::from(".blogctl")
}
fn default_transcript_key() -> String {
    crate::transcript::DEFAULT_TRANSCRIPT_KEY.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    #[serde(default)]
    pub database_id: Option<String>,
    /// Where `.mdx` files are written; defaults to `[content].blog_dir`.
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
    #[serde(default = "default_status_property")]
    pub status_property: String,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default = "default_notion_api_base")]
    pub api_base: String,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            database_id: None,
            output_dir: None,
            status_property: default_status_property(),
            author: default_author(),
            layout: default_layout(),
            api_base: default_notion_api_base(),
        }
    }
}

fn default_status_property() -> String {
    "publish_status".to_string()
}
fn default_layout() -> String {
    "PostSimple".to_string()
}
fn default_notion_api_base() -> String {
    "https://api.notion.com".to_string()
}

impl NotionConfig {
    /// Configured database id, falling back to `NOTION_DATABASE_ID`.
    pub fn resolve_database_id(&self) -> Result<String> {
        if let Some(id) = self.database_id.as_ref().filter(|id| !id.is_empty()) {
            return Ok(id.clone());
        }
        std::env::var("NOTION_DATABASE_ID")
            .ok()
            .filter(|id| !id.is_empty())
            .context("NOTION_DATABASE_ID is not set (set [notion].database_id or the env var)")
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// S3-compatible endpoint, e.g. `https://<account>.r2.cloudflarestorage.com`.
    pub endpoint: String,
    pub bucket: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Public base URL that serves objects from the bucket.
    pub cdn_base_url: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
}

fn default_region() -> String {
    "auto".to_string()
}
fn default_prefix() -> String {
    "notion-images".to_string()
}

impl StorageConfig {
    pub fn cdn_base(&self) -> &str {
        self.cdn_base_url.trim_end_matches('/')
    }
}

impl Config {
    /// Directory the sync writes posts into.
    pub fn output_dir(&self) -> PathBuf {
        self.notion
            .as_ref()
            .and_then(|n| n.output_dir.clone())
            .unwrap_or_else(|| self.content.blog_dir.clone())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.trim().is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.chat.model.trim().is_empty() {
        anyhow::bail!("chat.model must not be empty");
    }

    if config.chat.timeout_secs == 0 {
        anyhow::bail!("chat.timeout_secs must be > 0");
    }

    for (name, value) in [
        ("chat.api_base", &config.chat.api_base),
        ("client.endpoint", &config.client.endpoint),
    ] {
        if !value.starts_with("http://") && !value.starts_with("https://") {
            anyhow::bail!("{} must be an http(s) URL, got '{}'", name, value);
        }
    }

    if let Some(storage) = &config.storage {
        if storage.bucket.is_empty() {
            anyhow::bail!("storage.bucket must not be empty");
        }
        if !storage.cdn_base_url.starts_with("http") {
            anyhow::bail!(
                "storage.cdn_base_url must be an http(s) URL, got '{}'",
                storage.cdn_base_url
            );
        }
    }

    Ok(config)
}
