//! Notion → MDX sync.
//!
//! Two sequential phases:
//!
//! 1. **Publish**: every `ready` post is rendered to Markdown, its Notion
//!    images are copied to the bucket, MDX-hostile brackets are escaped, a
//!    front matter header is added, and `{id}.mdx` replaces any earlier
//!    files for the same article. The post is then marked `published`.
//! 2. **Delete**: every `delete` post has its files and their bucket images
//!    removed, then is marked `deleted`.
//!
//! A failing post is logged, counted in [`SyncReport::failed`], and skipped.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::Config;
use crate::mdx::{
    escape_angle_brackets, extract_image_urls, front_matter, infer_extension, is_notion_asset_url,
    post_files,
};
use crate::notion::{ContentSource, NotionPage};
use crate::progress::{SyncPhase, SyncProgressEvent, SyncProgressReporter};
use crate::storage::ObjectStore;

pub const STATUS_READY: &str = "ready";
pub const STATUS_PUBLISHED: &str = "published";
pub const STATUS_DELETE: &str = "delete";
pub const STATUS_DELETED: &str = "deleted";

/// A downloaded asset.
#[derive(Debug, Clone)]
pub struct Asset {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Downloads images for rehosting.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Asset>;
}

pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .build()?,
        })
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Asset> {
        let resp = self.client.get(url).send().await?;
        if !resp.status().is_success() {
            bail!("GET {} returned {}", url, resp.status());
        }
        let content_type = resp
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = resp.bytes().await?.to_vec();
        Ok(Asset {
            bytes,
            content_type,
        })
    }
}

/// Outcome of a sync run.
#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    /// Files written in the publish phase.
    pub published: Vec<PathBuf>,
    /// Posts removed in the delete phase.
    pub deleted: usize,
    pub failed: usize,
    pub images_uploaded: usize,
    pub images_removed: usize,
    /// Dry run only: posts that would be processed.
    pub planned: Vec<(SyncPhase, String)>,
}

/// Bucket access plus the public URL prefix that serves it.
pub struct ImageHost<'a> {
    pub store: &'a dyn ObjectStore,
    pub cdn_base: String,
    pub prefix: String,
}

struct Syncer<'a> {
    output_dir: PathBuf,
    author: String,
    layout: String,
    today: NaiveDate,
    source: &'a dyn ContentSource,
    images: Option<ImageHost<'a>>,
    fetcher: &'a dyn AssetFetcher,
    report: SyncReport,
}

/// Run both phases.
///
/// Without an [`ImageHost`] images are left pointing at Notion and old
/// files' bucket images are not cleaned up.
pub async fn run_sync(
    config: &Config,
    source: &dyn ContentSource,
    images: Option<ImageHost<'_>>,
    fetcher: &dyn AssetFetcher,
    progress: &dyn SyncProgressReporter,
    dry_run: bool,
) -> Result<SyncReport> {
    let notion = config.notion.clone().unwrap_or_default();

    let mut syncer = Syncer {
        output_dir: config.output_dir(),
        author: notion.author,
        layout: notion.layout,
        today: Utc::now().date_naive(),
        source,
        images,
        fetcher,
        report: SyncReport::default(),
    };

    if syncer.images.is_none() {
        log::warn!("no [storage] configured; Notion images will not be rehosted");
    }

    progress.report(SyncProgressEvent::Querying {
        phase: SyncPhase::Publish,
    });
    let ready = source.posts_with_status(STATUS_READY).await?;
    log::info!("{} post(s) ready to publish", ready.len());

    if !dry_run && !syncer.output_dir.exists() {
        std::fs::create_dir_all(&syncer.output_dir).with_context(|| {
            format!(
                "Failed to create output directory: {}",
                syncer.output_dir.display()
            )
        })?;
    }

    for (i, page) in ready.iter().enumerate() {
        progress.report(SyncProgressEvent::Post {
            phase: SyncPhase::Publish,
            n: i + 1,
            total: ready.len(),
            title: page.display_title().to_string(),
        });
        if dry_run {
            syncer
                .report
                .planned
                .push((SyncPhase::Publish, page.display_title().to_string()));
            continue;
        }
        match syncer.publish(page).await {
            Ok(path) => {
                log::info!("published '{}' -> {}", page.display_title(), path.display());
                syncer.report.published.push(path);
            }
            Err(e) => syncer.fail(progress, SyncPhase::Publish, page, e),
        }
    }

    progress.report(SyncProgressEvent::Querying {
        phase: SyncPhase::Delete,
    });
    let doomed = source.posts_with_status(STATUS_DELETE).await?;
    log::info!("{} post(s) marked for deletion", doomed.len());

    for (i, page) in doomed.iter().enumerate() {
        progress.report(SyncProgressEvent::Post {
            phase: SyncPhase::Delete,
            n: i + 1,
            total: doomed.len(),
            title: page.display_title().to_string(),
        });
        if dry_run {
            syncer
                .report
                .planned
                .push((SyncPhase::Delete, page.display_title().to_string()));
            continue;
        }
        match syncer.delete(page).await {
            Ok(()) => {
                log::info!("deleted '{}'", page.display_title());
                syncer.report.deleted += 1;
            }
            Err(e) => syncer.fail(progress, SyncPhase::Delete, page, e),
        }
    }

    Ok(syncer.report)
}

fn article_id(page: &NotionPage) -> Result<String> {
    page.article_id
        .map(|id| id.to_string())
        .with_context(|| format!("page {} has no ID number", page.id))
}

impl Syncer<'_> {
    fn fail(
        &mut self,
        progress: &dyn SyncProgressReporter,
        phase: SyncPhase,
        page: &NotionPage,
        err: anyhow::Error,
    ) {
        log::error!(
            "{} failed for '{}' ({}): {:#}",
            phase.as_str(),
            page.display_title(),
            page.id,
            err
        );
        progress.report(SyncProgressEvent::Failed {
            phase,
            title: page.display_title().to_string(),
            error: format!("{:#}", err),
        });
        self.report.failed += 1;
    }

    async fn publish(&mut self, page: &NotionPage) -> Result<PathBuf> {
        let id = article_id(page)?;
        let markdown = self.source.page_markdown(&page.id).await?;
        let markdown = self.rehost_images(markdown).await;
        let body = escape_angle_brackets(&markdown);
        let mdx = front_matter(page, &self.author, &self.layout, &body, self.today);

        let target = self.output_dir.join(format!("{}.mdx", id));
        for old in post_files(&self.output_dir, &id)? {
            self.remove_file_images(&old).await?;
            if old != target {
                std::fs::remove_file(&old)
                    .with_context(|| format!("Failed to remove {}", old.display()))?;
                log::info!("removed stale file {}", old.display());
            }
        }

        std::fs::write(&target, mdx)
            .with_context(|| format!("Failed to write {}", target.display()))?;
        self.source.set_status(&page.id, STATUS_PUBLISHED).await?;
        Ok(target)
    }

    async fn delete(&mut self, page: &NotionPage) -> Result<()> {
        let id = article_id(page)?;
        for file in post_files(&self.output_dir, &id)? {
            self.remove_file_images(&file).await?;
            std::fs::remove_file(&file)
                .with_context(|| format!("Failed to remove {}", file.display()))?;
            log::info!("removed {}", file.display());
        }
        self.source.set_status(&page.id, STATUS_DELETED).await?;
        Ok(())
    }

    /// Copy Notion-hosted images to the bucket and point the Markdown at
    /// the CDN. A failed image keeps its original URL.
    async fn rehost_images(&mut self, markdown: String) -> String {
        let Some(host) = &self.images else {
            return markdown;
        };

        let mut seen = HashSet::new();
        let mut result = markdown.clone();
        for url in extract_image_urls(&markdown) {
            if !is_notion_asset_url(&url) || !seen.insert(url.clone()) {
                continue;
            }
            match rehost_one(host, self.fetcher, &url).await {
                Ok(new_url) => {
                    log::info!("rehosted image -> {}", new_url);
                    result = result.replace(&url, &new_url);
                    self.report.images_uploaded += 1;
                }
                Err(e) => log::error!("image upload failed for {}: {:#}", url, e),
            }
        }
        result
    }

    async fn remove_file_images(&mut self, path: &Path) -> Result<()> {
        let Some(host) = &self.images else {
            return Ok(());
        };
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        for key in cdn_keys(&content, &host.cdn_base) {
            host.store.delete(&key).await?;
            log::info!("deleted bucket image {}", key);
            self.report.images_removed += 1;
        }
        Ok(())
    }
}

async fn rehost_one(host: &ImageHost<'_>, fetcher: &dyn AssetFetcher, url: &str) -> Result<String> {
    let asset = fetcher.fetch(url).await?;
    let content_type = asset
        .content_type
        .clone()
        .unwrap_or_else(|| "application/octet-stream".to_string());
    let ext = infer_extension(asset.content_type.as_deref(), url);
    let key = image_key(&host.prefix, &ext);
    host.store.put(&key, asset.bytes, &content_type).await?;
    Ok(format!("{}/{}", host.cdn_base, key))
}

/// `{prefix}/notion_{millis}_{random}{ext}`.
pub fn image_key(prefix: &str, ext: &str) -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!(
        "{}/notion_{}_{}{}",
        prefix.trim_end_matches('/'),
        Utc::now().timestamp_millis(),
        &random[..8],
        ext
    )
}

/// Bucket keys of the CDN-hosted images referenced by `content`.
pub fn cdn_keys(content: &str, cdn_base: &str) -> Vec<String> {
    let prefix = format!("{}/", cdn_base.trim_end_matches('/'));
    extract_image_urls(content)
        .into_iter()
        .filter_map(|url| url.strip_prefix(&prefix).map(str::to_string))
        .collect()
}
