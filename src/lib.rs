//! # Blog Harness
//!
//! Tooling behind a personal blog: a Notion → MDX sync and a chat companion
//! that knows the published posts.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌────────────┐
//! │  Notion  │──▶│  sync + mdx  │──▶│ data/blog  │
//! └──────────┘   └──────┬───────┘   └─────┬──────┘
//!                       │ images          │ posts
//!                       ▼                 ▼
//!                 ┌──────────┐      ┌──────────┐      ┌──────────────┐
//!                 │ R2 / CDN │      │  server  │◀────▶│ chat client  │
//!                 └──────────┘      │ (axum)   │      │ (blogctl)    │
//!                                   └──────────┘      └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! blogctl sync            # publish ready posts, remove deleted ones
//! blogctl pages           # list navigable pages
//! blogctl serve           # start the chat API
//! blogctl chat            # talk to it from the terminal
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Messages, pages, posts |
//! | [`directive`] | Navigation / related-posts block scanner |
//! | [`markdown`] | Inline Markdown subset |
//! | [`view`] | Message → renderable elements |
//! | [`transcript`] | Transcript persistence |
//! | [`navigation`] | One-time navigation trigger |
//! | [`chat`] | Chat session over a transport |
//! | [`client`] | HTTP transport and terminal chat |
//! | [`pages`] | Post catalogue and page metadata |
//! | [`prompt`] | Persona system prompt |
//! | [`llm`] | Streaming model client |
//! | [`server`] | Chat HTTP server |
//! | [`mdx`] | MDX transforms for synced posts |
//! | [`notion`] | Notion content source |
//! | [`storage`] | S3-compatible object storage |
//! | [`sync`] | Notion → MDX sync |
//! | [`progress`] | Sync progress reporting |

pub mod chat;
pub mod client;
pub mod config;
pub mod directive;
pub mod llm;
pub mod markdown;
pub mod mdx;
pub mod models;
pub mod navigation;
pub mod notion;
pub mod pages;
pub mod progress;
pub mod prompt;
pub mod server;
pub mod storage;
pub mod sync;
pub mod transcript;
pub mod view;
