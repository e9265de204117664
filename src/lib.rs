//! # Docs Relay
//!
//! Republishes a tree of markdown documents into chat channels and keeps
//! them in sync.
//!
//! Every document is parsed into structured blocks, split into
//! message-sized chunks that never cut through a code block, routed to a
//! channel derived from its path (or looked up in a configured mapping),
//! and posted in order. In summary mode a single embed per document is
//! kept up to date by editing the relay's own last message.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌───────────┐   ┌───────────────┐   ┌───────────┐
//! │ fs watcher   │──▶│           │──▶│ parser        │──▶│ resolver  │
//! │ webhook/git  │   │   relay   │   │ chunk/summary │   │ (channel) │
//! │ refresh tick │──▶│  (events) │   └───────────────┘   └─────┬─────┘
//! └──────────────┘   └───────────┘                             ▼
//!                                                       ┌─────────────┐
//!                                                       │ deliver     │
//!                                                       │ → platform  │
//!                                                       └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! relay status                     # verify channels
//! relay publish --dry-run          # show routing and message counts
//! relay publish                    # publish every document
//! relay watch                      # publish local edits as they happen
//! relay serve                      # accept push webhooks
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`parser`] | Markdown structure extraction |
//! | [`chunk`] | Fence-aware message splitting |
//! | [`summary`] | Document summaries |
//! | [`render`] | Message bodies and embeds |
//! | [`channel`] | Channel name normalization and path mapping |
//! | [`platform`] | Chat platform abstraction |
//! | [`discord`] | Discord REST implementation |
//! | [`platform_memory`] | In-memory platform for tests and dry runs |
//! | [`resolver`] | Channel index and resolution |
//! | [`deliver`] | Publication and delivery reports |
//! | [`relay`] | Event ingestion and dispatch |
//! | [`connector_fs`] | Local document discovery |
//! | [`connector_git`] | Git pull and change listing |
//! | [`webhook`] | Push webhook verification and parsing |
//! | [`server`] | Webhook HTTP server |
//! | [`watch`] | File-system watch mode |
//! | [`publish`] | One-shot commands |
//! | [`status`] | Channel verification report |

pub mod channel;
pub mod chunk;
pub mod config;
pub mod connector_fs;
pub mod connector_git;
pub mod deliver;
pub mod discord;
pub mod models;
pub mod parser;
pub mod platform;
pub mod platform_memory;
pub mod publish;
pub mod relay;
pub mod render;
pub mod resolver;
pub mod server;
pub mod status;
pub mod summary;
pub mod watch;
pub mod webhook;
