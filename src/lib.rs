//! # RAG Console
//!
//! A server-rendered front-end for a personal retrieval-augmented-generation
//! backend.
//!
//! The page has two forms: one sends a prompt and renders the markdown
//! answer, the other hands a website URL or a file to the backend for
//! ingestion. Retrieval, generation and ingestion all happen in the backend;
//! this crate only holds the form state, makes the calls, and renders the
//! results.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────────────────┐   ┌──────────────┐
//! │ Browser  │──▶│  ragc serve           │──▶│ RAG backend  │
//! │  forms   │   │  page + proxy (axum)  │   │ /api         │
//! └──────────┘   └───────────────────────┘   │ /ingest      │
//!                ┌───────────────────────┐   │ /ingest-file │
//!                │  ragc ask / ingest    │──▶│              │
//!                └───────────────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! ragc serve                          # page on http://127.0.0.1:3000
//! ragc ask "summarise my notes"       # one prompt from the terminal
//! ragc ingest url https://docs.rs     # crawl a site
//! ragc ingest file ./notes.md         # upload a file (5 MB max)
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`client`] | Backend HTTP client and error convention |
//! | [`markdown`] | Markdown to styled HTML |
//! | [`page`] | Form state and request flows |
//! | [`render`] | Server-side page rendering |
//! | [`server`] | Page host and reverse proxy |
//! | [`commands`] | CLI entry points |

pub mod client;
pub mod commands;
pub mod config;
pub mod markdown;
pub mod page;
pub mod render;
pub mod server;
