//! # Bilingual Search
//!
//! Arabic/English search over a set of policy record types: boolean
//! full-text search, semantic (vector) search with keyword blending,
//! typeahead suggestions, and the background jobs that keep embeddings and
//! the suggestion cache fresh.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌──────────────────────────────┐
//!   query ──────▶ │ validate → parse → fan-out   │──▶ rank → merge → page
//!                 └──────────────┬───────────────┘
//!                                │ one branch per entity type
//!                     ┌──────────┴──────────┐
//!                     ▼                     ▼
//!               ┌──────────┐          ┌──────────┐
//!               │  SQLite  │          │  Cache   │ (degrades to no-op)
//!               │ FTS5+Vec │          └──────────┘
//!               └────┬─────┘
//!                    ▲
//!   embedding worker ┘  (queue → provider → store)
//! ```
//!
//! Pure logic (normalization, query parsing, ranking, suggestion scoring,
//! store traits) lives in `bilingual-search-core`; this crate adds
//! persistence, providers, caching, orchestration, and the CLI.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`db`] | SQLite connection pool |
//! | [`migrate`] | Schema setup |
//! | [`sqlite_store`] | Record store, embedding queue, query history on SQLite |
//! | [`embedding`] | OpenAI-compatible and Ollama embedding providers |
//! | [`cache`] | Cache facade with transparent degradation |
//! | [`sqlite_cache`] | Database-backed cache backend |
//! | [`budget`] | Per-request time budgets |
//! | [`detached`] | Awaitable fire-and-forget writes |
//! | [`error`] | Caller-facing errors |
//! | [`search`] | Full-text search orchestrator |
//! | [`semantic`] | Semantic search orchestrator |
//! | [`suggest`] | Typeahead suggestion service |
//! | [`embed_worker`] | Embedding queue processor |
//! | [`warmer`] | Suggestion cache warmer |
//! | [`import`] | JSON record import |
//! | [`service`] | Wiring of all of the above |
//! | [`commands`] | CLI command implementations |

pub mod budget;
pub mod cache;
pub mod commands;
pub mod config;
pub mod db;
pub mod detached;
pub mod embed_worker;
pub mod embedding;
pub mod error;
pub mod import;
pub mod migrate;
pub mod search;
pub mod semantic;
pub mod service;
pub mod sqlite_cache;
pub mod sqlite_store;
pub mod suggest;
pub mod warmer;
