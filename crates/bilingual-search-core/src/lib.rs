//! # Bilingual Search Core
//!
//! Shared, runtime-agnostic logic for Bilingual Search: data models,
//! Arabic/English text normalization, boolean query parsing, the ranking
//! formula, suggestion scoring, and the collaborator traits the
//! orchestrators in the `bilingual-search` app crate are written against.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem dependencies.
//! Every function here is either pure or goes through one of the
//! [`store`] / [`embedding`] traits.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Entity types, records, results, suggestions, queue items |
//! | [`text`] | Language detection and Arabic orthographic folding |
//! | [`query`] | Boolean query parsing and syntax validation |
//! | [`ranking`] | Exact/semantic score bands and result ordering |
//! | [`suggest`] | Typeahead candidate scoring |
//! | [`embedding`] | Embedding provider trait, vector helpers, embedding input text |
//! | [`store`] | Record store, embedding queue, and query history traits |

pub mod embedding;
pub mod models;
pub mod query;
pub mod ranking;
pub mod store;
pub mod suggest;
pub mod text;
