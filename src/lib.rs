//! # Clinical Harness
//!
//! A nursing clinical-question assistant. Questions are classified by
//! intent, answered from a versioned knowledge snapshot with
//! reference-first retrieval, and returned as short, sanitized bullets
//! that never carry a known-incorrect value.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌──────────────────────────────────┐   ┌──────────┐
//! │  Corpus    │──▶│ clinical-harness-core Pipeline    │◀──│   CLI    │
//! │ static +   │   │ classify → retrieve → assemble →  │   │  (chx)   │
//! │ reference  │   │ complete → sanitize → fallback    │◀──│   HTTP   │
//! └────────────┘   └──────────┬─────────────┬─────────┘   └──────────┘
//!                             │             │
//!                       ┌─────▼─────┐ ┌─────▼──────┐
//!                       │ Embedder  │ │ Completion │
//!                       │ hash/HTTP │ │ openai/    │
//!                       │ fastembed │ │ local      │
//!                       └───────────┘ └────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`embedding`] | Embedding providers |
//! | [`completion`] | Chat-completion clients |
//! | [`engine`] | Corpus loading and pipeline wiring |
//! | [`commands`] | CLI command implementations |
//! | [`server`] | HTTP JSON server |

pub mod commands;
pub mod completion;
pub mod config;
pub mod embedding;
pub mod engine;
pub mod server;
