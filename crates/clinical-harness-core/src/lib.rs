//! # Clinical Harness Core
//!
//! Everything between a nurse's question and a bulleted answer, with no
//! network, filesystem or async runtime dependencies:
//!
//! | Module | Role |
//! |--------|------|
//! | [`models`] | Corpus, documents, conversation turns |
//! | [`chunk`] | Paragraph-boundary chunking |
//! | [`embedding`] | `Embedder` trait and the hashing embedder |
//! | [`store`] | Vector index and versioned knowledge snapshots |
//! | [`classify`] | Keyword intent classifier and routing |
//! | [`retrieve`] | Route-aware retrieval and priority ranking |
//! | [`context`] | Bounded context assembly |
//! | [`completion`] | Completion service contract and prompt shaping |
//! | [`sanitize`] | Answer sanitizer and fact extraction |
//! | [`corrections`] | Known-incorrect fact rewrites |
//! | [`reference`] | Pre-verified reference answers and guards |
//! | [`fallback`] | Follow-up fallback decisions |
//! | [`fluids`] | Holliday-Segar fluid calculator |
//! | [`suggest`] | Follow-up question suggestions |
//! | [`corpus`] | Built-in corpus and reference-text parsing |
//! | [`pipeline`] | The end-to-end answer pipeline |
//!
//! Providers that call real models live in the application crate and plug
//! in through [`embedding::Embedder`] and [`completion::CompletionService`].

mod text;

pub mod chunk;
pub mod classify;
pub mod completion;
pub mod context;
pub mod corpus;
pub mod corrections;
pub mod embedding;
pub mod error;
pub mod fallback;
pub mod fluids;
pub mod models;
pub mod pipeline;
pub mod reference;
pub mod retrieve;
pub mod sanitize;
pub mod store;
pub mod suggest;

pub use error::PipelineError;
pub use pipeline::{Answer, AnswerSource, Pipeline, PipelineSettings};
