//! # Mindful Chat
//!
//! Supportive conversation services over hosted or local language models.
//!
//! Two pipelines share one set of building blocks:
//!
//! ```text
//! retrieval-augmented:
//!   text ─▶ exit check ─▶ Retriever ─▶ assemble_context ─▶ build_request
//!                                                              │
//!        HistoryStore ◀── reply ◀── ResponseGenerator ◀────────┘
//!
//! sentiment:
//!   message ─▶ LexiconScorer ─▶ mood ──┐
//!   message ─▶ ResponseGenerator ──────┴─▶ {message, mood}
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! mindful init
//! mindful index ./knowledge
//! GROQ_API_KEY=... mindful serve rag
//! mindful serve sentiment         # local Ollama by default
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`models`] | Core data types |
//! | [`error`] | HTTP, generation and turn error types |
//! | [`commands`] | Exit-command recognition |
//! | [`context`] | Context assembly from retrieved passages |
//! | [`prompt`] | Prompt construction |
//! | [`history`] | Append-only conversation history |
//! | [`session`] | Per-session history store |
//! | [`sentiment`] | Lexicon sentiment scorer |
//! | [`http`] | Outbound JSON requests with retry |
//! | [`generation`] | Generation backends and reply normalization |
//! | [`embedding`] | Embedding providers and vector utilities |
//! | [`chunk`] | Passage splitting |
//! | [`db`] | Database connection |
//! | [`index`] | Index schema and directory indexing |
//! | [`retriever`] | Passage retrieval |
//! | [`pipeline`] | The two conversation pipelines |
//! | [`server`] | HTTP servers |
//! | [`chat_cmd`] | Terminal chat |

pub mod chat_cmd;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod error;
pub mod generation;
pub mod history;
pub mod http;
pub mod index;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod retriever;
pub mod sentiment;
pub mod server;
pub mod session;
