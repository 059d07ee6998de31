//! # Fitness RAG
//!
//! Retrieval-augmented question answering over a sports, fitness, and
//! cultural knowledge base, with answers in English, Arabic, or Persian.
//!
//! Documents are chunked, embedded, and stored in SQLite. Each query is
//! language-routed, translated to English when needed, expanded into
//! paraphrases, matched against the vector index, and answered by a hosted
//! chat model strictly from the retrieved passages. Progress is streamed to
//! the client as server-sent events. A separate endpoint checks standing
//! posture from an uploaded photo.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌─────────────┐   ┌──────────┐
//! │ Knowledge  │──▶│   Ingest     │──▶│  SQLite   │
//! │ md/pdf/json│   │ Chunk+Embed │   │ chunks+vec│
//! └────────────┘   └─────────────┘   └────┬─────┘
//!                                         │
//!     query ─▶ language ─▶ translate ─▶ expand ─▶ retrieve ─▶ generate ─▶ localize
//!                                                                          │
//!                                                            SSE / CLI ◀───┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! fitrag init                     # create database
//! fitrag index ./knowledge        # ingest documents
//! fitrag search "hiit benefits"   # inspect retrieval
//! fitrag ask "ما هي فوائد اليوغا؟"  # one-shot answer
//! fitrag serve                    # start HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types and pipeline events |
//! | [`error`] | Typed errors at the seams |
//! | [`extract`] | File text extraction (md, txt, pdf, json) |
//! | [`chunk`] | Text chunking |
//! | [`ingest`] | Index building |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`index`] | Vector index and lazy loading |
//! | [`expand`] | Query expansion |
//! | [`retriever`] | Multi-variant retrieval |
//! | [`language`] | Answer-language routing |
//! | [`translate`] | Translation and RTL formatting |
//! | [`llm`] | Chat-completion client |
//! | [`conversation`] | Bounded conversation history |
//! | [`generate`] | Grounded answer generation |
//! | [`images`] | Pose-image lookup |
//! | [`chat_log`] | Persistent exchange log |
//! | [`pipeline`] | Per-query orchestration |
//! | [`pose`] | Posture checker |
//! | [`server`] | HTTP server |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod chat_log;
pub mod chunk;
pub mod config;
pub mod conversation;
pub mod db;
pub mod embedding;
pub mod error;
pub mod expand;
pub mod extract;
pub mod generate;
pub mod images;
pub mod index;
pub mod ingest;
pub mod language;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod pose;
pub mod retriever;
pub mod server;
pub mod translate;
