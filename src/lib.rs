//! # suitegen
//!
//! Generate API test suites from OpenAPI descriptions and refine them with
//! free-text feedback.
//!
//! suitegen digests an uploaded OpenAPI 3 / Swagger 2 document, asks a
//! text-generation backend for a JUnit 5 test suite, and stores the result
//! as an immutable artifact under an opaque key. Feedback on an artifact
//! produces a new artifact whose provenance points back at its parent, so
//! every refinement extends a chain instead of overwriting history.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌──────────────┐   ┌──────────┐
//! │   Upload   │──▶│   Digest   │──▶│    Engine    │──▶│  SQLite  │
//! │ JSON/YAML  │   │ (core)     │   │ prompt+LLM   │   │ artifacts│
//! └────────────┘   └────────────┘   └──────────────┘   └────┬─────┘
//!                                                           │
//!                                  ┌────────────────────────┤
//!                                  ▼                        ▼
//!                            ┌──────────┐             ┌──────────┐
//!                            │   CLI    │             │   HTTP   │
//!                            │(suitegen)│             │  (axum)  │
//!                            └──────────┘             └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`backend`] | Text-generation backends (OpenAI-compatible, Ollama) |
//! | [`engine`] | Prompt construction and backend delegation |
//! | [`controller`] | Generate / regenerate / download pipelines |
//! | [`sqlite_store`] | Durable artifact store |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema creation |
//!
//! Digesting, prompt assembly, models and the store trait live in the
//! runtime-free `suitegen-core` crate.

pub mod backend;
pub mod config;
pub mod controller;
pub mod db;
pub mod engine;
pub mod migrate;
pub mod server;
pub mod sqlite_store;
