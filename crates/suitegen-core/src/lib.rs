//! # suitegen core
//!
//! Runtime-free logic for suitegen: the error taxonomy, artifact and digest
//! models, API-description digesting, prompt assembly, and the artifact
//! store abstraction.
//!
//! This crate contains no tokio, sqlx, network or filesystem I/O. The
//! application crate supplies the text-generation backend, the durable
//! store and the HTTP/CLI surfaces on top of it.

pub mod digest;
pub mod error;
pub mod models;
pub mod prompt;
pub mod store;

pub use error::{PipelineError, Result};
