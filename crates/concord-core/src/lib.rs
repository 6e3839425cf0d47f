//! Core types and trait definitions for the Concord discussion engine.
//!
//! This crate is deliberately free of database and linear-algebra
//! dependencies. Storage backends and the analysis pipeline depend on it; it
//! depends on neither.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod analysis;
pub mod config;
pub mod error;
pub mod ranking;
pub mod statement;
pub mod store;
pub mod vote;

pub use error::{Error, Result};
