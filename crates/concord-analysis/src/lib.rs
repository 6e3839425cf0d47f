//! Opinion clustering and consensus detection for Concord discussions.
//!
//! Data flows one way: a [`VoteSnapshot`](concord_core::analysis::VoteSnapshot)
//! becomes a [`matrix::VoteMatrix`], is projected by [`reduce`], partitioned
//! by [`cluster`], and classified by [`consensus`]. [`cache::AnalysisCache`]
//! decides when to run that pipeline and persists the result.

pub mod cache;
pub mod cluster;
pub mod consensus;
pub mod error;
pub mod matrix;
pub mod pipeline;
pub mod reduce;

pub use cache::{AnalysisCache, RefreshOutcome};
pub use error::{Error, Result};
pub use pipeline::{AnalysisRun, analyze, run};
