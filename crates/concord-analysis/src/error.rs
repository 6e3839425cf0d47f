//! Error types for `concord-analysis`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Too few participants or statements to analyse. Expected while a
  /// discussion is young; callers treat it as "no analysis yet".
  #[error("insufficient data for analysis: {0}")]
  InsufficientData(String),

  /// Degenerate input the numeric code could not handle.
  #[error("numerical failure: {0}")]
  Numerical(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("analysis task failed: {0}")]
  Task(#[from] tokio::task::JoinError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
