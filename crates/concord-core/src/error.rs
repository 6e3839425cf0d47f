//! Error types for `concord-core`.
//!
//! Every variant here is a caller-recoverable rejection of a write: it is
//! reported synchronously and never retried by the engine.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

/// Why an edit was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditLock {
  /// The edit window after creation has elapsed.
  WindowElapsed,
  /// Someone other than the author has already voted on the statement.
  VotedOn,
  /// The statement was soft-deleted or rejected by moderation.
  Removed,
}

impl fmt::Display for EditLock {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Self::WindowElapsed => "edit window elapsed",
      Self::VotedOn => "already voted on by other participants",
      Self::Removed => "statement removed",
    })
  }
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("statement not found: {0}")]
  StatementNotFound(Uuid),

  #[error("statement text must be {min}-{max} characters, got {len}")]
  TextLength { len: usize, min: usize, max: usize },

  #[error("duplicate statement; existing statement is {existing}")]
  Duplicate { existing: Uuid },

  #[error("invalid vote value: {0} (expected -1, 0 or 1)")]
  InvalidVoteValue(i64),

  #[error("invalid vote confidence: {0} (expected 1-5)")]
  InvalidConfidence(i64),

  #[error("statement {0} is not votable")]
  NotVotable(Uuid),

  #[error("statement {statement_id} is locked: {reason}")]
  EditLocked { statement_id: Uuid, reason: EditLock },

  #[error("participant {participant_id} is not the author of statement {statement_id}")]
  NotAuthor { statement_id: Uuid, participant_id: Uuid },

  #[error("unknown {field} value: {value:?}")]
  UnknownVariant { field: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  /// `true` for rejections caused by the shape of the caller's input, as
  /// opposed to the current state of the statement.
  pub fn is_validation(&self) -> bool {
    matches!(
      self,
      Self::TextLength { .. }
        | Self::Duplicate { .. }
        | Self::InvalidVoteValue(_)
        | Self::InvalidConfidence(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
