//! Statements: the short claims participants vote on.
//!
//! A statement is never hard-deleted. Removal is recorded as a
//! [`Deletion`] on the entity and every read path goes through
//! [`Statement::is_deleted`] / [`Statement::is_votable`].

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  error::EditLock,
  vote::VoteCounts,
};

pub const MIN_TEXT_LEN: usize = 10;
pub const MAX_TEXT_LEN: usize = 500;

// ─── Enums ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
  #[default]
  Claim,
  Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationStatus {
  Pending,
  Approved,
  Rejected,
}

/// Who removed a statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeletionReason {
  Moderation,
  Owner,
}

/// Soft-delete state. Statements are never removed from storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Deletion {
  #[default]
  Live,
  Deleted {
    reason: DeletionReason,
    at:     DateTime<Utc>,
  },
}

// ─── Statement ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
  pub statement_id:  Uuid,
  pub discussion_id: Uuid,
  pub author_id:     Uuid,
  pub text:          String,
  pub kind:          StatementKind,
  pub created_at:    DateTime<Utc>,
  pub edited_at:     Option<DateTime<Utc>>,
  pub moderation:    ModerationStatus,
  pub deletion:      Deletion,
  /// Authored by a moderator to seed the discussion.
  pub is_seed:       bool,
  pub flag_count:    u32,
  /// Denormalised tallies, maintained only by the store's vote path.
  pub counts:        VoteCounts,
}

impl Statement {
  pub fn is_deleted(&self) -> bool {
    matches!(self.deletion, Deletion::Deleted { .. })
  }

  /// Accepts votes: not deleted and not rejected by moderation.
  pub fn is_votable(&self) -> bool {
    !self.is_deleted() && self.moderation != ModerationStatus::Rejected
  }

  /// Eligible as a column of the vote matrix.
  pub fn is_active(&self) -> bool {
    !self.is_deleted() && self.moderation == ModerationStatus::Approved
  }

  /// Decide whether `editor_id` may replace the text at `now`.
  ///
  /// `voted_on_by_others` is whether any participant other than the author
  /// has a vote on record; the store supplies it.
  pub fn check_editable(
    &self,
    editor_id: Uuid,
    now: DateTime<Utc>,
    window: Duration,
    voted_on_by_others: bool,
  ) -> Result<()> {
    if editor_id != self.author_id {
      return Err(Error::NotAuthor {
        statement_id:   self.statement_id,
        participant_id: editor_id,
      });
    }
    let lock = if !self.is_votable() {
      Some(EditLock::Removed)
    } else if voted_on_by_others {
      Some(EditLock::VotedOn)
    } else if now - self.created_at > window {
      Some(EditLock::WindowElapsed)
    } else {
      None
    };
    match lock {
      Some(reason) => Err(Error::EditLocked { statement_id: self.statement_id, reason }),
      None => Ok(()),
    }
  }
}

// ─── NewStatement ────────────────────────────────────────────────────────────

/// Input to [`crate::store::DiscussionStore::create_statement`].
/// Timestamps, moderation status and counters are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewStatement {
  pub discussion_id: Uuid,
  pub author_id:     Uuid,
  pub text:          String,
  pub kind:          StatementKind,
  pub is_seed:       bool,
}

impl NewStatement {
  pub fn new(discussion_id: Uuid, author_id: Uuid, text: impl Into<String>) -> Self {
    Self {
      discussion_id,
      author_id,
      text: text.into(),
      kind: StatementKind::default(),
      is_seed: false,
    }
  }
}

// ─── Text rules ──────────────────────────────────────────────────────────────

/// Trim the text and check its length in characters.
pub fn validate_text(text: &str) -> Result<String> {
  let trimmed = text.trim();
  let len = trimmed.chars().count();
  if !(MIN_TEXT_LEN..=MAX_TEXT_LEN).contains(&len) {
    return Err(Error::TextLength { len, min: MIN_TEXT_LEN, max: MAX_TEXT_LEN });
  }
  Ok(trimmed.to_owned())
}

/// The form used for duplicate detection: lowercase, whitespace runs
/// collapsed to a single space.
pub fn normalize_text(text: &str) -> String {
  text
    .split_whitespace()
    .map(str::to_lowercase)
    .collect::<Vec<_>>()
    .join(" ")
}
