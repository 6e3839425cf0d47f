//! The `DiscussionStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g.
//! `concord-store-sqlite`). It is the only path that mutates statements,
//! votes and their denormalised counters, and the only writer of
//! [`ConsensusAnalysis`] rows.

use std::future::Future;

use chrono::Duration;
use uuid::Uuid;

use crate::{
  analysis::{ConsensusAnalysis, VoteSnapshot},
  ranking::SortOrder,
  statement::{ModerationStatus, NewStatement, Statement},
  vote::{Flag, FlagResult, NewVote, Vote, VoteResult},
};

// ─── Query type ──────────────────────────────────────────────────────────────

/// Parameters for [`DiscussionStore::list_statements`].
#[derive(Debug, Clone)]
pub struct StatementQuery {
  pub sort:            SortOrder,
  /// Zero-based page index.
  pub page:            usize,
  pub per_page:        usize,
  /// Also list statements still awaiting moderation.
  pub include_pending: bool,
}

impl Default for StatementQuery {
  fn default() -> Self {
    Self {
      sort:            SortOrder::default(),
      page:            0,
      per_page:        50,
      include_pending: false,
    }
  }
}

/// Proof that the caller holds a discussion's analysis lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisLease {
  pub discussion_id: Uuid,
  pub lease_id:      Uuid,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a Concord storage backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait DiscussionStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Statements ────────────────────────────────────────────────────────

  /// Validate and persist a new statement. Rejects text that duplicates a
  /// live statement in the same discussion, ignoring case and whitespace.
  fn create_statement(
    &self,
    input: NewStatement,
  ) -> impl Future<Output = Result<Statement, Self::Error>> + Send + '_;

  fn get_statement(
    &self,
    statement_id: Uuid,
  ) -> impl Future<Output = Result<Option<Statement>, Self::Error>> + Send + '_;

  /// Replace a statement's text. Only the author may edit, only inside the
  /// edit window, and only while no one else has voted on it.
  fn edit_statement(
    &self,
    statement_id: Uuid,
    editor_id: Uuid,
    new_text: String,
  ) -> impl Future<Output = Result<Statement, Self::Error>> + Send + '_;

  /// Record a moderation decision. Rejection soft-deletes the statement.
  fn set_moderation(
    &self,
    statement_id: Uuid,
    status: ModerationStatus,
  ) -> impl Future<Output = Result<Statement, Self::Error>> + Send + '_;

  /// Soft-delete a statement at its author's request.
  fn remove_statement(
    &self,
    statement_id: Uuid,
    requester_id: Uuid,
  ) -> impl Future<Output = Result<Statement, Self::Error>> + Send + '_;

  /// Record a flag for human review. At most one flag per reporter counts.
  fn flag_statement(
    &self,
    statement_id: Uuid,
    reporter_id: Uuid,
    reason: Option<String>,
  ) -> impl Future<Output = Result<FlagResult, Self::Error>> + Send + '_;

  /// Every flag raised on a statement, oldest first, for human review.
  fn flags_for_statement(
    &self,
    statement_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Flag>, Self::Error>> + Send + '_;

  /// Visible statements of a discussion, ranked and paginated.
  fn list_statements<'a>(
    &'a self,
    discussion_id: Uuid,
    query: &'a StatementQuery,
  ) -> impl Future<Output = Result<Vec<Statement>, Self::Error>> + Send + 'a;

  // ── Votes ─────────────────────────────────────────────────────────────

  /// Cast or change a vote. The vote row and the statement's counters are
  /// written in one transaction.
  fn cast_vote(
    &self,
    input: NewVote,
  ) -> impl Future<Output = Result<VoteResult, Self::Error>> + Send + '_;

  fn get_vote(
    &self,
    participant_id: Uuid,
    statement_id: Uuid,
  ) -> impl Future<Output = Result<Option<Vote>, Self::Error>> + Send + '_;

  fn votes_for_statement(
    &self,
    statement_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Vote>, Self::Error>> + Send + '_;

  // ── Analysis ──────────────────────────────────────────────────────────

  /// Total votes on the discussion's live statements, from the counters.
  fn discussion_vote_count(
    &self,
    discussion_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Read active statements and their votes in one transaction.
  fn vote_snapshot(
    &self,
    discussion_id: Uuid,
  ) -> impl Future<Output = Result<VoteSnapshot, Self::Error>> + Send + '_;

  fn current_analysis(
    &self,
    discussion_id: Uuid,
  ) -> impl Future<Output = Result<Option<ConsensusAnalysis>, Self::Error>> + Send + '_;

  /// Make `analysis` the current one for its discussion. Earlier rows are
  /// kept but no longer current.
  fn replace_analysis<'a>(
    &'a self,
    analysis: &'a ConsensusAnalysis,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Try to take the per-discussion analysis lock. Returns `None` while
  /// another unexpired lease is held.
  fn try_acquire_analysis_lock(
    &self,
    discussion_id: Uuid,
    timeout: Duration,
  ) -> impl Future<Output = Result<Option<AnalysisLease>, Self::Error>> + Send + '_;

  /// Release a lease. Releasing an expired or taken-over lease is a no-op.
  fn release_analysis_lock(
    &self,
    lease: AnalysisLease,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;
}
