//! Analysis inputs and results shared between the store and the pipeline.
//!
//! A [`ConsensusAnalysis`] is replaced wholesale on every successful run;
//! per-participant cluster labels are never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::vote::VoteValue;

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// One cast vote as read for analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CastVote {
  pub participant_id: Uuid,
  pub statement_id:   Uuid,
  pub value:          VoteValue,
}

/// A consistent read of a discussion's active statements and their votes,
/// taken in a single transaction at the start of an analysis run.
#[derive(Debug, Clone)]
pub struct VoteSnapshot {
  pub discussion_id: Uuid,
  pub taken_at:      DateTime<Utc>,
  /// Approved, live statements in creation order.
  pub statement_ids: Vec<Uuid>,
  /// Every vote on a statement in `statement_ids`.
  pub votes:         Vec<CastVote>,
}

impl VoteSnapshot {
  pub fn vote_count(&self) -> u64 { self.votes.len() as u64 }
}

// ─── Results ─────────────────────────────────────────────────────────────────

/// Agreement among one group of voters on one statement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GroupAgreement {
  pub voters: u32,
  pub agree:  u32,
  /// `agree / voters`, with unsure votes in the denominator.
  pub rate:   f64,
}

impl GroupAgreement {
  pub fn new(voters: u32, agree: u32) -> Self {
    let rate = if voters == 0 { 0.0 } else { f64::from(agree) / f64::from(voters) };
    Self { voters, agree, rate }
  }
}

/// Labels a statement can carry. Consensus and bridge may overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementTag {
  Consensus,
  Bridge,
  Divisive,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementStats {
  pub statement_id: Uuid,
  pub overall:      GroupAgreement,
  /// Indexed by cluster label.
  pub clusters:     Vec<GroupAgreement>,
  pub controversy:  f64,
  pub tags:         Vec<StatementTag>,
}

/// The persisted outcome of one analysis run for a discussion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusAnalysis {
  pub analysis_id:       Uuid,
  pub discussion_id:     Uuid,
  /// When the snapshot behind this analysis was read.
  pub computed_at:       DateTime<Utc>,
  pub cluster_count:     usize,
  pub cluster_sizes:     Vec<usize>,
  pub silhouette:        f64,
  /// Silhouette fell below the configured floor; cluster-derived content
  /// may be hidden, statement tags remain valid.
  pub low_confidence:    bool,
  /// Participants that qualified for clustering.
  pub participant_count: usize,
  pub consensus:         Vec<Uuid>,
  pub bridges:           Vec<Uuid>,
  pub divisive:          Vec<Uuid>,
  pub statement_stats:   Vec<StatementStats>,
  /// Discussion vote count when the snapshot was read.
  pub vote_count:        u64,
}

impl ConsensusAnalysis {
  /// Whether the discussion has accumulated `delta` or more votes since
  /// this snapshot.
  pub fn is_stale(&self, current_vote_count: u64, delta: u64) -> bool {
    current_vote_count.saturating_sub(self.vote_count) >= delta
  }
}
