//! Tunable thresholds for the store, the analysis pipeline, and the ranker.
//!
//! Every struct deserialises with `#[serde(default)]`, so a configuration
//! file only needs to name the values it overrides.

use serde::{Deserialize, Serialize};

use crate::statement::ModerationStatus;

/// The full set of engine tunables, grouped by component.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  pub store:     StoreConfig,
  pub matrix:    MatrixConfig,
  pub reducer:   ReducerConfig,
  pub cluster:   ClusterConfig,
  pub consensus: ConsensusConfig,
  pub ranking:   RankingConfig,
  pub cache:     CacheConfig,
}

// ─── Store ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
  /// Seconds after creation during which the author may edit a statement.
  pub edit_window_secs:   i64,
  /// Moderation status assigned to newly created statements.
  pub default_moderation: ModerationStatus,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      edit_window_secs:   600,
      default_moderation: ModerationStatus::Approved,
    }
  }
}

impl StoreConfig {
  pub fn edit_window(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.edit_window_secs)
  }
}

// ─── Analysis ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatrixConfig {
  /// Votes a participant needs before their row is used for clustering.
  /// Capped at the statement count of the discussion.
  pub min_votes_per_participant: usize,
}

impl Default for MatrixConfig {
  fn default() -> Self { Self { min_votes_per_participant: 5 } }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReducerConfig {
  pub components:       usize,
  pub max_components:   usize,
  /// Qualifying participants required before any analysis runs.
  pub min_participants: usize,
}

impl Default for ReducerConfig {
  fn default() -> Self {
    Self { components: 2, max_components: 10, min_participants: 10 }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
  pub min_k:            usize,
  pub max_k:            usize,
  /// Below this silhouette the clustering is flagged low-confidence.
  pub silhouette_floor: f64,
  pub max_iterations:   usize,
}

impl Default for ClusterConfig {
  fn default() -> Self {
    Self {
      min_k:            2,
      max_k:            5,
      silhouette_floor: 0.15,
      max_iterations:   100,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
  pub consensus_overall:   f64,
  pub consensus_cluster:   f64,
  pub bridge_mean:         f64,
  pub bridge_max_variance: f64,
  pub divisive_min:        f64,
  /// Clusters with fewer voters on a statement are left out of per-cluster
  /// checks.
  pub min_cluster_voters:  usize,
  /// Statements with fewer votes are left out of every classification.
  pub min_statement_votes: usize,
}

impl Default for ConsensusConfig {
  fn default() -> Self {
    Self {
      consensus_overall:   0.70,
      consensus_cluster:   0.60,
      bridge_mean:         0.65,
      bridge_max_variance: 0.15,
      divisive_min:        0.70,
      min_cluster_voters:  5,
      min_statement_votes: 10,
    }
  }
}

// ─── Ranking ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RankingConfig {
  /// Two-sided confidence level of the Wilson interval.
  pub wilson_confidence:       f64,
  /// Statements below this vote count are hidden from the controversial sort.
  pub controversial_min_votes: u32,
}

impl Default for RankingConfig {
  fn default() -> Self {
    Self { wilson_confidence: 0.95, controversial_min_votes: 10 }
  }
}

// ─── Cache ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Growth in a discussion's vote count that makes its snapshot stale.
  pub refresh_vote_delta: u64,
  /// Seconds after which an unreleased analysis lock may be taken over.
  pub lock_timeout_secs:  i64,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self { refresh_vote_delta: 50, lock_timeout_secs: 300 }
  }
}

impl CacheConfig {
  pub fn lock_timeout(&self) -> chrono::Duration {
    chrono::Duration::seconds(self.lock_timeout_secs)
  }
}
