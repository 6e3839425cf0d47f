//! Consensus, bridge and divisive classification.
//!
//! Rates count unsure votes in the denominator. Overall rates use every
//! voter in the matrix, clustered or not; per-cluster rates use only the
//! voters carrying that label.

use concord_core::{
  analysis::{GroupAgreement, StatementStats, StatementTag},
  config::ConsensusConfig,
  ranking::controversy,
  vote::{VoteCounts, VoteValue},
};
use uuid::Uuid;

use crate::matrix::VoteMatrix;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
  pub consensus: Vec<Uuid>,
  pub bridges:   Vec<Uuid>,
  pub divisive:  Vec<Uuid>,
  /// One entry per matrix column, in column order.
  pub stats:     Vec<StatementStats>,
}

/// Classify every statement in `matrix`. `labels` holds one entry per matrix
/// row; `None` marks a participant below the clustering floor.
pub fn classify(
  matrix: &VoteMatrix,
  labels: &[Option<usize>],
  k: usize,
  config: &ConsensusConfig,
) -> Classification {
  let mut out = Classification::default();

  for (col, &statement_id) in matrix.statements().iter().enumerate() {
    let mut overall = VoteCounts::default();
    let mut clusters = vec![VoteCounts::default(); k];
    for row in 0..matrix.rows() {
      let Some(value) = matrix.get(row, col) else { continue };
      overall.apply(None, value);
      if let Some(label) = labels.get(row).copied().flatten().filter(|l| *l < k) {
        clusters[label].apply(None, value);
      }
    }

    let overall_agreement = agreement(&overall);
    let cluster_agreement: Vec<GroupAgreement> = clusters.iter().map(agreement).collect();
    let score = controversy(&overall);
    let tags = tags_for(&overall_agreement, &cluster_agreement, score, config);

    for tag in &tags {
      match tag {
        StatementTag::Consensus => out.consensus.push(statement_id),
        StatementTag::Bridge => out.bridges.push(statement_id),
        StatementTag::Divisive => out.divisive.push(statement_id),
      }
    }
    out.stats.push(StatementStats {
      statement_id,
      overall: overall_agreement,
      clusters: cluster_agreement,
      controversy: score,
      tags,
    });
  }

  out
}

fn agreement(counts: &VoteCounts) -> GroupAgreement {
  GroupAgreement::new(counts.total(), counts.get(VoteValue::Agree))
}

fn tags_for(
  overall: &GroupAgreement,
  clusters: &[GroupAgreement],
  controversy: f64,
  config: &ConsensusConfig,
) -> Vec<StatementTag> {
  let mut tags = Vec::new();
  if (overall.voters as usize) < config.min_statement_votes {
    return tags;
  }

  // Near-empty clusters neither veto consensus nor count toward bridging.
  let rates: Vec<f64> = clusters
    .iter()
    .filter(|c| c.voters as usize >= config.min_cluster_voters)
    .map(|c| c.rate)
    .collect();

  if overall.rate >= config.consensus_overall
    && rates.iter().all(|r| *r >= config.consensus_cluster)
  {
    tags.push(StatementTag::Consensus);
  }

  if rates.len() >= 2 {
    let n = rates.len() as f64;
    let mean = rates.iter().sum::<f64>() / n;
    let variance = rates.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    if mean >= config.bridge_mean && variance < config.bridge_max_variance {
      tags.push(StatementTag::Bridge);
    }
  }

  if controversy >= config.divisive_min {
    tags.push(StatementTag::Divisive);
  }

  tags
}
