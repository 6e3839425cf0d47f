//! One analysis run: snapshot in, [`ConsensusAnalysis`] out.
//!
//! Everything here is synchronous and pure; the cache runs it on a blocking
//! thread.

use concord_core::{
  analysis::{ConsensusAnalysis, VoteSnapshot},
  config::EngineConfig,
};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
  Result,
  cluster::{Clustering, cluster},
  consensus::{Classification, classify},
  matrix::{VoteMatrix, participant_floor},
  reduce::{Projection, reduce},
};

/// Intermediate products of a run, kept for inspection and tests.
#[derive(Debug, Clone)]
pub struct AnalysisRun {
  pub matrix:         VoteMatrix,
  pub projection:     Projection,
  pub clustering:     Clustering,
  /// One entry per matrix row; `None` for participants below the floor.
  pub labels:         Vec<Option<usize>>,
  pub classification: Classification,
}

impl AnalysisRun {
  /// Participant ids grouped by cluster label.
  pub fn members(&self) -> Vec<Vec<Uuid>> {
    let mut groups = vec![Vec::new(); self.clustering.k];
    for (row, label) in self.labels.iter().enumerate() {
      if let Some(l) = label {
        groups[*l].push(self.matrix.participants()[row]);
      }
    }
    groups
  }
}

pub fn run(snapshot: &VoteSnapshot, config: &EngineConfig) -> Result<AnalysisRun> {
  let matrix = VoteMatrix::from_snapshot(snapshot);
  let floor = participant_floor(&config.matrix, matrix.cols());
  let rows = matrix.qualifying_rows(floor);
  debug!(
    discussion_id = %snapshot.discussion_id,
    participants = matrix.rows(),
    statements = matrix.cols(),
    qualifying = rows.len(),
    floor,
    "built vote matrix"
  );

  let projection = reduce(&matrix, &rows, &config.reducer)?;
  debug!(
    components = projection.components,
    explained = ?projection.explained_variance,
    "projected participants"
  );

  let clustering = cluster(&projection.coords, &config.cluster)?;
  let mut labels = vec![None; matrix.rows()];
  for (&row, &label) in projection.rows.iter().zip(&clustering.labels) {
    labels[row] = Some(label);
  }

  let classification = classify(&matrix, &labels, clustering.k, &config.consensus);

  info!(
    discussion_id = %snapshot.discussion_id,
    k = clustering.k,
    silhouette = clustering.silhouette,
    low_confidence = clustering.low_confidence,
    consensus = classification.consensus.len(),
    bridges = classification.bridges.len(),
    divisive = classification.divisive.len(),
    "analysis complete"
  );

  Ok(AnalysisRun { matrix, projection, clustering, labels, classification })
}

/// Run the pipeline and package the persisted result.
pub fn analyze(snapshot: &VoteSnapshot, config: &EngineConfig) -> Result<ConsensusAnalysis> {
  let run = run(snapshot, config)?;
  Ok(ConsensusAnalysis {
    analysis_id:       Uuid::new_v4(),
    discussion_id:     snapshot.discussion_id,
    computed_at:       snapshot.taken_at,
    cluster_count:     run.clustering.k,
    cluster_sizes:     run.clustering.sizes.clone(),
    silhouette:        run.clustering.silhouette,
    low_confidence:    run.clustering.low_confidence,
    participant_count: run.projection.rows.len(),
    consensus:         run.classification.consensus,
    bridges:           run.classification.bridges,
    divisive:          run.classification.divisive,
    statement_stats:   run.classification.stats,
    vote_count:        snapshot.vote_count(),
  })
}
