//! Keeps one current analysis per discussion and decides when to recompute.
//!
//! A refresh runs under the store's per-discussion analysis lock. A second
//! refresh while one is in flight is dropped, not queued. A failed run
//! leaves the previous analysis in place.

use std::sync::Arc;

use concord_core::{
  analysis::ConsensusAnalysis,
  config::EngineConfig,
  store::DiscussionStore,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Error, Result, pipeline::analyze};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
  Refreshed(ConsensusAnalysis),
  /// Another run holds the discussion's lock.
  Skipped,
}

pub struct AnalysisCache<S> {
  store:  Arc<S>,
  config: Arc<EngineConfig>,
}

impl<S> Clone for AnalysisCache<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), config: self.config.clone() }
  }
}

fn store_err<E: std::error::Error + Send + Sync + 'static>(e: E) -> Error {
  Error::Store(Box::new(e))
}

impl<S: DiscussionStore> AnalysisCache<S> {
  pub fn new(store: Arc<S>, config: EngineConfig) -> Self {
    Self { store, config: Arc::new(config) }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn config(&self) -> &EngineConfig { &self.config }

  /// The current analysis, if one has ever succeeded.
  pub async fn current(&self, discussion_id: Uuid) -> Result<Option<ConsensusAnalysis>> {
    self.store.current_analysis(discussion_id).await.map_err(store_err)
  }

  /// Whether enough votes have arrived since the current analysis. A
  /// discussion without one is always stale.
  pub async fn is_stale(&self, discussion_id: Uuid) -> Result<bool> {
    let current = self.current(discussion_id).await?;
    self.is_stale_against(discussion_id, current.as_ref()).await
  }

  async fn is_stale_against(
    &self,
    discussion_id: Uuid,
    current: Option<&ConsensusAnalysis>,
  ) -> Result<bool> {
    let Some(current) = current else { return Ok(true) };
    let votes = self.store.discussion_vote_count(discussion_id).await.map_err(store_err)?;
    Ok(current.is_stale(votes, self.config.cache.refresh_vote_delta))
  }

  /// Make `analysis` current. Only this cache writes analyses.
  pub async fn replace(&self, analysis: &ConsensusAnalysis) -> Result<()> {
    self.store.replace_analysis(analysis).await.map_err(store_err)
  }

  /// Recompute now, regardless of staleness.
  pub async fn refresh_now(&self, discussion_id: Uuid) -> Result<RefreshOutcome> {
    let lease = self
      .store
      .try_acquire_analysis_lock(discussion_id, self.config.cache.lock_timeout())
      .await
      .map_err(store_err)?;
    let Some(lease) = lease else {
      info!(%discussion_id, "analysis already running; skipping refresh");
      return Ok(RefreshOutcome::Skipped);
    };

    let result = self.compute_and_store(discussion_id).await;
    let released = self.store.release_analysis_lock(lease).await.map_err(store_err);

    let analysis = result?;
    released?;
    Ok(RefreshOutcome::Refreshed(analysis))
  }

  async fn compute_and_store(&self, discussion_id: Uuid) -> Result<ConsensusAnalysis> {
    let snapshot = self.store.vote_snapshot(discussion_id).await.map_err(store_err)?;
    debug!(%discussion_id, votes = snapshot.vote_count(), "took vote snapshot");

    let config = self.config.clone();
    let analysis = tokio::task::spawn_blocking(move || analyze(&snapshot, &config))
      .await?
      .map_err(|e| match e {
        Error::Numerical(msg) => {
          warn!(%discussion_id, error = %msg, "numerical failure during analysis");
          Error::InsufficientData(msg)
        }
        other => other,
      })?;

    self.replace(&analysis).await?;
    Ok(analysis)
  }

  /// The current analysis, recomputed first if stale.
  ///
  /// When a refresh is skipped or finds too little data, an existing
  /// analysis is returned instead. With nothing to fall back on the
  /// caller gets [`Error::InsufficientData`].
  pub async fn get_or_refresh_analysis(&self, discussion_id: Uuid) -> Result<ConsensusAnalysis> {
    let current = self.current(discussion_id).await?;
    if !self.is_stale_against(discussion_id, current.as_ref()).await? {
      if let Some(current) = current {
        return Ok(current);
      }
    }

    match self.refresh_now(discussion_id).await {
      Ok(RefreshOutcome::Refreshed(analysis)) => Ok(analysis),
      Ok(RefreshOutcome::Skipped) => current
        .ok_or_else(|| Error::InsufficientData("analysis in progress".into())),
      Err(Error::InsufficientData(reason)) => match current {
        Some(current) => {
          warn!(%discussion_id, %reason, "refresh failed; keeping previous analysis");
          Ok(current)
        }
        None => Err(Error::InsufficientData(reason)),
      },
      Err(e) => Err(e),
    }
  }
}
