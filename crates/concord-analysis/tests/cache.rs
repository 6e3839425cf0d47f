//! End-to-end tests: SQLite store, analysis pipeline and cache together.

use std::sync::Arc;

use chrono::Duration;
use concord_analysis::{AnalysisCache, Error, RefreshOutcome};
use concord_core::{
  analysis::StatementTag,
  config::EngineConfig,
  statement::{ModerationStatus, NewStatement},
  store::DiscussionStore,
  vote::{NewVote, VoteValue},
};
use concord_store_sqlite::SqliteStore;
use uuid::Uuid;

use concord_core::vote::VoteValue::{Agree as A, Disagree as D};

const TEXTS: [&str; 4] = [
  "The park should stay open until midnight",
  "Bike lanes belong on the main street",
  "Parking fees should fund the library",
  "Streetlights on the river path need fixing",
];

struct Discussion {
  id:         Uuid,
  statements: Vec<Uuid>,
}

async fn cache(config: EngineConfig) -> AnalysisCache<SqliteStore> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  AnalysisCache::new(Arc::new(store), config)
}

async fn discussion(store: &SqliteStore, statements: usize) -> Discussion {
  let id = Uuid::new_v4();
  let mut ids = Vec::new();
  for text in &TEXTS[..statements] {
    let s = store
      .create_statement(NewStatement::new(id, Uuid::new_v4(), *text))
      .await
      .unwrap();
    ids.push(s.statement_id);
  }
  Discussion { id, statements: ids }
}

/// One new participant per row, voting the row left to right.
async fn vote_rows(store: &SqliteStore, d: &Discussion, rows: &[Vec<VoteValue>]) {
  for row in rows {
    let participant = Uuid::new_v4();
    for (statement_id, value) in d.statements.iter().zip(row) {
      store.cast_vote(NewVote::new(participant, *statement_id, *value)).await.unwrap();
    }
  }
}

fn blocs(n: usize) -> Vec<Vec<VoteValue>> {
  let mut rows = vec![vec![A, A, D]; n];
  rows.extend(vec![vec![D, D, A]; n]);
  rows
}

#[tokio::test]
async fn four_participants_are_insufficient() {
  let cache = cache(EngineConfig::default()).await;
  let d = discussion(cache.store(), 3).await;
  vote_rows(cache.store(), &d, &[vec![A, D, A], vec![D, A, D], vec![A, A, A], vec![D, D, D]]).await;

  let err = cache.get_or_refresh_analysis(d.id).await.unwrap_err();
  assert!(matches!(err, Error::InsufficientData(_)));
  assert!(cache.current(d.id).await.unwrap().is_none());
}

#[tokio::test]
async fn two_blocs_end_to_end() {
  let cache = cache(EngineConfig::default()).await;
  let d = discussion(cache.store(), 3).await;
  vote_rows(cache.store(), &d, &blocs(6)).await;

  let analysis = cache.get_or_refresh_analysis(d.id).await.unwrap();
  assert_eq!(analysis.discussion_id, d.id);
  assert_eq!(analysis.cluster_count, 2);
  assert_eq!(analysis.cluster_sizes, vec![6, 6]);
  assert_eq!(analysis.vote_count, 36);
  assert!(!analysis.low_confidence);

  // Each statement is an exact 6/6 split across 12 votes.
  let mut divisive = analysis.divisive.clone();
  divisive.sort();
  let mut expected = d.statements.clone();
  expected.sort();
  assert_eq!(divisive, expected);
  assert!(analysis.consensus.is_empty());
  assert!(analysis.bridges.is_empty());
  assert!(analysis.statement_stats.iter().all(|s| s.tags == vec![StatementTag::Divisive]));

  assert_eq!(cache.current(d.id).await.unwrap(), Some(analysis));
}

#[tokio::test]
async fn shared_statement_is_consensus_and_bridge() {
  let cache = cache(EngineConfig::default()).await;
  let d = discussion(cache.store(), 4).await;
  let mut rows = vec![vec![A, A, D, A]; 6];
  rows.extend(vec![vec![D, D, A, A]; 6]);
  vote_rows(cache.store(), &d, &rows).await;

  let analysis = cache.get_or_refresh_analysis(d.id).await.unwrap();
  assert_eq!(analysis.consensus, vec![d.statements[3]]);
  assert_eq!(analysis.bridges, vec![d.statements[3]]);
}

#[tokio::test]
async fn refreshes_only_after_vote_delta() {
  let mut config = EngineConfig::default();
  config.cache.refresh_vote_delta = 5;
  let cache = cache(config).await;
  let d = discussion(cache.store(), 3).await;
  vote_rows(cache.store(), &d, &blocs(6)).await;

  let first = cache.get_or_refresh_analysis(d.id).await.unwrap();
  assert!(!cache.is_stale(d.id).await.unwrap());

  vote_rows(cache.store(), &d, &[vec![A, A, D]]).await;
  assert!(!cache.is_stale(d.id).await.unwrap());
  let same = cache.get_or_refresh_analysis(d.id).await.unwrap();
  assert_eq!(same.analysis_id, first.analysis_id);

  vote_rows(cache.store(), &d, &[vec![D, D, A]]).await;
  assert!(cache.is_stale(d.id).await.unwrap());
  let fresh = cache.get_or_refresh_analysis(d.id).await.unwrap();
  assert_ne!(fresh.analysis_id, first.analysis_id);
  assert_eq!(fresh.vote_count, 42);
  assert_eq!(fresh.participant_count, 14);
}

#[tokio::test]
async fn busy_lock_skips_refresh() {
  let cache = cache(EngineConfig::default()).await;
  let d = discussion(cache.store(), 3).await;
  vote_rows(cache.store(), &d, &blocs(6)).await;

  let lease = cache
    .store()
    .try_acquire_analysis_lock(d.id, Duration::minutes(5))
    .await
    .unwrap()
    .expect("lock is free");

  assert_eq!(cache.refresh_now(d.id).await.unwrap(), RefreshOutcome::Skipped);
  let err = cache.get_or_refresh_analysis(d.id).await.unwrap_err();
  assert!(matches!(err, Error::InsufficientData(_)));
  assert!(cache.current(d.id).await.unwrap().is_none());

  cache.store().release_analysis_lock(lease).await.unwrap();
  assert!(matches!(cache.refresh_now(d.id).await.unwrap(), RefreshOutcome::Refreshed(_)));
}

#[tokio::test]
async fn refresh_releases_its_lock() {
  let cache = cache(EngineConfig::default()).await;
  let d = discussion(cache.store(), 3).await;
  vote_rows(cache.store(), &d, &blocs(2)).await;

  // Fails for lack of participants, but must not leave the lock held.
  assert!(matches!(cache.refresh_now(d.id).await, Err(Error::InsufficientData(_))));
  let lease = cache.store().try_acquire_analysis_lock(d.id, Duration::minutes(5)).await.unwrap();
  assert!(lease.is_some());
}

#[tokio::test]
async fn failed_refresh_keeps_previous_analysis() {
  let cache = cache(EngineConfig::default()).await;
  let d = discussion(cache.store(), 3).await;
  vote_rows(cache.store(), &d, &blocs(6)).await;
  let before = cache.get_or_refresh_analysis(d.id).await.unwrap();

  // With one active statement left there is nothing to project.
  for id in &d.statements[1..] {
    cache.store().set_moderation(*id, ModerationStatus::Rejected).await.unwrap();
  }
  assert!(matches!(cache.refresh_now(d.id).await, Err(Error::InsufficientData(_))));

  assert_eq!(cache.current(d.id).await.unwrap(), Some(before.clone()));
  let served = cache.get_or_refresh_analysis(d.id).await.unwrap();
  assert_eq!(served.analysis_id, before.analysis_id);
}
