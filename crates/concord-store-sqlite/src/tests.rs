//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use concord_core::{
  Error as CoreError,
  analysis::ConsensusAnalysis,
  error::EditLock,
  ranking::SortOrder,
  statement::{Deletion, DeletionReason, ModerationStatus, NewStatement, StatementKind},
  store::{DiscussionStore, StatementQuery},
  vote::{NewVote, VoteConfidence, VoteCounts, VoteValue},
};
use uuid::Uuid;

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

/// A clock the test moves by hand.
#[derive(Clone)]
struct ManualClock(Arc<Mutex<DateTime<Utc>>>);

impl ManualClock {
  fn advance(&self, by: Duration) {
    let mut now = self.0.lock().unwrap();
    *now += by;
  }
}

async fn store_with_clock() -> (SqliteStore, ManualClock) {
  let clock = ManualClock(Arc::new(Mutex::new(Utc::now())));
  let handle = clock.clone();
  let s = store()
    .await
    .with_clock(Arc::new(move || *handle.0.lock().unwrap()));
  (s, clock)
}

fn domain(err: Error) -> CoreError {
  match err {
    Error::Core(e) => e,
    other => panic!("expected a domain error, got {other:?}"),
  }
}

fn new_statement(discussion_id: Uuid, text: &str) -> NewStatement {
  NewStatement::new(discussion_id, Uuid::new_v4(), text)
}

// ─── Statements ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_get_statement() {
  let s = store().await;
  let discussion = Uuid::new_v4();

  let mut input = new_statement(discussion, "  Public transit should be free  ");
  input.kind = StatementKind::Question;
  input.is_seed = true;
  let created = s.create_statement(input).await.unwrap();

  assert_eq!(created.text, "Public transit should be free");
  assert_eq!(created.moderation, ModerationStatus::Approved);

  let fetched = s.get_statement(created.statement_id).await.unwrap().unwrap();
  assert_eq!(fetched.statement_id, created.statement_id);
  assert_eq!(fetched.discussion_id, discussion);
  assert_eq!(fetched.kind, StatementKind::Question);
  assert!(fetched.is_seed);
  assert_eq!(fetched.counts, VoteCounts::default());
  assert_eq!(fetched.created_at, created.created_at);
}

#[tokio::test]
async fn get_statement_missing_returns_none() {
  let s = store().await;
  assert!(s.get_statement(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn create_rejects_out_of_range_text() {
  let s = store().await;
  let err = s
    .create_statement(new_statement(Uuid::new_v4(), "short"))
    .await
    .unwrap_err();
  assert!(matches!(domain(err), CoreError::TextLength { len: 5, .. }));
}

#[tokio::test]
async fn duplicate_text_is_rejected_with_existing_id() {
  let s = store().await;
  let discussion = Uuid::new_v4();

  let first = s
    .create_statement(new_statement(discussion, "Rent control helps tenants"))
    .await
    .unwrap();
  let err = s
    .create_statement(new_statement(discussion, "  RENT control   helps tenants "))
    .await
    .unwrap_err();

  match domain(err) {
    CoreError::Duplicate { existing } => assert_eq!(existing, first.statement_id),
    other => panic!("unexpected {other:?}"),
  }
}

#[tokio::test]
async fn same_text_allowed_in_other_discussion_or_after_removal() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  let text = "Rent control helps tenants";

  let first = s.create_statement(new_statement(discussion, text)).await.unwrap();
  s.create_statement(new_statement(Uuid::new_v4(), text)).await.unwrap();

  s.remove_statement(first.statement_id, first.author_id).await.unwrap();
  s.create_statement(new_statement(discussion, text)).await.unwrap();
}

// ─── Edits ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn edit_within_window_succeeds() {
  let (s, clock) = store_with_clock().await;
  let created = s
    .create_statement(new_statement(Uuid::new_v4(), "Schools should start later"))
    .await
    .unwrap();

  clock.advance(Duration::minutes(9));
  let edited = s
    .edit_statement(created.statement_id, created.author_id, "Schools should start at nine".into())
    .await
    .unwrap();

  assert_eq!(edited.text, "Schools should start at nine");
  assert!(edited.edited_at.is_some());
}

#[tokio::test]
async fn edit_after_window_is_locked() {
  let (s, clock) = store_with_clock().await;
  let created = s
    .create_statement(new_statement(Uuid::new_v4(), "Schools should start later"))
    .await
    .unwrap();

  clock.advance(Duration::minutes(11));
  let err = s
    .edit_statement(created.statement_id, created.author_id, "Schools should start at nine".into())
    .await
    .unwrap_err();

  assert!(matches!(
    domain(err),
    CoreError::EditLocked { reason: EditLock::WindowElapsed, .. }
  ));
}

#[tokio::test]
async fn edit_after_third_party_vote_is_locked() {
  let (s, clock) = store_with_clock().await;
  let created = s
    .create_statement(new_statement(Uuid::new_v4(), "Schools should start later"))
    .await
    .unwrap();

  // The author's own vote does not lock the statement.
  s.cast_vote(NewVote::new(created.author_id, created.statement_id, VoteValue::Agree))
    .await
    .unwrap();
  s.cast_vote(NewVote::new(Uuid::new_v4(), created.statement_id, VoteValue::Disagree))
    .await
    .unwrap();

  clock.advance(Duration::minutes(5));
  let err = s
    .edit_statement(created.statement_id, created.author_id, "Schools should start at nine".into())
    .await
    .unwrap_err();

  assert!(matches!(domain(err), CoreError::EditLocked { reason: EditLock::VotedOn, .. }));
}

#[tokio::test]
async fn edit_with_own_vote_only_succeeds() {
  let s = store().await;
  let created = s
    .create_statement(new_statement(Uuid::new_v4(), "Schools should start later"))
    .await
    .unwrap();
  s.cast_vote(NewVote::new(created.author_id, created.statement_id, VoteValue::Agree))
    .await
    .unwrap();

  s.edit_statement(created.statement_id, created.author_id, "Schools should start at nine".into())
    .await
    .unwrap();
}

#[tokio::test]
async fn edit_loses_to_a_concurrent_removal() {
  let path = std::env::temp_dir().join(format!("concord-edit-{}.db", Uuid::new_v4()));
  let s = SqliteStore::open(&path).await.unwrap();
  let created = s
    .create_statement(new_statement(Uuid::new_v4(), "Schools should start at eight"))
    .await
    .unwrap();

  // The next clock read runs after the store has loaded the live row but
  // before its write transaction; remove the statement from a second
  // connection at that moment.
  let side = Mutex::new(rusqlite::Connection::open(&path).unwrap());
  let id_str = crate::encode::encode_uuid(created.statement_id);
  let s = s.with_clock(Arc::new(move || {
    let now = Utc::now();
    side
      .lock()
      .unwrap()
      .execute(
        "UPDATE statements SET deleted_at = ?2, deletion_reason = 'owner'
         WHERE statement_id = ?1 AND deleted_at IS NULL",
        rusqlite::params![id_str, crate::encode::encode_dt(now)],
      )
      .unwrap();
    now
  }));

  let err = s
    .edit_statement(created.statement_id, created.author_id, "Schools should start at nine".into())
    .await
    .unwrap_err();
  assert!(matches!(
    domain(err),
    CoreError::EditLocked { reason: EditLock::Removed, .. }
  ));

  let fetched = s.get_statement(created.statement_id).await.unwrap().unwrap();
  assert_eq!(fetched.text, "Schools should start at eight");
  assert!(fetched.is_deleted());
  let _ = std::fs::remove_file(&path);
}

#[tokio::test]
async fn edit_by_someone_else_is_rejected() {
  let s = store().await;
  let created = s
    .create_statement(new_statement(Uuid::new_v4(), "Schools should start later"))
    .await
    .unwrap();

  let err = s
    .edit_statement(created.statement_id, Uuid::new_v4(), "Schools should start at nine".into())
    .await
    .unwrap_err();
  assert!(matches!(domain(err), CoreError::NotAuthor { .. }));
}

#[tokio::test]
async fn edit_into_existing_text_is_duplicate() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  let other = s
    .create_statement(new_statement(discussion, "Libraries need more funding"))
    .await
    .unwrap();
  let mine = s
    .create_statement(new_statement(discussion, "Schools should start later"))
    .await
    .unwrap();

  let err = s
    .edit_statement(mine.statement_id, mine.author_id, "libraries need more FUNDING".into())
    .await
    .unwrap_err();
  assert!(matches!(domain(err), CoreError::Duplicate { existing } if existing == other.statement_id));
}

// ─── Votes ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn cast_vote_updates_counters() {
  let s = store().await;
  let st = s
    .create_statement(new_statement(Uuid::new_v4(), "Parking should cost more downtown"))
    .await
    .unwrap();

  for value in [VoteValue::Agree, VoteValue::Agree, VoteValue::Disagree, VoteValue::Unsure] {
    s.cast_vote(NewVote::new(Uuid::new_v4(), st.statement_id, value)).await.unwrap();
  }

  let fetched = s.get_statement(st.statement_id).await.unwrap().unwrap();
  assert_eq!(fetched.counts, VoteCounts::new(2, 1, 1));
  assert_eq!(fetched.counts.total(), 4);
}

#[tokio::test]
async fn revote_a_b_a_leaves_single_row_and_original_counts() {
  let s = store().await;
  let st = s
    .create_statement(new_statement(Uuid::new_v4(), "Parking should cost more downtown"))
    .await
    .unwrap();
  let voter = Uuid::new_v4();

  let first = s.cast_vote(NewVote::new(voter, st.statement_id, VoteValue::Agree)).await.unwrap();
  assert_eq!(first.previous, None);
  let second =
    s.cast_vote(NewVote::new(voter, st.statement_id, VoteValue::Disagree)).await.unwrap();
  assert_eq!(second.previous, Some(VoteValue::Agree));
  assert_eq!(second.counts, VoteCounts::new(0, 1, 0));
  let third = s.cast_vote(NewVote::new(voter, st.statement_id, VoteValue::Agree)).await.unwrap();
  assert_eq!(third.counts, VoteCounts::new(1, 0, 0));

  let votes = s.votes_for_statement(st.statement_id).await.unwrap();
  assert_eq!(votes.len(), 1);
  assert_eq!(votes[0].value, VoteValue::Agree);
}

#[tokio::test]
async fn vote_confidence_roundtrip() {
  let s = store().await;
  let st = s
    .create_statement(new_statement(Uuid::new_v4(), "Parking should cost more downtown"))
    .await
    .unwrap();
  let voter = Uuid::new_v4();

  let mut input = NewVote::new(voter, st.statement_id, VoteValue::Unsure);
  input.confidence = Some(VoteConfidence::try_from(4).unwrap());
  s.cast_vote(input).await.unwrap();

  let vote = s.get_vote(voter, st.statement_id).await.unwrap().unwrap();
  assert_eq!(vote.value, VoteValue::Unsure);
  assert_eq!(vote.confidence.map(VoteConfidence::get), Some(4));
}

#[tokio::test]
async fn vote_on_removed_or_rejected_statement_is_not_votable() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  let removed = s
    .create_statement(new_statement(discussion, "First statement to remove"))
    .await
    .unwrap();
  let rejected = s
    .create_statement(new_statement(discussion, "Second statement to reject"))
    .await
    .unwrap();

  s.remove_statement(removed.statement_id, removed.author_id).await.unwrap();
  let moderated = s
    .set_moderation(rejected.statement_id, ModerationStatus::Rejected)
    .await
    .unwrap();
  assert!(matches!(
    moderated.deletion,
    Deletion::Deleted { reason: DeletionReason::Moderation, .. }
  ));

  for id in [removed.statement_id, rejected.statement_id] {
    let err = s.cast_vote(NewVote::new(Uuid::new_v4(), id, VoteValue::Agree)).await.unwrap_err();
    assert!(matches!(domain(err), CoreError::NotVotable(got) if got == id));
  }
}

#[tokio::test]
async fn vote_on_missing_statement_is_not_found() {
  let s = store().await;
  let err = s
    .cast_vote(NewVote::new(Uuid::new_v4(), Uuid::new_v4(), VoteValue::Agree))
    .await
    .unwrap_err();
  assert!(matches!(domain(err), CoreError::StatementNotFound(_)));
}

#[tokio::test]
async fn concurrent_votes_keep_counters_consistent() {
  let s = store().await;
  let st = s
    .create_statement(new_statement(Uuid::new_v4(), "Parking should cost more downtown"))
    .await
    .unwrap();
  let voters: Vec<Uuid> = (0..12).map(|_| Uuid::new_v4()).collect();

  let mut handles = Vec::new();
  for (i, voter) in voters.iter().copied().enumerate() {
    let s = s.clone();
    let id = st.statement_id;
    handles.push(tokio::spawn(async move {
      // Each voter casts, changes, and settles on a value.
      let values = [VoteValue::Agree, VoteValue::Disagree, VoteValue::Unsure];
      for step in 0..3 {
        s.cast_vote(NewVote::new(voter, id, values[(i + step) % 3])).await.unwrap();
      }
    }));
  }
  for h in handles {
    h.await.unwrap();
  }

  let fetched = s.get_statement(st.statement_id).await.unwrap().unwrap();
  let votes = s.votes_for_statement(st.statement_id).await.unwrap();
  let mut tallied = VoteCounts::default();
  for v in &votes {
    tallied.apply(None, v.value);
  }

  assert_eq!(votes.len(), voters.len());
  assert_eq!(fetched.counts, tallied);
  assert_eq!(fetched.counts.total() as usize, voters.len());
}

// ─── Flags and moderation ────────────────────────────────────────────────────

#[tokio::test]
async fn flags_count_once_per_reporter() {
  let s = store().await;
  let st = s
    .create_statement(new_statement(Uuid::new_v4(), "This statement gets flagged"))
    .await
    .unwrap();
  let reporter = Uuid::new_v4();

  let first = s.flag_statement(st.statement_id, reporter, Some("spam".into())).await.unwrap();
  assert!(first.newly_recorded);
  assert_eq!(first.flag_count, 1);

  let again = s.flag_statement(st.statement_id, reporter, None).await.unwrap();
  assert!(!again.newly_recorded);
  assert_eq!(again.flag_count, 1);

  let other = s.flag_statement(st.statement_id, Uuid::new_v4(), None).await.unwrap();
  assert_eq!(other.flag_count, 2);

  // Flags do not touch moderation status.
  let fetched = s.get_statement(st.statement_id).await.unwrap().unwrap();
  assert_eq!(fetched.moderation, ModerationStatus::Approved);
  assert_eq!(fetched.flag_count, 2);

  // Reviewers can see who flagged and why; a repeat keeps the first reason.
  let flags = s.flags_for_statement(st.statement_id).await.unwrap();
  assert_eq!(flags.len(), 2);
  assert!(flags.iter().all(|f| f.statement_id == st.statement_id));
  let first_flag = flags.iter().find(|f| f.reporter_id == reporter).unwrap();
  assert_eq!(first_flag.reason.as_deref(), Some("spam"));
  let other_flag = flags.iter().find(|f| f.reporter_id != reporter).unwrap();
  assert_eq!(other_flag.reason, None);
}

#[tokio::test]
async fn remove_requires_author() {
  let s = store().await;
  let st = s
    .create_statement(new_statement(Uuid::new_v4(), "Only my author may remove me"))
    .await
    .unwrap();

  let err = s.remove_statement(st.statement_id, Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(domain(err), CoreError::NotAuthor { .. }));

  let removed = s.remove_statement(st.statement_id, st.author_id).await.unwrap();
  assert!(matches!(removed.deletion, Deletion::Deleted { reason: DeletionReason::Owner, .. }));
}

// ─── Listing ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_statements_progressive_and_paged() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  let mut ids = Vec::new();
  for (i, votes) in [3usize, 0, 1].into_iter().enumerate() {
    let st = s
      .create_statement(new_statement(discussion, &format!("Statement number {i} here")))
      .await
      .unwrap();
    for _ in 0..votes {
      s.cast_vote(NewVote::new(Uuid::new_v4(), st.statement_id, VoteValue::Agree))
        .await
        .unwrap();
    }
    ids.push(st.statement_id);
  }

  let all = s.list_statements(discussion, &StatementQuery::default()).await.unwrap();
  let order: Vec<_> = all.iter().map(|st| st.statement_id).collect();
  assert_eq!(order, vec![ids[1], ids[2], ids[0]]);

  let query = StatementQuery { sort: SortOrder::MostVoted, page: 1, per_page: 2, ..Default::default() };
  let page = s.list_statements(discussion, &query).await.unwrap();
  assert_eq!(page.len(), 1);
  assert_eq!(page[0].statement_id, ids[1]);
}

#[tokio::test]
async fn list_hides_removed_and_pending_by_default() {
  let s = store()
    .await
    .with_config(
      concord_core::config::StoreConfig {
        default_moderation: ModerationStatus::Pending,
        ..Default::default()
      },
      Default::default(),
    );
  let discussion = Uuid::new_v4();
  let pending = s
    .create_statement(new_statement(discussion, "Awaiting a moderator decision"))
    .await
    .unwrap();
  let approved = s
    .create_statement(new_statement(discussion, "Already approved by moderators"))
    .await
    .unwrap();
  s.set_moderation(approved.statement_id, ModerationStatus::Approved).await.unwrap();

  let visible = s.list_statements(discussion, &StatementQuery::default()).await.unwrap();
  assert_eq!(visible.len(), 1);
  assert_eq!(visible[0].statement_id, approved.statement_id);

  let query = StatementQuery { include_pending: true, ..Default::default() };
  let with_pending = s.list_statements(discussion, &query).await.unwrap();
  assert_eq!(with_pending.len(), 2);
  assert!(with_pending.iter().any(|st| st.statement_id == pending.statement_id));
}

// ─── Analysis support ────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_covers_only_active_statements() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  let kept = s
    .create_statement(new_statement(discussion, "Kept in the analysis"))
    .await
    .unwrap();
  let dropped = s
    .create_statement(new_statement(discussion, "Removed before the analysis"))
    .await
    .unwrap();

  for id in [kept.statement_id, dropped.statement_id] {
    s.cast_vote(NewVote::new(Uuid::new_v4(), id, VoteValue::Agree)).await.unwrap();
  }
  s.remove_statement(dropped.statement_id, dropped.author_id).await.unwrap();

  let snapshot = s.vote_snapshot(discussion).await.unwrap();
  assert_eq!(snapshot.statement_ids, vec![kept.statement_id]);
  assert_eq!(snapshot.votes.len(), 1);
  assert_eq!(snapshot.vote_count(), s.discussion_vote_count(discussion).await.unwrap());
}

fn analysis(discussion_id: Uuid, vote_count: u64) -> ConsensusAnalysis {
  ConsensusAnalysis {
    analysis_id: Uuid::new_v4(),
    discussion_id,
    computed_at: Utc::now(),
    cluster_count: 2,
    cluster_sizes: vec![6, 6],
    silhouette: 0.9,
    low_confidence: false,
    participant_count: 12,
    consensus: vec![Uuid::new_v4()],
    bridges: vec![],
    divisive: vec![Uuid::new_v4(), Uuid::new_v4()],
    statement_stats: vec![],
    vote_count,
  }
}

#[tokio::test]
async fn replace_analysis_swaps_current_row() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  assert!(s.current_analysis(discussion).await.unwrap().is_none());

  let first = analysis(discussion, 40);
  s.replace_analysis(&first).await.unwrap();
  assert_eq!(s.current_analysis(discussion).await.unwrap().unwrap().analysis_id, first.analysis_id);

  let second = analysis(discussion, 95);
  s.replace_analysis(&second).await.unwrap();
  let current = s.current_analysis(discussion).await.unwrap().unwrap();
  assert_eq!(current.analysis_id, second.analysis_id);
  assert_eq!(current.vote_count, 95);
  assert_eq!(current.divisive, second.divisive);
  assert_eq!(current.cluster_sizes, vec![6, 6]);
}

#[tokio::test]
async fn analysis_lock_is_exclusive_until_released() {
  let s = store().await;
  let discussion = Uuid::new_v4();
  let timeout = Duration::minutes(5);

  let lease = s.try_acquire_analysis_lock(discussion, timeout).await.unwrap().unwrap();
  assert!(s.try_acquire_analysis_lock(discussion, timeout).await.unwrap().is_none());

  // Other discussions are unaffected.
  assert!(s.try_acquire_analysis_lock(Uuid::new_v4(), timeout).await.unwrap().is_some());

  s.release_analysis_lock(lease).await.unwrap();
  assert!(s.try_acquire_analysis_lock(discussion, timeout).await.unwrap().is_some());
}

#[tokio::test]
async fn expired_analysis_lock_can_be_taken_over() {
  let (s, clock) = store_with_clock().await;
  let discussion = Uuid::new_v4();

  let stale = s
    .try_acquire_analysis_lock(discussion, Duration::minutes(5))
    .await
    .unwrap()
    .unwrap();
  clock.advance(Duration::minutes(6));

  let fresh = s
    .try_acquire_analysis_lock(discussion, Duration::minutes(5))
    .await
    .unwrap()
    .unwrap();
  assert_ne!(stale.lease_id, fresh.lease_id);

  // The hung run's late release must not free the new holder's lock.
  s.release_analysis_lock(stale).await.unwrap();
  assert!(s.try_acquire_analysis_lock(discussion, Duration::minutes(5)).await.unwrap().is_none());
}
