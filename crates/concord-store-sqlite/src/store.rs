//! [`SqliteStore`], the SQLite implementation of [`DiscussionStore`].

use std::{path::Path, sync::Arc};

use chrono::{DateTime, Duration, SubsecRound as _, Utc};
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use uuid::Uuid;

use concord_core::{
  analysis::{CastVote, ConsensusAnalysis, VoteSnapshot},
  config::{RankingConfig, StoreConfig},
  error::EditLock,
  ranking,
  statement::{
    DeletionReason, ModerationStatus, NewStatement, Statement, validate_text,
  },
  store::{AnalysisLease, DiscussionStore, StatementQuery},
  vote::{Flag, FlagResult, NewVote, Vote, VoteCounts, VoteResult, VoteValue},
};

use crate::{
  Result,
  encode::{
    ANALYSIS_COLUMNS, EncodedAnalysis, FLAG_COLUMNS, RawAnalysis, RawFlag, RawStatement,
    RawVote, STATEMENT_COLUMNS, VOTE_COLUMNS, counter_column, decode_uuid,
    encode_deletion_reason, encode_dt, encode_kind, encode_moderation,
    encode_uuid, text_hash,
  },
  schema::SCHEMA,
};

type CoreError = concord_core::Error;

/// Source of "now" for timestamps and edit-window checks.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Live, approved statements: the ones that feed the vote matrix.
const ACTIVE: &str = "deleted_at IS NULL AND moderation = 'approved'";

/// Result of the edit transaction, decoded outside the connection thread.
enum EditOutcome {
  Updated,
  Duplicate(String),
  VotedOn,
  Removed,
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Concord store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:    tokio_rusqlite::Connection,
  config:  StoreConfig,
  ranking: RankingConfig,
  clock:   Clock,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      config: StoreConfig::default(),
      ranking: RankingConfig::default(),
      clock: Arc::new(Utc::now),
    })
  }

  pub fn with_config(mut self, config: StoreConfig, ranking: RankingConfig) -> Self {
    self.config = config;
    self.ranking = ranking;
    self
  }

  /// Replace the wall clock, e.g. to test edit windows.
  pub fn with_clock(mut self, clock: Clock) -> Self {
    self.clock = clock;
    self
  }

  /// Current time at the precision timestamps are stored with.
  fn now(&self) -> DateTime<Utc> { (self.clock)().trunc_subsecs(6) }

  /// Whether anyone other than `author_id` has voted on the statement.
  async fn voted_on_by_others(&self, statement_id: Uuid, author_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(statement_id);
    let author_str = encode_uuid(author_id);

    let voted = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          "SELECT EXISTS (
             SELECT 1 FROM votes WHERE statement_id = ?1 AND participant_id != ?2
           )",
          rusqlite::params![id_str, author_str],
          |r| r.get::<_, bool>(0),
        )?)
      })
      .await?;
    Ok(voted)
  }

  async fn require_statement(&self, statement_id: Uuid) -> Result<Statement> {
    self
      .get_statement(statement_id)
      .await?
      .ok_or_else(|| CoreError::StatementNotFound(statement_id).into())
  }
}

// ─── DiscussionStore impl ────────────────────────────────────────────────────

impl DiscussionStore for SqliteStore {
  type Error = crate::Error;

  // ── Statements ────────────────────────────────────────────────────────────

  async fn create_statement(&self, input: NewStatement) -> Result<Statement> {
    let text = validate_text(&input.text)?;

    let statement = Statement {
      statement_id:  Uuid::new_v4(),
      discussion_id: input.discussion_id,
      author_id:     input.author_id,
      text,
      kind:          input.kind,
      created_at:    self.now(),
      edited_at:     None,
      moderation:    self.config.default_moderation,
      deletion:      Default::default(),
      is_seed:       input.is_seed,
      flag_count:    0,
      counts:        VoteCounts::default(),
    };

    let id_str         = encode_uuid(statement.statement_id);
    let discussion_str = encode_uuid(statement.discussion_id);
    let author_str     = encode_uuid(statement.author_id);
    let text_str       = statement.text.clone();
    let hash           = text_hash(&statement.text);
    let kind_str       = encode_kind(statement.kind);
    let created_str    = encode_dt(statement.created_at);
    let moderation_str = encode_moderation(statement.moderation);
    let is_seed        = statement.is_seed;

    let existing: Option<String> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let existing: Option<String> = tx
          .query_row(
            "SELECT statement_id FROM statements
             WHERE discussion_id = ?1 AND text_hash = ?2 AND deleted_at IS NULL",
            rusqlite::params![discussion_str, hash],
            |r| r.get(0),
          )
          .optional()?;

        if existing.is_none() {
          tx.execute(
            "INSERT INTO statements (
               statement_id, discussion_id, author_id, text, text_hash,
               kind, created_at, moderation, is_seed
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            rusqlite::params![
              id_str,
              discussion_str,
              author_str,
              text_str,
              hash,
              kind_str,
              created_str,
              moderation_str,
              is_seed,
            ],
          )?;
        }
        tx.commit()?;
        Ok(existing)
      })
      .await?;

    if let Some(existing) = existing {
      return Err(CoreError::Duplicate { existing: decode_uuid(&existing)? }.into());
    }
    Ok(statement)
  }

  async fn get_statement(&self, statement_id: Uuid) -> Result<Option<Statement>> {
    let id_str = encode_uuid(statement_id);

    let raw: Option<RawStatement> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {STATEMENT_COLUMNS} FROM statements WHERE statement_id = ?1"),
            rusqlite::params![id_str],
            RawStatement::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawStatement::into_statement).transpose()
  }

  async fn edit_statement(
    &self,
    statement_id: Uuid,
    editor_id:    Uuid,
    new_text:     String,
  ) -> Result<Statement> {
    let text = validate_text(&new_text)?;
    let current = self.require_statement(statement_id).await?;
    let voted = self.voted_on_by_others(statement_id, current.author_id).await?;
    current.check_editable(editor_id, self.now(), self.config.edit_window(), voted)?;

    let id_str         = encode_uuid(statement_id);
    let discussion_str = encode_uuid(current.discussion_id);
    let hash           = text_hash(&text);
    let edited_str     = encode_dt(self.now());

    let outcome: EditOutcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let duplicate: Option<String> = tx
          .query_row(
            "SELECT statement_id FROM statements
             WHERE discussion_id = ?1 AND text_hash = ?2
               AND deleted_at IS NULL AND statement_id != ?3",
            rusqlite::params![discussion_str, hash, id_str],
            |r| r.get(0),
          )
          .optional()?;
        if let Some(existing) = duplicate {
          return Ok(EditOutcome::Duplicate(existing));
        }

        // A third-party vote, removal or rejection may have landed since
        // the checks above.
        let updated = tx.execute(
          "UPDATE statements SET text = ?2, text_hash = ?3, edited_at = ?4
           WHERE statement_id = ?1
             AND deleted_at IS NULL AND moderation != 'rejected'
             AND NOT EXISTS (
               SELECT 1 FROM votes v
               WHERE v.statement_id = ?1 AND v.participant_id != statements.author_id
             )",
          rusqlite::params![id_str, text, hash, edited_str],
        )?;
        if updated == 0 {
          let live: bool = tx
            .query_row(
              "SELECT deleted_at IS NULL AND moderation != 'rejected'
               FROM statements WHERE statement_id = ?1",
              rusqlite::params![id_str],
              |r| r.get(0),
            )
            .optional()?
            .unwrap_or(false);
          return Ok(if live { EditOutcome::VotedOn } else { EditOutcome::Removed });
        }
        tx.commit()?;
        Ok(EditOutcome::Updated)
      })
      .await?;

    match outcome {
      EditOutcome::Updated => {}
      EditOutcome::Duplicate(existing) => {
        return Err(CoreError::Duplicate { existing: decode_uuid(&existing)? }.into());
      }
      EditOutcome::VotedOn => {
        return Err(CoreError::EditLocked { statement_id, reason: EditLock::VotedOn }.into());
      }
      EditOutcome::Removed => {
        return Err(CoreError::EditLocked { statement_id, reason: EditLock::Removed }.into());
      }
    }

    self.require_statement(statement_id).await
  }

  async fn set_moderation(
    &self,
    statement_id: Uuid,
    status:       ModerationStatus,
  ) -> Result<Statement> {
    let id_str     = encode_uuid(statement_id);
    let status_str = encode_moderation(status);
    let reason_str = encode_deletion_reason(DeletionReason::Moderation);
    let now_str    = encode_dt(self.now());

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE statements SET
             moderation      = ?2,
             deleted_at      = CASE WHEN ?2 = 'rejected' AND deleted_at IS NULL
                                    THEN ?4 ELSE deleted_at END,
             deletion_reason = CASE WHEN ?2 = 'rejected' AND deleted_at IS NULL
                                    THEN ?3 ELSE deletion_reason END
           WHERE statement_id = ?1",
          rusqlite::params![id_str, status_str, reason_str, now_str],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(CoreError::StatementNotFound(statement_id).into());
    }
    self.require_statement(statement_id).await
  }

  async fn remove_statement(&self, statement_id: Uuid, requester_id: Uuid) -> Result<Statement> {
    let current = self.require_statement(statement_id).await?;
    if current.author_id != requester_id {
      return Err(CoreError::NotAuthor { statement_id, participant_id: requester_id }.into());
    }
    if current.is_deleted() {
      return Ok(current);
    }

    let id_str     = encode_uuid(statement_id);
    let reason_str = encode_deletion_reason(DeletionReason::Owner);
    let now_str    = encode_dt(self.now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "UPDATE statements SET deleted_at = ?2, deletion_reason = ?3
           WHERE statement_id = ?1 AND deleted_at IS NULL",
          rusqlite::params![id_str, now_str, reason_str],
        )?;
        Ok(())
      })
      .await?;

    self.require_statement(statement_id).await
  }

  async fn flag_statement(
    &self,
    statement_id: Uuid,
    reporter_id:  Uuid,
    reason:       Option<String>,
  ) -> Result<FlagResult> {
    let flag_id_str  = encode_uuid(Uuid::new_v4());
    let id_str       = encode_uuid(statement_id);
    let reporter_str = encode_uuid(reporter_id);
    let now_str      = encode_dt(self.now());

    let outcome: Option<(u32, bool)> = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let exists = tx
          .query_row(
            "SELECT 1 FROM statements WHERE statement_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(()),
          )
          .optional()?
          .is_some();
        if !exists {
          return Ok(None);
        }

        let inserted = tx.execute(
          "INSERT OR IGNORE INTO flags (flag_id, statement_id, reporter_id, reason, recorded_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![flag_id_str, id_str, reporter_str, reason, now_str],
        )?;
        if inserted == 1 {
          tx.execute(
            "UPDATE statements SET flag_count = flag_count + 1 WHERE statement_id = ?1",
            rusqlite::params![id_str],
          )?;
        }
        let count: u32 = tx.query_row(
          "SELECT flag_count FROM statements WHERE statement_id = ?1",
          rusqlite::params![id_str],
          |r| r.get(0),
        )?;
        tx.commit()?;
        Ok(Some((count, inserted == 1)))
      })
      .await?;

    let (flag_count, newly_recorded) =
      outcome.ok_or(CoreError::StatementNotFound(statement_id))?;
    Ok(FlagResult { statement_id, flag_count, newly_recorded })
  }

  async fn flags_for_statement(&self, statement_id: Uuid) -> Result<Vec<Flag>> {
    let id_str = encode_uuid(statement_id);

    let raws: Vec<RawFlag> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {FLAG_COLUMNS} FROM flags WHERE statement_id = ?1
           ORDER BY recorded_at, flag_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawFlag::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawFlag::into_flag).collect()
  }

  async fn list_statements(
    &self,
    discussion_id: Uuid,
    query:         &StatementQuery,
  ) -> Result<Vec<Statement>> {
    let discussion_str = encode_uuid(discussion_id);
    let moderation_filter = if query.include_pending {
      "moderation IN ('approved', 'pending')"
    } else {
      "moderation = 'approved'"
    };

    let raws: Vec<RawStatement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {STATEMENT_COLUMNS} FROM statements
           WHERE discussion_id = ?1 AND deleted_at IS NULL AND {moderation_filter}"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![discussion_str], RawStatement::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let statements = raws
      .into_iter()
      .map(RawStatement::into_statement)
      .collect::<Result<Vec<_>>>()?;

    Ok(
      ranking::rank(statements, query.sort, &self.ranking)
        .into_iter()
        .skip(query.page.saturating_mul(query.per_page))
        .take(query.per_page)
        .collect(),
    )
  }

  // ── Votes ─────────────────────────────────────────────────────────────────

  async fn cast_vote(&self, input: NewVote) -> Result<VoteResult> {
    let vote = Vote {
      participant_id: input.participant_id,
      statement_id:   input.statement_id,
      value:          input.value,
      confidence:     input.confidence,
      updated_at:     self.now(),
    };

    let statement_id    = vote.statement_id;
    let participant_str = encode_uuid(vote.participant_id);
    let id_str          = encode_uuid(vote.statement_id);
    let value           = vote.value;
    let confidence      = vote.confidence.map(i64::from);
    let updated_str     = encode_dt(vote.updated_at);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let target: Option<(Option<String>, String)> = tx
          .query_row(
            "SELECT deleted_at, moderation FROM statements WHERE statement_id = ?1",
            rusqlite::params![id_str],
            |r| Ok((r.get(0)?, r.get(1)?)),
          )
          .optional()?;
        match target {
          None => return Ok(Err(CoreError::StatementNotFound(statement_id))),
          Some((deleted_at, moderation)) if deleted_at.is_some() || moderation == "rejected" => {
            return Ok(Err(CoreError::NotVotable(statement_id)));
          }
          Some(_) => {}
        }

        let previous: Option<i64> = tx
          .query_row(
            "SELECT value FROM votes WHERE participant_id = ?1 AND statement_id = ?2",
            rusqlite::params![participant_str, id_str],
            |r| r.get(0),
          )
          .optional()?;
        let previous = match previous.map(VoteValue::try_from).transpose() {
          Ok(p) => p,
          Err(e) => return Ok(Err(e)),
        };

        tx.execute(
          "INSERT INTO votes (participant_id, statement_id, value, confidence, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (participant_id, statement_id) DO UPDATE SET
             value      = excluded.value,
             confidence = excluded.confidence,
             updated_at = excluded.updated_at",
          rusqlite::params![participant_str, id_str, value.as_i8(), confidence, updated_str],
        )?;

        // Counters move with the vote row, inside the same transaction.
        match previous {
          Some(prev) if prev == value => {}
          Some(prev) => {
            let (old, new) = (counter_column(prev), counter_column(value));
            tx.execute(
              &format!(
                "UPDATE statements SET {old} = {old} - 1, {new} = {new} + 1
                 WHERE statement_id = ?1"
              ),
              rusqlite::params![id_str],
            )?;
          }
          None => {
            let col = counter_column(value);
            tx.execute(
              &format!(
                "UPDATE statements SET {col} = {col} + 1, vote_count = vote_count + 1
                 WHERE statement_id = ?1"
              ),
              rusqlite::params![id_str],
            )?;
          }
        }

        let counts = tx.query_row(
          "SELECT agree_count, disagree_count, unsure_count FROM statements
           WHERE statement_id = ?1",
          rusqlite::params![id_str],
          |r| Ok(VoteCounts::new(r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;
        tx.commit()?;
        Ok(Ok((previous, counts)))
      })
      .await?;

    let (previous, counts) = outcome?;
    Ok(VoteResult { vote, previous, counts })
  }

  async fn get_vote(&self, participant_id: Uuid, statement_id: Uuid) -> Result<Option<Vote>> {
    let participant_str = encode_uuid(participant_id);
    let id_str          = encode_uuid(statement_id);

    let raw: Option<RawVote> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {VOTE_COLUMNS} FROM votes WHERE participant_id = ?1 AND statement_id = ?2"
            ),
            rusqlite::params![participant_str, id_str],
            RawVote::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawVote::into_vote).transpose()
  }

  async fn votes_for_statement(&self, statement_id: Uuid) -> Result<Vec<Vote>> {
    let id_str = encode_uuid(statement_id);

    let raws: Vec<RawVote> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {VOTE_COLUMNS} FROM votes WHERE statement_id = ?1 ORDER BY participant_id"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![id_str], RawVote::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawVote::into_vote).collect()
  }

  // ── Analysis ──────────────────────────────────────────────────────────────

  async fn discussion_vote_count(&self, discussion_id: Uuid) -> Result<u64> {
    let discussion_str = encode_uuid(discussion_id);

    let total: i64 = self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(
          &format!(
            "SELECT COALESCE(SUM(vote_count), 0) FROM statements
             WHERE discussion_id = ?1 AND {ACTIVE}"
          ),
          rusqlite::params![discussion_str],
          |r| r.get(0),
        )?)
      })
      .await?;
    Ok(total.max(0) as u64)
  }

  async fn vote_snapshot(&self, discussion_id: Uuid) -> Result<VoteSnapshot> {
    let discussion_str = encode_uuid(discussion_id);
    let taken_at = self.now();

    let (statement_strs, vote_rows): (Vec<String>, Vec<(String, String, i64)>) = self
      .conn
      .call(move |conn| {
        // Both reads come from one transaction so votes and statements agree.
        let tx = conn.transaction()?;
        let statements = {
          let mut stmt = tx.prepare(&format!(
            "SELECT statement_id FROM statements
             WHERE discussion_id = ?1 AND {ACTIVE}
             ORDER BY created_at, statement_id"
          ))?;
          stmt
            .query_map(rusqlite::params![discussion_str], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?
        };
        let votes = {
          let mut stmt = tx.prepare(
            "SELECT v.participant_id, v.statement_id, v.value
             FROM votes v JOIN statements s ON s.statement_id = v.statement_id
             WHERE s.discussion_id = ?1
               AND s.deleted_at IS NULL AND s.moderation = 'approved'
             ORDER BY v.participant_id, v.statement_id",
          )?;
          stmt
            .query_map(rusqlite::params![discussion_str], |r| {
              Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((statements, votes))
      })
      .await?;

    let statement_ids = statement_strs
      .iter()
      .map(|s| decode_uuid(s))
      .collect::<Result<Vec<_>>>()?;
    let votes = vote_rows
      .into_iter()
      .map(|(participant, statement, value)| {
        Ok(CastVote {
          participant_id: decode_uuid(&participant)?,
          statement_id:   decode_uuid(&statement)?,
          value:          VoteValue::try_from(value)?,
        })
      })
      .collect::<Result<Vec<_>>>()?;

    Ok(VoteSnapshot { discussion_id, taken_at, statement_ids, votes })
  }

  async fn current_analysis(&self, discussion_id: Uuid) -> Result<Option<ConsensusAnalysis>> {
    let discussion_str = encode_uuid(discussion_id);

    let raw: Option<RawAnalysis> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {ANALYSIS_COLUMNS} FROM analyses
               WHERE discussion_id = ?1 AND is_current = 1"
            ),
            rusqlite::params![discussion_str],
            RawAnalysis::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawAnalysis::into_analysis).transpose()
  }

  async fn replace_analysis(&self, analysis: &ConsensusAnalysis) -> Result<()> {
    let a = EncodedAnalysis::encode(analysis)?;

    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
          "UPDATE analyses SET is_current = 0 WHERE discussion_id = ?1 AND is_current = 1",
          rusqlite::params![a.discussion_id],
        )?;
        tx.execute(
          &format!(
            "INSERT INTO analyses ({ANALYSIS_COLUMNS}, is_current)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, 1)"
          ),
          rusqlite::params![
            a.analysis_id,
            a.discussion_id,
            a.computed_at,
            a.cluster_count,
            a.cluster_sizes,
            a.silhouette,
            a.low_confidence,
            a.participant_count,
            a.consensus_ids,
            a.bridge_ids,
            a.divisive_ids,
            a.statement_stats,
            a.vote_count,
          ],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn try_acquire_analysis_lock(
    &self,
    discussion_id: Uuid,
    timeout:       Duration,
  ) -> Result<Option<AnalysisLease>> {
    let lease = AnalysisLease { discussion_id, lease_id: Uuid::new_v4() };
    let now = self.now();

    let discussion_str = encode_uuid(discussion_id);
    let lease_str      = encode_uuid(lease.lease_id);
    let now_str        = encode_dt(now);
    let expires_str    = encode_dt(now + timeout);

    let acquired = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        // An expired lease belongs to a run that hung or crashed.
        tx.execute(
          "DELETE FROM analysis_locks WHERE discussion_id = ?1 AND expires_at <= ?2",
          rusqlite::params![discussion_str, now_str],
        )?;
        let inserted = tx.execute(
          "INSERT OR IGNORE INTO analysis_locks (discussion_id, lease_id, acquired_at, expires_at)
           VALUES (?1, ?2, ?3, ?4)",
          rusqlite::params![discussion_str, lease_str, now_str, expires_str],
        )?;
        tx.commit()?;
        Ok(inserted == 1)
      })
      .await?;

    Ok(acquired.then_some(lease))
  }

  async fn release_analysis_lock(&self, lease: AnalysisLease) -> Result<()> {
    let discussion_str = encode_uuid(lease.discussion_id);
    let lease_str      = encode_uuid(lease.lease_id);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM analysis_locks WHERE discussion_id = ?1 AND lease_id = ?2",
          rusqlite::params![discussion_str, lease_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}
